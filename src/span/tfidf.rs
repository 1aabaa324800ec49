//! Descriptive labels for span clusters.
//!
//! Each fresh span cluster starts with an opaque `"{batch}_{n}"` id. The
//! labeler scores the cluster's words by term frequency within the cluster
//! against the number of clusters using the word, and renames the cluster
//! after its best few words, e.g. `"revenue, quarter, growth"`.
//!
//! Entity placeholders (`The Organization`, ...) are removed before
//! counting and the replaced entity text is counted instead, once per
//! occurrence.

use super::types::{Span, SpanLabelMap};
use crate::label::Label;
use crate::vocab::Vocabulary;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Entity kinds replaced by `The <Kind>` placeholders during tokenization.
pub const ENTITY_PLACEHOLDERS: &[&str] = &[
    "Organization",
    "Person",
    "Facility",
    "Location",
    "Date",
    "Law",
    "Amount",
    "Event",
];

/// Characters trimmed from candidate label words.
const LABEL_PUNCTUATION: &[char] = &[
    '~', '!', '@', '#', '$', '%', '^', '&', '*', '(', ')', '<', '>', ',', '.', ':', ';',
];

/// Separator between a span's prefix (e.g. a section heading) and its body.
pub const PREFIX_SEPARATOR: &str = "||";

/// Cap on the language-model weight factor in the score.
const MAX_WEIGHT_FACTOR: f64 = 1.5;

/// Accumulated term and document frequencies.
///
/// Kept across batches so later clusters are scored against everything
/// seen so far.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TfIdfState {
    label_tf: BTreeMap<String, BTreeMap<String, f64>>,
    df: BTreeMap<String, usize>,
}

impl TfIdfState {
    /// Empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of clusters containing `word`.
    pub fn df(&self, word: &str) -> usize {
        self.df.get(word).copied().unwrap_or(0)
    }

    /// Term frequencies recorded for `label`.
    pub fn tf(&self, label: &str) -> Option<&BTreeMap<String, f64>> {
        self.label_tf.get(label)
    }

    /// Record the words of one cluster.
    ///
    /// `tf` is count over total tokens (before filtering) across the
    /// cluster's spans; each distinct word bumps `df` once.
    pub fn observe_cluster(&mut self, label: &str, spans: &[&Span], stopwords: &BTreeSet<String>) {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        let mut total = 0usize;
        for span in spans {
            let tokens = span_tokens(span);
            total += tokens.len();
            for t in tokens {
                if keep_token(&t, stopwords) {
                    *counts.entry(t).or_insert(0) += 1;
                }
            }
        }
        if total == 0 {
            return;
        }
        let tf = self.label_tf.entry(label.to_string()).or_default();
        for (word, count) in counts {
            tf.insert(word.clone(), count as f64 / total as f64);
            *self.df.entry(word).or_insert(0) += 1;
        }
    }

    /// Build a descriptive label for `label` from its recorded words.
    ///
    /// Returns `None` when no usable word remains.
    pub fn describe(
        &self,
        label: &str,
        weights: Option<&Vocabulary>,
        stopwords: &BTreeSet<String>,
        top_k: usize,
        max_terms: usize,
    ) -> Option<String> {
        let tf = self.label_tf.get(label)?;
        let mut scored: Vec<(&str, f64)> = tf
            .iter()
            .map(|(word, &f)| {
                let weight = weights
                    .and_then(|v| v.weight(&Label::leaf(word.as_str())))
                    .unwrap_or(1.0)
                    .min(MAX_WEIGHT_FACTOR);
                let idf = (1.0 / (1.0 + self.df(word) as f64)).ln();
                (word.as_str(), f * weight * idf)
            })
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        let mut words: Vec<String> = Vec::new();
        for (word, _) in scored.into_iter().take(top_k) {
            let w = word.to_lowercase();
            let w = w.trim_matches(LABEL_PUNCTUATION);
            if w.is_empty() || stopwords.contains(w) || all_stopword_compound(w, stopwords) {
                continue;
            }
            if !words.iter().any(|x| x == w) {
                words.push(w.to_string());
            }
            if words.len() == max_terms {
                break;
            }
        }
        if words.is_empty() {
            None
        } else {
            Some(words.join(", "))
        }
    }

    /// Move the frequencies of `old` under `new`, adding into any existing
    /// entry for `new`.
    pub fn rename(&mut self, old: &str, new: &str) {
        let Some(tf) = self.label_tf.remove(old) else {
            return;
        };
        let target = self.label_tf.entry(new.to_string()).or_default();
        for (word, f) in tf {
            *target.entry(word).or_insert(0.0) += f;
        }
    }
}

/// Rewrites opaque span-cluster ids into descriptive labels.
#[derive(Debug, Clone)]
pub struct TfIdfLabeler<'a> {
    stopwords: BTreeSet<String>,
    weights: Option<&'a Vocabulary>,
    top_k: usize,
    max_terms: usize,
}

impl<'a> TfIdfLabeler<'a> {
    /// Labeler filtering `stopwords`, scoring the top `top_k` words and
    /// keeping up to `max_terms` of them.
    pub fn new(stopwords: BTreeSet<String>, top_k: usize, max_terms: usize) -> Self {
        Self {
            stopwords,
            weights: None,
            top_k,
            max_terms,
        }
    }

    /// Use term weights from a vocabulary (missing words weigh 1.0).
    pub fn with_weights(mut self, vocab: &'a Vocabulary) -> Self {
        self.weights = Some(vocab);
        self
    }

    /// Score `clusters` (label → member spans), rename them in `map` and
    /// return the old → new label mapping.
    ///
    /// Clusters with no usable words keep their opaque id.
    pub fn relabel_with_tfidf(
        &self,
        state: &mut TfIdfState,
        map: &mut SpanLabelMap,
        clusters: &BTreeMap<String, Vec<&Span>>,
    ) -> BTreeMap<String, String> {
        for (label, spans) in clusters {
            state.observe_cluster(label, spans, &self.stopwords);
        }

        let mut renames = BTreeMap::new();
        for label in clusters.keys() {
            let Some(new) =
                state.describe(label, self.weights, &self.stopwords, self.top_k, self.max_terms)
            else {
                continue;
            };
            if new != *label {
                renames.insert(label.clone(), new);
            }
        }
        for (old, new) in &renames {
            let moved = map.relabel(old, new);
            state.rename(old, new);
            debug!(old = %old, new = %new, moved, "descriptive label");
        }
        renames
    }
}

/// Tokens a span contributes to its cluster's word counts.
///
/// Placeholders are dropped and entity text is added back `count` times.
/// A span at offset 0 keeps the tail of its prefix (after the last `:` and
/// `;`) as tokens; later spans drop the prefix entirely.
pub fn span_tokens(span: &Span) -> Vec<String> {
    let mut text = span.tokenized_text.clone();
    for kind in ENTITY_PLACEHOLDERS {
        text = text
            .replace(&format!("The {kind}"), "")
            .replace(&format!("The_{kind}"), "");
    }

    let mut tokens: Vec<String> = Vec::new();
    if span.id.offset == 0 {
        let body = match text.split_once(PREFIX_SEPARATOR) {
            Some((prefix, body)) => {
                let tail = prefix.rsplit(':').next().unwrap_or(prefix);
                let tail = tail.rsplit(';').next().unwrap_or(tail);
                tokens.extend(tail.split_whitespace().map(str::to_string));
                body
            }
            None => text.as_str(),
        };
        let spaced = body.replace('(', " ( ").replace(')', " ) ");
        tokens.extend(spaced.split_whitespace().map(str::to_string));
    } else {
        let body = text
            .split_once(PREFIX_SEPARATOR)
            .map_or(text.as_str(), |(_, b)| b);
        tokens.extend(body.split_whitespace().map(str::to_string));
    }

    for ent in &span.ents {
        let joined = ent.text.replace(' ', "_");
        tokens.extend(std::iter::repeat_n(joined, ent.count));
    }
    tokens
}

/// Whether a token counts toward word frequencies.
fn keep_token(token: &str, stopwords: &BTreeSet<String>) -> bool {
    if token.chars().count() <= 1 {
        return false;
    }
    if !token
        .chars()
        .next()
        .is_some_and(|c| c.to_ascii_lowercase().is_ascii_lowercase())
    {
        return false;
    }
    let lower = token.to_lowercase();
    !stopwords.contains(&lower) && !all_stopword_compound(&lower, stopwords)
}

/// A compound (`a_b`) whose every part is a stopword.
fn all_stopword_compound(word: &str, stopwords: &BTreeSet<String>) -> bool {
    word.contains('_')
        && word
            .to_lowercase()
            .split('_')
            .all(|part| stopwords.contains(part))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::label::ClusterMap;
    use crate::span::types::{Entity, SpanId};
    use crate::stopwords::Stopwords;

    fn stop() -> BTreeSet<String> {
        Stopwords::english().domain_set()
    }

    fn span(line: usize, offset: usize, text: &str) -> Span {
        Span::new(SpanId::new("f", line, offset), text)
    }

    #[test]
    fn placeholders_are_removed_and_entities_restored() {
        let s = span(0, 5, "The Organization reported The Amount")
            .with_entity(Entity::new("Acme Corp", "ORG", 2));
        assert_eq!(span_tokens(&s), vec!["reported", "Acme_Corp", "Acme_Corp"]);
    }

    #[test]
    fn prefix_tail_kept_only_at_offset_zero() {
        let first = span(0, 0, "Report: Q3; Revenue || sales grew (fast)");
        assert_eq!(
            span_tokens(&first),
            vec!["Revenue", "sales", "grew", "(", "fast", ")"]
        );
        let later = span(0, 40, "Report || margins fell");
        assert_eq!(span_tokens(&later), vec!["margins", "fell"]);
    }

    #[test]
    fn token_filter() {
        let sw = stop();
        assert!(keep_token("revenue", &sw));
        assert!(!keep_token("x", &sw));
        assert!(!keep_token("The", &sw));
        assert!(!keep_token("of_the", &sw));
        assert!(keep_token("of_revenue", &sw));
        assert!(!keep_token("(", &sw));
        assert!(!keep_token("3rd", &sw));
    }

    #[test]
    fn placeholder_only_cluster_uses_remaining_word() {
        let spans: Vec<Span> = (0..5)
            .map(|i| span(i, 3, "The Organization reported The Amount"))
            .collect();
        let refs: Vec<&Span> = spans.iter().collect();
        let mut map = SpanLabelMap::new();
        for s in &spans {
            map.register(&s.id);
            map.set_label(s.id.clone(), "0_0".into());
        }
        let clusters: BTreeMap<String, Vec<&Span>> = [("0_0".to_string(), refs)].into_iter().collect();

        let mut state = TfIdfState::new();
        let renames = TfIdfLabeler::new(stop(), 40, 5).relabel_with_tfidf(&mut state, &mut map, &clusters);
        assert_eq!(renames.get("0_0").map(String::as_str), Some("reported"));
        assert_eq!(state.df("reported"), 1);
        assert_eq!(map.members("reported").len(), 5);
        assert!(state.tf("0_0").is_none());
    }

    #[test]
    fn nothing_usable_keeps_opaque_id() {
        let spans = [span(0, 3, "The Organization and The Person")];
        let refs: Vec<&Span> = spans.iter().collect();
        let mut map = SpanLabelMap::new();
        map.register(&spans[0].id);
        map.set_label(spans[0].id.clone(), "2_7".into());
        let clusters: BTreeMap<String, Vec<&Span>> = [("2_7".to_string(), refs)].into_iter().collect();

        let mut state = TfIdfState::new();
        let renames = TfIdfLabeler::new(stop(), 40, 5).relabel_with_tfidf(&mut state, &mut map, &clusters);
        assert!(renames.is_empty());
        assert_eq!(map.label(&spans[0].id), Some("2_7"));
    }

    #[test]
    fn label_is_capped_and_deduplicated() {
        let spans = [span(
            0,
            3,
            "Alpha alpha beta gamma delta epsilon zeta eta theta",
        )];
        let refs: Vec<&Span> = spans.iter().collect();
        let mut state = TfIdfState::new();
        state.observe_cluster("c", &refs, &stop());
        let label = state.describe("c", None, &stop(), 40, 5).unwrap();
        let words: Vec<&str> = label.split(", ").collect();
        assert_eq!(words.len(), 5);
        let unique: BTreeSet<&str> = words.iter().copied().collect();
        assert_eq!(unique.len(), 5);
    }

    #[test]
    fn rename_merges_into_existing_label() {
        let mut state = TfIdfState::new();
        state
            .label_tf
            .insert("a".into(), [("x".to_string(), 0.5)].into_iter().collect());
        state
            .label_tf
            .insert("b".into(), [("x".to_string(), 0.25)].into_iter().collect());
        state.rename("a", "b");
        assert!(state.tf("a").is_none());
        assert_eq!(state.tf("b").unwrap()["x"], 0.75);
    }
}
