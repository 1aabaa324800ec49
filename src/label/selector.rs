//! Canonical label selection for one emergent cluster.
//!
//! Given the members of a cluster, decide which of them get which canonical
//! label. Rules, in order:
//!
//! 1. **Compounds** (leaf terms containing `_`) are handled first.
//! 2. If some compounds already carry labels, the most common uppercase
//!    label claims the uppercase-looking unlabeled compounds (plus anything
//!    unlabeled that contains, or is contained by, a claimed term), and the
//!    most common lowercase label claims the rest.
//! 3. With no history, uppercase compounds (again closed under substring
//!    containment) form one group and the remaining compounds another; each
//!    group gets a fresh parent named after its best-ranked member.
//! 4. Whatever is still unlabeled is split into existing parents,
//!    stopwords, and everything else; each non-empty part is unified under a
//!    parent named after its best-ranked member.
//!
//! Ranking prefers a known low language-model weight, then a short name,
//! then label order, so the outcome is a pure function of the inputs.
//! Containment closure walks candidates in ascending name length.

use super::label::Label;
use super::synonyms::SynonymMap;
use crate::stopwords::Stopwords;
use crate::vocab::Vocabulary;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Chooses canonical labels from cluster members.
#[derive(Debug, Clone, Copy)]
pub struct LabelSelector<'a> {
    vocab: &'a Vocabulary,
    stopwords: &'a Stopwords,
}

/// Working overlay: prior map plus assignments made for this cluster.
struct Overlay<'m> {
    prior: &'m SynonymMap,
    pending: BTreeMap<Label, Label>,
}

impl Overlay<'_> {
    fn current(&self, term: &Label) -> Option<&Label> {
        self.pending.get(term).or_else(|| self.prior.get(term))
    }

    fn assign_all(&mut self, terms: &[Label], label: &Label) {
        for term in terms {
            if label.depth() > term.depth() {
                self.pending.insert(term.clone(), label.clone());
            }
        }
    }
}

impl<'a> LabelSelector<'a> {
    /// Create a selector over the given weights and stopwords.
    pub fn new(vocab: &'a Vocabulary, stopwords: &'a Stopwords) -> Self {
        Self { vocab, stopwords }
    }

    /// Compute `(term, label)` assignments for one cluster.
    ///
    /// `synonyms` is only read. Members already labeled keep their label;
    /// singleton clusters produce nothing.
    pub fn select(&self, members: &[Label], synonyms: &SynonymMap) -> Vec<(Label, Label)> {
        let members: Vec<Label> = members
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if members.len() < 2 {
            return Vec::new();
        }
        let mut overlay = Overlay {
            prior: synonyms,
            pending: BTreeMap::new(),
        };

        let mut compounds: Vec<Label> = members.iter().filter(|m| m.is_compound()).cloned().collect();
        compounds.sort_by(|a, b| a.char_len().cmp(&b.char_len()).then_with(|| a.cmp(b)));
        if compounds.len() > 1 {
            self.label_compounds(&compounds, &mut overlay);
        }

        let remaining: Vec<Label> = members
            .iter()
            .filter(|m| overlay.current(m).is_none())
            .cloned()
            .collect();
        if remaining.len() > 1 {
            self.label_remaining(remaining, &mut overlay);
        }

        overlay.pending.into_iter().collect()
    }

    /// Apply [`select`](Self::select) to `synonyms`, returning how many terms
    /// were assigned.
    pub fn apply(&self, members: &[Label], synonyms: &mut SynonymMap) -> usize {
        let assignments = self.select(members, synonyms);
        let mut n = 0;
        for (term, label) in assignments {
            if synonyms.assign(term, label) {
                n += 1;
            }
        }
        n
    }

    fn label_compounds(&self, compounds: &[Label], overlay: &mut Overlay<'_>) {
        let mut upper_prior = Vec::new();
        let mut lower_prior = Vec::new();
        for term in compounds {
            if let Some(label) = overlay.prior.get(term) {
                if label.starts_upper() {
                    upper_prior.push(label.clone());
                } else {
                    lower_prior.push(label.clone());
                }
            }
        }

        let mut upper_group: BTreeSet<Label> = BTreeSet::new();

        if let Some(label) = most_common(&upper_prior) {
            let seeds: Vec<Label> = compounds
                .iter()
                .filter(|v| match overlay.current(v) {
                    Some(l) => *l == label,
                    None => v.starts_upper(),
                })
                .cloned()
                .collect();
            let group = containment_closure(seeds, compounds, |v| overlay.current(v).is_none());
            if group.len() > 1 {
                overlay.assign_all(&group, &label);
            }
            upper_group.extend(group);
        }

        if let Some(label) = most_common(&lower_prior) {
            let group: Vec<Label> = compounds
                .iter()
                .filter(|v| !upper_group.contains(*v))
                .filter(|v| overlay.current(v).is_none_or(|l| *l == label))
                .cloned()
                .collect();
            if group.len() > 1 {
                overlay.assign_all(&group, &label);
            }
        }

        if upper_prior.is_empty() && lower_prior.is_empty() {
            let seeds: Vec<Label> = compounds.iter().filter(|v| v.starts_upper()).cloned().collect();
            let mut upper = containment_closure(seeds, compounds, |_| true);
            let mut rest: Vec<Label> = compounds.to_vec();
            if upper.len() > 1 {
                self.vocab.sort_by_rank(&mut upper);
                let label = upper[0].parent();
                overlay.assign_all(&upper, &label);
                rest.retain(|v| !upper.contains(v));
            }
            if rest.len() > 1 {
                self.vocab.sort_by_rank(&mut rest);
                let head = rest.iter().find(|v| v.starts_lower()).unwrap_or(&rest[0]);
                let label = head.parent();
                overlay.assign_all(&rest, &label);
            }
        }
    }

    fn label_remaining(&self, mut remaining: Vec<Label>, overlay: &mut Overlay<'_>) {
        self.vocab.sort_by_rank(&mut remaining);
        let (parents, leaves): (Vec<Label>, Vec<Label>) =
            remaining.into_iter().partition(Label::is_parent);
        let (stop, content): (Vec<Label>, Vec<Label>) = leaves
            .into_iter()
            .partition(|v| self.stopwords.is_stopword(v.name()));

        for part in [parents, stop, content] {
            let Some(head) = part.first() else {
                continue;
            };
            let depth = part.iter().map(Label::depth).max().unwrap_or(0);
            let label = Label::new(head.name(), depth.saturating_add(1));
            overlay.assign_all(&part, &label);
        }
    }
}

/// Highest-count label; ties go to the smallest label.
fn most_common(labels: &[Label]) -> Option<Label> {
    let mut counts: BTreeMap<&Label, usize> = BTreeMap::new();
    for l in labels {
        *counts.entry(l).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .max_by(|(la, ca), (lb, cb)| ca.cmp(cb).then_with(|| lb.cmp(la)))
        .map(|(l, _)| l.clone())
}

/// Grow `seeds` with every eligible pool member whose name contains, or is
/// contained in, a member already in the group. Transitive.
fn containment_closure<F>(seeds: Vec<Label>, pool: &[Label], eligible: F) -> Vec<Label>
where
    F: Fn(&Label) -> bool,
{
    let mut group: Vec<Label> = Vec::new();
    let mut queue: VecDeque<Label> = VecDeque::new();
    for seed in seeds {
        if !group.contains(&seed) {
            group.push(seed.clone());
            queue.push_back(seed);
        }
    }
    while let Some(v) = queue.pop_front() {
        for candidate in pool {
            if group.contains(candidate) || !eligible(candidate) {
                continue;
            }
            if candidate.name().contains(v.name()) || v.name().contains(candidate.name()) {
                group.push(candidate.clone());
                queue.push_back(candidate.clone());
            }
        }
    }
    group
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaves(names: &[&str]) -> Vec<Label> {
        names.iter().map(|n| Label::leaf(*n)).collect()
    }

    fn label_of<'m>(assignments: &'m [(Label, Label)], term: &str) -> Option<&'m Label> {
        assignments
            .iter()
            .find(|(t, _)| t.name() == term && t.depth() == 0)
            .map(|(_, l)| l)
    }

    #[test]
    fn case_split_without_history() {
        let vocab = Vocabulary::new();
        let sw = Stopwords::english();
        let members = leaves(&["Apple_Inc", "Apple_Corp", "apple_pie", "apple_juice"]);
        let out = LabelSelector::new(&vocab, &sw).select(&members, &SynonymMap::new());

        let upper = Label::new("Apple_Inc", 1);
        let lower = Label::new("apple_pie", 1);
        assert_eq!(label_of(&out, "Apple_Inc"), Some(&upper));
        assert_eq!(label_of(&out, "Apple_Corp"), Some(&upper));
        assert_eq!(label_of(&out, "apple_pie"), Some(&lower));
        assert_eq!(label_of(&out, "apple_juice"), Some(&lower));
    }

    #[test]
    fn weights_override_length_in_ranking() {
        let mut vocab = Vocabulary::new();
        vocab.observe(&Label::leaf("apple_juice"), 0.01);
        let sw = Stopwords::english();
        let members = leaves(&["apple_pie", "apple_juice"]);
        let out = LabelSelector::new(&vocab, &sw).select(&members, &SynonymMap::new());
        assert_eq!(
            label_of(&out, "apple_pie"),
            Some(&Label::new("apple_juice", 1))
        );
    }

    #[test]
    fn upper_history_claims_contained_terms() {
        let vocab = Vocabulary::new();
        let sw = Stopwords::english();
        let mut prior = SynonymMap::new();
        let acme = Label::new("Acme_Corp", 1);
        prior.assign(Label::leaf("Acme_Corp"), acme.clone());
        prior.assign(Label::leaf("Acme_Corp_Ltd"), acme.clone());

        let members = leaves(&["Acme_Corp", "Acme_Corp_Ltd", "acme_corp_ltd_shares", "New_Acme"]);
        let out = LabelSelector::new(&vocab, &sw).select(&members, &prior);

        assert_eq!(label_of(&out, "acme_corp_ltd_shares"), None);
        assert_eq!(label_of(&out, "New_Acme"), Some(&acme));
    }

    #[test]
    fn lower_history_takes_unclaimed_compounds() {
        let vocab = Vocabulary::new();
        let sw = Stopwords::english();
        let mut prior = SynonymMap::new();
        let pie = Label::new("apple_pie", 1);
        prior.assign(Label::leaf("apple_pie"), pie.clone());

        let members = leaves(&["apple_pie", "cherry_pie", "Cherry_Corp"]);
        let out = LabelSelector::new(&vocab, &sw).select(&members, &prior);

        assert_eq!(label_of(&out, "cherry_pie"), Some(&pie));
        assert_eq!(label_of(&out, "Cherry_Corp"), Some(&pie));
    }

    #[test]
    fn existing_labels_are_not_overwritten() {
        let vocab = Vocabulary::new();
        let sw = Stopwords::english();
        let mut prior = SynonymMap::new();
        prior.assign(Label::leaf("bank"), Label::new("finance", 1));
        let members = leaves(&["bank", "river", "shore"]);
        let out = LabelSelector::new(&vocab, &sw).select(&members, &prior);
        assert_eq!(label_of(&out, "bank"), None);
        assert_eq!(label_of(&out, "river"), Some(&Label::new("river", 1)));
    }

    #[test]
    fn stopwords_and_content_words_get_separate_parents() {
        let vocab = Vocabulary::new();
        let sw = Stopwords::english();
        let members = leaves(&["the", "of", "revenue", "income"]);
        let out = LabelSelector::new(&vocab, &sw).select(&members, &SynonymMap::new());
        assert_eq!(label_of(&out, "the"), Some(&Label::new("of", 1)));
        assert_eq!(label_of(&out, "of"), Some(&Label::new("of", 1)));
        assert_eq!(label_of(&out, "revenue"), Some(&Label::new("income", 1)));
    }

    #[test]
    fn parents_unify_one_level_up() {
        let vocab = Vocabulary::new();
        let sw = Stopwords::english();
        let members = vec![Label::new("fruit", 1), Label::new("vegetable", 1)];
        let out = LabelSelector::new(&vocab, &sw).select(&members, &SynonymMap::new());
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|(_, l)| *l == Label::new("fruit", 2)));
    }

    #[test]
    fn singleton_is_left_unlabeled() {
        let vocab = Vocabulary::new();
        let sw = Stopwords::english();
        let out = LabelSelector::new(&vocab, &sw).select(&leaves(&["alone"]), &SynonymMap::new());
        assert!(out.is_empty());
    }

    #[test]
    fn most_common_breaks_ties_by_label_order() {
        let a = Label::new("a", 1);
        let b = Label::new("b", 1);
        assert_eq!(most_common(&[b.clone(), a.clone()]), Some(a.clone()));
        assert_eq!(most_common(&[b.clone(), a, b.clone()]), Some(b));
        assert_eq!(most_common(&[]), None);
    }
}
