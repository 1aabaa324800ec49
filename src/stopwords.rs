//! Stopword weights.
//!
//! Used as a ranking and tie-break signal by the canonical label selector and
//! as a filter by the descriptive labeler. Keys are lowercase.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Default English stopwords.
pub const DEFAULT_STOPWORDS: &[&str] = &[
    "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you", "you're", "you've",
    "you'll", "you'd", "your", "yours", "yourself", "yourselves", "he", "him", "his", "himself",
    "she", "she's", "her", "hers", "herself", "it", "it's", "its", "itself", "they", "them",
    "their", "theirs", "themselves", "what", "which", "who", "whom", "this", "that", "that'll",
    "these", "those", "am", "is", "are", "was", "were", "be", "been", "being", "have", "has",
    "had", "having", "do", "does", "did", "doing", "a", "an", "the", "and", "but", "if", "or",
    "because", "as", "until", "while", "of", "at", "by", "for", "with", "about", "against",
    "between", "into", "through", "during", "before", "after", "above", "below", "to", "from",
    "up", "down", "in", "out", "on", "off", "over", "under", "again", "further", "then", "once",
    "here", "there", "when", "where", "why", "how", "all", "any", "both", "each", "few", "more",
    "most", "other", "some", "such", "no", "nor", "not", "only", "own", "same", "so", "than",
    "too", "very", "s", "t", "can", "will", "just", "don", "don't", "should", "should've", "now",
    "d", "ll", "m", "o", "re", "ve", "y", "ain", "aren", "aren't", "couldn", "couldn't", "didn",
    "didn't", "doesn", "doesn't", "hadn", "hadn't", "hasn", "hasn't", "haven", "haven't", "isn",
    "isn't", "ma", "mightn", "mightn't", "mustn", "mustn't", "needn", "needn't", "shan",
    "shan't", "shouldn", "shouldn't", "wasn", "wasn't", "weren", "weren't", "won", "won't",
    "wouldn", "wouldn't", "...", "could", "shall", "might", "may", "include", "including",
];

/// Lowercase stopword → weight (lower = more stopword-like).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Stopwords {
    weights: BTreeMap<String, f64>,
}

impl Default for Stopwords {
    fn default() -> Self {
        Self::english()
    }
}

impl Stopwords {
    /// No stopwords at all.
    pub fn empty() -> Self {
        Self {
            weights: BTreeMap::new(),
        }
    }

    /// Seeded with [`DEFAULT_STOPWORDS`] at weight 1.0.
    pub fn english() -> Self {
        let mut sw = Self::empty();
        for word in DEFAULT_STOPWORDS {
            sw.insert(word, 1.0);
        }
        sw
    }

    /// Add or lower the weight of `word`.
    pub fn insert(&mut self, word: &str, weight: f64) {
        self.weights
            .entry(word.to_lowercase())
            .and_modify(|w| *w = w.min(weight))
            .or_insert(weight);
    }

    /// Case-insensitive membership.
    pub fn is_stopword(&self, word: &str) -> bool {
        self.weights.contains_key(word) || self.weights.contains_key(&word.to_lowercase())
    }

    /// Weight of `word`, if it is a stopword.
    pub fn weight(&self, word: &str) -> Option<f64> {
        self.weights.get(&word.to_lowercase()).copied()
    }

    /// Learned words plus the default list, for span-label filtering.
    pub fn domain_set(&self) -> BTreeSet<String> {
        self.weights
            .keys()
            .cloned()
            .chain(DEFAULT_STOPWORDS.iter().map(|w| w.to_string()))
            .collect()
    }

    /// Number of stopwords.
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    /// True if empty.
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn membership_is_case_insensitive() {
        let sw = Stopwords::english();
        assert!(sw.is_stopword("The"));
        assert!(sw.is_stopword("including"));
        assert!(!sw.is_stopword("revenue"));
    }

    #[test]
    fn insert_keeps_lowest_weight() {
        let mut sw = Stopwords::empty();
        sw.insert("Per", 0.4);
        sw.insert("per", 0.9);
        assert_eq!(sw.weight("per"), Some(0.4));
    }
}
