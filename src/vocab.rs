//! Term registry shared by the term pipeline and the vector store.
//!
//! Every observed term (and every parent label that receives a centroid
//! vector) gets a stable index. Indices are handed out in observation order,
//! never reused, and line up 1:1 with vector store slots.

use crate::label::{Label, COMPOUND_SEPARATOR};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Ordered term registry with language-model weights.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vocabulary {
    terms: Vec<Label>,
    #[serde(skip)]
    index: HashMap<Label, usize>,
    weights: HashMap<Label, f64>,
    compound: HashMap<String, usize>,
}

impl Vocabulary {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the lookup table after deserialization.
    pub fn reindex(&mut self) {
        self.index = self
            .terms
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i))
            .collect();
    }

    /// Register `term` if unseen and return its index.
    pub fn intern(&mut self, term: &Label) -> usize {
        if let Some(&idx) = self.index.get(term) {
            return idx;
        }
        let idx = self.terms.len();
        self.terms.push(term.clone());
        self.index.insert(term.clone(), idx);
        idx
    }

    /// Register `term` and fold `weight` in, keeping the minimum seen.
    ///
    /// Compound terms also extend the compound span table.
    pub fn observe(&mut self, term: &Label, weight: f64) -> usize {
        let idx = self.intern(term);
        self.update_weight(term, weight);
        if term.is_compound() {
            self.observe_compound(term);
        }
        idx
    }

    /// Minimum-wins weight update.
    pub fn update_weight(&mut self, term: &Label, weight: f64) {
        self.weights
            .entry(term.clone())
            .and_modify(|w| *w = w.min(weight))
            .or_insert(weight);
    }

    /// Overwrite a weight (used for derived parent weights).
    pub fn set_weight(&mut self, term: &Label, weight: f64) {
        self.weights.insert(term.clone(), weight);
    }

    /// Record the token count of a compound under its first token.
    pub fn observe_compound(&mut self, term: &Label) {
        let mut tokens = term
            .name()
            .trim_matches(COMPOUND_SEPARATOR)
            .split(COMPOUND_SEPARATOR)
            .filter(|t| !t.is_empty());
        let Some(first) = tokens.next() else {
            return;
        };
        let len = 1 + tokens.count();
        let entry = self.compound.entry(first.to_string()).or_insert(0);
        *entry = (*entry).max(len);
    }

    /// Longest compound starting with `first_token`.
    pub fn compound_len(&self, first_token: &str) -> Option<usize> {
        self.compound.get(first_token).copied()
    }

    /// Index of `term`.
    pub fn index_of(&self, term: &Label) -> Option<usize> {
        self.index.get(term).copied()
    }

    /// Term at `idx`.
    pub fn term(&self, idx: usize) -> Option<&Label> {
        self.terms.get(idx)
    }

    /// All terms in index order.
    pub fn terms(&self) -> &[Label] {
        &self.terms
    }

    /// Weight of `term`.
    pub fn weight(&self, term: &Label) -> Option<f64> {
        self.weights.get(term).copied()
    }

    /// Canonical-label ranking key: weight when known, else name length.
    ///
    /// Lower is preferred.
    pub fn rank_key(&self, term: &Label) -> f64 {
        self.weight(term).unwrap_or(term.char_len() as f64)
    }

    /// Sort so the preferred canonical candidate comes first.
    ///
    /// Ties fall back to label order, keeping selection deterministic.
    pub fn sort_by_rank(&self, terms: &mut [Label]) {
        terms.sort_by(|a, b| {
            self.rank_key(a)
                .total_cmp(&self.rank_key(b))
                .then_with(|| a.cmp(b))
        });
    }

    /// Number of registered terms.
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// True if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}
