//! Synonym map and the derived ontology view.
//!
//! The synonym map is the single source of truth: term → canonical label.
//! The [`OntologyView`] (label → children) is recomputed from it on demand
//! and never persisted.
//!
//! Every stored edge strictly increases depth, so chains are acyclic by
//! construction and never longer than the deepest label.

use super::label::Label;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Term → canonical label assignments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SynonymMap {
    entries: BTreeMap<Label, Label>,
}

impl SynonymMap {
    /// Empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical label of `term`, if assigned.
    pub fn get(&self, term: &Label) -> Option<&Label> {
        self.entries.get(term)
    }

    /// Whether `term` has a canonical label.
    pub fn contains(&self, term: &Label) -> bool {
        self.entries.contains_key(term)
    }

    /// Number of assigned terms.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is assigned.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate `(term, label)` pairs in term order.
    pub fn iter(&self) -> impl Iterator<Item = (&Label, &Label)> {
        self.entries.iter()
    }

    /// Assign `term → label`.
    ///
    /// Rejected (returns `false`) when `label` is not strictly deeper than
    /// `term`, which also rules out self-mapping.
    pub fn assign(&mut self, term: Label, label: Label) -> bool {
        if label.depth() <= term.depth() {
            return false;
        }
        self.entries.insert(term, label);
        true
    }

    /// Drop the assignment for `term`, returning it to the unlabeled state.
    pub fn remove(&mut self, term: &Label) -> Option<Label> {
        self.entries.remove(term)
    }

    /// Remove the edges of parent labels that no longer have children.
    ///
    /// Repeats until every parent term in the map has at least one child, so
    /// a vacated label's ancestors are dropped too. Returns the number of
    /// edges removed.
    pub fn prune_childless(&mut self) -> usize {
        let mut removed = 0;
        loop {
            let labels: BTreeSet<&Label> = self.entries.values().collect();
            let orphans: Vec<Label> = self
                .entries
                .keys()
                .filter(|t| t.is_parent() && !labels.contains(t))
                .cloned()
                .collect();
            if orphans.is_empty() {
                return removed;
            }
            for t in &orphans {
                self.entries.remove(t);
            }
            removed += orphans.len();
        }
    }

    /// Inverse view: label → sorted children.
    pub fn view(&self) -> OntologyView {
        let mut children: BTreeMap<Label, Vec<Label>> = BTreeMap::new();
        for (term, label) in &self.entries {
            children.entry(label.clone()).or_default().push(term.clone());
        }
        OntologyView { children }
    }

    /// Labels with children but no parent of their own.
    pub fn top_parents(&self) -> Vec<Label> {
        let labels: BTreeSet<&Label> = self.entries.values().collect();
        labels
            .into_iter()
            .filter(|l| !self.entries.contains_key(*l))
            .cloned()
            .collect()
    }

    /// Distinct labels at exactly `depth`.
    pub fn parents_at_depth(&self, depth: u8) -> Vec<Label> {
        let labels: BTreeSet<&Label> = self
            .entries
            .values()
            .filter(|l| l.depth() == depth)
            .collect();
        labels.into_iter().cloned().collect()
    }

    /// Ancestors of `term`, nearest first.
    pub fn chain(&self, term: &Label) -> Vec<Label> {
        let mut out = Vec::new();
        let mut current = term;
        while let Some(next) = self.entries.get(current) {
            if out.contains(next) {
                break;
            }
            out.push(next.clone());
            current = next;
        }
        out
    }

    /// Topmost ancestor of `term`, or `term` itself when unassigned.
    pub fn root_of(&self, term: &Label) -> Label {
        self.chain(term).pop().unwrap_or_else(|| term.clone())
    }
}

impl FromIterator<(Label, Label)> for SynonymMap {
    fn from_iter<I: IntoIterator<Item = (Label, Label)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (term, label) in iter {
            map.assign(term, label);
        }
        map
    }
}

/// Label → children, derived from a [`SynonymMap`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OntologyView {
    children: BTreeMap<Label, Vec<Label>>,
}

impl OntologyView {
    /// Children of `label`.
    pub fn children(&self, label: &Label) -> Option<&[Label]> {
        self.children.get(label).map(Vec::as_slice)
    }

    /// Iterate `(label, children)` in label order.
    pub fn iter(&self) -> impl Iterator<Item = (&Label, &Vec<Label>)> {
        self.children.iter()
    }

    /// Number of labels with at least one child.
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// True if no label has children.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Largest child count.
    pub fn max_cluster_size(&self) -> usize {
        self.children.values().map(Vec::len).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SynonymMap {
        [
            (Label::leaf("a"), Label::new("a", 1)),
            (Label::leaf("b"), Label::new("a", 1)),
            (Label::leaf("c"), Label::new("c", 1)),
            (Label::new("a", 1), Label::new("a", 2)),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn view_inverts_map() {
        let view = sample().view();
        assert_eq!(
            view.children(&Label::new("a", 1)).unwrap(),
            &[Label::leaf("a"), Label::leaf("b")]
        );
        assert_eq!(view.len(), 3);
    }

    #[test]
    fn top_parents_have_no_parent() {
        let tops = sample().top_parents();
        assert_eq!(tops, vec![Label::new("c", 1), Label::new("a", 2)]);
    }

    #[test]
    fn assign_rejects_non_increasing_depth() {
        let mut map = SynonymMap::new();
        assert!(!map.assign(Label::leaf("x"), Label::leaf("x")));
        assert!(!map.assign(Label::new("x", 2), Label::new("y", 1)));
        assert!(map.assign(Label::leaf("x"), Label::new("x", 1)));
    }

    #[test]
    fn chain_walks_to_root() {
        let map = sample();
        assert_eq!(
            map.chain(&Label::leaf("b")),
            vec![Label::new("a", 1), Label::new("a", 2)]
        );
        assert_eq!(map.root_of(&Label::leaf("c")), Label::new("c", 1));
        assert_eq!(map.root_of(&Label::leaf("z")), Label::leaf("z"));
    }

    #[test]
    fn childless_parents_are_pruned_up_the_chain() {
        let mut map = sample();
        map.assign(Label::new("a", 2), Label::new("a", 3));
        map.remove(&Label::leaf("a"));
        assert_eq!(map.prune_childless(), 0);

        map.remove(&Label::leaf("b"));
        assert_eq!(map.prune_childless(), 2);
        assert!(!map.contains(&Label::new("a", 1)));
        assert!(!map.contains(&Label::new("a", 2)));
        assert_eq!(map.top_parents(), vec![Label::new("c", 1)]);
    }

    #[test]
    fn json_round_trip() {
        let map = sample();
        let json = serde_json::to_string(&map).unwrap();
        assert!(json.contains("\"b\":\"¶a\""));
        let back: SynonymMap = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }
}
