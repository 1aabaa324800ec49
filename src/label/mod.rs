//! Labels, synonym maps, and canonical label selection.
//!
//! # Model
//!
//! ```text
//! Level 2:            ¶¶fruit
//!                    /       \
//! Level 1:      ¶apple      ¶cherry          (canonical labels)
//!              /   |  \       |    \
//! Level 0: apple apples apple_pie cherry cherries   (leaf terms)
//! ```
//!
//! The [`SynonymMap`] stores each child → parent edge. Depth is an explicit
//! field on [`Label`]; the `¶` prefix only appears in text form.
//!
//! [`ClusterMap`] abstracts over the two kinds of assignment maps (terms →
//! labels and spans → labels) so the consensus merge and the recluster
//! controller work on either.

#[allow(clippy::module_inception)]
mod label;
mod selector;
mod synonyms;

pub use label::{Label, COMPOUND_SEPARATOR, DEPTH_MARKER, NAME_ESCAPE};
pub use selector::LabelSelector;
pub use synonyms::{OntologyView, SynonymMap};

use std::collections::BTreeMap;

/// An item → cluster-label assignment map.
pub trait ClusterMap {
    /// Item identifier.
    type Key: Clone + Ord;
    /// Cluster label.
    type Value: Clone + Ord;

    /// Current label of `key`.
    fn label_of(&self, key: &Self::Key) -> Option<&Self::Value>;

    /// Assign `key → label`; returns `false` if the map refuses the edge.
    fn set_label(&mut self, key: Self::Key, label: Self::Value) -> bool;

    /// Return `key` to the unlabeled state.
    fn clear_label(&mut self, key: &Self::Key) -> Option<Self::Value>;

    /// Clusters subject to size control: label → members.
    fn clusters(&self) -> BTreeMap<Self::Value, Vec<Self::Key>>;
}

impl ClusterMap for SynonymMap {
    type Key = Label;
    type Value = Label;

    fn label_of(&self, key: &Label) -> Option<&Label> {
        self.get(key)
    }

    fn set_label(&mut self, key: Label, label: Label) -> bool {
        self.assign(key, label)
    }

    fn clear_label(&mut self, key: &Label) -> Option<Label> {
        self.remove(key)
    }

    /// Only first-level clusters (labels over leaf terms) are size-controlled;
    /// upper ontology levels are shaped by the ontology builder.
    fn clusters(&self) -> BTreeMap<Label, Vec<Label>> {
        self.view()
            .iter()
            .filter(|(label, _)| label.depth() == 1)
            .map(|(label, children)| {
                let leaves = children.iter().filter(|c| c.depth() == 0).cloned().collect();
                (label.clone(), leaves)
            })
            .collect()
    }
}
