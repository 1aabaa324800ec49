//! Cross-batch label continuity.
//!
//! Two pieces keep later batches consistent with earlier ones:
//!
//! - [`AnchorSampler`] carries a bounded sample of earlier items into each
//!   clustering call so new clusters form around established ones.
//! - [`consensus_label`] and [`assign_unlabeled`] implement the majority vote:
//!   when at least two members of an emergent cluster already share a label,
//!   that label wins for the cluster. Members holding a different label keep
//!   it and are left out of the merge.
//!
//! Both work on any [`ClusterMap`], so term and span pipelines share them.

use crate::label::ClusterMap;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use std::collections::BTreeMap;

/// Minimum number of agreeing members for a prior label to win.
pub const CONSENSUS_QUORUM: usize = 2;

/// Prior label shared by at least [`CONSENSUS_QUORUM`] members, if any.
///
/// Ties between equally common labels go to the smallest label.
pub fn consensus_label<M: ClusterMap>(map: &M, members: &[M::Key]) -> Option<M::Value> {
    let mut counts: BTreeMap<&M::Value, usize> = BTreeMap::new();
    for m in members {
        if let Some(label) = map.label_of(m) {
            *counts.entry(label).or_insert(0) += 1;
        }
    }
    counts
        .into_iter()
        .max_by(|(la, ca), (lb, cb)| ca.cmp(cb).then_with(|| lb.cmp(la)))
        .filter(|(_, c)| *c >= CONSENSUS_QUORUM)
        .map(|(l, _)| l.clone())
}

/// Assign `label` to every unlabeled member.
///
/// Members already carrying `label` are unaffected, and members carrying a
/// different one are the dissenters left out of the merge. Returns the
/// number of newly labeled members.
pub fn assign_unlabeled<M: ClusterMap>(map: &mut M, members: &[M::Key], label: &M::Value) -> usize {
    let mut assigned = 0;
    for m in members {
        if map.label_of(m).is_none() && map.set_label(m.clone(), label.clone()) {
            assigned += 1;
        }
    }
    assigned
}

/// Bounded, seeded sampler for anchor items.
#[derive(Debug, Clone)]
pub struct AnchorSampler {
    cap: usize,
    rng: StdRng,
}

impl AnchorSampler {
    /// Sampler taking at most `cap` unlabeled and `2 * cap` anchors overall.
    pub fn new(cap: usize, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        Self { cap, rng }
    }

    /// Per-half cap.
    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Draw anchors: up to `cap` from `unlabeled`, then fill the remaining
    /// `2 * cap` budget from `labeled`.
    ///
    /// Pools are sorted first, so the draw depends only on their contents
    /// and the seed. The result keeps pool order within each half.
    pub fn sample<K: Clone + Ord>(&mut self, mut unlabeled: Vec<K>, mut labeled: Vec<K>) -> Vec<K> {
        unlabeled.sort();
        unlabeled.dedup();
        labeled.sort();
        labeled.dedup();

        let mut anchors = self.take(unlabeled, self.cap);
        let remaining = (2 * self.cap).saturating_sub(anchors.len());
        anchors.extend(self.take(labeled, remaining));
        anchors
    }

    fn take<K: Clone>(&mut self, pool: Vec<K>, amount: usize) -> Vec<K> {
        if pool.len() <= amount {
            return pool;
        }
        let mut picked = index::sample(&mut self.rng, pool.len(), amount).into_vec();
        picked.sort_unstable();
        picked.into_iter().map(|i| pool[i].clone()).collect()
    }
}
