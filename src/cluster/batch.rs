//! Batch partitioning front-end used by the pipelines.
//!
//! Wraps [`Kmeans`] and [`MiniBatchKmeans`] behind one call that never fails
//! on degenerate input: fewer than two distinct vectors yield one trivial
//! cluster, and the requested k is clamped to `max(2, min(k, distinct))`.

use super::kmeans::{Kmeans, Metric};
use super::minibatch::MiniBatchKmeans;
use super::traits::Clustering;
use crate::config::ClusterMode;
use crate::error::Result;
use std::collections::HashSet;
use tracing::debug;

/// Partitions gathered vectors into groups by cosine similarity.
#[derive(Debug, Clone)]
pub struct BatchClusterer {
    mode: ClusterMode,
    seed: Option<u64>,
    mini_batch_size: usize,
    max_iter: usize,
}

impl BatchClusterer {
    /// Create a clusterer for the given mode.
    pub fn new(mode: ClusterMode) -> Self {
        Self {
            mode,
            seed: None,
            mini_batch_size: 1024,
            max_iter: 100,
        }
    }

    /// Set random seed.
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Set points per mini-batch iteration.
    pub fn with_mini_batch_size(mut self, n: usize) -> Self {
        self.mini_batch_size = n.max(1);
        self
    }

    /// Set maximum iterations.
    pub fn with_max_iter(mut self, n: usize) -> Self {
        self.max_iter = n;
        self
    }

    /// Mode in use.
    pub fn mode(&self) -> ClusterMode {
        self.mode
    }

    /// Return a label in `0..k'` per vector, where `k'` is the clamped k.
    pub fn fit_predict(&self, vectors: &[Vec<f32>], k: usize) -> Result<Vec<usize>> {
        let n = vectors.len();
        let distinct = distinct_count(vectors);
        if distinct < 2 {
            return Ok(vec![0; n]);
        }
        let k = k.min(distinct).max(2);
        debug!(n, k, mode = ?self.mode, "partitioning batch");

        match self.mode {
            ClusterMode::Exact => {
                let mut km = Kmeans::new(k)
                    .with_metric(Metric::Cosine)
                    .with_max_iter(self.max_iter);
                if let Some(seed) = self.seed {
                    km = km.with_seed(seed);
                }
                km.fit_predict(vectors)
            }
            ClusterMode::MiniBatch => {
                let mut km = MiniBatchKmeans::new(k)
                    .with_metric(Metric::Cosine)
                    .with_batch_size(self.mini_batch_size)
                    .with_max_iter(self.max_iter);
                if let Some(seed) = self.seed {
                    km = km.with_seed(seed);
                }
                km.fit_predict(vectors)
            }
        }
    }

    /// Group positions `0..vectors.len()` by cluster, dropping empty clusters.
    ///
    /// Groups are ordered by cluster id and members keep input order.
    pub fn partition(&self, vectors: &[Vec<f32>], k: usize) -> Result<Vec<Vec<usize>>> {
        if vectors.is_empty() {
            return Ok(Vec::new());
        }
        let labels = self.fit_predict(vectors, k)?;
        Ok(group_by_label(&labels))
    }
}

/// Turn a label vector into member lists, ordered by label.
pub fn group_by_label(labels: &[usize]) -> Vec<Vec<usize>> {
    let k = labels.iter().copied().max().map_or(0, |m| m + 1);
    let mut groups = vec![Vec::new(); k];
    for (i, &l) in labels.iter().enumerate() {
        groups[l].push(i);
    }
    groups.retain(|g| !g.is_empty());
    groups
}

fn distinct_count(vectors: &[Vec<f32>]) -> usize {
    vectors
        .iter()
        .map(|v| v.iter().map(|x| x.to_bits()).collect::<Vec<u32>>())
        .collect::<HashSet<_>>()
        .len()
}
