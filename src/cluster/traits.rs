//! Clustering traits.

use crate::error::Result;

/// Trait for hard clustering algorithms over dense embeddings.
pub trait Clustering {
    /// Fit the model to data and return cluster assignments.
    ///
    /// Returns a vector of cluster labels in `0..n_clusters()`, one per
    /// input point.
    fn fit_predict(&self, data: &[Vec<f32>]) -> Result<Vec<usize>>;

    /// Get the number of clusters.
    fn n_clusters(&self) -> usize;
}
