//! Pipeline configuration.
//!
//! One immutable [`OntologyConfig`] is handed to a pipeline at construction.
//! Every threshold the clustering, recluster and labeling stages consult
//! lives here; nothing is defaulted lazily later.

use crate::cluster::BatchClusterer;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Which k-means family member partitions a batch.
///
/// Both modes satisfy the same downstream contracts; `MiniBatch` trades
/// some partition quality for throughput on large batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClusterMode {
    /// Full Lloyd iterations over every item.
    Exact,
    /// Mini-batch updates with a final full assignment pass.
    #[default]
    MiniBatch,
}

/// How oversized clusters are resubmitted to the clusterer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReclusterStrategy {
    /// Recluster each oversized cluster on its own.
    Individual,
    /// Pool reclaimed members from several clusters up to `kmeans_batch_size`.
    #[default]
    Batched,
}

/// Configuration for term and span clustering runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OntologyConfig {
    /// Target members per term cluster.
    pub items_per_cluster: usize,
    /// Target members per span cluster.
    pub span_items_per_cluster: usize,
    /// Nominal clusterer batch size (new items plus anchors).
    pub kmeans_batch_size: usize,
    /// Lower bound used when sizing the anchor sample.
    pub min_prev_ids: usize,
    /// Number of parent levels the ontology builder may add.
    pub max_ontology_depth: u8,
    /// Parent count below which a level is left unclustered.
    ///
    /// Also sets the cluster size ceiling: `sqrt(max_top_parents)`.
    pub max_top_parents: usize,
    /// Partitioning mode.
    pub cluster_mode: ClusterMode,
    /// Iteration cap for either k-means mode.
    pub kmeans_max_iter: usize,
    /// Oversized-cluster resubmission strategy.
    pub recluster_strategy: ReclusterStrategy,
    /// Seed for k-means initialisation and anchor sampling.
    pub seed: Option<u64>,
    /// Hard cap on vector store slots.
    pub vector_capacity: Option<usize>,
    /// Terms per embedder call.
    pub embed_batch_size: usize,
    /// Spans per embedder call.
    pub span_embed_batch_size: usize,
    /// Candidate terms considered per descriptive label.
    pub tfidf_top_k: usize,
    /// Terms kept in a descriptive label.
    pub label_max_terms: usize,
    /// Build parent levels after term clustering.
    pub build_ontology: bool,
}

impl Default for OntologyConfig {
    fn default() -> Self {
        Self {
            items_per_cluster: 10,
            span_items_per_cluster: 20,
            kmeans_batch_size: 50_000,
            min_prev_ids: 10_000,
            max_ontology_depth: 4,
            max_top_parents: 10_000,
            cluster_mode: ClusterMode::default(),
            kmeans_max_iter: 100,
            recluster_strategy: ReclusterStrategy::default(),
            seed: Some(42),
            vector_capacity: None,
            embed_batch_size: 7_000,
            span_embed_batch_size: 100,
            tfidf_top_k: 40,
            label_max_terms: 5,
            build_ontology: true,
        }
    }
}

impl OntologyConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set target members per term cluster.
    pub fn with_items_per_cluster(mut self, n: usize) -> Self {
        self.items_per_cluster = n;
        self
    }

    /// Set target members per span cluster.
    pub fn with_span_items_per_cluster(mut self, n: usize) -> Self {
        self.span_items_per_cluster = n;
        self
    }

    /// Set nominal clusterer batch size.
    pub fn with_kmeans_batch_size(mut self, n: usize) -> Self {
        self.kmeans_batch_size = n;
        self
    }

    /// Set anchor sizing floor.
    pub fn with_min_prev_ids(mut self, n: usize) -> Self {
        self.min_prev_ids = n;
        self
    }

    /// Set maximum ontology depth.
    pub fn with_max_ontology_depth(mut self, depth: u8) -> Self {
        self.max_ontology_depth = depth;
        self
    }

    /// Set the top-parent threshold (and with it the cluster ceiling).
    pub fn with_max_top_parents(mut self, n: usize) -> Self {
        self.max_top_parents = n;
        self
    }

    /// Set partitioning mode.
    pub fn with_cluster_mode(mut self, mode: ClusterMode) -> Self {
        self.cluster_mode = mode;
        self
    }

    /// Set k-means iteration cap.
    pub fn with_kmeans_max_iter(mut self, n: usize) -> Self {
        self.kmeans_max_iter = n;
        self
    }

    /// Set recluster strategy.
    pub fn with_recluster_strategy(mut self, strategy: ReclusterStrategy) -> Self {
        self.recluster_strategy = strategy;
        self
    }

    /// Set random seed (`None` draws from the thread RNG).
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Cap the vector store.
    pub fn with_vector_capacity(mut self, capacity: usize) -> Self {
        self.vector_capacity = Some(capacity);
        self
    }

    /// Set terms per embedder call.
    pub fn with_embed_batch_size(mut self, n: usize) -> Self {
        self.embed_batch_size = n;
        self
    }

    /// Set spans per embedder call.
    pub fn with_span_embed_batch_size(mut self, n: usize) -> Self {
        self.span_embed_batch_size = n;
        self
    }

    /// Set candidate terms scored per descriptive label.
    pub fn with_tfidf_top_k(mut self, n: usize) -> Self {
        self.tfidf_top_k = n;
        self
    }

    /// Set terms kept in a descriptive label.
    pub fn with_label_max_terms(mut self, n: usize) -> Self {
        self.label_max_terms = n;
        self
    }

    /// Toggle ontology construction after term clustering.
    pub fn with_build_ontology(mut self, enabled: bool) -> Self {
        self.build_ontology = enabled;
        self
    }

    /// Reject configurations that would divide by zero or never progress.
    pub fn validate(&self) -> Result<()> {
        let checks: [(&'static str, usize); 9] = [
            ("items_per_cluster", self.items_per_cluster),
            ("span_items_per_cluster", self.span_items_per_cluster),
            ("kmeans_batch_size", self.kmeans_batch_size),
            ("max_top_parents", self.max_top_parents),
            ("embed_batch_size", self.embed_batch_size),
            ("span_embed_batch_size", self.span_embed_batch_size),
            ("kmeans_max_iter", self.kmeans_max_iter),
            ("tfidf_top_k", self.tfidf_top_k),
            ("label_max_terms", self.label_max_terms),
        ];
        for (name, value) in checks {
            if value == 0 {
                return Err(Error::InvalidParameter {
                    name,
                    message: "must be positive",
                });
            }
        }
        Ok(())
    }

    /// New items consumed per clustering call.
    pub fn batch_chunk(&self) -> usize {
        ((self.kmeans_batch_size as f64 * 0.7) as usize).max(1)
    }

    /// Cap on each half of the anchor sample (unlabeled, then labeled).
    pub fn max_anchor_ids(&self) -> usize {
        let by_batch = (self.kmeans_batch_size as f64 * 0.15) as usize;
        let by_floor = (self.min_prev_ids as f64 * 0.5) as usize;
        by_batch.max(by_floor)
    }

    /// Largest cluster the recluster controller tolerates.
    pub fn max_cluster_size(&self) -> usize {
        ((self.max_top_parents as f64).sqrt() as usize).max(1)
    }

    /// Clusters below this size are dissolved on non-final batches.
    pub fn min_viable_size(&self, per_cluster: usize) -> f64 {
        per_cluster as f64 * 0.5
    }

    /// Clusterer configured from this mode, seed and iteration cap.
    pub fn clusterer(&self) -> BatchClusterer {
        BatchClusterer::new(self.cluster_mode)
            .with_seed(self.seed)
            .with_max_iter(self.kmeans_max_iter)
    }

    /// `max(2, n / per_cluster)`.
    pub fn target_k(n: usize, per_cluster: usize) -> usize {
        (n / per_cluster.max(1)).max(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = OntologyConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.batch_chunk(), 35_000);
        assert_eq!(config.max_anchor_ids(), 7_500);
        assert_eq!(config.max_cluster_size(), 100);
    }

    #[test]
    fn zero_cluster_size_rejected() {
        let config = OntologyConfig::new().with_items_per_cluster(0);
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidParameter {
                name: "items_per_cluster",
                ..
            })
        ));
    }

    #[test]
    fn label_builders_are_validated() {
        let config = OntologyConfig::new().with_tfidf_top_k(10).with_label_max_terms(3);
        assert_eq!((config.tfidf_top_k, config.label_max_terms), (10, 3));
        assert!(config.validate().is_ok());
        assert!(matches!(
            OntologyConfig::new().with_label_max_terms(0).validate(),
            Err(Error::InvalidParameter {
                name: "label_max_terms",
                ..
            })
        ));
    }

    #[test]
    fn target_k_has_floor_of_two() {
        assert_eq!(OntologyConfig::target_k(3, 10), 2);
        assert_eq!(OntologyConfig::target_k(100, 10), 10);
    }

    #[test]
    fn serde_fills_missing_fields_with_defaults() {
        let config: OntologyConfig =
            serde_json::from_str(r#"{"items_per_cluster": 4, "cluster_mode": "exact"}"#).unwrap();
        assert_eq!(config.items_per_cluster, 4);
        assert_eq!(config.cluster_mode, ClusterMode::Exact);
        assert_eq!(config.max_top_parents, 10_000);
    }
}
