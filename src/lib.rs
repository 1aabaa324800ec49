//! # canopy
//!
//! Incremental similarity clustering and ontology induction: a growing stream
//! of embedded terms (or text spans) is grouped into stable, human-readable
//! clusters, and the clusters are composed into a multi-level concept
//! hierarchy.
//!
//! ```text
//! terms ─► VectorStore ─► BatchClusterer ─► consensus | LabelSelector ─► SynonymMap
//!                              ▲                                          │
//!                              └──── ReclusterController (size fixpoint) ◄┘
//!                                                                         │
//!                                               OntologyBuilder ◄─────────┘
//!
//! spans ─► VectorStore ─► BatchClusterer ─► consensus | "{batch}_{n}" ─► TfIdfLabeler
//! ```
//!
//! Two pipelines drive the stages: [`TermPipeline`] for words and compounds
//! and [`SpanPipeline`] for text spans. Both take the current label map by
//! reference and return the next one, so a failed batch leaves the caller's
//! state untouched. [`Checkpoint`] plus the store files are enough to resume
//! at a batch boundary.
//!
//! The `parallel` feature runs the k-means assignment step on rayon.

/// Batch-boundary persistence of maps and frequency tables.
pub mod checkpoint;
pub mod cluster;
pub mod config;
pub mod embed;
/// Error types used across `canopy`.
pub mod error;
pub mod hierarchy;
pub mod label;
pub mod pipeline;
pub mod recluster;
pub mod span;
pub mod stability;
pub mod stopwords;
pub mod store;
pub mod vocab;


pub use checkpoint::Checkpoint;
pub use cluster::{BatchClusterer, Clustering, Kmeans, Metric, MiniBatchKmeans};
pub use config::{ClusterMode, OntologyConfig, ReclusterStrategy};
pub use embed::{Embedder, FnEmbedder};
pub use error::{Error, Result};
pub use hierarchy::{ontology_health, validate_synonyms, OntologyBuilder, ValidationReport};
pub use label::{ClusterMap, Label, LabelSelector, OntologyView, SynonymMap};
pub use pipeline::TermPipeline;
pub use recluster::{ReclusterController, ReclusterReport};
pub use span::{Entity, Span, SpanId, SpanLabelMap, SpanPipeline, TfIdfLabeler, TfIdfState};
pub use stopwords::Stopwords;
pub use store::{StoreKind, VectorStore};
pub use vocab::Vocabulary;
