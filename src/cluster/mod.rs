//! Clustering algorithms for grouping embedded terms and spans.
//!
//! ## Algorithms
//!
//! ### K-means (Lloyd)
//!
//! Assign each point to the nearest centroid, then move centroids to the
//! mean of their points. Repeat.
//!
//! ```text
//! J = Σ_k Σ_{x ∈ C_k} ||x - μ_k||²
//! ```
//!
//! With [`Metric::Cosine`] (the default) rows are L2-normalised first, which
//! turns the objective into cosine dissimilarity: the right geometry for
//! sentence/word encoder outputs.
//!
//! ### Mini-batch K-means
//!
//! Same objective, but centroids move toward small random batches with a
//! decaying per-centroid learning rate. Much cheaper per iteration; used for
//! the large streaming batches of the term and span pipelines.
//!
//! ## Front-end
//!
//! [`BatchClusterer`] is what the pipelines call: it picks the configured
//! mode, clamps k, and turns degenerate batches into one trivial cluster
//! instead of an error.
//!
//! ## Usage
//!
//! ```rust
//! use canopy::cluster::{Clustering, Kmeans};
//!
//! let data = vec![
//!     vec![1.0, 0.0],
//!     vec![0.9, 0.1],
//!     vec![0.0, 1.0],
//!     vec![0.1, 0.9],
//! ];
//!
//! let labels = Kmeans::new(2).with_seed(42).fit_predict(&data).unwrap();
//! assert_eq!(labels[0], labels[1]);
//! assert_ne!(labels[0], labels[2]);
//! ```

mod batch;
mod kmeans;
mod minibatch;
mod traits;

pub use batch::{group_by_label, BatchClusterer};
pub use kmeans::{Kmeans, Metric};
pub use minibatch::MiniBatchKmeans;
pub use traits::Clustering;
