//! Mini-batch K-means.
//!
//! Sculley (2010): instead of a full Lloyd pass per iteration, draw a small
//! random batch, assign it, and move each touched centroid toward its points
//! with a per-centroid learning rate `1 / count`:
//!
//! ```text
//! μₖ ← (1 - ηₖ) μₖ + ηₖ x      ηₖ = 1 / |points seen by k|
//! ```
//!
//! Seeding uses k-means++ over an `init_size` subsample
//! (`max(3k, 1000)` by default), and a final full assignment pass labels
//! every point. Cost per iteration is O(batch·k·d) regardless of n, which is
//! what makes streaming batches of tens of thousands of terms tractable.
//!
//! # References
//!
//! - Sculley (2010). "Web-Scale K-Means Clustering." WWW.

use super::kmeans::{
    assign, init_centroids, normalize_rows, prepare, rng_for, squared_distance, Metric,
};
use super::traits::Clustering;
use crate::error::Result;
use ndarray::Array2;
use rand::seq::index;

/// Mini-batch K-means clusterer.
#[derive(Debug, Clone)]
pub struct MiniBatchKmeans {
    /// Number of clusters.
    k: usize,
    /// Points drawn per iteration.
    batch_size: usize,
    /// Maximum iterations.
    max_iter: usize,
    /// Subsample size for k-means++ seeding (`None` = `max(3k, 1000)`).
    init_size: Option<usize>,
    /// Stop once the summed centroid shift falls below this.
    tol: f64,
    /// Random seed.
    seed: Option<u64>,
    /// Distance metric.
    metric: Metric,
}

impl MiniBatchKmeans {
    /// Create a new mini-batch clusterer.
    pub fn new(k: usize) -> Self {
        Self {
            k,
            batch_size: 1024,
            max_iter: 100,
            init_size: None,
            tol: 1e-4,
            seed: None,
            metric: Metric::Cosine,
        }
    }

    /// Set points per mini-batch.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Set maximum iterations.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Set seeding subsample size.
    pub fn with_init_size(mut self, init_size: usize) -> Self {
        self.init_size = Some(init_size);
        self
    }

    /// Set random seed for reproducibility.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the distance metric.
    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }
}

impl Clustering for MiniBatchKmeans {
    fn fit_predict(&self, data: &[Vec<f32>]) -> Result<Vec<usize>> {
        let data_arr = prepare(data, self.k, self.metric)?;
        let n = data_arr.nrows();
        let d = data_arr.ncols();
        let mut rng = rng_for(self.seed);

        let init_size = self
            .init_size
            .unwrap_or_else(|| (3 * self.k).max(1000))
            .clamp(self.k, n);
        let mut init_rows = index::sample(&mut rng, n, init_size).into_vec();
        init_rows.sort_unstable();
        let mut centroids = init_centroids(&data_arr, &init_rows, self.k, rng.as_mut());

        let batch_size = self.batch_size.min(n);
        let mut seen = vec![0usize; self.k];
        let mut batch_labels = vec![0usize; batch_size];

        for _iter in 0..self.max_iter {
            let rows = index::sample(&mut rng, n, batch_size).into_vec();
            let batch = data_arr.select(ndarray::Axis(0), &rows);
            assign(&batch, &centroids, &mut batch_labels);

            let previous = centroids.clone();
            for (i, &k) in batch_labels.iter().enumerate() {
                seen[k] += 1;
                let eta = 1.0 / seen[k] as f32;
                let point = batch.row(i);
                let mut centroid = centroids.row_mut(k);
                for j in 0..d {
                    centroid[j] = (1.0 - eta) * centroid[j] + eta * point[j];
                }
            }
            if self.metric == Metric::Cosine {
                normalize_rows(&mut centroids);
            }

            let shift: f32 = previous
                .iter()
                .zip(centroids.iter())
                .map(|(a, b)| (a - b).powi(2))
                .sum();
            if shift < self.tol as f32 {
                break;
            }
        }

        let mut labels = vec![0usize; n];
        assign(&data_arr, &centroids, &mut labels);
        reseed_empty(&data_arr, &mut centroids, &mut labels);
        Ok(labels)
    }

    fn n_clusters(&self) -> usize {
        self.k
    }
}

/// Give each empty cluster the point farthest from its own centroid.
///
/// Mini-batch updates can starve a centroid entirely; callers sizing k from
/// item counts expect every cluster id to be populated when `k <= n`.
fn reseed_empty(
    data: &Array2<f32>,
    centroids: &mut Array2<f32>,
    labels: &mut [usize],
) {
    let k = centroids.nrows();
    let mut counts = vec![0usize; k];
    for &l in labels.iter() {
        counts[l] += 1;
    }
    for cluster in 0..k {
        if counts[cluster] > 0 {
            continue;
        }
        let donor = (0..labels.len())
            .filter(|&i| counts[labels[i]] > 1)
            .max_by(|&a, &b| {
                let da = squared_distance(&data.row(a), &centroids.row(labels[a]));
                let db = squared_distance(&data.row(b), &centroids.row(labels[b]));
                da.total_cmp(&db)
            });
        let Some(point) = donor else {
            break;
        };
        counts[labels[point]] -= 1;
        labels[point] = cluster;
        counts[cluster] = 1;
        centroids.row_mut(cluster).assign(&data.row(point));
    }
}
