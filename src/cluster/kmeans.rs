//! K-means clustering.
//!
//! Partitions data into k clusters by minimizing **within-cluster sum of squares**
//! (WCSS):
//!
//! ```text
//! WCSS = Σₖ Σᵢ∈Cₖ ||xᵢ - μₖ||²
//! ```
//!
//! # Lloyd's Algorithm
//!
//! 1. Initialize k centroids via k-means++
//! 2. **Assign**: Each point → nearest centroid
//! 3. **Update**: Each centroid → mean of assigned points
//! 4. Repeat until convergence
//!
//! # Cosine Mode
//!
//! Sentence and word encoders produce vectors whose direction carries the
//! meaning. With [`Metric::Cosine`] every row is L2-normalised up front and
//! centroids are re-normalised after each update (spherical k-means), so the
//! squared Euclidean distance used internally is `2 - 2·cos(x, μ)`.

use super::traits::Clustering;
use crate::error::{Error, Result};
use ndarray::{Array2, ArrayView1};
use rand::prelude::*;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Distance used to compare points with centroids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Metric {
    /// Squared Euclidean distance on raw vectors.
    Euclidean,
    /// Cosine distance (spherical k-means on normalised vectors).
    #[default]
    Cosine,
}

/// K-means clustering algorithm.
#[derive(Debug, Clone)]
pub struct Kmeans {
    /// Number of clusters.
    k: usize,
    /// Maximum iterations.
    max_iter: usize,
    /// Convergence tolerance.
    tol: f64,
    /// Random seed.
    seed: Option<u64>,
    /// Distance metric.
    metric: Metric,
}

impl Kmeans {
    /// Create a new K-means clusterer.
    pub fn new(k: usize) -> Self {
        Self {
            k,
            max_iter: 100,
            tol: 1e-4,
            seed: None,
            metric: Metric::Cosine,
        }
    }

    /// Set maximum iterations.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Set convergence tolerance.
    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
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

/// Validate shape and pack rows into a matrix, normalising for cosine.
pub(crate) fn prepare(data: &[Vec<f32>], k: usize, metric: Metric) -> Result<Array2<f32>> {
    if data.is_empty() {
        return Err(Error::EmptyInput);
    }

    let n = data.len();
    let d = data[0].len();

    if k == 0 || k > n {
        return Err(Error::InvalidClusterCount {
            requested: k,
            n_items: n,
        });
    }

    let mut flat: Vec<f32> = Vec::with_capacity(n * d);
    for point in data {
        if point.len() != d {
            return Err(Error::DimensionMismatch {
                expected: d,
                found: point.len(),
            });
        }
        flat.extend(point);
    }
    let mut arr = Array2::from_shape_vec((n, d), flat).map_err(|e| Error::Other(e.to_string()))?;

    if metric == Metric::Cosine {
        normalize_rows(&mut arr);
    }
    Ok(arr)
}

/// L2-normalise every row in place; zero rows are left untouched.
pub(crate) fn normalize_rows(arr: &mut Array2<f32>) {
    for mut row in arr.rows_mut() {
        let norm = row.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            row.mapv_inplace(|x| x / norm);
        }
    }
}

pub(crate) fn rng_for(seed: Option<u64>) -> Box<dyn RngCore> {
    match seed {
        Some(s) => Box::new(StdRng::seed_from_u64(s)),
        None => Box::new(rand::rng()),
    }
}

/// Compute squared Euclidean distance.
pub(crate) fn squared_distance(a: &ArrayView1<'_, f32>, b: &ArrayView1<'_, f32>) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Initialize centroids using k-means++ over the given rows.
///
/// Keeps a running nearest-centroid distance per point so seeding costs
/// O(n·k·d) rather than O(n·k²·d).
pub(crate) fn init_centroids(
    data: &Array2<f32>,
    rows: &[usize],
    k: usize,
    rng: &mut dyn RngCore,
) -> Array2<f32> {
    let n = rows.len();
    let d = data.ncols();
    let mut centroids = Array2::zeros((k, d));

    // First centroid: random point
    let first = rows[rng.random_range(0..n)];
    centroids.row_mut(0).assign(&data.row(first));

    let mut distances: Vec<f32> = rows
        .iter()
        .map(|&r| squared_distance(&data.row(r), &centroids.row(0)))
        .collect();

    for i in 1..k {
        // Sample proportional to squared distance
        let total: f32 = distances.iter().sum();
        let selected = if total <= 0.0 {
            rng.random_range(0..n)
        } else {
            let threshold = rng.random::<f32>() * total;
            let mut cumsum = 0.0;
            let mut selected = n - 1;
            for (j, &dist) in distances.iter().enumerate() {
                cumsum += dist;
                if cumsum >= threshold {
                    selected = j;
                    break;
                }
            }
            selected
        };

        centroids.row_mut(i).assign(&data.row(rows[selected]));
        let centroid = centroids.row(i);
        for (dist, &r) in distances.iter_mut().zip(rows) {
            let candidate = squared_distance(&data.row(r), &centroid);
            if candidate < *dist {
                *dist = candidate;
            }
        }
    }

    centroids
}

fn nearest(point: &ArrayView1<'_, f32>, centroids: &Array2<f32>) -> usize {
    let mut best_cluster = 0;
    let mut best_dist = f32::MAX;
    for (k, centroid) in centroids.rows().into_iter().enumerate() {
        let dist = squared_distance(point, &centroid);
        if dist < best_dist {
            best_dist = dist;
            best_cluster = k;
        }
    }
    best_cluster
}

/// Assign every row of `data` to its nearest centroid.
pub(crate) fn assign(data: &Array2<f32>, centroids: &Array2<f32>, labels: &mut [usize]) {
    #[cfg(feature = "parallel")]
    {
        labels.par_iter_mut().enumerate().for_each(|(i, label)| {
            *label = nearest(&data.row(i), centroids);
        });
    }

    #[cfg(not(feature = "parallel"))]
    for (i, label) in labels.iter_mut().enumerate() {
        *label = nearest(&data.row(i), centroids);
    }
}

impl Clustering for Kmeans {
    fn fit_predict(&self, data: &[Vec<f32>]) -> Result<Vec<usize>> {
        let data_arr = prepare(data, self.k, self.metric)?;
        let n = data_arr.nrows();
        let d = data_arr.ncols();

        let mut rng = rng_for(self.seed);
        let all_rows: Vec<usize> = (0..n).collect();
        let mut centroids = init_centroids(&data_arr, &all_rows, self.k, rng.as_mut());
        let mut labels = vec![0usize; n];

        for _iter in 0..self.max_iter {
            assign(&data_arr, &centroids, &mut labels);

            // Update step
            let mut new_centroids = Array2::zeros((self.k, d));
            let mut counts = vec![0usize; self.k];

            for (i, &k) in labels.iter().enumerate() {
                for j in 0..d {
                    new_centroids[[k, j]] += data_arr[[i, j]];
                }
                counts[k] += 1;
            }

            for (k, &count) in counts.iter().enumerate() {
                if count > 0 {
                    for j in 0..d {
                        new_centroids[[k, j]] /= count as f32;
                    }
                } else {
                    // Empty cluster: reinitialize randomly
                    let idx = rng.random_range(0..n);
                    new_centroids.row_mut(k).assign(&data_arr.row(idx));
                }
            }
            if self.metric == Metric::Cosine {
                normalize_rows(&mut new_centroids);
            }

            // Check convergence
            let shift: f32 = centroids
                .iter()
                .zip(new_centroids.iter())
                .map(|(a, b)| (a - b).powi(2))
                .sum();

            centroids = new_centroids;

            if shift < self.tol as f32 {
                break;
            }
        }

        assign(&data_arr, &centroids, &mut labels);
        Ok(labels)
    }

    fn n_clusters(&self) -> usize {
        self.k
    }
}
