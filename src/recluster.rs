//! Adaptive cluster size control.
//!
//! After a clustering pass the controller inspects every size-controlled
//! cluster of a [`ClusterMap`]:
//!
//! - clusters smaller than `0.5 * items_per_cluster` are dissolved back to
//!   unlabeled, except on the final batch where nothing better will come;
//! - clusters larger than `sqrt(max_top_parents)` lose their assignments and
//!   the reclaimed members are handed back to the clusterer, one cluster at
//!   a time or pooled up to `kmeans_batch_size`.
//!
//! Splitting repeats until no cluster exceeds the ceiling. If a snapshot is
//! still oversized after `max_rounds`, the excess members of each offending
//! cluster are returned to the unlabeled state so the ceiling always holds.

use crate::config::{OntologyConfig, ReclusterStrategy};
use crate::error::Result;
use crate::label::ClusterMap;
use tracing::{debug, warn};

/// Default number of split rounds before trimming.
pub const DEFAULT_MAX_ROUNDS: usize = 8;

/// What one controller run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReclusterReport {
    /// Clusters dissolved for being too small.
    pub dissolved: usize,
    /// Clusters split for being too large.
    pub split: usize,
    /// Split rounds executed.
    pub rounds: usize,
    /// Members unlabeled by the final trim.
    pub trimmed: usize,
}

/// Dissolves undersized clusters and splits oversized ones.
#[derive(Debug, Clone)]
pub struct ReclusterController {
    min_viable: f64,
    ceiling: usize,
    strategy: ReclusterStrategy,
    pool_cap: usize,
    max_rounds: usize,
}

impl ReclusterController {
    /// Controller for clusters targeting `per_cluster` members.
    pub fn from_config(config: &OntologyConfig, per_cluster: usize) -> Self {
        Self {
            min_viable: config.min_viable_size(per_cluster),
            ceiling: config.max_cluster_size(),
            strategy: config.recluster_strategy,
            pool_cap: config.kmeans_batch_size,
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }

    /// Set the split round limit.
    pub fn with_max_rounds(mut self, rounds: usize) -> Self {
        self.max_rounds = rounds;
        self
    }

    /// Largest tolerated cluster.
    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Smallest k that can bring `n` members under the ceiling.
    pub fn split_k(&self, n: usize, per_cluster: usize) -> usize {
        let by_target = OntologyConfig::target_k(n, per_cluster);
        let by_ceiling = n.div_ceil(self.ceiling.max(1));
        by_target.max(by_ceiling)
    }

    /// Run to fixpoint.
    ///
    /// `recluster` receives the map and a set of members whose labels were
    /// just cleared; it is expected to cluster and relabel them.
    pub fn run<M, F>(&self, map: &mut M, is_final: bool, mut recluster: F) -> Result<ReclusterReport>
    where
        M: ClusterMap,
        F: FnMut(&mut M, Vec<M::Key>) -> Result<()>,
    {
        let mut report = ReclusterReport::default();

        if !is_final {
            report.dissolved += self.dissolve_small(map);
        }

        while report.rounds < self.max_rounds {
            let oversized: Vec<Vec<M::Key>> = map
                .clusters()
                .into_values()
                .filter(|members| members.len() > self.ceiling)
                .collect();
            if oversized.is_empty() {
                break;
            }
            report.rounds += 1;
            report.split += oversized.len();
            debug!(
                round = report.rounds,
                clusters = oversized.len(),
                ceiling = self.ceiling,
                "splitting oversized clusters"
            );

            let mut pool: Vec<M::Key> = Vec::new();
            for members in oversized {
                for m in &members {
                    map.clear_label(m);
                }
                match self.strategy {
                    ReclusterStrategy::Individual => recluster(map, members)?,
                    ReclusterStrategy::Batched => {
                        pool.extend(members);
                        if pool.len() > self.pool_cap {
                            recluster(map, std::mem::take(&mut pool))?;
                        }
                    }
                }
            }
            if !pool.is_empty() {
                recluster(map, pool)?;
            }

            if !is_final {
                report.dissolved += self.dissolve_small(map);
            }
        }

        report.trimmed = self.trim_oversized(map);
        if report.trimmed > 0 {
            warn!(
                trimmed = report.trimmed,
                rounds = report.rounds,
                "split did not converge; returned excess members to unlabeled"
            );
        }
        Ok(report)
    }

    fn dissolve_small<M: ClusterMap>(&self, map: &mut M) -> usize {
        let small: Vec<Vec<M::Key>> = map
            .clusters()
            .into_values()
            .filter(|members| (members.len() as f64) < self.min_viable)
            .collect();
        for members in &small {
            for m in members {
                map.clear_label(m);
            }
        }
        if !small.is_empty() {
            debug!(clusters = small.len(), "dissolved undersized clusters");
        }
        small.len()
    }

    fn trim_oversized<M: ClusterMap>(&self, map: &mut M) -> usize {
        let mut trimmed = 0;
        for members in map.clusters().into_values() {
            for m in members.iter().skip(self.ceiling) {
                if map.clear_label(m).is_some() {
                    trimmed += 1;
                }
            }
        }
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::label::{Label, SynonymMap};

    fn one_cluster(n: usize) -> SynonymMap {
        let root = Label::new("t0", 1);
        (0..n)
            .map(|i| (Label::leaf(format!("t{i}")), root.clone()))
            .collect()
    }

    fn config() -> OntologyConfig {
        OntologyConfig::new()
            .with_items_per_cluster(4)
            .with_max_top_parents(16)
    }

    /// Chunk reclaimed members into groups of `size`, labeled after the first.
    fn chunker(size: usize) -> impl FnMut(&mut SynonymMap, Vec<Label>) -> Result<()> {
        move |map, mut members| {
            members.sort();
            for chunk in members.chunks(size) {
                let label = chunk[0].parent();
                for m in chunk {
                    map.assign(m.clone(), label.clone());
                }
            }
            Ok(())
        }
    }

    #[test]
    fn oversized_cluster_is_split_under_ceiling() {
        let mut map = one_cluster(40);
        let controller = ReclusterController::from_config(&config(), 4);
        let report = controller.run(&mut map, true, chunker(3)).unwrap();
        assert_eq!(report.split, 1);
        assert_eq!(report.trimmed, 0);
        assert!(map.view().max_cluster_size() <= 4);
        assert_eq!(map.len(), 40);
    }

    #[test]
    fn undersized_clusters_dissolve_unless_final() {
        let mut map: SynonymMap = [
            (Label::leaf("a"), Label::new("a", 1)),
            (Label::leaf("b"), Label::new("b", 1)),
            (Label::leaf("c"), Label::new("b", 1)),
        ]
        .into_iter()
        .collect();
        let controller = ReclusterController::from_config(&config(), 4);

        let mut final_map = map.clone();
        let report = controller.run(&mut final_map, true, chunker(2)).unwrap();
        assert_eq!(report.dissolved, 0);
        assert_eq!(final_map.len(), 3);

        let report = controller.run(&mut map, false, chunker(2)).unwrap();
        assert_eq!(report.dissolved, 1);
        assert!(!map.contains(&Label::leaf("a")));
        assert!(map.contains(&Label::leaf("b")));
    }

    #[test]
    fn non_converging_split_is_trimmed() {
        let mut map = one_cluster(20);
        let controller = ReclusterController::from_config(&config(), 4).with_max_rounds(2);
        // Puts everything straight back into one cluster.
        let report = controller.run(&mut map, true, chunker(usize::MAX)).unwrap();
        assert_eq!(report.rounds, 2);
        assert_eq!(report.trimmed, 16);
        assert!(map.view().max_cluster_size() <= controller.ceiling());
    }

    #[test]
    fn batched_and_individual_reach_same_invariant() {
        for strategy in [ReclusterStrategy::Individual, ReclusterStrategy::Batched] {
            let mut map = one_cluster(30);
            for i in 0..30 {
                map.assign(Label::leaf(format!("u{i}")), Label::new("u0", 1));
            }
            let cfg = config().with_recluster_strategy(strategy).with_kmeans_batch_size(10);
            let controller = ReclusterController::from_config(&cfg, 4);
            controller.run(&mut map, true, chunker(4)).unwrap();
            assert!(map.view().max_cluster_size() <= 4, "{strategy:?}");
        }
    }

    #[test]
    fn split_k_reaches_ceiling() {
        let controller = ReclusterController::from_config(&config(), 10);
        assert_eq!(controller.split_k(100, 10), 25);
        assert_eq!(controller.split_k(3, 10), 2);
    }
}
