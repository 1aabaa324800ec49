//! Parent-level construction over a labeled vocabulary.
//!
//! Works level by level, like a RAPTOR tree build, except that the "summary"
//! of a cluster is the mean of its children's vectors:
//!
//! ```text
//! level 0: parents at depth 1 get mean vectors + mean weights
//!          |parents| < max_top_parents ? next level : cluster them (k = sqrt n)
//! level 1: parents at depth 2 ...
//! ...
//! finally: every top parent that still lacks a vector gets one
//! ```
//!
//! Parents at depth `max_ontology_depth` are never clustered further, so no
//! chain is longer than `max_ontology_depth` hops.

use crate::cluster::BatchClusterer;
use crate::config::OntologyConfig;
use crate::error::Result;
use crate::label::{Label, LabelSelector, SynonymMap};
use crate::stopwords::Stopwords;
use crate::store::VectorStore;
use crate::vocab::Vocabulary;
use tracing::{debug, info, warn};

/// Summary of one [`OntologyBuilder::build`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OntologyStats {
    /// Parent labels that received a vector.
    pub materialized: usize,
    /// Levels whose parents were clustered into a new level.
    pub clustered_levels: usize,
    /// Children dropped back to leaves because they had no vector.
    pub recovered: usize,
}

/// Adds parent levels on top of first-level clusters.
#[derive(Debug, Clone)]
pub struct OntologyBuilder<'a> {
    config: &'a OntologyConfig,
    stopwords: &'a Stopwords,
    clusterer: BatchClusterer,
}

impl<'a> OntologyBuilder<'a> {
    /// Builder using the configured depth limit and parent threshold.
    pub fn new(config: &'a OntologyConfig, stopwords: &'a Stopwords) -> Self {
        Self {
            config,
            stopwords,
            clusterer: config.clusterer(),
        }
    }

    /// Extend `synonyms` with parent levels.
    ///
    /// New parent labels are registered in `vocab` and their vectors
    /// appended to `store`, keeping vocabulary and store indices aligned.
    pub fn build(
        &self,
        mut synonyms: SynonymMap,
        vocab: &mut Vocabulary,
        store: &mut VectorStore,
    ) -> Result<(SynonymMap, OntologyStats)> {
        let mut stats = OntologyStats::default();
        let max_depth = self.config.max_ontology_depth;

        for level in 0..max_depth {
            let depth = level + 1;
            let parents = synonyms.parents_at_depth(depth);
            if parents.is_empty() {
                continue;
            }
            for parent in &parents {
                self.materialize(parent, &mut synonyms, vocab, store, &mut stats)?;
            }

            let parents = synonyms.parents_at_depth(depth);
            if parents.len() < self.config.max_top_parents || depth >= max_depth {
                debug!(depth, parents = parents.len(), "level thin enough; not clustering");
                continue;
            }

            let k = ((parents.len() as f64).sqrt() as usize).max(2);
            let idxs: Vec<usize> = parents.iter().filter_map(|p| vocab.index_of(p)).collect();
            let groups = self.clusterer.partition(&store.gather(&idxs), k)?;
            let selector = LabelSelector::new(vocab, self.stopwords);
            let mut assigned = 0;
            for group in groups {
                let members: Vec<Label> = group
                    .iter()
                    .filter_map(|&pos| vocab.term(idxs[pos]).cloned())
                    .collect();
                assigned += selector.apply(&members, &mut synonyms);
            }
            stats.clustered_levels += 1;
            info!(depth, parents = parents.len(), k, assigned, "clustered ontology level");
        }

        for parent in synonyms.top_parents() {
            self.materialize(&parent, &mut synonyms, vocab, store, &mut stats)?;
        }
        Ok((synonyms, stats))
    }

    /// Give `parent` a vector and weight if it has none yet.
    fn materialize(
        &self,
        parent: &Label,
        synonyms: &mut SynonymMap,
        vocab: &mut Vocabulary,
        store: &mut VectorStore,
        stats: &mut OntologyStats,
    ) -> Result<()> {
        if vocab.index_of(parent).is_some() {
            return Ok(());
        }
        let children: Vec<Label> = synonyms
            .view()
            .children(parent)
            .map(<[Label]>::to_vec)
            .unwrap_or_default();

        let mut child_idxs = Vec::with_capacity(children.len());
        let mut weights = Vec::with_capacity(children.len());
        for child in &children {
            match vocab.index_of(child).filter(|&i| store.is_written(i)) {
                Some(i) => {
                    child_idxs.push(i);
                    if let Some(w) = vocab.weight(child) {
                        weights.push(w);
                    }
                }
                None => {
                    warn!(child = %child, parent = %parent, "child has no vector; treating as fresh leaf");
                    synonyms.remove(child);
                    stats.recovered += 1;
                }
            }
        }

        let Some(mean) = store.mean_of(&child_idxs) else {
            return Ok(());
        };
        // Grow first: a capacity failure must not leave a slotless term behind.
        store.grow_to(vocab.len() + 1)?;
        let idx = vocab.intern(parent);
        store.write(idx, &mean)?;
        if !weights.is_empty() {
            vocab.set_weight(parent, weights.iter().sum::<f64>() / weights.len() as f64);
        }
        stats.materialized += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClusterMode;

    fn setup(names: &[(&str, [f32; 2], f64)]) -> (Vocabulary, VectorStore) {
        let mut vocab = Vocabulary::new();
        let mut store = VectorStore::new(2);
        for (name, v, w) in names {
            vocab.observe(&Label::leaf(*name), *w);
            store.push(v).unwrap();
        }
        (vocab, store)
    }

    #[test]
    fn parent_vector_is_mean_of_children() {
        let (mut vocab, mut store) = setup(&[
            ("a", [1.0, 0.0], 2.0),
            ("b", [0.0, 1.0], 4.0),
            ("c", [1.0, 1.0], 6.0),
        ]);
        let root = Label::new("root", 1);
        let map: SynonymMap = ["a", "b", "c"]
            .iter()
            .map(|n| (Label::leaf(*n), root.clone()))
            .collect();

        let config = OntologyConfig::default();
        let sw = Stopwords::english();
        let (out, stats) = OntologyBuilder::new(&config, &sw)
            .build(map.clone(), &mut vocab, &mut store)
            .unwrap();

        assert_eq!(out, map);
        assert_eq!(stats.materialized, 1);
        assert_eq!(stats.clustered_levels, 0);
        let idx = vocab.index_of(&root).unwrap();
        assert_eq!(idx, 3);
        let v = store.get(idx).unwrap();
        assert!((v[0] - 2.0 / 3.0).abs() < 1e-6 && (v[1] - 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(vocab.weight(&root), Some(4.0));
        assert!(out.parents_at_depth(2).is_empty());
    }

    #[test]
    fn crowded_level_is_clustered_one_level_up() {
        let mut rows = Vec::new();
        for i in 0..8 {
            let v = if i < 4 { [1.0, 0.05 * i as f32] } else { [0.05 * i as f32, 1.0] };
            rows.push((format!("w{i}"), v));
        }
        let mut vocab = Vocabulary::new();
        let mut store = VectorStore::new(2);
        let mut map = SynonymMap::new();
        for (i, (name, v)) in rows.iter().enumerate() {
            let leaf = Label::leaf(name.clone());
            vocab.observe(&leaf, 1.0);
            store.push(v).unwrap();
            // Pair leaves under one parent each: p0..p3.
            map.assign(leaf, Label::new(format!("p{}", i / 2), 1));
        }

        let config = OntologyConfig::new()
            .with_max_top_parents(4)
            .with_cluster_mode(ClusterMode::Exact);
        let sw = Stopwords::english();
        let (out, stats) = OntologyBuilder::new(&config, &sw)
            .build(map, &mut vocab, &mut store)
            .unwrap();

        assert_eq!(stats.clustered_levels, 1);
        assert!(!out.parents_at_depth(2).is_empty());
        for p in out.parents_at_depth(1) {
            assert_eq!(out.get(&p).map(Label::depth), Some(2));
        }
        assert_eq!(vocab.len(), store.len());
    }

    #[test]
    fn child_without_vector_becomes_leaf_again() {
        let (mut vocab, mut store) = setup(&[("a", [1.0, 0.0], 1.0), ("b", [0.0, 1.0], 1.0)]);
        vocab.observe(&Label::leaf("ghost"), 1.0);
        store.reserve(1).unwrap();
        let root = Label::new("a", 1);
        let map: SynonymMap = ["a", "b", "ghost"]
            .iter()
            .map(|n| (Label::leaf(*n), root.clone()))
            .collect();

        let config = OntologyConfig::default();
        let sw = Stopwords::english();
        let (out, stats) = OntologyBuilder::new(&config, &sw)
            .build(map, &mut vocab, &mut store)
            .unwrap();
        assert_eq!(stats.recovered, 1);
        assert!(!out.contains(&Label::leaf("ghost")));
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn depth_limit_caps_chains() {
        let (mut vocab, mut store) = setup(&[("a", [1.0, 0.0], 1.0), ("b", [0.9, 0.1], 1.0)]);
        let map: SynonymMap = [
            (Label::leaf("a"), Label::new("a", 1)),
            (Label::leaf("b"), Label::new("b", 1)),
        ]
        .into_iter()
        .collect();
        let config = OntologyConfig::new()
            .with_max_top_parents(1)
            .with_max_ontology_depth(1);
        let sw = Stopwords::english();
        let (out, _) = OntologyBuilder::new(&config, &sw)
            .build(map, &mut vocab, &mut store)
            .unwrap();
        assert!(out.parents_at_depth(2).is_empty());
    }
}
