//! Term clustering pipeline.
//!
//! One [`TermPipeline`] owns the resources of a run: the configuration, the
//! embedder, the word vector store, the vocabulary, stopwords, clusterer and
//! anchor RNG. Maps are passed in and a new map is returned; the caller
//! swaps it in once the call succeeds.
//!
//! ```text
//! observe_terms ─► embed_pending ─► for each chunk of unlabeled leaves:
//!                                     anchors + chunk ─► partition
//!                                     per cluster: consensus | selector
//!                                     (last batches) recluster to fixpoint
//!                                   ─► build_ontology
//! ```

use crate::cluster::BatchClusterer;
use crate::config::OntologyConfig;
use crate::embed::{embed_chunked, Embedder};
use crate::error::{Error, Result};
use crate::hierarchy::OntologyBuilder;
use crate::label::{Label, LabelSelector, SynonymMap};
use crate::recluster::{ReclusterController, ReclusterReport};
use crate::stability::{assign_unlabeled, consensus_label, AnchorSampler};
use crate::stopwords::Stopwords;
use crate::store::VectorStore;
use crate::vocab::Vocabulary;
use tracing::{debug, info};

/// Incremental term clustering and ontology construction.
pub struct TermPipeline<E> {
    config: OntologyConfig,
    embedder: E,
    store: VectorStore,
    vocab: Vocabulary,
    stopwords: Stopwords,
    clusterer: BatchClusterer,
    sampler: AnchorSampler,
}

impl<E: Embedder> TermPipeline<E> {
    /// Create a pipeline writing term vectors into `store`.
    pub fn new(config: OntologyConfig, embedder: E, store: VectorStore) -> Result<Self> {
        config.validate()?;
        if store.dim() != embedder.dim() {
            return Err(Error::DimensionMismatch {
                expected: embedder.dim(),
                found: store.dim(),
            });
        }
        let store = match config.vector_capacity {
            Some(cap) => store.with_capacity_limit(Some(cap)),
            None => store,
        };
        Ok(Self {
            clusterer: config.clusterer(),
            sampler: AnchorSampler::new(config.max_anchor_ids(), config.seed),
            config,
            embedder,
            store,
            vocab: Vocabulary::new(),
            stopwords: Stopwords::english(),
        })
    }

    /// Resume with a previously saved vocabulary.
    pub fn with_vocabulary(mut self, mut vocab: Vocabulary) -> Self {
        vocab.reindex();
        self.vocab = vocab;
        self
    }

    /// Replace the stopword table.
    pub fn with_stopwords(mut self, stopwords: Stopwords) -> Self {
        self.stopwords = stopwords;
        self
    }

    /// Configuration in use.
    pub fn config(&self) -> &OntologyConfig {
        &self.config
    }

    /// Term registry.
    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocab
    }

    /// Stopword table.
    pub fn stopwords(&self) -> &Stopwords {
        &self.stopwords
    }

    /// Word vector store.
    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    /// Mutable store access, e.g. to flush it.
    pub fn store_mut(&mut self) -> &mut VectorStore {
        &mut self.store
    }

    /// Embedder in use.
    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    /// Register terms with their language-model weights.
    ///
    /// Each new term reserves a store slot; weights of known terms only
    /// ever decrease. Returns the number of new terms.
    pub fn observe_terms(&mut self, terms: &[(&str, f64)]) -> Result<usize> {
        let mut added = 0;
        for &(name, weight) in terms {
            let term = Label::leaf(name);
            if self.vocab.index_of(&term).is_none() {
                self.store.grow_to(self.vocab.len() + 1)?;
                added += 1;
            }
            self.vocab.observe(&term, weight);
        }
        debug!(added, total = self.vocab.len(), "observed terms");
        Ok(added)
    }

    /// Learn or lower a stopword weight.
    pub fn observe_stopword(&mut self, word: &str, weight: f64) {
        self.stopwords.insert(word, weight);
    }

    /// Embed every leaf term whose slot is still empty.
    pub fn embed_pending(&mut self) -> Result<usize> {
        self.store.grow_to(self.vocab.len())?;
        let pending: Vec<usize> = self
            .vocab
            .terms()
            .iter()
            .enumerate()
            .filter(|(i, t)| !t.is_parent() && !self.store.is_written(*i))
            .map(|(i, _)| i)
            .collect();
        if pending.is_empty() {
            return Ok(0);
        }
        let texts: Vec<String> = pending
            .iter()
            .filter_map(|&i| self.vocab.term(i).map(Label::surface))
            .collect();
        let vectors = embed_chunked(&self.embedder, &texts, self.config.embed_batch_size)?;
        self.store.write_many(&pending, &vectors)?;
        debug!(embedded = pending.len(), embedder = self.embedder.name(), "embedded terms");
        Ok(pending.len())
    }

    /// Cluster every unlabeled leaf term and return the updated map.
    ///
    /// Unlabeled terms are consumed in chunks of `kmeans_batch_size * 0.7`,
    /// each clustered together with a sample of earlier terms. From the
    /// third-to-last chunk on, cluster sizes are enforced after each chunk.
    pub fn cluster_and_label(&mut self, synonyms: &SynonymMap) -> Result<SynonymMap> {
        self.embed_pending()?;
        let mut next = synonyms.clone();

        let pending: Vec<usize> = self
            .leaf_indices()
            .filter(|&i| self.vocab.term(i).is_some_and(|t| !next.contains(t)))
            .collect();
        let n = pending.len();
        let chunk = self.config.batch_chunk();
        let start_recluster = (n / chunk).saturating_sub(3);

        for (batch, start) in (0..n).step_by(chunk).enumerate() {
            let end = (start + chunk).min(n);
            let history: Vec<usize> = pending[..start]
                .iter()
                .copied()
                .filter(|&i| self.vocab.term(i).is_some_and(|t| !next.contains(t)))
                .collect();
            let labeled: Vec<usize> = self
                .leaf_indices()
                .filter(|&i| self.vocab.term(i).is_some_and(|t| next.contains(t)))
                .collect();

            let mut idxs = self.sampler.sample(history, labeled);
            let anchors = idxs.len();
            idxs.extend_from_slice(&pending[start..end]);
            let k = OntologyConfig::target_k(idxs.len(), self.config.items_per_cluster);
            self.cluster_into(&mut next, &idxs, k)?;

            let report = if batch >= start_recluster {
                self.enforce_cluster_sizes(&mut next, end == n)?
            } else {
                ReclusterReport::default()
            };
            info!(
                batch,
                new = end - start,
                anchors,
                k,
                dissolved = report.dissolved,
                split = report.split,
                labeled = next.len(),
                "clustered term batch"
            );
        }

        if self.config.build_ontology {
            next = self.build_ontology(&next)?;
        }
        Ok(next)
    }

    /// Add parent levels to `synonyms` and return the extended map.
    pub fn build_ontology(&mut self, synonyms: &SynonymMap) -> Result<SynonymMap> {
        let builder = OntologyBuilder::new(&self.config, &self.stopwords);
        let (next, stats) = builder.build(synonyms.clone(), &mut self.vocab, &mut self.store)?;
        info!(
            materialized = stats.materialized,
            clustered_levels = stats.clustered_levels,
            recovered = stats.recovered,
            "built ontology"
        );
        Ok(next)
    }

    /// Run the recluster controller on first-level clusters until no
    /// cluster exceeds the size ceiling.
    ///
    /// Labels left without members lose their own edges up the ontology.
    pub fn enforce_cluster_sizes(
        &self,
        synonyms: &mut SynonymMap,
        is_final: bool,
    ) -> Result<ReclusterReport> {
        let per_cluster = self.config.items_per_cluster;
        let controller = ReclusterController::from_config(&self.config, per_cluster);
        let report = controller.run(synonyms, is_final, |map, members| {
            let idxs: Vec<usize> = members
                .iter()
                .filter_map(|t| self.vocab.index_of(t))
                .filter(|&i| self.store.is_written(i))
                .collect();
            if idxs.is_empty() {
                return Ok(());
            }
            let k = controller.split_k(idxs.len(), per_cluster);
            self.cluster_into(map, &idxs, k)
        })?;
        let pruned = synonyms.prune_childless();
        if pruned > 0 {
            debug!(pruned, "dropped parent edges of vacated labels");
        }
        Ok(report)
    }

    /// Partition the vectors at `idxs` and label each emergent cluster.
    fn cluster_into(&self, synonyms: &mut SynonymMap, idxs: &[usize], k: usize) -> Result<()> {
        let vectors = self.store.gather(idxs);
        let groups = self.clusterer.partition(&vectors, k)?;
        let selector = LabelSelector::new(&self.vocab, &self.stopwords);
        for group in groups {
            let members: Vec<Label> = group
                .iter()
                .filter_map(|&pos| self.vocab.term(idxs[pos]).cloned())
                .collect();
            match consensus_label(synonyms, &members) {
                Some(label) => {
                    assign_unlabeled(synonyms, &members, &label);
                }
                None => {
                    selector.apply(&members, synonyms);
                }
            }
        }
        Ok(())
    }

    /// Indices of leaf terms that have a vector.
    fn leaf_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.vocab
            .terms()
            .iter()
            .enumerate()
            .filter(|(i, t)| !t.is_parent() && self.store.is_written(*i))
            .map(|(i, _)| i)
    }
}
