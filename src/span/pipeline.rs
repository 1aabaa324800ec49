use super::tfidf::{TfIdfLabeler, TfIdfState};
use super::types::{Span, SpanId, SpanLabelMap};
use crate::cluster::BatchClusterer;
use crate::config::OntologyConfig;
use crate::embed::{embed_chunked, Embedder};
use crate::error::{Error, Result};
use crate::label::ClusterMap;
use crate::recluster::{ReclusterController, ReclusterReport};
use crate::stability::{assign_unlabeled, consensus_label, AnchorSampler, CONSENSUS_QUORUM};
use crate::stopwords::Stopwords;
use crate::store::VectorStore;
use crate::vocab::Vocabulary;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// Incremental span clustering with descriptive labels.
///
/// Each call to [`cluster_spans`](Self::cluster_spans) is one batch. Fresh
/// clusters get ids `"{batch}_{n}"`, which the TF-IDF pass then replaces
/// with words drawn from the cluster's spans where it can.
pub struct SpanPipeline<E> {
    config: OntologyConfig,
    embedder: E,
    store: VectorStore,
    stopwords: Stopwords,
    weights: Option<Vocabulary>,
    tfidf: TfIdfState,
    clusterer: BatchClusterer,
    sampler: AnchorSampler,
    batches: usize,
    next_cluster: usize,
}

impl<E: Embedder> SpanPipeline<E> {
    /// Create a pipeline writing span vectors into `store`.
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
            stopwords: Stopwords::english(),
            weights: None,
            tfidf: TfIdfState::new(),
            batches: 0,
            next_cluster: 0,
        })
    }

    /// Replace the stopword table.
    pub fn with_stopwords(mut self, stopwords: Stopwords) -> Self {
        self.stopwords = stopwords;
        self
    }

    /// Score label words with term weights from a term vocabulary.
    pub fn with_term_weights(mut self, vocab: Vocabulary) -> Self {
        self.weights = Some(vocab);
        self
    }

    /// Resume frequency accounting and batch numbering.
    pub fn with_state(mut self, tfidf: TfIdfState, batches: usize) -> Self {
        self.tfidf = tfidf;
        self.batches = batches;
        self
    }

    /// Accumulated TF-IDF state.
    pub fn tfidf(&self) -> &TfIdfState {
        &self.tfidf
    }

    /// Number of batches processed.
    pub fn batches(&self) -> usize {
        self.batches
    }

    /// Span vector store.
    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    /// Mutable store access, e.g. to flush it.
    pub fn store_mut(&mut self) -> &mut VectorStore {
        &mut self.store
    }

    /// Cluster one batch of spans and return the updated map.
    ///
    /// Spans already labeled keep their labels. Adjacency labels are filled
    /// in batch order once labeling is complete.
    pub fn cluster_spans(&mut self, batch: &[Span], labels: &SpanLabelMap) -> Result<SpanLabelMap> {
        let mut next = labels.clone();
        let batch_no = self.batches;
        self.next_cluster = 0;

        let mut seen: BTreeSet<&SpanId> = BTreeSet::new();
        let mut order: Vec<SpanId> = Vec::with_capacity(batch.len());
        for span in batch {
            if next.index_of(&span.id).is_none() {
                self.store.grow_to(next.span_count() + 1)?;
            }
            next.register_span(span);
            if seen.insert(&span.id) {
                order.push(span.id.clone());
            }
        }
        self.embed_pending(&next, &order)?;

        let unlabeled: Vec<SpanId> = order
            .iter()
            .filter(|id| next.label_of(id).is_none())
            .cloned()
            .collect();
        let n = unlabeled.len();
        let chunk = self.config.batch_chunk();
        for start in (0..n).step_by(chunk) {
            let end = (start + chunk).min(n);
            let history: Vec<SpanId> = unlabeled[..start]
                .iter()
                .filter(|id| next.label_of(id).is_none())
                .cloned()
                .collect();
            let labeled: Vec<SpanId> = next
                .iter()
                .map(|(id, _)| id)
                .filter(|id| next.index_of(id).is_some_and(|i| self.store.is_written(i)))
                .cloned()
                .collect();
            let mut members = self.sampler.sample(history, labeled);
            members.extend_from_slice(&unlabeled[start..end]);
            let k = OntologyConfig::target_k(members.len(), self.config.span_items_per_cluster);
            self.cluster_into(&mut next, &members, k, batch_no, None)?;
        }

        let report = self.enforce_cluster_sizes(&mut next, labels, batch_no)?;

        let prefix = format!("{batch_no}_");
        let bodies: BTreeMap<String, Vec<Span>> = next
            .clusters()
            .into_iter()
            .filter(|(label, _)| label.starts_with(&prefix))
            .map(|(label, ids)| {
                let spans = ids.iter().filter_map(|id| next.span(id)).cloned().collect();
                (label, spans)
            })
            .collect();
        let fresh: BTreeMap<String, Vec<&Span>> = bodies
            .iter()
            .filter(|(_, spans)| !spans.is_empty())
            .map(|(label, spans)| (label.clone(), spans.iter().collect()))
            .collect();
        let mut labeler = TfIdfLabeler::new(
            self.stopwords.domain_set(),
            self.config.tfidf_top_k,
            self.config.label_max_terms,
        );
        if let Some(vocab) = &self.weights {
            labeler = labeler.with_weights(vocab);
        }
        let renames = labeler.relabel_with_tfidf(&mut self.tfidf, &mut next, &fresh);

        next.link_sequence(&order);
        self.batches += 1;
        info!(
            batch = batch_no,
            spans = order.len(),
            clustered = n,
            fresh = fresh.len(),
            described = renames.len(),
            split = report.split,
            "clustered span batch"
        );
        Ok(next)
    }

    /// Split span clusters above the size ceiling.
    ///
    /// Span clusters are never dissolved: a span is only clustered in the
    /// batch it arrives in, so a dissolved span would stay unlabeled. For the
    /// same reason, spans the controller trims are grouped into new clusters
    /// of at most the ceiling. A split group whose members mostly held one
    /// label before this batch takes that label back once it is vacant.
    fn enforce_cluster_sizes(
        &mut self,
        labels: &mut SpanLabelMap,
        established: &SpanLabelMap,
        batch_no: usize,
    ) -> Result<ReclusterReport> {
        let per_cluster = self.config.span_items_per_cluster;
        let controller = ReclusterController::from_config(&self.config, per_cluster);
        let assigned: Vec<SpanId> = labels.iter().map(|(id, _)| id.clone()).collect();

        let report = controller.run(labels, true, |map, members| {
            let k = controller.split_k(members.len(), per_cluster);
            self.cluster_into(map, &members, k, batch_no, Some(established))
        })?;

        let stranded: Vec<SpanId> = assigned
            .into_iter()
            .filter(|id| labels.label_of(id).is_none())
            .collect();
        for group in stranded.chunks(controller.ceiling()) {
            let label = self.fresh_label(batch_no);
            assign_unlabeled(labels, group, &label);
        }
        if !stranded.is_empty() {
            warn!(
                spans = stranded.len(),
                ceiling = controller.ceiling(),
                "regrouped spans trimmed from oversized clusters"
            );
        }
        Ok(report)
    }

    fn embed_pending(&mut self, labels: &SpanLabelMap, ids: &[SpanId]) -> Result<()> {
        let mut idxs = Vec::new();
        let mut texts = Vec::new();
        for id in ids {
            let Some(span) = labels.span(id) else {
                continue;
            };
            if let Some(i) = labels.index_of(id).filter(|&i| !self.store.is_written(i)) {
                idxs.push(i);
                texts.push(span.surface());
            }
        }
        if idxs.is_empty() {
            return Ok(());
        }
        let vectors = embed_chunked(&self.embedder, &texts, self.config.span_embed_batch_size)?;
        self.store.write_many(&idxs, &vectors)?;
        debug!(embedded = idxs.len(), "embedded spans");
        Ok(())
    }

    fn fresh_label(&mut self, batch_no: usize) -> String {
        let label = format!("{batch_no}_{}", self.next_cluster);
        self.next_cluster += 1;
        label
    }

    fn cluster_into(
        &mut self,
        labels: &mut SpanLabelMap,
        members: &[SpanId],
        k: usize,
        batch_no: usize,
        established: Option<&SpanLabelMap>,
    ) -> Result<()> {
        let members: Vec<SpanId> = members
            .iter()
            .filter(|id| labels.index_of(id).is_some_and(|i| self.store.is_written(i)))
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if members.is_empty() {
            return Ok(());
        }
        let idxs: Vec<usize> = members.iter().filter_map(|id| labels.index_of(id)).collect();
        let groups = self.clusterer.partition(&self.store.gather(&idxs), k)?;
        for group in groups {
            let ids: Vec<SpanId> = group.iter().map(|&p| members[p].clone()).collect();
            let label = consensus_label(labels, &ids)
                .or_else(|| established.and_then(|prev| vacant_prior_label(prev, labels, &ids)))
                .unwrap_or_else(|| self.fresh_label(batch_no));
            assign_unlabeled(labels, &ids, &label);
        }
        Ok(())
    }
}

/// Label that at least [`CONSENSUS_QUORUM`] of `ids` carried in `prev` and
/// that no span in `current` carries any more.
fn vacant_prior_label(prev: &SpanLabelMap, current: &SpanLabelMap, ids: &[SpanId]) -> Option<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for id in ids {
        if let Some(label) = prev.label(id) {
            *counts.entry(label).or_insert(0) += 1;
        }
    }
    counts
        .into_iter()
        .filter(|&(label, count)| count >= CONSENSUS_QUORUM && current.members(label).is_empty())
        .max_by(|(la, ca), (lb, cb)| ca.cmp(cb).then_with(|| lb.cmp(la)))
        .map(|(label, _)| label.to_string())
}
