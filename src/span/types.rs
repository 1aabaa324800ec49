//! Span records and the span → cluster-label map.

use crate::label::ClusterMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Location of a span: source file, line, character offset within the line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SpanId {
    /// Source file name.
    pub file: String,
    /// Line number in the file.
    pub line: usize,
    /// Character offset of the span within the line.
    pub offset: usize,
}

impl SpanId {
    /// Construct a span id.
    pub fn new(file: impl Into<String>, line: usize, offset: usize) -> Self {
        Self {
            file: file.into(),
            line,
            offset,
        }
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.offset)
    }
}

/// A named entity found in a span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Surface text of the entity.
    pub text: String,
    /// Entity type, e.g. `ORG`.
    pub label: String,
    /// Occurrences within the span.
    pub count: usize,
}

impl Entity {
    /// Construct an entity mention.
    pub fn new(text: impl Into<String>, label: impl Into<String>, count: usize) -> Self {
        Self {
            text: text.into(),
            label: label.into(),
            count,
        }
    }
}

/// A text span ready for clustering.
///
/// `tokenized_text` has compounds joined with `_` and entities replaced by
/// placeholders such as `The Organization`; `ents` holds what was replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    /// Where the span came from.
    pub id: SpanId,
    /// Original text.
    pub text: String,
    /// Tokenized, entity-simplified text.
    pub tokenized_text: String,
    /// Entities replaced in `tokenized_text`.
    #[serde(default)]
    pub ents: Vec<Entity>,
}

impl Span {
    /// Span whose tokenized text equals its text.
    pub fn new(id: SpanId, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            id,
            tokenized_text: text.clone(),
            text,
            ents: Vec::new(),
        }
    }

    /// Set the tokenized text.
    pub fn with_tokenized_text(mut self, tokenized: impl Into<String>) -> Self {
        self.tokenized_text = tokenized.into();
        self
    }

    /// Attach an entity mention.
    pub fn with_entity(mut self, entity: Entity) -> Self {
        self.ents.push(entity);
        self
    }

    /// Text handed to the embedder.
    pub fn surface(&self) -> String {
        self.tokenized_text.replace('_', " ")
    }
}

/// Span → cluster label, with sequence-adjacency labels and the span index
/// registry backing the span vector store.
///
/// Span bodies are kept alongside so a cluster can be described again after
/// its members move, even when they arrived in an earlier batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Vec<SpanRecord>", from = "Vec<SpanRecord>")]
pub struct SpanLabelMap {
    index: BTreeMap<SpanId, usize>,
    bodies: BTreeMap<SpanId, Span>,
    labels: BTreeMap<SpanId, String>,
    before: BTreeMap<SpanId, String>,
    after: BTreeMap<SpanId, String>,
}

/// Flat persisted form of one [`SpanLabelMap`] entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanRecord {
    /// Span location.
    #[serde(flatten)]
    pub id: SpanId,
    /// Vector store slot.
    pub index: usize,
    /// Cluster label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Label of the preceding span.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
    /// Label of the following span.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
    /// Original span text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Tokenized text, when it differs from `text`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokenized_text: Option<String>,
    /// Entities replaced in the tokenized text.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ents: Vec<Entity>,
}

impl From<SpanLabelMap> for Vec<SpanRecord> {
    fn from(mut map: SpanLabelMap) -> Self {
        let mut records: Vec<SpanRecord> = map
            .index
            .into_iter()
            .map(|(id, index)| {
                let body = map.bodies.remove(&id);
                let (text, tokenized_text, ents) = match body {
                    Some(span) => {
                        let tokenized = (span.tokenized_text != span.text).then_some(span.tokenized_text);
                        (Some(span.text), tokenized, span.ents)
                    }
                    None => (None, None, Vec::new()),
                };
                SpanRecord {
                    label: map.labels.remove(&id),
                    before: map.before.remove(&id),
                    after: map.after.remove(&id),
                    id,
                    index,
                    text,
                    tokenized_text,
                    ents,
                }
            })
            .collect();
        records.sort_by_key(|r| r.index);
        records
    }
}

impl From<Vec<SpanRecord>> for SpanLabelMap {
    fn from(records: Vec<SpanRecord>) -> Self {
        let mut map = SpanLabelMap::default();
        for r in records {
            map.index.insert(r.id.clone(), r.index);
            if let Some(l) = r.label {
                map.labels.insert(r.id.clone(), l);
            }
            if let Some(l) = r.before {
                map.before.insert(r.id.clone(), l);
            }
            if let Some(l) = r.after {
                map.after.insert(r.id.clone(), l);
            }
            if let Some(text) = r.text {
                let span = Span {
                    tokenized_text: r.tokenized_text.unwrap_or_else(|| text.clone()),
                    text,
                    ents: r.ents,
                    id: r.id.clone(),
                };
                map.bodies.insert(r.id, span);
            }
        }
        map
    }
}

impl SpanLabelMap {
    /// Empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `id`, returning its store index and whether it is new.
    pub fn register(&mut self, id: &SpanId) -> (usize, bool) {
        if let Some(&idx) = self.index.get(id) {
            return (idx, false);
        }
        let idx = self.index.len();
        self.index.insert(id.clone(), idx);
        (idx, true)
    }

    /// Register `span` and keep its body for later relabeling.
    pub fn register_span(&mut self, span: &Span) -> (usize, bool) {
        let registered = self.register(&span.id);
        self.bodies.entry(span.id.clone()).or_insert_with(|| span.clone());
        registered
    }

    /// Body of a span registered with [`register_span`](Self::register_span).
    pub fn span(&self, id: &SpanId) -> Option<&Span> {
        self.bodies.get(id)
    }

    /// Store index of `id`.
    pub fn index_of(&self, id: &SpanId) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Number of registered spans.
    pub fn span_count(&self) -> usize {
        self.index.len()
    }

    /// Label of `id`.
    pub fn label(&self, id: &SpanId) -> Option<&str> {
        self.labels.get(id).map(String::as_str)
    }

    /// Number of labeled spans.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// True if no span is labeled.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Iterate `(span, label)` in span order.
    pub fn iter(&self) -> impl Iterator<Item = (&SpanId, &str)> {
        self.labels.iter().map(|(k, v)| (k, v.as_str()))
    }

    /// Spans carrying `label`, in span order.
    pub fn members(&self, label: &str) -> Vec<SpanId> {
        self.labels
            .iter()
            .filter(|(_, l)| l.as_str() == label)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Move every span labeled `old` to `new`. Returns how many moved.
    pub fn relabel(&mut self, old: &str, new: &str) -> usize {
        let mut moved = 0;
        for label in self.labels.values_mut() {
            if label == old {
                *label = new.to_string();
                moved += 1;
            }
        }
        moved
    }

    /// Label of the span preceding `id` in its batch.
    pub fn before(&self, id: &SpanId) -> Option<&str> {
        self.before.get(id).map(String::as_str)
    }

    /// Label of the span following `id` in its batch.
    pub fn after(&self, id: &SpanId) -> Option<&str> {
        self.after.get(id).map(String::as_str)
    }

    /// Record adjacency features for a run of spans in reading order.
    pub fn link_sequence(&mut self, ids: &[SpanId]) {
        for pair in ids.windows(2) {
            let (prev, cur) = (&pair[0], &pair[1]);
            match self.labels.get(prev).cloned() {
                Some(l) => self.before.insert(cur.clone(), l),
                None => self.before.remove(cur),
            };
            match self.labels.get(cur).cloned() {
                Some(l) => self.after.insert(prev.clone(), l),
                None => self.after.remove(prev),
            };
        }
    }
}

impl ClusterMap for SpanLabelMap {
    type Key = SpanId;
    type Value = String;

    fn label_of(&self, key: &SpanId) -> Option<&String> {
        self.labels.get(key)
    }

    fn set_label(&mut self, key: SpanId, label: String) -> bool {
        self.labels.insert(key, label);
        true
    }

    fn clear_label(&mut self, key: &SpanId) -> Option<String> {
        self.labels.remove(key)
    }

    fn clusters(&self) -> BTreeMap<String, Vec<SpanId>> {
        let mut out: BTreeMap<String, Vec<SpanId>> = BTreeMap::new();
        for (id, label) in &self.labels {
            out.entry(label.clone()).or_default().push(id.clone());
        }
        out
    }
}
