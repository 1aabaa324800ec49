//! Span clustering: text spans grouped per batch and given descriptive
//! labels.

mod pipeline;
mod tfidf;
mod types;

pub use pipeline::SpanPipeline;
pub use tfidf::{span_tokens, TfIdfLabeler, TfIdfState, ENTITY_PLACEHOLDERS, PREFIX_SEPARATOR};
pub use types::{Entity, Span, SpanId, SpanLabelMap, SpanRecord};
