//! Batch-boundary checkpoints.
//!
//! Maps and frequency tables go to one JSON file; vectors live in the
//! [`VectorStore`](crate::store::VectorStore) files and are flushed
//! separately. Saving both after each batch is enough to resume without
//! reprocessing committed batches.

use crate::error::Result;
use crate::label::SynonymMap;
use crate::span::{SpanLabelMap, TfIdfState};
use crate::stopwords::Stopwords;
use crate::vocab::Vocabulary;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Everything needed to resume a run, apart from vectors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Checkpoint {
    /// Term → canonical label.
    pub synonyms: SynonymMap,
    /// Term registry; order matches the word vector store.
    pub vocabulary: Vocabulary,
    /// Learned stopword weights.
    pub stopwords: Stopwords,
    /// Span → cluster label, with adjacency labels.
    pub spans: SpanLabelMap,
    /// Descriptive-label frequency accounting.
    pub tfidf: TfIdfState,
    /// Span batches processed so far.
    pub batches: usize,
}

impl Checkpoint {
    /// `{dir}/{project}.checkpoint.json`
    pub fn path_for(dir: &Path, project: &str) -> PathBuf {
        dir.join(format!("{project}.checkpoint.json"))
    }

    /// Write the checkpoint, replacing any previous one atomically.
    pub fn save(&self, dir: &Path, project: &str) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = Self::path_for(dir, project);
        let tmp = path.with_extension("json.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer(&mut writer, self)?;
            writer.flush()?;
        }
        fs::rename(&tmp, &path)?;
        info!(
            path = %path.display(),
            terms = self.vocabulary.len(),
            synonyms = self.synonyms.len(),
            spans = self.spans.span_count(),
            "saved checkpoint"
        );
        Ok(path)
    }

    /// Load a checkpoint, or an empty one if none was saved yet.
    pub fn load(dir: &Path, project: &str) -> Result<Self> {
        let path = Self::path_for(dir, project);
        if !path.exists() {
            warn!(path = %path.display(), "no checkpoint; starting fresh");
            return Ok(Self::default());
        }
        let mut checkpoint: Self = serde_json::from_reader(BufReader::new(File::open(&path)?))?;
        checkpoint.vocabulary.reindex();
        info!(
            path = %path.display(),
            terms = checkpoint.vocabulary.len(),
            batches = checkpoint.batches,
            "loaded checkpoint"
        );
        Ok(checkpoint)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::label::{ClusterMap, Label};
    use crate::span::SpanId;

    #[test]
    fn missing_checkpoint_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cp = Checkpoint::load(dir.path(), "nothing").unwrap();
        assert_eq!(cp, Checkpoint::default());
    }

    #[test]
    fn round_trip_restores_lookups() {
        let dir = tempfile::tempdir().unwrap();
        let mut cp = Checkpoint::default();
        cp.vocabulary.observe(&Label::leaf("apple"), 2.0);
        cp.vocabulary.observe(&Label::leaf("Apple"), 1.0);
        cp.synonyms.assign(Label::leaf("Apple"), Label::new("apple", 1));
        let id = SpanId::new("notes.txt", 4, 0);
        cp.spans.register(&id);
        cp.spans.set_label(id.clone(), "fruit, apple".into());
        cp.stopwords.insert("fruit", 0.3);
        cp.batches = 3;

        let path = cp.save(dir.path(), "demo").unwrap();
        assert!(path.ends_with("demo.checkpoint.json"));
        let back = Checkpoint::load(dir.path(), "demo").unwrap();
        assert_eq!(back.batches, 3);
        assert_eq!(back.vocabulary.index_of(&Label::leaf("Apple")), Some(1));
        assert_eq!(back.synonyms.get(&Label::leaf("Apple")), Some(&Label::new("apple", 1)));
        assert_eq!(back.spans.label(&id), Some("fruit, apple"));
        assert_eq!(back.stopwords.weight("fruit"), Some(0.3));
    }
}
