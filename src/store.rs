//! Append-only, index-addressed vector store.
//!
//! Slots are reserved in term order and filled lazily; a slot is never
//! released or reassigned. The store is grown explicitly and refuses to grow
//! past its capacity instead of truncating, since a short store would shift
//! every later vector onto the wrong term.
//!
//! # File layout
//!
//! ```text
//! [header: 24 bytes] magic "CNVS" | version u32 | dim u64 | len u64  (little-endian)
//! [written: len bytes] 1 if the slot holds a vector, 0 if only reserved
//! [payload: len * dim f32, host byte order]
//! ```

use crate::error::{Error, Result};
use bytemuck::{Pod, Zeroable};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::debug;

const STORE_MAGIC: [u8; 4] = *b"CNVS";
const STORE_VERSION: u32 = 1;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct StoreHeader {
    magic: [u8; 4],
    version: u32,
    dim: u64,
    len: u64,
}

/// Which stream a store file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// Term and parent-label vectors.
    Words,
    /// Span vectors.
    Spans,
}

impl StoreKind {
    fn suffix(self) -> &'static str {
        match self {
            StoreKind::Words => "words",
            StoreKind::Spans => "spans",
        }
    }
}

/// Growable array of fixed-width `f32` vectors.
#[derive(Debug, Clone)]
pub struct VectorStore {
    dim: usize,
    data: Vec<f32>,
    written: Vec<bool>,
    capacity: Option<usize>,
    path: Option<PathBuf>,
}

impl VectorStore {
    /// In-memory store for `dim`-wide vectors.
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            data: Vec::new(),
            written: Vec::new(),
            capacity: None,
            path: None,
        }
    }

    /// Cap the number of slots.
    pub fn with_capacity_limit(mut self, capacity: Option<usize>) -> Self {
        self.capacity = capacity;
        self
    }

    /// Conventional file path: `{dir}/{project}.{embedder}_{words|spans}.vec`.
    pub fn path_for(dir: &Path, project: &str, embedder: &str, kind: StoreKind) -> PathBuf {
        dir.join(format!("{project}.{embedder}_{}.vec", kind.suffix()))
    }

    /// Open `path` if it exists, else start an empty store bound to it.
    pub fn open_or_create(path: &Path, dim: usize) -> Result<Self> {
        if path.exists() {
            let store = Self::open(path)?;
            if store.dim != dim {
                return Err(Error::DimensionMismatch {
                    expected: dim,
                    found: store.dim,
                });
            }
            Ok(store)
        } else {
            let mut store = Self::new(dim);
            store.path = Some(path.to_path_buf());
            Ok(store)
        }
    }

    /// Load a store written by [`save`](Self::save).
    ///
    /// The header's sizes are checked against the file length before
    /// anything is allocated.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        let mut header_bytes = [0u8; std::mem::size_of::<StoreHeader>()];
        reader.read_exact(&mut header_bytes)?;
        let header: StoreHeader = bytemuck::pod_read_unaligned(&header_bytes);
        if header.magic != STORE_MAGIC {
            return Err(Error::CorruptStore(format!(
                "bad magic in {}",
                path.display()
            )));
        }
        if u32::from_le(header.version) != STORE_VERSION {
            return Err(Error::CorruptStore(format!(
                "unsupported version {}",
                u32::from_le(header.version)
            )));
        }
        let dim = u64::from_le(header.dim);
        let len = u64::from_le(header.len);
        let expected = len
            .checked_mul(dim)
            .and_then(|n| n.checked_mul(std::mem::size_of::<f32>() as u64))
            .and_then(|n| n.checked_add(len))
            .and_then(|n| n.checked_add(header_bytes.len() as u64));
        if expected != Some(file_len) {
            return Err(Error::CorruptStore(format!(
                "header claims {len} x {dim} vectors but {} holds {file_len} bytes",
                path.display()
            )));
        }
        // Bounded by the file length checked above.
        let (dim, len) = (dim as usize, len as usize);

        let mut flags = vec![0u8; len];
        reader.read_exact(&mut flags)?;
        let mut data = vec![0.0f32; len * dim];
        reader.read_exact(bytemuck::cast_slice_mut(&mut data))?;

        debug!(path = %path.display(), dim, len, "opened vector store");
        Ok(Self {
            dim,
            data,
            written: flags.into_iter().map(|f| f != 0).collect(),
            capacity: None,
            path: Some(path.to_path_buf()),
        })
    }

    /// Write the store to `path` and bind it there.
    pub fn save(&mut self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = path.with_extension("vec.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            let header = StoreHeader {
                magic: STORE_MAGIC,
                version: STORE_VERSION.to_le(),
                dim: (self.dim as u64).to_le(),
                len: (self.len() as u64).to_le(),
            };
            writer.write_all(bytemuck::bytes_of(&header))?;
            let flags: Vec<u8> = self.written.iter().map(|&w| u8::from(w)).collect();
            writer.write_all(&flags)?;
            writer.write_all(bytemuck::cast_slice(&self.data))?;
            writer.flush()?;
        }
        fs::rename(&tmp, path)?;
        self.path = Some(path.to_path_buf());
        Ok(())
    }

    /// Save to the bound path, if any.
    pub fn flush(&mut self) -> Result<()> {
        match self.path.clone() {
            Some(path) => self.save(&path),
            None => Ok(()),
        }
    }

    /// Vector width.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of reserved slots.
    pub fn len(&self) -> usize {
        self.written.len()
    }

    /// True when no slot is reserved.
    pub fn is_empty(&self) -> bool {
        self.written.is_empty()
    }

    /// Reserve `n` more slots and return their index range.
    pub fn reserve(&mut self, n: usize) -> Result<Range<usize>> {
        let start = self.len();
        self.grow_to(start + n)?;
        Ok(start..start + n)
    }

    /// Grow to `len` slots; shrinking is a no-op.
    pub fn grow_to(&mut self, len: usize) -> Result<()> {
        if let Some(capacity) = self.capacity {
            if len > capacity {
                return Err(Error::CapacityExceeded {
                    requested: len,
                    capacity,
                });
            }
        }
        if len > self.len() {
            self.data.resize(len * self.dim, 0.0);
            self.written.resize(len, false);
        }
        Ok(())
    }

    /// Append a vector and return its index.
    pub fn push(&mut self, vector: &[f32]) -> Result<usize> {
        let idx = self.reserve(1)?.start;
        self.write(idx, vector)?;
        Ok(idx)
    }

    /// Fill a reserved slot.
    pub fn write(&mut self, idx: usize, vector: &[f32]) -> Result<()> {
        if idx >= self.len() {
            return Err(Error::UnreservedIndex {
                index: idx,
                len: self.len(),
            });
        }
        if vector.len() != self.dim {
            return Err(Error::DimensionMismatch {
                expected: self.dim,
                found: vector.len(),
            });
        }
        self.data[idx * self.dim..(idx + 1) * self.dim].copy_from_slice(vector);
        self.written[idx] = true;
        Ok(())
    }

    /// Fill several reserved slots.
    pub fn write_many(&mut self, idxs: &[usize], vectors: &[Vec<f32>]) -> Result<()> {
        if idxs.len() != vectors.len() {
            return Err(Error::DimensionMismatch {
                expected: idxs.len(),
                found: vectors.len(),
            });
        }
        for (&idx, v) in idxs.iter().zip(vectors) {
            self.write(idx, v)?;
        }
        Ok(())
    }

    /// Whether slot `idx` holds a vector.
    pub fn is_written(&self, idx: usize) -> bool {
        self.written.get(idx).copied().unwrap_or(false)
    }

    /// Vector at `idx`, if written.
    pub fn get(&self, idx: usize) -> Option<&[f32]> {
        if self.is_written(idx) {
            Some(&self.data[idx * self.dim..(idx + 1) * self.dim])
        } else {
            None
        }
    }

    /// Copy out the vectors at `idxs`; unwritten slots come back as zeros.
    pub fn gather(&self, idxs: &[usize]) -> Vec<Vec<f32>> {
        idxs.iter()
            .map(|&i| {
                self.get(i)
                    .map(<[f32]>::to_vec)
                    .unwrap_or_else(|| vec![0.0; self.dim])
            })
            .collect()
    }

    /// Element-wise mean of the written vectors among `idxs`.
    pub fn mean_of(&self, idxs: &[usize]) -> Option<Vec<f32>> {
        let mut sum = vec![0.0f32; self.dim];
        let mut n = 0usize;
        for v in idxs.iter().filter_map(|&i| self.get(i)) {
            for (s, x) in sum.iter_mut().zip(v) {
                *s += x;
            }
            n += 1;
        }
        if n == 0 {
            return None;
        }
        for s in &mut sum {
            *s /= n as f32;
        }
        Some(sum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_then_fill_lazily() {
        let mut store = VectorStore::new(2);
        let range = store.reserve(3).unwrap();
        assert_eq!(range, 0..3);
        assert!(store.get(1).is_none());
        store.write(1, &[1.0, 2.0]).unwrap();
        assert_eq!(store.get(1), Some(&[1.0, 2.0][..]));
        assert_eq!(store.gather(&[0, 1]), vec![vec![0.0, 0.0], vec![1.0, 2.0]]);
    }

    #[test]
    fn capacity_is_fatal() {
        let mut store = VectorStore::new(2).with_capacity_limit(Some(2));
        store.push(&[0.0, 1.0]).unwrap();
        store.push(&[1.0, 0.0]).unwrap();
        assert!(matches!(
            store.push(&[1.0, 1.0]),
            Err(Error::CapacityExceeded {
                requested: 3,
                capacity: 2
            })
        ));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn unreserved_write_rejected() {
        let mut store = VectorStore::new(1);
        assert!(matches!(
            store.write(0, &[1.0]),
            Err(Error::UnreservedIndex { index: 0, len: 0 })
        ));
    }

    #[test]
    fn mean_skips_unwritten() {
        let mut store = VectorStore::new(2);
        store.reserve(3).unwrap();
        store.write(0, &[1.0, 0.0]).unwrap();
        store.write(2, &[3.0, 2.0]).unwrap();
        assert_eq!(store.mean_of(&[0, 1, 2]), Some(vec![2.0, 1.0]));
        assert_eq!(store.mean_of(&[1]), None);
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = VectorStore::path_for(dir.path(), "proj", "minilm", StoreKind::Words);
        assert!(path.ends_with("proj.minilm_words.vec"));

        let mut store = VectorStore::new(3);
        store.push(&[1.0, 2.0, 3.0]).unwrap();
        store.reserve(1).unwrap();
        store.save(&path).unwrap();

        let reopened = VectorStore::open_or_create(&path, 3).unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.get(0), Some(&[1.0, 2.0, 3.0][..]));
        assert!(!reopened.is_written(1));
    }

    #[test]
    fn dimension_change_on_reopen_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.vec");
        let mut store = VectorStore::new(2);
        store.push(&[0.5, 0.5]).unwrap();
        store.save(&path).unwrap();
        assert!(VectorStore::open_or_create(&path, 4).is_err());
    }

    #[test]
    fn oversized_header_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.vec");
        for (dim, len) in [(u64::MAX, 2u64), (1 << 40, 1 << 40), (2, 3)] {
            let header = StoreHeader {
                magic: STORE_MAGIC,
                version: STORE_VERSION.to_le(),
                dim: dim.to_le(),
                len: len.to_le(),
            };
            let mut bytes = bytemuck::bytes_of(&header).to_vec();
            bytes.extend_from_slice(&[1, 0, 1]);
            fs::write(&path, &bytes).unwrap();
            assert!(
                matches!(VectorStore::open(&path), Err(Error::CorruptStore(_))),
                "dim {dim} len {len}"
            );
        }
    }
}
