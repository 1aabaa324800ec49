//! Embedding seam.
//!
//! Model inference lives outside this crate. Callers plug in an encoder via
//! the [`Embedder`] trait or wrap a closure with [`FnEmbedder`].

use crate::error::{Error, Result};

/// Turns strings into fixed-width vectors.
///
/// Implementations must be deterministic for identical input and always
/// return `dim()`-wide vectors, one per input.
pub trait Embedder {
    /// Name used in vector store file names.
    fn name(&self) -> &str;

    /// Output width.
    fn dim(&self) -> usize;

    /// Embed a batch of texts.
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;
}

impl<E: Embedder + ?Sized> Embedder for Box<E> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn dim(&self) -> usize {
        (**self).dim()
    }

    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        (**self).embed(texts)
    }
}

/// A closure-backed embedder.
#[derive(Clone)]
pub struct FnEmbedder<F> {
    name: String,
    dim: usize,
    f: F,
}

impl<F> FnEmbedder<F>
where
    F: Fn(&str) -> Vec<f32>,
{
    /// Create an embedder from a per-text function.
    pub fn new(name: impl Into<String>, dim: usize, f: F) -> Self {
        Self {
            name: name.into(),
            dim,
            f,
        }
    }
}

impl<F> Embedder for FnEmbedder<F>
where
    F: Fn(&str) -> Vec<f32>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts
            .iter()
            .map(|t| {
                let v = (self.f)(t);
                if v.len() != self.dim {
                    return Err(Error::DimensionMismatch {
                        expected: self.dim,
                        found: v.len(),
                    });
                }
                Ok(v)
            })
            .collect()
    }
}

/// Embed `texts` in chunks of `chunk` and concatenate the results.
pub fn embed_chunked<E: Embedder + ?Sized>(
    embedder: &E,
    texts: &[String],
    chunk: usize,
) -> Result<Vec<Vec<f32>>> {
    let mut out = Vec::with_capacity(texts.len());
    for batch in texts.chunks(chunk.max(1)) {
        let refs: Vec<&str> = batch.iter().map(String::as_str).collect();
        let vectors = embedder.embed(&refs)?;
        if vectors.len() != refs.len() {
            return Err(Error::DimensionMismatch {
                expected: refs.len(),
                found: vectors.len(),
            });
        }
        out.extend(vectors);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fn_embedder_checks_width() {
        let e = FnEmbedder::new("len", 2, |t: &str| vec![t.len() as f32, 1.0]);
        assert_eq!(e.embed(&["ab"]).unwrap(), vec![vec![2.0, 1.0]]);

        let bad = FnEmbedder::new("bad", 3, |_: &str| vec![0.0]);
        assert!(bad.embed(&["x"]).is_err());
    }

    #[test]
    fn chunked_embedding_preserves_order() {
        let e = FnEmbedder::new("len", 1, |t: &str| vec![t.len() as f32]);
        let texts: Vec<String> = ["a", "bb", "ccc", "dddd", "eeeee"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let out = embed_chunked(&e, &texts, 2).unwrap();
        assert_eq!(out, vec![vec![1.0], vec![2.0], vec![3.0], vec![4.0], vec![5.0]]);
    }
}
