//! The document embedding index: parallel storage plus similarity search.
//!
//! Documents and their embedding vectors live in two parallel structures,
//! positionally associated by row. The invariant
//! `documents.len() == matrix.rows()` holds after every completed
//! mutation; a failed [`EmbeddingIndex::add`] leaves both untouched.
//!
//! The index grows only by batch append. There is no in-place update or
//! individual delete; re-indexing replaces the artifacts wholesale.
//! Search is a pure function of current state. Mutation is expected to
//! happen out-of-band (offline indexing) under single-writer discipline;
//! add-during-search is not supported and must be serialized by the
//! caller.
//!
//! # Persistence
//!
//! Two artifacts per data directory, written and read as a pair:
//!
//! | Artifact | Format |
//! |----------|--------|
//! | `documents.json` | JSON array of `{url, content}`, array order = row order |
//! | `embeddings.bin` | `rows: u32 LE`, `dims: u32 LE`, then `rows * dims` `f32 LE` |
//!
//! A directory with only `documents.json` loads as a document-only index
//! (searches return empty until embeddings are added). A directory with
//! no `documents.json` fails with [`Error::NotFound`].

use std::path::Path;

use tracing::info;

use crate::backend::SearchBackend;
use crate::error::{Error, Result};
use crate::models::{Document, SearchHit};
use crate::persist::{FlatFileStore, Persistence};

/// Row-major 2D float matrix backing the embedding store.
#[derive(Debug, Clone, Default)]
pub struct Matrix {
    data: Vec<f32>,
    dims: usize,
}

impl Matrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> usize {
        if self.dims == 0 {
            0
        } else {
            self.data.len() / self.dims
        }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn row(&self, i: usize) -> &[f32] {
        let start = i * self.dims;
        &self.data[start..start + self.dims]
    }

    /// Append rows, preserving existing row order.
    ///
    /// The first batch fixes the matrix dimensionality; later batches must
    /// match it. All rows are validated before any is appended, so a
    /// failure leaves the matrix unchanged.
    pub fn append_rows(&mut self, rows: &[Vec<f32>]) -> Result<()> {
        let Some(first) = rows.first() else {
            return Ok(());
        };
        let dims = if self.dims == 0 { first.len() } else { self.dims };
        if dims == 0 {
            return Err(Error::DimensionMismatch {
                expected: 1,
                actual: 0,
            });
        }
        for row in rows {
            if row.len() != dims {
                return Err(Error::DimensionMismatch {
                    expected: dims,
                    actual: row.len(),
                });
            }
        }
        self.dims = dims;
        self.data.reserve(rows.len() * dims);
        for row in rows {
            self.data.extend_from_slice(row);
        }
        Ok(())
    }

    pub(crate) fn to_bytes(&self) -> Vec<u8> {
        let rows = self.rows() as u32;
        let dims = self.dims as u32;
        let mut bytes = Vec::with_capacity(8 + self.data.len() * 4);
        bytes.extend_from_slice(&rows.to_le_bytes());
        bytes.extend_from_slice(&dims.to_le_bytes());
        for v in &self.data {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes
    }

    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 8 {
            return Err(Error::InvalidArtifact(
                "embeddings file shorter than header".to_string(),
            ));
        }
        let rows = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        let dims = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
        let expected = 8 + rows * dims * 4;
        if bytes.len() != expected {
            return Err(Error::InvalidArtifact(format!(
                "embeddings file is {} bytes, header implies {}",
                bytes.len(),
                expected
            )));
        }
        let data = bytes[8..]
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Ok(Self { data, dims })
    }
}

/// Document store with vector similarity search.
///
/// The scoring strategy is pluggable via [`SearchBackend`]; see that
/// trait for the score semantics of each variant.
pub struct EmbeddingIndex {
    documents: Vec<Document>,
    matrix: Matrix,
    backend: Box<dyn SearchBackend>,
    persistence: Box<dyn Persistence>,
}

impl EmbeddingIndex {
    pub fn new(backend: Box<dyn SearchBackend>) -> Self {
        Self::with_persistence(backend, Box::new(FlatFileStore))
    }

    pub fn with_persistence(
        backend: Box<dyn SearchBackend>,
        persistence: Box<dyn Persistence>,
    ) -> Self {
        Self {
            documents: Vec::new(),
            matrix: Matrix::new(),
            backend,
            persistence,
        }
    }

    /// Number of indexed documents.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Embedding dimensionality, or `None` before the first add.
    pub fn dims(&self) -> Option<usize> {
        (self.matrix.dims() > 0).then(|| self.matrix.dims())
    }

    /// Number of stored embedding rows.
    pub fn embedded_rows(&self) -> usize {
        self.matrix.rows()
    }

    pub fn backend_kind(&self) -> &'static str {
        self.backend.kind()
    }

    /// All indexed documents in insertion order.
    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    /// Append a batch of documents with their embeddings.
    ///
    /// Fails with [`Error::DimensionMismatch`] when the counts disagree or
    /// when a vector's dimensionality differs from the index's. On error
    /// the prior state is fully preserved.
    pub fn add(&mut self, documents: Vec<Document>, embeddings: Vec<Vec<f32>>) -> Result<()> {
        if documents.len() != embeddings.len() {
            return Err(Error::DimensionMismatch {
                expected: documents.len(),
                actual: embeddings.len(),
            });
        }
        self.matrix.append_rows(&embeddings)?;
        self.documents.extend(documents);
        self.backend.rebuild(&self.matrix);
        Ok(())
    }

    /// Nearest-neighbor search over the stored embeddings.
    ///
    /// Filters candidates to `score >= threshold`, sorts descending by
    /// score (stable, so ties keep insertion order), and truncates to `k`.
    /// A high threshold can legitimately return fewer than `k` hits, or
    /// none. An empty or document-only index returns an empty vector.
    pub fn search(&self, query: &[f32], k: usize, threshold: f32) -> Vec<SearchHit> {
        if self.matrix.rows() == 0 || k == 0 {
            return Vec::new();
        }
        let mut scored: Vec<(usize, f32)> = self
            .backend
            .candidates(&self.matrix, query, k)
            .into_iter()
            .filter(|(_, score)| *score >= threshold)
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
            .into_iter()
            .map(|(row, score)| SearchHit {
                document: self.documents[row].clone(),
                score,
            })
            .collect()
    }

    /// Persist the document list and embedding matrix as a pair.
    ///
    /// The embeddings artifact is only written when embeddings exist, so a
    /// document-only index round-trips as document-only.
    pub fn save(&self, dir: &Path) -> Result<()> {
        self.persistence.save(dir, &self.documents, &self.matrix)?;
        info!(
            documents = self.documents.len(),
            rows = self.matrix.rows(),
            dir = %dir.display(),
            "index saved"
        );
        Ok(())
    }

    /// Restore a previously saved index from `dir`.
    ///
    /// A missing `documents.json` is fatal. A missing embeddings artifact
    /// is not: the result is a document-only index. When both exist, the
    /// row count must match the document count.
    pub fn load(&mut self, dir: &Path) -> Result<()> {
        let (documents, matrix) = self.persistence.load(dir)?;
        self.documents = documents;
        self.matrix = matrix;
        self.backend.rebuild(&self.matrix);
        info!(
            documents = self.documents.len(),
            rows = self.matrix.rows(),
            dir = %dir.display(),
            "index loaded"
        );
        Ok(())
    }
}
