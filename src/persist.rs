//! Persistence seam for the embedding index.
//!
//! The index stores two artifacts per data directory, always written and
//! read as a pair. [`FlatFileStore`] is the only implementation today: a
//! whole-artifact rewrite on every save, which is fine at this corpus
//! scale. The trait exists so an incremental or streaming writer can be
//! swapped in without touching index logic.

use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::index::Matrix;
use crate::models::Document;

const DOCUMENTS_FILE: &str = "documents.json";
const EMBEDDINGS_FILE: &str = "embeddings.bin";

/// Storage backend for the document list and embedding matrix.
pub trait Persistence: Send + Sync {
    /// Write both artifacts. The embeddings artifact is only written when
    /// the matrix is non-empty, so a document-only index round-trips as
    /// document-only.
    fn save(&self, dir: &Path, documents: &[Document], matrix: &Matrix) -> Result<()>;

    /// Read both artifacts back.
    ///
    /// A missing documents artifact is [`Error::NotFound`]. A missing
    /// embeddings artifact yields an empty matrix. When both exist, the
    /// row count must equal the document count.
    fn load(&self, dir: &Path) -> Result<(Vec<Document>, Matrix)>;
}

/// Flat-file persistence: `documents.json` plus `embeddings.bin`,
/// rewritten in full on every save.
#[derive(Debug, Default)]
pub struct FlatFileStore;

impl Persistence for FlatFileStore {
    fn save(&self, dir: &Path, documents: &[Document], matrix: &Matrix) -> Result<()> {
        fs::create_dir_all(dir)?;
        let json = serde_json::to_string(documents)?;
        fs::write(dir.join(DOCUMENTS_FILE), json)?;
        if matrix.rows() > 0 {
            fs::write(dir.join(EMBEDDINGS_FILE), matrix.to_bytes())?;
        }
        Ok(())
    }

    fn load(&self, dir: &Path) -> Result<(Vec<Document>, Matrix)> {
        let docs_path = dir.join(DOCUMENTS_FILE);
        if !docs_path.exists() {
            return Err(Error::NotFound(docs_path));
        }
        let documents: Vec<Document> = serde_json::from_str(&fs::read_to_string(&docs_path)?)?;

        let emb_path = dir.join(EMBEDDINGS_FILE);
        let matrix = if emb_path.exists() {
            let matrix = Matrix::from_bytes(&fs::read(&emb_path)?)?;
            if matrix.rows() != documents.len() {
                return Err(Error::DimensionMismatch {
                    expected: documents.len(),
                    actual: matrix.rows(),
                });
            }
            matrix
        } else {
            Matrix::new()
        };

        Ok((documents, matrix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_matrix_artifact_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let mut matrix = Matrix::new();
        matrix
            .append_rows(&[vec![1.0, -2.5, 3.125], vec![0.0, 0.5, -0.001]])
            .unwrap();
        let docs = vec![
            Document {
                url: "a".to_string(),
                content: "x".to_string(),
            },
            Document {
                url: "b".to_string(),
                content: "y".to_string(),
            },
        ];

        let store = FlatFileStore;
        store.save(tmp.path(), &docs, &matrix).unwrap();
        let (loaded_docs, loaded_matrix) = store.load(tmp.path()).unwrap();

        assert_eq!(loaded_docs, docs);
        assert_eq!(loaded_matrix.rows(), 2);
        assert_eq!(loaded_matrix.dims(), 3);
        assert_eq!(loaded_matrix.row(0), &[1.0, -2.5, 3.125]);
        assert_eq!(loaded_matrix.row(1), &[0.0, 0.5, -0.001]);
    }

    #[test]
    fn test_truncated_embeddings_artifact_rejected() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(DOCUMENTS_FILE), "[]").unwrap();
        fs::write(tmp.path().join(EMBEDDINGS_FILE), [1u8, 2, 3]).unwrap();

        let err = FlatFileStore.load(tmp.path()).unwrap_err();
        assert!(matches!(err, Error::InvalidArtifact(_)));
    }
}
