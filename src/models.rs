//! Core data types that flow through the retrieval pipeline.

use serde::{Deserialize, Serialize};

/// An indexed document: a source URL plus its extracted text content.
///
/// The URL is the logical key, but uniqueness is not enforced; the corpus
/// crawler may legitimately produce the same page twice. Documents are
/// immutable once indexed. Updating one means re-indexing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub url: String,
    pub content: String,
}

impl Document {
    /// Whether this document is a PDF, judged by its URL.
    ///
    /// Official documents in the corpus (editais, resultados, calendários)
    /// are published as PDFs, which is why PDF status drives re-ranking.
    pub fn is_pdf(&self) -> bool {
        self.url.to_lowercase().contains(".pdf")
    }
}

/// A scored search result: an independent copy of the matched document.
///
/// Produced fresh per query and never persisted. Mutating a hit has no
/// effect on stored index state.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub document: Document,
    /// Cosine similarity for the linear backend, negated L2 distance for
    /// the approximate backend. Callers must not mix the two scales.
    pub score: f32,
}

/// The answer returned for a question, with its supporting sources.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub answer: String,
    /// Deduplicated source URLs (fragment stripped), first-seen order.
    pub sources: Vec<String>,
    /// Similarity scores of the hits that backed the answer.
    pub scores: Vec<f32>,
}

impl Answer {
    /// An answer with no document support.
    pub fn plain(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            sources: Vec::new(),
            scores: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_pdf_by_extension() {
        let doc = Document {
            url: "https://www.ufpb.br/docs/edital-01.PDF".to_string(),
            content: String::new(),
        };
        assert!(doc.is_pdf());
    }

    #[test]
    fn test_is_pdf_negative() {
        let doc = Document {
            url: "https://www.ufpb.br/noticias/resultado".to_string(),
            content: String::new(),
        };
        assert!(!doc.is_pdf());
    }
}
