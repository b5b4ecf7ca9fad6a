//! Decides which retrieval path answers an incoming question.
//!
//! Meta-questions about the corpus itself (counts, listings) are detected
//! with a single ordered rule table of substring patterns, evaluated once
//! per request. Earlier revisions scattered overlapping keyword checks
//! across entry points; the table is the one source of truth now.
//!
//! Everything else is labeled by an external intent oracle. The oracle is
//! fail-open: an unrecognized label degrades to [`Route::Chat`] so the
//! user always gets an answer. Only a transport failure of the oracle
//! itself propagates as a request-level error.

use async_trait::async_trait;
use tracing::debug;

use crate::assembler::normalize;
use crate::error::Result;

/// The retrieval path chosen for a question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// How many documents are indexed, optionally scoped to a file type.
    MetaCount { scope: Option<String> },
    /// Which documents are indexed, optionally scoped to a file type.
    MetaList { scope: Option<String> },
    /// Conversational, identity, or small-talk; no document context.
    Chat,
    /// Semantic search over the corpus.
    Search,
    /// Reinterpret via the chat path first, then search with the result.
    Refine,
}

/// Label source for non-meta questions.
///
/// An opaque oracle returning one of the closed labels `CHAT`, `SEARCH`,
/// `REFINE`. Implemented in production over the generation service.
#[async_trait]
pub trait IntentOracle: Send + Sync {
    async fn label(&self, question: &str) -> Result<String>;
}

enum MetaKind {
    Count,
    List,
}

/// Ordered meta-question rules, matched against the normalized question.
const META_RULES: &[(MetaKind, &[&str])] = &[
    (
        MetaKind::Count,
        &[
            "quantos documentos",
            "quantos arquivos",
            "quantos pdfs",
            "quantos pdf",
            "numero de documentos",
            "quantidade de documentos",
        ],
    ),
    (
        MetaKind::List,
        &[
            "quais documentos",
            "quais arquivos",
            "quais pdfs",
            "quais pdf",
            "que documentos",
            "liste os documentos",
            "lista de documentos",
            "o que esta indexado",
            "estao indexados",
        ],
    ),
];

/// Deterministic classification of corpus meta-questions.
///
/// Returns `None` when the question is not about the index itself.
pub fn classify_meta(question: &str) -> Option<Route> {
    let normalized = normalize(question);
    for (kind, patterns) in META_RULES {
        if patterns.iter().any(|p| normalized.contains(p)) {
            let scope = normalized.contains("pdf").then(|| "pdf".to_string());
            return Some(match kind {
                MetaKind::Count => Route::MetaCount { scope },
                MetaKind::List => Route::MetaList { scope },
            });
        }
    }
    None
}

/// Classify a question, consulting the oracle for non-meta questions.
pub async fn classify(question: &str, oracle: &dyn IntentOracle) -> Result<Route> {
    if let Some(route) = classify_meta(question) {
        debug!(?route, "meta-question matched");
        return Ok(route);
    }

    let label = oracle.label(question).await?;
    let route = match label.trim().to_uppercase().as_str() {
        "SEARCH" => Route::Search,
        "REFINE" => Route::Refine,
        "CHAT" => Route::Chat,
        other => {
            debug!(label = other, "unrecognized intent label, using chat");
            Route::Chat
        }
    };
    Ok(route)
}
