//! Turns raw search hits into a bounded, prioritized context for generation.
//!
//! The pipeline is: soft keyword filter, priority re-rank, context
//! concatenation, token-budget chunking, chunk-budget cap. The cap bounds
//! how many generation calls a single question can trigger, regardless of
//! corpus size.
//!
//! Ranking encodes a product decision: official documents (PDFs, editais,
//! resultados) outrank arbitrary HTML pages even when their raw
//! similarity is lower.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::SearchHit;

/// Rough characters-per-token ratio used for the chunk budget.
pub const CHARS_PER_TOKEN: usize = 4;

/// Fixed sentence returned when the corpus has nothing to say.
///
/// Doubles as the no-answer marker: the grounded prompt instructs the
/// model to reply with exactly this sentence when the context is
/// insufficient, and [`combine_answers`] filters such replies out.
pub const FALLBACK_ANSWER: &str = "Não encontrei essa informação nos documentos indexados.";

/// Keywords that mark a document as an official, high-value source.
pub const PRIORITY_KEYWORDS: &[&str] = &["edital", "relatorio", "calendario", "resultado", "pdf"];

/// Document-code pattern: a document-type word followed by a number,
/// e.g. "convocação 03/2024" or "edital nº 12". Matched against the
/// normalized question.
static DOC_CODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(edital|convocacao|resultado|relatorio|calendario|portaria|resolucao|processo)\s*(?:n[o°º]?\.?\s*)?[-/ ]*(\d{1,4}(?:[-/.]\d{1,4})*)",
    )
    .expect("document-code regex")
});

/// A context slice ready for one generation call.
#[derive(Debug, Clone)]
pub struct ContextChunk {
    pub text: String,
    /// Similarity score of the hit this chunk was cut from.
    pub score: f32,
}

/// Lowercase and strip Portuguese diacritics.
///
/// Pattern matching and URL containment both run over this form, so
/// "convocação" and "convocacao" behave identically.
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'ç' => 'c',
            'ñ' => 'n',
            other => other,
        })
        .collect()
}

/// Extract a filter keyword from the question.
///
/// Prefers a compound document code ("convocacao-03-2024" style slug);
/// falls back to the first token longer than 4 characters.
pub fn extract_keyword(question: &str) -> Option<String> {
    let normalized = normalize(question);

    if let Some(caps) = DOC_CODE.captures(&normalized) {
        let kind = &caps[1];
        let number = caps[2].replace(['/', '.'], "-");
        return Some(format!("{kind}-{number}"));
    }

    normalized
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()))
        .find(|t| t.chars().count() > 4)
        .map(|t| t.to_string())
}

/// Apply the soft keyword filter and the priority re-rank.
///
/// The keyword filter only restricts the set when at least one URL
/// contains the keyword; it never empties it. The re-rank is a stable
/// sort by: PDF before non-PDF, then count of [`PRIORITY_KEYWORDS`]
/// present in URL or content, then raw similarity score.
pub fn rank_hits(hits: &[SearchHit], keyword: Option<&str>) -> Vec<SearchHit> {
    let mut working: Vec<SearchHit> = match keyword {
        Some(kw) => {
            let matching: Vec<SearchHit> = hits
                .iter()
                .filter(|h| normalize(&h.document.url).contains(kw))
                .cloned()
                .collect();
            if matching.is_empty() {
                hits.to_vec()
            } else {
                matching
            }
        }
        None => hits.to_vec(),
    };

    let mut keyed: Vec<(bool, usize, SearchHit)> = working
        .drain(..)
        .map(|h| (h.document.is_pdf(), priority_count(&h), h))
        .collect();
    keyed.sort_by(|a, b| {
        b.0.cmp(&a.0)
            .then_with(|| b.1.cmp(&a.1))
            .then_with(|| {
                b.2.score
                    .partial_cmp(&a.2.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    });
    keyed.into_iter().map(|(_, _, h)| h).collect()
}

fn priority_count(hit: &SearchHit) -> usize {
    let url = normalize(&hit.document.url);
    let content = normalize(&hit.document.content);
    PRIORITY_KEYWORDS
        .iter()
        .filter(|kw| url.contains(*kw) || content.contains(*kw))
        .count()
}

/// Build the bounded context chunks for a set of hits.
///
/// Concatenates `"Fonte: {url}\n{content}"` sections in ranked order,
/// splits the result under the token budget, and keeps at most
/// `max_chunks` chunks, preferring those cut from the highest-scoring
/// hits while preserving chunk order.
pub fn assemble(
    hits: &[SearchHit],
    keyword: Option<&str>,
    max_tokens: usize,
    max_chunks: usize,
) -> Vec<ContextChunk> {
    let ranked = rank_hits(hits, keyword);
    if ranked.is_empty() {
        return Vec::new();
    }

    // Section start offsets drive chunk-to-hit score attribution.
    let mut context = String::new();
    let mut sections: Vec<(usize, f32)> = Vec::with_capacity(ranked.len());
    for hit in &ranked {
        if !context.is_empty() {
            context.push_str("\n\n");
        }
        sections.push((context.len(), hit.score));
        context.push_str(&format!("Fonte: {}\n{}", hit.document.url, hit.document.content));
    }

    let max_chars = max_tokens.max(1) * CHARS_PER_TOKEN;
    let mut chunks: Vec<ContextChunk> = split_bounded(&context, max_chars)
        .into_iter()
        .map(|(start, text)| ContextChunk {
            text,
            score: score_at(&sections, start),
        })
        .collect();

    if chunks.len() > max_chunks {
        let mut order: Vec<usize> = (0..chunks.len()).collect();
        order.sort_by(|&a, &b| {
            chunks[b]
                .score
                .partial_cmp(&chunks[a].score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let mut keep: Vec<usize> = order.into_iter().take(max_chunks).collect();
        keep.sort_unstable();
        chunks = keep.into_iter().map(|i| chunks[i].clone()).collect();
    }

    chunks
}

/// Split `text` into `(start_offset, trimmed_piece)` slices of at most
/// `max_chars` bytes, breaking at the nearest preceding newline, else
/// space, else a hard cut at a char boundary. Empty pieces are dropped.
fn split_bounded(text: &str, max_chars: usize) -> Vec<(usize, String)> {
    let mut out = Vec::new();
    let mut pos = 0;

    while pos < text.len() {
        let remaining = &text[pos..];
        if remaining.len() <= max_chars {
            push_piece(&mut out, pos, remaining);
            break;
        }

        let mut cut = snap_to_char_boundary(remaining, max_chars);
        if cut == 0 {
            cut = remaining
                .char_indices()
                .nth(1)
                .map(|(i, _)| i)
                .unwrap_or(remaining.len());
        }
        let window = &remaining[..cut];
        let split = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .map(|i| i + 1)
            .unwrap_or(cut);

        push_piece(&mut out, pos, &remaining[..split]);
        pos += split;
    }

    out
}

fn push_piece(out: &mut Vec<(usize, String)>, pos: usize, piece: &str) {
    let trimmed = piece.trim();
    if trimmed.is_empty() {
        return;
    }
    // Attribute by the first non-whitespace byte so a chunk starting on a
    // section separator belongs to the section that follows it.
    let lead = piece.len() - piece.trim_start().len();
    out.push((pos + lead, trimmed.to_string()));
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn score_at(sections: &[(usize, f32)], offset: usize) -> f32 {
    sections
        .iter()
        .rev()
        .find(|(start, _)| *start <= offset)
        .map(|(_, score)| *score)
        .unwrap_or(0.0)
}

/// Join per-chunk answers into the final answer.
///
/// Answers equal to [`FALLBACK_ANSWER`] (case-insensitive) are dropped;
/// if every chunk came back empty-handed, the fallback itself is the
/// answer. Never returns an empty string.
pub fn combine_answers(answers: &[String]) -> String {
    let fallback = FALLBACK_ANSWER.to_lowercase();
    let useful: Vec<&str> = answers
        .iter()
        .map(|a| a.trim())
        .filter(|a| !a.is_empty() && a.to_lowercase() != fallback)
        .collect();
    if useful.is_empty() {
        FALLBACK_ANSWER.to_string()
    } else {
        useful.join("\n\n")
    }
}
