//! Lexical scan for informal regional vocabulary in the question.
//!
//! Used only to append a tone-adaptation hint to the generation prompt;
//! never affects retrieval or ranking. The scan is first-match-wins in
//! table order, by substring containment over the lowercased question.
//! Short entries can match inside unrelated words; that behavior is
//! preserved as observed.

/// A matched regional expression and the region it is associated with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Regionalism {
    pub expression: &'static str,
    pub region: &'static str,
}

/// Regional expression table. Order matters: the first entry whose
/// expression appears in the question wins.
const REGIONALISMS: &[(&str, &str)] = &[
    ("oxente", "Nordeste"),
    ("arretado", "Nordeste"),
    ("visse", "Pernambuco"),
    ("mainha", "Nordeste"),
    ("painho", "Nordeste"),
    ("massa", "Nordeste"),
    ("uai", "Minas Gerais"),
    ("trem bom", "Minas Gerais"),
    ("bah", "Rio Grande do Sul"),
    ("tchê", "Rio Grande do Sul"),
    ("tri legal", "Rio Grande do Sul"),
    ("égua", "Pará"),
];

/// Scan `question` for a regional expression.
pub fn detect(question: &str) -> Option<Regionalism> {
    let lowered = question.to_lowercase();
    REGIONALISMS
        .iter()
        .find(|(expression, _)| lowered.contains(expression))
        .map(|(expression, region)| Regionalism { expression, region })
}
