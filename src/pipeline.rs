//! Question-answering pipeline: classify, retrieve, assemble, generate.
//!
//! A question flows through exactly one route per request:
//! meta-questions are answered from index metadata with no generation
//! call; chat questions go straight to the generator with the identity
//! prompt; retrieval questions are embedded, searched, assembled into
//! bounded context chunks, and answered with one generation call per
//! chunk; refine questions get a reformulation pass first and then take
//! the retrieval route with the reformulated query.
//!
//! Each question is processed to completion independently. The index is
//! only read here; mutation happens out-of-band in the indexing command.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::assembler::{self, FALLBACK_ANSWER};
use crate::classifier::{self, IntentOracle, Route};
use crate::config::RetrievalConfig;
use crate::error::{Error, Result};
use crate::generation::{grounded_prompt, identity_prompt, refine_prompt, Generator};
use crate::models::{Answer, SearchHit};
use crate::regional;
use crate::registry::{Agent, AgentRegistry};

pub struct Pipeline {
    generator: Arc<dyn Generator>,
    oracle: Arc<dyn IntentOracle>,
    retrieval: RetrievalConfig,
}

impl Pipeline {
    pub fn new(
        generator: Arc<dyn Generator>,
        oracle: Arc<dyn IntentOracle>,
        retrieval: RetrievalConfig,
    ) -> Self {
        Self {
            generator,
            oracle,
            retrieval,
        }
    }

    /// Answer a question against the named agent (or the default).
    ///
    /// `threshold` overrides both the agent's and the global threshold
    /// for this request only.
    pub async fn ask(
        &self,
        registry: &AgentRegistry,
        question: &str,
        agent_name: Option<&str>,
        threshold: Option<f32>,
    ) -> Result<Answer> {
        let agent = registry.resolve(agent_name)?;
        let route = classifier::classify(question, self.oracle.as_ref()).await?;
        debug!(agent = %agent.name, ?route, "question classified");

        match route {
            Route::MetaCount { scope } => Ok(self.meta_count(agent, scope.as_deref())),
            Route::MetaList { scope } => Ok(self.meta_list(agent, scope.as_deref())),
            Route::Chat => {
                let answer = self.generator.complete(&identity_prompt(question)).await?;
                Ok(Answer::plain(answer))
            }
            Route::Search => self.answer_from_corpus(agent, question, threshold).await,
            Route::Refine => {
                let refined = self.generator.complete(&refine_prompt(question)).await?;
                info!(refined = %refined, "question reformulated for retrieval");
                self.answer_from_corpus(agent, &refined, threshold).await
            }
        }
    }

    fn meta_count(&self, agent: &Agent, scope: Option<&str>) -> Answer {
        let docs = agent.index.documents();
        match scope {
            Some("pdf") => {
                let n = docs.iter().filter(|d| d.is_pdf()).count();
                Answer::plain(format!("O índice contém {n} PDFs."))
            }
            _ => Answer::plain(format!("O índice contém {} documentos.", docs.len())),
        }
    }

    fn meta_list(&self, agent: &Agent, scope: Option<&str>) -> Answer {
        let docs: Vec<_> = agent
            .index
            .documents()
            .iter()
            .filter(|d| scope != Some("pdf") || d.is_pdf())
            .collect();
        if docs.is_empty() {
            return Answer::plain("Nenhum documento indexado até o momento.");
        }
        let lines: Vec<String> = docs
            .iter()
            .map(|d| {
                let preview: String = d.content.chars().take(200).collect();
                format!("- {}: {}", d.url, preview)
            })
            .collect();
        Answer {
            answer: format!("Documentos indexados:\n{}", lines.join("\n")),
            sources: docs.iter().map(|d| d.url.clone()).collect(),
            scores: Vec::new(),
        }
    }

    /// The retrieval route: embed, search, assemble, generate per chunk.
    async fn answer_from_corpus(
        &self,
        agent: &Agent,
        question: &str,
        threshold: Option<f32>,
    ) -> Result<Answer> {
        let threshold = threshold
            .or(agent.threshold)
            .unwrap_or(self.retrieval.threshold);

        let query_vec = crate::embedding::embed_query(agent.embedder.as_ref(), question).await?;
        let hits = agent.index.search(&query_vec, self.retrieval.k, threshold);
        debug!(hits = hits.len(), threshold, "search complete");

        if hits.is_empty() {
            return Ok(Answer::plain(FALLBACK_ANSWER));
        }

        let keyword = assembler::extract_keyword(question);
        let chunks = assembler::assemble(
            &hits,
            keyword.as_deref(),
            self.retrieval.max_tokens,
            self.retrieval.max_chunks,
        );
        let tone = regional::detect(question);

        let mut answers = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            let prompt = grounded_prompt(&chunk.text, question, tone);
            match self.generator.complete(&prompt).await {
                Ok(answer) => answers.push(answer),
                Err(e) => warn!(error = %e, "context chunk generation failed, skipping"),
            }
        }
        if answers.is_empty() {
            return Err(Error::Generation(
                "generation failed for every context chunk".to_string(),
            ));
        }

        Ok(Answer {
            answer: assembler::combine_answers(&answers),
            sources: collect_sources(&hits),
            scores: hits.iter().map(|h| h.score).collect(),
        })
    }
}

/// Deduplicated hit URLs with any `#fragment` stripped, first-seen order.
fn collect_sources(hits: &[SearchHit]) -> Vec<String> {
    let mut sources = Vec::new();
    for hit in hits {
        let url = hit
            .document
            .url
            .split('#')
            .next()
            .unwrap_or(&hit.document.url)
            .to_string();
        if !sources.contains(&url) {
            sources.push(url);
        }
    }
    sources
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LinearCosine;
    use crate::embedding::Embedder;
    use crate::index::EmbeddingIndex;
    use crate::models::Document;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct UnitEmbedder;

    #[async_trait]
    impl Embedder for UnitEmbedder {
        fn model_name(&self) -> &str {
            "unit"
        }
        fn dims(&self) -> usize {
            3
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0, 0.0]).collect())
        }
    }

    struct EchoGenerator;

    #[async_trait]
    impl Generator for EchoGenerator {
        async fn complete(&self, prompt: &str) -> Result<String> {
            Ok(prompt.to_string())
        }
    }

    struct FailingGenerator(AtomicUsize);

    #[async_trait]
    impl Generator for FailingGenerator {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(Error::Generation("boom".to_string()))
        }
    }

    struct FixedOracle(&'static str);

    #[async_trait]
    impl IntentOracle for FixedOracle {
        async fn label(&self, _question: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    fn registry_with_docs(docs: Vec<(Document, Vec<f32>)>) -> AgentRegistry {
        let mut index = EmbeddingIndex::new(Box::new(LinearCosine));
        if !docs.is_empty() {
            let (documents, embeddings): (Vec<_>, Vec<_>) = docs.into_iter().unzip();
            index.add(documents, embeddings).unwrap();
        }
        let mut registry = AgentRegistry::new();
        registry.register(
            Agent {
                name: "qb".to_string(),
                data_dir: PathBuf::from("unused"),
                threshold: None,
                index,
                embedder: Arc::new(UnitEmbedder),
            },
            true,
        );
        registry
    }

    fn pipeline(generator: Arc<dyn Generator>, oracle: &'static str) -> Pipeline {
        Pipeline::new(generator, Arc::new(FixedOracle(oracle)), RetrievalConfig::default())
    }

    #[tokio::test]
    async fn test_search_route_answers_from_corpus() {
        let registry = registry_with_docs(vec![(
            Document {
                url: "https://x/e.pdf".to_string(),
                content: "Edital 2024 prazo até 10/10.".to_string(),
            },
            vec![1.0, 0.0, 0.0],
        )]);
        let p = pipeline(Arc::new(EchoGenerator), "SEARCH");
        let answer = p
            .ask(&registry, "qual o prazo do edital?", None, Some(0.0))
            .await
            .unwrap();
        assert!(answer.answer.contains("prazo até 10/10"));
        assert_eq!(answer.sources, vec!["https://x/e.pdf"]);
        assert_eq!(answer.scores.len(), 1);
        assert!((answer.scores[0] - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_empty_search_yields_fallback() {
        let registry = registry_with_docs(vec![]);
        let p = pipeline(Arc::new(EchoGenerator), "SEARCH");
        let answer = p
            .ask(&registry, "qual o prazo do edital?", None, None)
            .await
            .unwrap();
        assert_eq!(answer.answer, FALLBACK_ANSWER);
        assert!(answer.sources.is_empty());
    }

    #[tokio::test]
    async fn test_meta_count_needs_no_generation() {
        let registry = registry_with_docs(vec![
            (
                Document {
                    url: "https://x/a.pdf".to_string(),
                    content: "a".to_string(),
                },
                vec![1.0, 0.0, 0.0],
            ),
            (
                Document {
                    url: "https://x/b.html".to_string(),
                    content: "b".to_string(),
                },
                vec![0.0, 1.0, 0.0],
            ),
        ]);
        let failing = Arc::new(FailingGenerator(AtomicUsize::new(0)));
        let p = Pipeline::new(
            failing.clone(),
            Arc::new(FixedOracle("SEARCH")),
            RetrievalConfig::default(),
        );
        let answer = p
            .ask(&registry, "quantos documentos vocês têm?", None, None)
            .await
            .unwrap();
        assert!(answer.answer.contains('2'));
        assert_eq!(failing.0.load(Ordering::SeqCst), 0);

        let answer = p
            .ask(&registry, "quantos pdfs vocês têm?", None, None)
            .await
            .unwrap();
        assert!(answer.answer.contains("1 PDF"));
    }

    #[tokio::test]
    async fn test_meta_list_scoped() {
        let registry = registry_with_docs(vec![
            (
                Document {
                    url: "https://x/a.pdf".to_string(),
                    content: "conteudo a".to_string(),
                },
                vec![1.0, 0.0, 0.0],
            ),
            (
                Document {
                    url: "https://x/b.html".to_string(),
                    content: "conteudo b".to_string(),
                },
                vec![0.0, 1.0, 0.0],
            ),
        ]);
        let p = pipeline(Arc::new(EchoGenerator), "SEARCH");
        let answer = p
            .ask(&registry, "quais pdfs estão indexados?", None, None)
            .await
            .unwrap();
        assert!(answer.answer.contains("https://x/a.pdf"));
        assert!(!answer.answer.contains("https://x/b.html"));
        assert_eq!(answer.sources, vec!["https://x/a.pdf"]);
    }

    #[tokio::test]
    async fn test_chat_route_uses_identity_prompt() {
        let registry = registry_with_docs(vec![]);
        let p = pipeline(Arc::new(EchoGenerator), "CHAT");
        let answer = p.ask(&registry, "quem é você?", None, None).await.unwrap();
        assert!(answer.answer.contains("assistente virtual"));
        assert!(answer.sources.is_empty());
    }

    #[tokio::test]
    async fn test_all_chunks_failing_is_an_error() {
        let registry = registry_with_docs(vec![(
            Document {
                url: "https://x/e.pdf".to_string(),
                content: "Edital 2024.".to_string(),
            },
            vec![1.0, 0.0, 0.0],
        )]);
        let p = pipeline(Arc::new(FailingGenerator(AtomicUsize::new(0))), "SEARCH");
        let err = p
            .ask(&registry, "qual o prazo do edital?", None, Some(0.0))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Generation(_)));
    }

    #[tokio::test]
    async fn test_sources_deduplicated_and_fragment_stripped() {
        let hits = vec![
            SearchHit {
                document: Document {
                    url: "https://x/a.pdf#page=2".to_string(),
                    content: String::new(),
                },
                score: 0.9,
            },
            SearchHit {
                document: Document {
                    url: "https://x/a.pdf#page=5".to_string(),
                    content: String::new(),
                },
                score: 0.8,
            },
        ];
        assert_eq!(collect_sources(&hits), vec!["https://x/a.pdf"]);
    }
}
