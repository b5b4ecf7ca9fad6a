//! Generation provider, prompt templates, and the LLM-backed intent oracle.
//!
//! The completion service is an external collaborator: an opaque function
//! from prompt to text. The core depends on the [`Generator`] trait;
//! production wires in [`HttpGenerator`] against an OpenAI-compatible
//! chat-completions endpoint. Failures surface as [`Error::Generation`];
//! the same transient-status retry policy as the embedding provider
//! applies inside the wrapper.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::assembler::FALLBACK_ANSWER;
use crate::classifier::IntentOracle;
use crate::config::GenerationConfig;
use crate::error::{Error, Result};
use crate::regional::Regionalism;

/// An opaque prompt-to-text completion function.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Prompt for conversational and identity questions.
pub fn identity_prompt(question: &str) -> String {
    format!(
        "Você é uma assistente virtual universitária que ajuda alunos, professores e \
         interessados com informações sobre a universidade, seus documentos e processos \
         seletivos. Responda de forma simpática, clara e humana à pergunta a seguir.\n\n\
         Pergunta: {question}\nResposta:"
    )
}

/// Prompt for answering from retrieved context.
///
/// Instructs the model to reply with exactly the fallback sentence when
/// the context is insufficient, which is what lets the answer combiner
/// recognize and drop empty-handed chunks.
pub fn grounded_prompt(context: &str, question: &str, tone: Option<Regionalism>) -> String {
    let tone_hint = match tone {
        Some(r) => format!(
            "O usuário usou a expressão regional \"{}\", comum em {}. \
             Adapte o tom da resposta a esse registro informal.\n\n",
            r.expression, r.region
        ),
        None => String::new(),
    };
    format!(
        "Com base no contexto abaixo, responda a pergunta em português.\n\
         Se o contexto não for suficiente, responda exatamente: \"{FALLBACK_ANSWER}\"\n\n\
         {tone_hint}Contexto:\n{context}\n\nPergunta: {question}\n\nResposta:"
    )
}

/// Prompt asking the oracle to label a question's intent.
pub fn routing_prompt(question: &str) -> String {
    format!(
        "Usuário: \"{question}\"\n\n\
         Você é um roteador de perguntas. Esta pergunta deve ser enviada para:\n\
         - CHAT -> pergunta geral, pessoal ou sobre a identidade da assistente, \
         sem depender de documentos.\n\
         - SEARCH -> pergunta que depende dos documentos indexados \
         (editais, resultados, calendários, PDFs, dados acadêmicos).\n\
         - REFINE -> pergunta que precisa ser reinterpretada antes da busca \
         nos documentos.\n\n\
         Responda apenas com UMA dessas opções: CHAT / SEARCH / REFINE."
    )
}

/// Prompt that rewrites a question into an objective search query.
pub fn refine_prompt(question: &str) -> String {
    format!(
        "Reformule a pergunta a seguir como uma consulta objetiva para busca em \
         documentos universitários. Responda apenas com a consulta reformulada.\n\n\
         Pergunta: {question}\nConsulta:"
    )
}

/// Completion provider backed by an OpenAI-compatible chat endpoint.
///
/// The API key is read from the environment per call, not at
/// construction, so question paths that never generate (meta-questions)
/// work without credentials.
pub struct HttpGenerator {
    endpoint: String,
    model: String,
    api_key_env: String,
    temperature: f32,
    max_tokens: u32,
    max_retries: u32,
    client: reqwest::Client,
}

impl HttpGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Generation(e.to_string()))?;
        Ok(Self {
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key_env: config.api_key_env.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            client,
        })
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let api_key = std::env::var(&self.api_key_env)
            .map_err(|_| Error::Generation(format!("{} not set", self.api_key_env)))?;
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "messages": [ { "role": "user", "content": prompt } ],
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&self.endpoint)
                .header("Authorization", format!("Bearer {api_key}"))
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| Error::Generation(e.to_string()))?;
                        return parse_completion(&json);
                    }
                    let retryable = status.as_u16() == 429 || status.is_server_error();
                    let text = response.text().await.unwrap_or_default();
                    let err = Error::Generation(format!("HTTP {status}: {text}"));
                    if !retryable {
                        return Err(err);
                    }
                    last_err = Some(err);
                }
                Err(e) => {
                    last_err = Some(Error::Generation(format!("request failed: {e}")));
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| Error::Generation("retries exhausted".to_string())))
    }
}

/// Parse an OpenAI-style chat-completions response body.
fn parse_completion(json: &serde_json::Value) -> Result<String> {
    json["choices"][0]["message"]["content"]
        .as_str()
        .map(|s| s.trim().to_string())
        .ok_or_else(|| Error::Generation("missing completion content".to_string()))
}

/// Intent oracle implemented over the generation service.
pub struct LlmIntentOracle {
    generator: Arc<dyn Generator>,
}

impl LlmIntentOracle {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl IntentOracle for LlmIntentOracle {
    async fn label(&self, question: &str) -> Result<String> {
        self.generator.complete(&routing_prompt(question)).await
    }
}
