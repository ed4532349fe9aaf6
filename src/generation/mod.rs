//! Abstractions for generating grounded answers via local providers.
//!
//! Generation is a best-effort layer on top of the guaranteed retrieval
//! contract: when no provider is configured or a call fails, retrieval still
//! succeeds and returns the raw chunks. The Ollama-backed client issues HTTP
//! requests directly to the runtime, mirroring the embedding adapter.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::config::{Config, GenerationProvider};

const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Errors surfaced while attempting answer generation.
#[derive(Debug, Error)]
pub enum GenerationClientError {
    /// Provider was explicitly disabled or unreachable.
    #[error("Generation provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate answer: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// Presentation style requested for a generated answer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStyle {
    /// A few sentences, straight to the point.
    #[default]
    Concise,
    /// A thorough prose answer.
    Detailed,
    /// Bullet-point summary.
    Bullets,
}

impl ResponseStyle {
    fn instruction(self) -> &'static str {
        match self {
            Self::Concise => "Answer in a few direct sentences.",
            Self::Detailed => "Answer thoroughly in prose, covering every relevant excerpt.",
            Self::Bullets => "Answer as a short list of bullet points.",
        }
    }
}

/// One numbered context passage supplied to the prompt.
#[derive(Debug, Clone)]
pub struct ContextPassage {
    /// Filename of the owning document, when known.
    pub source: Option<String>,
    /// Passage text.
    pub content: String,
}

/// Request payload passed to the generation provider.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Fully qualified model identifier understood by the provider.
    pub model: String,
    /// Prompt assembled by the retrieval engine.
    pub prompt: String,
}

/// Interface implemented by answer generation providers.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Generate an answer using the configured model.
    async fn generate_answer(
        &self,
        request: GenerationRequest,
    ) -> Result<String, GenerationClientError>;
}

/// Assemble the grounded-answer prompt from numbered context passages.
///
/// The instructions pin the model to the supplied context so the answer
/// cannot drift beyond what retrieval produced.
pub fn build_answer_prompt(
    query: &str,
    passages: &[ContextPassage],
    style: ResponseStyle,
    include_citations: bool,
) -> String {
    let mut prompt = String::from(
        "You answer questions using only the numbered context excerpts below. \
         Do not use outside knowledge and do not invent facts. \
         If the excerpts do not contain the answer, say so plainly.\n",
    );
    prompt.push_str(style.instruction());
    if include_citations {
        prompt.push_str(" Cite supporting excerpts inline as [1], [2], and so on.");
    }
    prompt.push_str("\n\nContext:\n");

    for (position, passage) in passages.iter().enumerate() {
        match passage.source.as_deref() {
            Some(source) => {
                prompt.push_str(&format!(
                    "[{}] ({}) {}\n",
                    position + 1,
                    source,
                    passage.content
                ));
            }
            None => {
                prompt.push_str(&format!("[{}] {}\n", position + 1, passage.content));
            }
        }
    }

    prompt.push_str(&format!("\nQuestion: {query}\nAnswer:"));
    prompt
}

/// Build a generation client based on configuration; `None` disables the layer.
pub fn get_generation_client(config: &Config) -> Option<Box<dyn GenerationClient + Send + Sync>> {
    match config.generation_provider {
        GenerationProvider::None => None,
        GenerationProvider::Ollama => {
            let base_url = config
                .ollama_url
                .clone()
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());
            Some(Box::new(OllamaGenerationClient::new(base_url)))
        }
    }
}

/// Generation client backed by a local Ollama runtime.
pub struct OllamaGenerationClient {
    http: Client,
    base_url: String,
}

impl OllamaGenerationClient {
    /// Construct a client against the given Ollama base URL.
    pub fn new(base_url: String) -> Self {
        let http = Client::builder()
            .user_agent("docpipe/answer")
            .build()
            .expect("Failed to construct reqwest::Client for generation");
        Self { http, base_url }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    done: bool,
}

#[async_trait]
impl GenerationClient for OllamaGenerationClient {
    async fn generate_answer(
        &self,
        request: GenerationRequest,
    ) -> Result<String, GenerationClientError> {
        let payload = json!({
            "model": request.model,
            "prompt": request.prompt,
            "stream": false,
            "options": {
                // Lower temperature keeps answers anchored to the excerpts.
                "temperature": 0.1,
            }
        });

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                GenerationClientError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(GenerationClientError::ProviderUnavailable(format!(
                "Ollama endpoint {} returned 404",
                self.endpoint()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationClientError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaResponse = response.json().await.map_err(|error| {
            GenerationClientError::InvalidResponse(format!(
                "failed to decode Ollama response: {error}"
            ))
        })?;

        if !body.done {
            return Err(GenerationClientError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        Ok(body.response.trim().to_string())
    }
}
