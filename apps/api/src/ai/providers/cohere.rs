//! Cohere adapter: `/generate`, `/embed`, and newline-delimited JSON streaming.

use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::ai::provider::{
    elapsed_ms, EmbeddingProvider, ProviderCore, RateLimitHeaders, TextProvider,
};
use crate::ai::sse::for_each_line;
use crate::ai::types::{
    Capability, Completion, CompletionMetadata, Embedding, GenerationOptions, ModelInfo,
    ProviderError, RateLimitInfo, Usage,
};

const DEFAULT_MAX_TOKENS: u32 = 500;
pub const DEFAULT_RATE_LIMIT: u32 = 100;

const RATE_LIMIT_HEADERS: RateLimitHeaders = RateLimitHeaders {
    limit: &["x-api-requests-limit"],
    remaining: &["x-api-requests-remaining"],
    reset: &["x-api-requests-reset"],
};

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: u32,
    temperature: f32,
    p: f32,
    k: u32,
    stop_sequences: &'a [String],
    return_likelihoods: &'static str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    generations: Vec<Generation>,
    #[serde(default)]
    meta: Option<Meta>,
}

#[derive(Debug, Deserialize)]
struct Generation {
    #[serde(default)]
    text: String,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Meta {
    #[serde(default)]
    billed_units: Option<BilledUnits>,
}

#[derive(Debug, Deserialize)]
struct BilledUnits {
    input_tokens: Option<u32>,
    output_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    texts: [&'a str; 1],
    input_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f64>>,
}

#[derive(Debug, Deserialize)]
struct StreamLine {
    #[serde(default)]
    text: Option<String>,
}

pub struct CohereProvider {
    core: ProviderCore,
}

impl CohereProvider {
    pub fn new(core: ProviderCore) -> Self {
        Self { core }
    }

    fn embedding_model(&self) -> Option<&str> {
        self.core.config().models.embedding.as_deref()
    }

    fn generate_request<'a>(
        &'a self,
        prompt: &'a str,
        options: &'a GenerationOptions,
        stream: bool,
    ) -> GenerateRequest<'a> {
        GenerateRequest {
            model: &self.core.config().models.text,
            prompt,
            max_tokens: options
                .max_tokens
                .or(self.core.config().max_tokens)
                .unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: options.temperature_or_default(),
            p: options.top_p_or_default(),
            k: 0,
            stop_sequences: &options.stop,
            return_likelihoods: "NONE",
            stream,
        }
    }
}

#[async_trait]
impl TextProvider for CohereProvider {
    fn key(&self) -> &str {
        self.core.key()
    }

    fn name(&self) -> &str {
        "Cohere"
    }

    fn is_available(&self) -> bool {
        self.core.is_available()
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            text_models: ["command-r", "command-r-plus", "command", "command-light"]
                .map(String::from)
                .to_vec(),
            vision_models: Vec::new(),
            embedding_models: [
                "embed-english-v3.0",
                "embed-multilingual-v3.0",
                "embed-english-light-v3.0",
            ]
            .map(String::from)
            .to_vec(),
            current_text_model: self.core.config().models.text.clone(),
            current_vision_model: None,
            current_embedding_model: self.embedding_model().map(str::to_string),
            supports_vision: false,
            supports_embeddings: self.embedding_model().is_some(),
            supports_streaming: true,
            context_window: None,
        }
    }

    fn rate_limit_info(&self) -> RateLimitInfo {
        self.core.rate_limit()
    }

    async fn generate_text(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<Completion, ProviderError> {
        self.core
            .cached("text", prompt, &options.cache_fingerprint(), || async {
                let body = self.generate_request(prompt, options, false);
                let url = self.core.url("/generate");
                let api_key = self.core.config().api_key();
                let started = Instant::now();

                let (response, headers) = self
                    .core
                    .send_json::<GenerateResponse, _>(|client| {
                        client.post(&url).bearer_auth(api_key).json(&body)
                    })
                    .await?;
                self.core.update_rate_limit(&headers, &RATE_LIMIT_HEADERS);

                let usage = response
                    .meta
                    .as_ref()
                    .and_then(|m| m.billed_units.as_ref())
                    .map(|b| Usage::new(b.input_tokens, b.output_tokens))
                    .unwrap_or_default();
                let first = response.generations.into_iter().next();

                Ok(Completion {
                    provider: self.key().to_string(),
                    model: body.model.to_string(),
                    metadata: CompletionMetadata {
                        response_time_ms: elapsed_ms(started),
                        finish_reason: first.as_ref().and_then(|g| g.finish_reason.clone()),
                    },
                    text: first.map(|g| g.text).unwrap_or_default(),
                    usage,
                })
            })
            .await
    }

    async fn try_stream_text(
        &self,
        prompt: &str,
        options: &GenerationOptions,
        on_chunk: &mut (dyn FnMut(String) + Send),
    ) -> Result<(), ProviderError> {
        let body = self.generate_request(prompt, options, true);
        let url = self.core.url("/generate");
        let api_key = self.core.config().api_key();
        let response = self
            .core
            .send(|client| client.post(&url).bearer_auth(api_key).json(&body))
            .await?;

        // Each line is a standalone JSON event.
        for_each_line(response, self.key(), |line| {
            if line.trim().is_empty() {
                return;
            }
            if let Ok(StreamLine { text: Some(text) }) = serde_json::from_str(line) {
                on_chunk(text);
            }
        })
        .await
    }

    fn embeddings(&self) -> Option<&dyn EmbeddingProvider> {
        self.embedding_model().map(|_| self as &dyn EmbeddingProvider)
    }
}

#[async_trait]
impl EmbeddingProvider for CohereProvider {
    async fn generate_embedding(&self, text: &str) -> Result<Embedding, ProviderError> {
        let model = self
            .embedding_model()
            .ok_or_else(|| ProviderError::unsupported(self.key(), Capability::Embedding))?;

        self.core
            .cached("embedding", text, model, || async {
                let url = self.core.url("/embed");
                let api_key = self.core.config().api_key();
                let body = EmbedRequest {
                    model,
                    texts: [text],
                    input_type: "search_document",
                };
                let (response, _) = self
                    .core
                    .send_json::<EmbedResponse, _>(|client| {
                        client.post(&url).bearer_auth(api_key).json(&body)
                    })
                    .await?;

                let vector = response.embeddings.into_iter().next().ok_or_else(|| {
                    ProviderError::malformed(self.key(), "response contained no embeddings")
                })?;
                Ok(Embedding::new(self.key(), model, vector))
            })
            .await
    }
}
