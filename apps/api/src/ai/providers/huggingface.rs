//! HuggingFace Inference API adapter: text generation, feature-extraction embeddings, and raw
//! chunk streaming.

use std::time::Instant;

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;

use crate::ai::provider::{
    elapsed_ms, EmbeddingProvider, ProviderCore, RateLimitHeaders, TextProvider,
};
use crate::ai::types::{
    Capability, Completion, CompletionMetadata, Embedding, GenerationOptions, ModelInfo,
    ProviderError, RateLimitInfo, Usage,
};

const DEFAULT_MAX_TOKENS: u32 = 500;
pub const DEFAULT_RATE_LIMIT: u32 = 100;

const RATE_LIMIT_HEADERS: RateLimitHeaders = RateLimitHeaders {
    limit: &["x-ratelimit-limit"],
    remaining: &["x-ratelimit-remaining"],
    reset: &["x-ratelimit-reset"],
};

/// Text generation answers either a list of generations or a single object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GenerationResponse {
    List(Vec<GeneratedText>),
    Single(GeneratedText),
}

#[derive(Debug, Deserialize)]
struct GeneratedText {
    #[serde(default)]
    generated_text: String,
}

/// Feature extraction answers a flat vector for sentence-embedding models and a
/// per-token matrix for others.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FeatureExtraction {
    Vector(Vec<f64>),
    Batch(Vec<Vec<f64>>),
}

impl GenerationResponse {
    fn into_text(self) -> String {
        match self {
            GenerationResponse::List(items) => items
                .into_iter()
                .next()
                .map(|g| g.generated_text)
                .unwrap_or_default(),
            GenerationResponse::Single(item) => item.generated_text,
        }
    }
}

/// Character-count estimate used because the inference API reports no token usage.
fn estimate_tokens(text: &str) -> u32 {
    u32::try_from(text.len() / 4).unwrap_or(u32::MAX)
}

pub struct HuggingFaceProvider {
    core: ProviderCore,
}

impl HuggingFaceProvider {
    pub fn new(core: ProviderCore) -> Self {
        Self { core }
    }

    fn embedding_model(&self) -> Option<&str> {
        self.core.config().models.embedding.as_deref()
    }

    fn generation_body(
        &self,
        prompt: &str,
        options: &GenerationOptions,
        stream: bool,
    ) -> serde_json::Value {
        let max_new_tokens = options
            .max_tokens
            .or(self.core.config().max_tokens)
            .unwrap_or(DEFAULT_MAX_TOKENS);
        let mut parameters = json!({
            "max_new_tokens": max_new_tokens,
            "temperature": options.temperature_or_default(),
        });
        if stream {
            parameters["stream"] = json!(true);
        } else {
            parameters["top_p"] = json!(options.top_p_or_default());
            parameters["do_sample"] = json!(true);
        }
        json!({ "inputs": prompt, "parameters": parameters })
    }
}

#[async_trait]
impl TextProvider for HuggingFaceProvider {
    fn key(&self) -> &str {
        self.core.key()
    }

    fn name(&self) -> &str {
        "HuggingFace"
    }

    fn is_available(&self) -> bool {
        self.core.is_available()
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            text_models: [
                "meta-llama/Llama-3.2-3B-Instruct",
                "mistralai/Mistral-7B-Instruct-v0.3",
                "google/flan-t5-xxl",
            ]
            .map(String::from)
            .to_vec(),
            vision_models: Vec::new(),
            embedding_models: [
                "sentence-transformers/all-MiniLM-L6-v2",
                "sentence-transformers/all-mpnet-base-v2",
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
                let model = self.core.config().models.text.as_str();
                let url = self.core.url(&format!("/models/{model}"));
                let api_key = self.core.config().api_key();
                let body = self.generation_body(prompt, options, false);
                let started = Instant::now();

                let (response, headers) = self
                    .core
                    .send_json::<GenerationResponse, _>(|client| {
                        client.post(&url).bearer_auth(api_key).json(&body)
                    })
                    .await?;
                self.core.update_rate_limit(&headers, &RATE_LIMIT_HEADERS);

                let text = response.into_text();
                Ok(Completion {
                    provider: self.key().to_string(),
                    model: model.to_string(),
                    usage: Usage::new(Some(estimate_tokens(prompt)), Some(estimate_tokens(&text))),
                    text,
                    metadata: CompletionMetadata {
                        response_time_ms: elapsed_ms(started),
                        finish_reason: None,
                    },
                })
            })
            .await
    }

    /// The inference API streams unframed bytes; each network chunk is forwarded as-is.
    async fn try_stream_text(
        &self,
        prompt: &str,
        options: &GenerationOptions,
        on_chunk: &mut (dyn FnMut(String) + Send),
    ) -> Result<(), ProviderError> {
        let url = self
            .core
            .url(&format!("/models/{}", self.core.config().models.text));
        let api_key = self.core.config().api_key();
        let body = self.generation_body(prompt, options, true);
        let response = self
            .core
            .send(|client| client.post(&url).bearer_auth(api_key).json(&body))
            .await?;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ProviderError::transport(self.key(), e))?;
            if !chunk.is_empty() {
                on_chunk(String::from_utf8_lossy(&chunk).into_owned());
            }
        }
        Ok(())
    }

    fn embeddings(&self) -> Option<&dyn EmbeddingProvider> {
        self.embedding_model().map(|_| self as &dyn EmbeddingProvider)
    }
}

#[async_trait]
impl EmbeddingProvider for HuggingFaceProvider {
    async fn generate_embedding(&self, text: &str) -> Result<Embedding, ProviderError> {
        let model = self
            .embedding_model()
            .ok_or_else(|| ProviderError::unsupported(self.key(), Capability::Embedding))?;

        self.core
            .cached("embedding", text, model, || async {
                let url = self.core.url(&format!("/models/{model}"));
                let api_key = self.core.config().api_key();
                let body = json!({ "inputs": text });
                let (response, _) = self
                    .core
                    .send_json::<FeatureExtraction, _>(|client| {
                        client.post(&url).bearer_auth(api_key).json(&body)
                    })
                    .await?;

                let vector = match response {
                    FeatureExtraction::Vector(values) => values,
                    FeatureExtraction::Batch(rows) => rows.into_iter().next().unwrap_or_default(),
                };
                if vector.is_empty() {
                    return Err(ProviderError::malformed(self.key(), "empty feature vector"));
                }
                Ok(Embedding::new(self.key(), model, vector))
            })
            .await
    }
}
