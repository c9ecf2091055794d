//! Anthropic Messages API adapter: text, vision, and SSE streaming.

use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::ai::provider::{
    elapsed_ms, ProviderCore, RateLimitHeaders, TextProvider, VisionProvider,
};
use crate::ai::sse::{for_each_line, sse_data};
use crate::ai::types::{
    Completion, CompletionMetadata, GenerationOptions, ImageAnalysis, ModelInfo, ProviderError,
    RateLimitInfo, Usage,
};

const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;
const VISION_MAX_TOKENS: u32 = 1000;
pub const DEFAULT_RATE_LIMIT: u32 = 50;

const RATE_LIMIT_HEADERS: RateLimitHeaders = RateLimitHeaders {
    limit: &["anthropic-ratelimit-requests-limit"],
    remaining: &["anthropic-ratelimit-requests-remaining"],
    reset: &["anthropic-ratelimit-requests-reset"],
};

const TEXT_MODELS: &[&str] = &[
    "claude-3-5-sonnet-20241022",
    "claude-3-5-haiku-20241022",
    "claude-3-opus-20240229",
    "claude-3-sonnet-20240229",
    "claude-3-haiku-20240307",
];

const VISION_MODELS: &[&str] = &[
    "claude-3-5-sonnet-20241022",
    "claude-3-opus-20240229",
    "claude-3-sonnet-20240229",
    "claude-3-haiku-20240307",
];

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    #[serde(skip_serializing_if = "no_stop_sequences")]
    stop_sequences: &'a [String],
    messages: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

fn no_stop_sequences(stops: &&[String]) -> bool {
    stops.is_empty()
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<MessagesUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessagesUsage {
    input_tokens: Option<u32>,
    output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(default)]
    delta: Option<StreamDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    text: Option<String>,
}

impl MessagesResponse {
    fn joined_text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::Other => None,
            })
            .collect()
    }

    fn usage(&self) -> Usage {
        self.usage
            .as_ref()
            .map(|u| Usage::new(u.input_tokens, u.output_tokens))
            .unwrap_or_default()
    }
}

pub struct ClaudeProvider {
    core: ProviderCore,
}

impl ClaudeProvider {
    pub fn new(core: ProviderCore) -> Self {
        Self { core }
    }

    fn max_tokens(&self, options: &GenerationOptions) -> u32 {
        options
            .max_tokens
            .or(self.core.config().max_tokens)
            .unwrap_or(DEFAULT_MAX_TOKENS)
    }

    fn text_request<'a>(
        &'a self,
        prompt: &str,
        options: &'a GenerationOptions,
        stream: bool,
    ) -> MessagesRequest<'a> {
        MessagesRequest {
            model: &self.core.config().models.text,
            max_tokens: self.max_tokens(options),
            temperature: Some(options.temperature_or_default()),
            top_p: options.top_p,
            system: Some(options.system_or_default()),
            stop_sequences: &options.stop,
            messages: vec![json!({ "role": "user", "content": prompt })],
            stream,
        }
    }

    async fn post_messages(
        &self,
        body: &MessagesRequest<'_>,
    ) -> Result<MessagesResponse, ProviderError> {
        let url = self.core.url("/v1/messages");
        let api_key = self.core.config().api_key();
        let (response, headers) = self
            .core
            .send_json::<MessagesResponse, _>(|client| {
                client
                    .post(&url)
                    .header("x-api-key", api_key)
                    .header("anthropic-version", API_VERSION)
                    .json(body)
            })
            .await?;
        self.core.update_rate_limit(&headers, &RATE_LIMIT_HEADERS);
        Ok(response)
    }
}

#[async_trait]
impl TextProvider for ClaudeProvider {
    fn key(&self) -> &str {
        self.core.key()
    }

    fn name(&self) -> &str {
        "Claude (Anthropic)"
    }

    fn is_available(&self) -> bool {
        self.core.is_available()
    }

    fn model_info(&self) -> ModelInfo {
        let current = self.core.config().models.text.clone();
        ModelInfo {
            text_models: TEXT_MODELS.iter().map(|m| m.to_string()).collect(),
            vision_models: VISION_MODELS.iter().map(|m| m.to_string()).collect(),
            embedding_models: Vec::new(),
            current_vision_model: Some(current.clone()),
            current_text_model: current,
            current_embedding_model: None,
            supports_vision: true,
            supports_embeddings: false,
            supports_streaming: true,
            context_window: Some(200_000),
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
                let body = self.text_request(prompt, options, false);
                let started = Instant::now();
                let response = self.post_messages(&body).await?;
                let response_time_ms = elapsed_ms(started);

                debug!(provider = self.key(), response_time_ms, "Claude call succeeded");

                Ok(Completion {
                    provider: self.key().to_string(),
                    model: body.model.to_string(),
                    text: response.joined_text(),
                    usage: response.usage(),
                    metadata: CompletionMetadata {
                        response_time_ms,
                        finish_reason: response.stop_reason.clone(),
                    },
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
        let body = self.text_request(prompt, options, true);
        let url = self.core.url("/v1/messages");
        let api_key = self.core.config().api_key();
        let response = self
            .core
            .send(|client| {
                client
                    .post(&url)
                    .header("x-api-key", api_key)
                    .header("anthropic-version", API_VERSION)
                    .json(&body)
            })
            .await?;

        for_each_line(response, self.key(), |line| {
            let Some(data) = sse_data(line) else { return };
            if let Ok(event) = serde_json::from_str::<StreamEvent>(data) {
                if let Some(text) = event.delta.and_then(|d| d.text) {
                    on_chunk(text);
                }
            }
        })
        .await
    }

    fn vision(&self) -> Option<&dyn VisionProvider> {
        Some(self)
    }
}

#[async_trait]
impl VisionProvider for ClaudeProvider {
    async fn analyze_image(
        &self,
        image_base64: &str,
        prompt: &str,
    ) -> Result<ImageAnalysis, ProviderError> {
        let payload = format!("{prompt}\u{0}{image_base64}");
        self.core
            .cached("vision", &payload, "", || async {
                let model = self.core.config().models.text.as_str();
                let body = MessagesRequest {
                    model,
                    max_tokens: VISION_MAX_TOKENS,
                    temperature: None,
                    top_p: None,
                    system: None,
                    stop_sequences: &[],
                    messages: vec![json!({
                        "role": "user",
                        "content": [
                            {
                                "type": "image",
                                "source": {
                                    "type": "base64",
                                    "media_type": "image/jpeg",
                                    "data": image_base64,
                                },
                            },
                            { "type": "text", "text": prompt },
                        ],
                    })],
                    stream: false,
                };
                let response = self.post_messages(&body).await?;

                Ok(ImageAnalysis {
                    provider: self.key().to_string(),
                    model: model.to_string(),
                    analysis: response.joined_text(),
                    usage: response.usage(),
                })
            })
            .await
    }
}
