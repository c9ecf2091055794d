//! OpenAI-compatible chat-completions adapter, shared by Groq and Together.

use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::ai::provider::{
    elapsed_ms, ProviderCore, RateLimitHeaders, TextProvider, VisionProvider,
};
use crate::ai::sse::{for_each_line, sse_data};
use crate::ai::types::{
    Capability, Completion, CompletionMetadata, GenerationOptions, ImageAnalysis, ModelInfo, ProviderError,
    RateLimitInfo, Usage,
};

const DEFAULT_MAX_TOKENS: u32 = 1000;
const VISION_MAX_TOKENS: u32 = 1000;

const RATE_LIMIT_HEADERS: RateLimitHeaders = RateLimitHeaders {
    limit: &["x-ratelimit-limit", "x-ratelimit-limit-requests"],
    remaining: &["x-ratelimit-remaining", "x-ratelimit-remaining-requests"],
    reset: &["x-ratelimit-reset", "x-ratelimit-reset-requests"],
};

/// Vendor-specific facts for one OpenAI-compatible backend.
pub struct CompatProfile {
    pub name: &'static str,
    pub text_models: &'static [&'static str],
    pub vision_models: &'static [&'static str],
    pub default_rate_limit: u32,
}

pub const GROQ: CompatProfile = CompatProfile {
    name: "Groq",
    text_models: &[
        "llama-3.1-8b-instant",
        "llama-3.1-70b-versatile",
        "mixtral-8x7b-32768",
        "gemma2-9b-it",
    ],
    vision_models: &["llava-v1.5-7b-4096-preview"],
    default_rate_limit: 30,
};

pub const TOGETHER: CompatProfile = CompatProfile {
    name: "Together AI",
    text_models: &[
        "meta-llama/Llama-3.2-3B-Instruct-Turbo",
        "meta-llama/Meta-Llama-3.1-8B-Instruct-Turbo",
        "mistralai/Mixtral-8x7B-Instruct-v0.1",
    ],
    vision_models: &[],
    default_rate_limit: 60,
};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<serde_json::Value>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a [String]>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<ChoiceMessage>,
}

impl ChatResponse {
    fn first_text(&self) -> String {
        self.choices
            .first()
            .and_then(|c| c.message.as_ref())
            .and_then(|m| m.content.clone())
            .unwrap_or_default()
    }

    fn usage(&self) -> Usage {
        self.usage
            .as_ref()
            .map(|u| Usage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default()
    }
}

pub struct OpenAiCompatProvider {
    core: ProviderCore,
    profile: &'static CompatProfile,
}

impl OpenAiCompatProvider {
    pub fn new(core: ProviderCore, profile: &'static CompatProfile) -> Self {
        Self { core, profile }
    }

    fn vision_model(&self) -> Option<&str> {
        self.core
            .config()
            .models
            .vision
            .as_deref()
            .filter(|m| !m.trim().is_empty())
    }

    fn chat_request<'a>(
        &'a self,
        prompt: &str,
        options: &'a GenerationOptions,
        stream: bool,
    ) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.core.config().models.text,
            messages: vec![
                json!({ "role": "system", "content": options.system_or_default() }),
                json!({ "role": "user", "content": prompt }),
            ],
            max_tokens: options
                .max_tokens
                .or(self.core.config().max_tokens)
                .unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: Some(options.temperature_or_default()),
            top_p: Some(options.top_p_or_default()),
            stop: (!options.stop.is_empty()).then_some(options.stop.as_slice()),
            stream,
        }
    }

    async fn post_chat(&self, body: &ChatRequest<'_>) -> Result<ChatResponse, ProviderError> {
        let url = self.core.url("/chat/completions");
        let api_key = self.core.config().api_key();
        let (response, headers) = self
            .core
            .send_json::<ChatResponse, _>(|client| client.post(&url).bearer_auth(api_key).json(body))
            .await?;
        self.core.update_rate_limit(&headers, &RATE_LIMIT_HEADERS);
        Ok(response)
    }
}

#[async_trait]
impl TextProvider for OpenAiCompatProvider {
    fn key(&self) -> &str {
        self.core.key()
    }

    fn name(&self) -> &str {
        self.profile.name
    }

    fn is_available(&self) -> bool {
        self.core.is_available()
    }

    fn model_info(&self) -> ModelInfo {
        let vision = self.vision_model().map(str::to_string);
        ModelInfo {
            text_models: self.profile.text_models.iter().map(|m| m.to_string()).collect(),
            vision_models: self.profile.vision_models.iter().map(|m| m.to_string()).collect(),
            embedding_models: Vec::new(),
            current_text_model: self.core.config().models.text.clone(),
            supports_vision: vision.is_some(),
            current_vision_model: vision,
            current_embedding_model: None,
            supports_embeddings: false,
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
                let body = self.chat_request(prompt, options, false);
                let started = Instant::now();
                let response = self.post_chat(&body).await?;

                Ok(Completion {
                    provider: self.key().to_string(),
                    model: body.model.to_string(),
                    text: response.first_text(),
                    usage: response.usage(),
                    metadata: CompletionMetadata {
                        response_time_ms: elapsed_ms(started),
                        finish_reason: response
                            .choices
                            .first()
                            .and_then(|c| c.finish_reason.clone()),
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
        let body = self.chat_request(prompt, options, true);
        let url = self.core.url("/chat/completions");
        let api_key = self.core.config().api_key();
        let response = self
            .core
            .send(|client| client.post(&url).bearer_auth(api_key).json(&body))
            .await?;

        for_each_line(response, self.key(), |line| {
            let Some(data) = sse_data(line) else { return };
            let Ok(chunk) = serde_json::from_str::<StreamChunk>(data) else {
                return;
            };
            let delta = chunk
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.delta)
                .and_then(|d| d.content);
            if let Some(text) = delta.filter(|t| !t.is_empty()) {
                on_chunk(text);
            }
        })
        .await
    }

    fn vision(&self) -> Option<&dyn VisionProvider> {
        self.vision_model().map(|_| self as &dyn VisionProvider)
    }
}

#[async_trait]
impl VisionProvider for OpenAiCompatProvider {
    async fn analyze_image(
        &self,
        image_base64: &str,
        prompt: &str,
    ) -> Result<ImageAnalysis, ProviderError> {
        let Some(model) = self.vision_model() else {
            return Err(ProviderError::unsupported(
                self.key(),
                Capability::ImageAnalysis,
            ));
        };

        let payload = format!("{prompt}\u{0}{image_base64}");
        self.core
            .cached("vision", &payload, model, || async {
                let body = ChatRequest {
                    model,
                    messages: vec![json!({
                        "role": "user",
                        "content": [
                            { "type": "text", "text": prompt },
                            {
                                "type": "image_url",
                                "image_url": { "url": format!("data:image/jpeg;base64,{image_base64}") },
                            },
                        ],
                    })],
                    max_tokens: VISION_MAX_TOKENS,
                    temperature: None,
                    top_p: None,
                    stop: None,
                    stream: false,
                };
                let response = self.post_chat(&body).await?;

                Ok(ImageAnalysis {
                    provider: self.key().to_string(),
                    model: model.to_string(),
                    analysis: response.first_text(),
                    usage: response.usage(),
                })
            })
            .await
    }
}
