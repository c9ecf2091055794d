//! Google Gemini adapter: generateContent, embedContent, inline-data vision, and SSE streaming.
//!
//! Gemini authenticates with a `key` query parameter rather than a header and does not send
//! request-quota headers, so its rate-limit info stays at the defaults.

use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::ai::provider::{
    elapsed_ms, EmbeddingProvider, ProviderCore, TextProvider, VisionProvider,
};
use crate::ai::sse::{for_each_line, sse_data};
use crate::ai::types::{
    Capability, Completion, CompletionMetadata, Embedding, GenerationOptions, ImageAnalysis,
    ModelInfo, ProviderError, RateLimitInfo, Usage,
};

const DEFAULT_MAX_TOKENS: u32 = 1000;
const DEFAULT_TOP_K: u32 = 40;
pub const DEFAULT_RATE_LIMIT: u32 = 60;

const SAFETY_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop_sequences: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<u32>,
    candidates_token_count: Option<u32>,
    total_token_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: Option<EmbeddingValues>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    #[serde(default)]
    values: Vec<f64>,
}

impl GenerateContentResponse {
    fn first_candidate(&self) -> Option<&Candidate> {
        self.candidates.first()
    }

    fn text(&self) -> String {
        self.first_candidate()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn usage(&self) -> Usage {
        match &self.usage_metadata {
            Some(meta) => Usage {
                input_tokens: meta.prompt_token_count,
                output_tokens: meta.candidates_token_count,
                total_tokens: meta.total_token_count,
            },
            None => Usage::default(),
        }
    }
}

pub struct GeminiProvider {
    core: ProviderCore,
}

impl GeminiProvider {
    pub fn new(core: ProviderCore) -> Self {
        Self { core }
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        self.core.url(&format!("/models/{model}:{method}"))
    }

    fn embedding_model(&self) -> Option<&str> {
        self.core.config().models.embedding.as_deref()
    }

    fn vision_model(&self) -> Option<&str> {
        self.core.config().models.vision.as_deref()
    }

    fn generate_body(
        &self,
        prompt: &str,
        options: &GenerationOptions,
        streaming: bool,
    ) -> serde_json::Value {
        let generation_config = GenerationConfig {
            temperature: options.temperature_or_default(),
            top_k: (!streaming).then_some(DEFAULT_TOP_K),
            top_p: (!streaming).then(|| options.top_p_or_default()),
            max_output_tokens: options
                .max_tokens
                .or(self.core.config().max_tokens)
                .unwrap_or(DEFAULT_MAX_TOKENS),
            stop_sequences: options.stop.clone(),
        };

        let safety_settings: Vec<_> = SAFETY_CATEGORIES
            .iter()
            .map(|category| json!({ "category": category, "threshold": "BLOCK_MEDIUM_AND_ABOVE" }))
            .collect();

        let mut body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": generation_config,
            "safetySettings": safety_settings,
        });
        if let Some(system) = &options.system {
            body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }
        body
    }

    async fn post_generate(
        &self,
        model: &str,
        body: &serde_json::Value,
    ) -> Result<GenerateContentResponse, ProviderError> {
        let url = self.model_url(model, "generateContent");
        let api_key = self.core.config().api_key();
        let (response, _) = self
            .core
            .send_json::<GenerateContentResponse, _>(|client| {
                client.post(&url).query(&[("key", api_key)]).json(body)
            })
            .await?;
        Ok(response)
    }
}

#[async_trait]
impl TextProvider for GeminiProvider {
    fn key(&self) -> &str {
        self.core.key()
    }

    fn name(&self) -> &str {
        "Google Gemini"
    }

    fn is_available(&self) -> bool {
        self.core.is_available()
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            text_models: [
                "gemini-1.5-flash",
                "gemini-1.5-flash-8b",
                "gemini-1.5-pro",
                "gemini-1.0-pro",
            ]
            .map(String::from)
            .to_vec(),
            vision_models: ["gemini-1.5-flash", "gemini-1.5-pro"]
                .map(String::from)
                .to_vec(),
            embedding_models: ["text-embedding-004", "embedding-001"]
                .map(String::from)
                .to_vec(),
            current_text_model: self.core.config().models.text.clone(),
            current_vision_model: self.vision_model().map(str::to_string),
            current_embedding_model: self.embedding_model().map(str::to_string),
            supports_vision: self.vision_model().is_some(),
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
                let body = self.generate_body(prompt, options, false);
                let started = Instant::now();
                let response = self.post_generate(model, &body).await?;

                Ok(Completion {
                    provider: self.key().to_string(),
                    model: model.to_string(),
                    text: response.text(),
                    usage: response.usage(),
                    metadata: CompletionMetadata {
                        response_time_ms: elapsed_ms(started),
                        finish_reason: response
                            .first_candidate()
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
        let url = self.model_url(&self.core.config().models.text, "streamGenerateContent");
        let api_key = self.core.config().api_key();
        let body = self.generate_body(prompt, options, true);
        let response = self
            .core
            .send(|client| {
                client
                    .post(&url)
                    .query(&[("key", api_key), ("alt", "sse")])
                    .json(&body)
            })
            .await?;

        for_each_line(response, self.key(), |line| {
            let Some(data) = sse_data(line) else { return };
            if let Ok(event) = serde_json::from_str::<GenerateContentResponse>(data) {
                let text = event.text();
                if !text.is_empty() {
                    on_chunk(text);
                }
            }
        })
        .await
    }

    fn embeddings(&self) -> Option<&dyn EmbeddingProvider> {
        self.embedding_model().map(|_| self as &dyn EmbeddingProvider)
    }

    fn vision(&self) -> Option<&dyn VisionProvider> {
        self.vision_model().map(|_| self as &dyn VisionProvider)
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiProvider {
    async fn generate_embedding(&self, text: &str) -> Result<Embedding, ProviderError> {
        let model = self
            .embedding_model()
            .ok_or_else(|| ProviderError::unsupported(self.key(), Capability::Embedding))?;

        self.core
            .cached("embedding", text, model, || async {
                let url = self.model_url(model, "embedContent");
                let api_key = self.core.config().api_key();
                let body = json!({
                    "model": format!("models/{model}"),
                    "content": { "parts": [{ "text": text }] },
                });
                let (response, _) = self
                    .core
                    .send_json::<EmbedContentResponse, _>(|client| {
                        client.post(&url).query(&[("key", api_key)]).json(&body)
                    })
                    .await?;

                let values = response
                    .embedding
                    .map(|e| e.values)
                    .filter(|values| !values.is_empty())
                    .ok_or_else(|| {
                        ProviderError::malformed(self.key(), "response contained no embedding")
                    })?;
                Ok(Embedding::new(self.key(), model, values))
            })
            .await
    }
}

#[async_trait]
impl VisionProvider for GeminiProvider {
    async fn analyze_image(
        &self,
        image_base64: &str,
        prompt: &str,
    ) -> Result<ImageAnalysis, ProviderError> {
        let model = self
            .vision_model()
            .ok_or_else(|| ProviderError::unsupported(self.key(), Capability::ImageAnalysis))?;

        let payload = format!("{prompt}\u{0}{image_base64}");
        self.core
            .cached("vision", &payload, model, || async {
                let body = json!({
                    "contents": [{
                        "parts": [
                            { "text": prompt },
                            { "inline_data": { "mime_type": "image/jpeg", "data": image_base64 } },
                        ],
                    }],
                });
                let response = self.post_generate(model, &body).await?;

                Ok(ImageAnalysis {
                    provider: self.key().to_string(),
                    model: model.to_string(),
                    analysis: response.text(),
                    usage: response.usage(),
                })
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use mockito::Matcher;

    use super::*;
    use crate::ai::provider::RetryPolicy;
    use crate::ai::providers::test_support::provider_config;

    fn provider(base_url: &str) -> GeminiProvider {
        let config = provider_config("gemini", base_url);
        GeminiProvider::new(
            ProviderCore::new(config, None, RetryPolicy::no_retry(), DEFAULT_RATE_LIMIT).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_generate_text_passes_key_as_query_param() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/models/gemini-1.5-flash:generateContent")
            .match_query(Matcher::UrlEncoded("key".into(), "test-key".into()))
            .match_body(Matcher::PartialJson(json!({
                "generationConfig": { "topK": 40, "maxOutputTokens": 1000 },
            })))
            .with_status(200)
            .with_body(
                r#"{"candidates":[{"content":{"parts":[{"text":"Part one. "},{"text":"Part two."}]},"finishReason":"STOP"}],
                    "usageMetadata":{"promptTokenCount":3,"candidatesTokenCount":6,"totalTokenCount":9}}"#,
            )
            .create_async()
            .await;

        let completion = provider(&server.url())
            .generate_text("Write two parts", &GenerationOptions::default())
            .await
            .unwrap();

        assert_eq!(completion.text, "Part one. Part two.");
        assert_eq!(completion.usage.total_tokens, Some(9));
        assert_eq!(completion.metadata.finish_reason.as_deref(), Some("STOP"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_embedding_reads_values() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/models/text-embedding-004:embedContent")
            .match_query(Matcher::Any)
            .match_body(Matcher::PartialJson(json!({ "model": "models/text-embedding-004" })))
            .with_status(200)
            .with_body(r#"{"embedding":{"values":[0.5,0.25]}}"#)
            .create_async()
            .await;

        let embedding = provider(&server.url())
            .generate_embedding("text")
            .await
            .unwrap();
        assert_eq!(embedding.embedding, vec![0.5, 0.25]);
        assert_eq!(embedding.provider, "gemini");
    }

    #[tokio::test]
    async fn test_stream_uses_sse_alt_and_collects_parts() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/models/gemini-1.5-flash:streamGenerateContent")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("alt".into(), "sse".into()),
                Matcher::UrlEncoded("key".into(), "test-key".into()),
            ]))
            .with_status(200)
            .with_body(concat!(
                "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hi\"}]}}]}\r\n\r\n",
                "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\" there\"}]}}]}\r\n\r\n",
            ))
            .create_async()
            .await;

        let mut chunks = Vec::new();
        provider(&server.url())
            .stream_text("x", &GenerationOptions::default(), &mut |c: String| {
                chunks.push(c)
            })
            .await;
        assert_eq!(chunks, vec!["Hi".to_string(), " there".to_string()]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_vision_sends_inline_data() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/models/gemini-1.5-flash:generateContent")
            .match_query(Matcher::Any)
            .match_body(Matcher::Regex("inline_data".to_string()))
            .with_status(200)
            .with_body(r#"{"candidates":[{"content":{"parts":[{"text":"A chart."}]}}]}"#)
            .create_async()
            .await;

        let analysis = provider(&server.url())
            .analyze_image("aGk=", "What is this?")
            .await
            .unwrap();
        assert_eq!(analysis.analysis, "A chart.");
    }
}
