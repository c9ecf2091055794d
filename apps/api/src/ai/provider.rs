//! Provider capability traits and the HTTP plumbing every adapter shares.
//!
//! Text generation (with streaming) is the base capability. Embeddings and image analysis are
//! optional capabilities: an adapter exposes them through [`TextProvider::embeddings`] and
//! [`TextProvider::vision`], so the aggregator only ever calls backends that support them.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::ai::cache::{cache_key, CacheHandle};
use crate::ai::types::{
    Completion, Embedding, GenerationOptions, ImageAnalysis, ModelInfo,
    ProviderError, RateLimitInfo,
};
use crate::config::ProviderConfig;

const MAX_ERROR_MESSAGE_LEN: usize = 256;

// ────────────────────────────────────────────────────────────────────────────
// Capability traits
// ────────────────────────────────────────────────────────────────────────────

/// Base contract for every backend: text generation, streaming, and metadata.
#[async_trait]
pub trait TextProvider: Send + Sync {
    /// Stable registry key, e.g. "claude".
    fn key(&self) -> &str;

    /// Human readable vendor name.
    fn name(&self) -> &str;

    /// Configuration-derived readiness. No network round trip.
    fn is_available(&self) -> bool;

    fn model_info(&self) -> ModelInfo;

    fn rate_limit_info(&self) -> RateLimitInfo;

    async fn generate_text(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<Completion, ProviderError>;

    /// Streams decoded text fragments into `on_chunk`, failing on transport or vendor errors.
    async fn try_stream_text(
        &self,
        prompt: &str,
        options: &GenerationOptions,
        on_chunk: &mut (dyn FnMut(String) + Send),
    ) -> Result<(), ProviderError>;

    /// Streams text into `on_chunk`. Failures are delivered through the same callback as a
    /// serialized `{"error": ...}` payload so single-callback consumers see every outcome.
    async fn stream_text(
        &self,
        prompt: &str,
        options: &GenerationOptions,
        on_chunk: &mut (dyn FnMut(String) + Send),
    ) {
        if let Err(e) = self.try_stream_text(prompt, options, on_chunk).await {
            error!(provider = self.key(), "Stream failed: {e}");
            on_chunk(error_chunk(&e.to_string()));
        }
    }

    fn embeddings(&self) -> Option<&dyn EmbeddingProvider> {
        None
    }

    fn vision(&self) -> Option<&dyn VisionProvider> {
        None
    }
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn generate_embedding(&self, text: &str) -> Result<Embedding, ProviderError>;
}

#[async_trait]
pub trait VisionProvider: Send + Sync {
    /// `image_base64` is raw base64 without any data-URI prefix.
    async fn analyze_image(
        &self,
        image_base64: &str,
        prompt: &str,
    ) -> Result<ImageAnalysis, ProviderError>;
}

/// The payload delivered to stream consumers in place of text when a stream fails.
pub fn error_chunk(message: &str) -> String {
    serde_json::json!({ "error": message }).to_string()
}

// ────────────────────────────────────────────────────────────────────────────
// Construction errors
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("{provider}: {message}")]
    InvalidConfig { provider: String, message: String },

    #[error("{provider}: failed to build HTTP client: {source}")]
    Client {
        provider: String,
        #[source]
        source: reqwest::Error,
    },
}

// ────────────────────────────────────────────────────────────────────────────
// Retry policy
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for every attempt after that.
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::from_millis(1000),
        }
    }

    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    fn delay_before(&self, attempt: u32) -> Duration {
        // Exponential backoff: base, 2×base, 4×base, ...
        self.base_delay * (1u32 << (attempt - 1).min(16))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Response header names a vendor uses for its request quota. The first present name wins.
pub struct RateLimitHeaders {
    pub limit: &'static [&'static str],
    pub remaining: &'static [&'static str],
    pub reset: &'static [&'static str],
}

// ────────────────────────────────────────────────────────────────────────────
// ProviderCore
// ────────────────────────────────────────────────────────────────────────────

/// HTTP client, configuration, cache access, retry, and rate-limit bookkeeping for one adapter.
pub struct ProviderCore {
    key: String,
    config: ProviderConfig,
    client: Client,
    cache: Option<CacheHandle>,
    retry: RetryPolicy,
    rate_limit: Mutex<RateLimitInfo>,
}

impl ProviderCore {
    pub fn new(
        config: ProviderConfig,
        cache: Option<CacheHandle>,
        retry: RetryPolicy,
        default_rate_limit: u32,
    ) -> Result<Self, BuildError> {
        if config.base_url.trim().is_empty() {
            return Err(BuildError::InvalidConfig {
                provider: config.key.clone(),
                message: "base_url must not be empty".to_string(),
            });
        }
        if config.models.text.trim().is_empty() {
            return Err(BuildError::InvalidConfig {
                provider: config.key.clone(),
                message: "a text model must be configured".to_string(),
            });
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|source| BuildError::Client {
                provider: config.key.clone(),
                source,
            })?;

        Ok(Self {
            key: config.key.clone(),
            config,
            client,
            cache,
            retry,
            rate_limit: Mutex::new(RateLimitInfo::with_default_limit(default_rate_limit)),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn is_available(&self) -> bool {
        self.config.has_credentials()
    }

    /// `{base_url}{path}` without doubled slashes.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    pub fn rate_limit(&self) -> RateLimitInfo {
        match self.rate_limit.lock() {
            Ok(info) => info.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Refreshes the quota snapshot from response headers, leaving absent values untouched.
    pub fn update_rate_limit(&self, headers: &HeaderMap, names: &RateLimitHeaders) {
        let lookup = |candidates: &[&str]| {
            candidates
                .iter()
                .find_map(|name| headers.get(*name))
                .and_then(|value| value.to_str().ok())
                .map(|value| value.trim().to_string())
        };

        let limit = lookup(names.limit).and_then(|v| v.parse::<u32>().ok());
        let remaining = lookup(names.remaining).and_then(|v| v.parse::<u32>().ok());
        let reset = lookup(names.reset);

        if limit.is_none() && remaining.is_none() && reset.is_none() {
            return;
        }

        let mut info = match self.rate_limit.lock() {
            Ok(info) => info,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(limit) = limit {
            info.limit = limit;
        }
        if let Some(remaining) = remaining {
            info.remaining = remaining;
        }
        if reset.is_some() {
            info.reset = reset;
        }
        info.updated_at = Some(chrono::Utc::now());
    }

    /// Replays a cached result for this call when one exists, otherwise runs `call` and stores
    /// its successful result.
    pub async fn cached<T, F, Fut>(
        &self,
        kind: &str,
        payload: &str,
        fingerprint: &str,
        call: F,
    ) -> Result<T, ProviderError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let Some(cache) = &self.cache else {
            return call().await;
        };

        let key = cache_key(&self.key, kind, payload, fingerprint);
        if let Some(hit) = cache.get(&key).await {
            match serde_json::from_str::<T>(&hit) {
                Ok(value) => {
                    debug!(provider = %self.key, kind, "Cache hit");
                    return Ok(value);
                }
                Err(e) => warn!(provider = %self.key, "Discarding unreadable cache entry: {e}"),
            }
        }

        let value = call().await?;
        match serde_json::to_string(&value) {
            Ok(serialized) => cache.put(&key, serialized).await,
            Err(e) => warn!(provider = %self.key, "Failed to serialize result for cache: {e}"),
        }
        Ok(value)
    }

    /// Sends a request built by `build`, retrying on transport errors, 429 and 5xx.
    /// Returns the successful response with its status already checked.
    pub async fn send<B>(&self, build: B) -> Result<Response, ProviderError>
    where
        B: Fn(&Client) -> RequestBuilder,
    {
        let mut last_error: Option<ProviderError> = None;

        for attempt in 0..self.retry.max_attempts {
            if attempt > 0 {
                let delay = self.retry.delay_before(attempt);
                warn!(
                    provider = %self.key,
                    "Attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let result = match build(&self.client).send().await {
                Ok(response) => self.check_status(response).await,
                Err(e) => Err(ProviderError::transport(&self.key, e)),
            };

            match result {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() => last_error = Some(e),
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| ProviderError::Transport {
            provider: self.key.clone(),
            message: "no attempts were made".to_string(),
        }))
    }

    /// Sends a request and decodes its JSON body, returning the response headers alongside.
    pub async fn send_json<T, B>(&self, build: B) -> Result<(T, HeaderMap), ProviderError>
    where
        T: DeserializeOwned,
        B: Fn(&Client) -> RequestBuilder,
    {
        let response = self.send(build).await?;
        let headers = response.headers().clone();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::transport(&self.key, e))?;

        let decoded = serde_json::from_str::<T>(&body).map_err(|e| {
            ProviderError::malformed(
                &self.key,
                format!("{e} (body: {})", truncate_message(&body)),
            )
        })?;

        Ok((decoded, headers))
    }

    async fn check_status(&self, response: Response) -> Result<Response, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = vendor_error_message(&body);
        error!(
            provider = %self.key,
            status = status.as_u16(),
            "Vendor API returned an error: {message}"
        );
        Err(ProviderError::Vendor {
            provider: self.key.clone(),
            status: status.as_u16(),
            message,
        })
    }
}

/// Pulls the human readable message out of the error envelopes vendors commonly use.
pub fn vendor_error_message(body: &str) -> String {
    let parsed = serde_json::from_str::<serde_json::Value>(body).ok();
    let message = parsed.as_ref().and_then(|value| {
        value
            .pointer("/error/message")
            .or_else(|| value.get("message"))
            .or_else(|| value.get("error"))
            .and_then(|m| m.as_str())
            .map(str::to_string)
    });
    message.unwrap_or_else(|| truncate_message(body))
}

pub fn truncate_message(body: &str) -> String {
    let compact = body.trim().replace('\n', " ");
    compact.chars().take(MAX_ERROR_MESSAGE_LEN).collect()
}

/// Milliseconds elapsed since `started`, saturating.
pub fn elapsed_ms(started: std::time::Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
