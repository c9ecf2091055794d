//! Shared data model for the AI layer: request options, provider results, metadata, and the
//! provider error taxonomy.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_TOP_P: f32 = 0.95;
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant for job applications.";

// ────────────────────────────────────────────────────────────────────────────
// Strategy
// ────────────────────────────────────────────────────────────────────────────

/// How one logical text request is spread across the registered providers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    #[default]
    Single,
    Fastest,
    Weighted,
    Consensus,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Single => "single",
            Strategy::Fastest => "fastest",
            Strategy::Weighted => "weighted",
            Strategy::Consensus => "consensus",
        }
    }

    /// Lenient parse used for configuration values: anything unrecognized means `single`.
    pub fn parse_or_single(value: &str) -> Self {
        value.parse().unwrap_or(Strategy::Single)
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(Strategy::Single),
            "fastest" => Ok(Strategy::Fastest),
            "weighted" => Ok(Strategy::Weighted),
            "consensus" => Ok(Strategy::Consensus),
            other => Err(format!("unknown strategy '{other}'")),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Options
// ────────────────────────────────────────────────────────────────────────────

/// Per-request generation options. Unset values fall back to vendor defaults inside each adapter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Strategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

impl GenerationOptions {
    pub fn with_strategy(strategy: Strategy) -> Self {
        Self {
            strategy: Some(strategy),
            ..Self::default()
        }
    }

    pub fn temperature_or_default(&self) -> f32 {
        self.temperature.unwrap_or(DEFAULT_TEMPERATURE)
    }

    pub fn top_p_or_default(&self) -> f32 {
        self.top_p.unwrap_or(DEFAULT_TOP_P)
    }

    pub fn system_or_default(&self) -> &str {
        self.system.as_deref().unwrap_or(DEFAULT_SYSTEM_PROMPT)
    }

    /// Canonical form of the options that influence a single vendor call.
    /// Strategy and provider selection are aggregator concerns and are left out.
    pub fn cache_fingerprint(&self) -> String {
        serde_json::json!({
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "top_p": self.top_p,
            "system": self.system,
            "stop": self.stop,
        })
        .to_string()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Provider results
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u32>,
}

impl Usage {
    pub fn new(input_tokens: Option<u32>, output_tokens: Option<u32>) -> Self {
        let total_tokens = match (input_tokens, output_tokens) {
            (Some(input), Some(output)) => input.checked_add(output),
            _ => None,
        };
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }

    /// Sums token counts across providers. A count stays `None` only if no provider reported it.
    pub fn accumulate<'a>(usages: impl IntoIterator<Item = &'a Usage>) -> Usage {
        fn add(acc: Option<u32>, value: Option<u32>) -> Option<u32> {
            match (acc, value) {
                (Some(a), Some(b)) => Some(a.saturating_add(b)),
                (None, v) | (v, None) => v,
            }
        }

        usages.into_iter().fold(Usage::default(), |acc, usage| Usage {
            input_tokens: add(acc.input_tokens, usage.input_tokens),
            output_tokens: add(acc.output_tokens, usage.output_tokens),
            total_tokens: add(acc.total_tokens, usage.total_tokens),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionMetadata {
    /// Wall-clock duration of the vendor call in milliseconds.
    pub response_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// A successful text generation from one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub provider: String,
    pub model: String,
    pub text: String,
    pub usage: Usage,
    pub metadata: CompletionMetadata,
}

/// A successful embedding from one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub provider: String,
    pub model: String,
    pub embedding: Vec<f64>,
    pub dimensions: usize,
}

impl Embedding {
    pub fn new(provider: &str, model: &str, embedding: Vec<f64>) -> Self {
        Self {
            provider: provider.to_string(),
            model: model.to_string(),
            dimensions: embedding.len(),
            embedding,
        }
    }
}

/// A successful image analysis from one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAnalysis {
    pub provider: String,
    pub model: String,
    pub analysis: String,
    pub usage: Usage,
}

// ────────────────────────────────────────────────────────────────────────────
// Metadata
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub text_models: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vision_models: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding_models: Vec<String>,
    pub current_text_model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_vision_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_embedding_model: Option<String>,
    pub supports_vision: bool,
    pub supports_embeddings: bool,
    pub supports_streaming: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_window: Option<u32>,
}

/// Last known request quota for a provider. Starts at adapter defaults and is refreshed from
/// rate-limit response headers when the vendor sends them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitInfo {
    pub limit: u32,
    pub remaining: u32,
    pub reset: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl RateLimitInfo {
    pub fn with_default_limit(limit: u32) -> Self {
        Self {
            limit,
            remaining: limit,
            reset: None,
            updated_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    TextGeneration,
    Embedding,
    ImageAnalysis,
    Streaming,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Capability::TextGeneration => "text generation",
            Capability::Embedding => "embedding generation",
            Capability::ImageAnalysis => "image analysis",
            Capability::Streaming => "streaming",
        };
        f.write_str(label)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Everything that can go wrong in a single adapter call. The message is for logs only;
/// callers branch on success vs failure, never on the text.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderError {
    #[error("{provider} transport error: {message}")]
    Transport { provider: String, message: String },

    #[error("{provider} API error (status {status}): {message}")]
    Vendor {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("{capability} is not supported by the {provider} provider")]
    Unsupported {
        provider: String,
        capability: Capability,
    },

    #[error("{provider} returned a malformed response: {message}")]
    MalformedResponse { provider: String, message: String },
}

impl ProviderError {
    pub fn transport(provider: &str, error: reqwest::Error) -> Self {
        let message = if error.is_timeout() {
            format!("request timed out: {error}")
        } else {
            error.to_string()
        };
        ProviderError::Transport {
            provider: provider.to_string(),
            message,
        }
    }

    pub fn malformed(provider: &str, message: impl Into<String>) -> Self {
        ProviderError::MalformedResponse {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    pub fn unsupported(provider: &str, capability: Capability) -> Self {
        ProviderError::Unsupported {
            provider: provider.to_string(),
            capability,
        }
    }

    /// Rate limiting, server errors, and network failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Transport { .. } => true,
            ProviderError::Vendor { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_parses_case_insensitively() {
        assert_eq!("Weighted".parse::<Strategy>(), Ok(Strategy::Weighted));
        assert_eq!(" consensus ".parse::<Strategy>(), Ok(Strategy::Consensus));
        assert!("loudest".parse::<Strategy>().is_err());
    }

    #[test]
    fn test_unknown_strategy_falls_back_to_single() {
        assert_eq!(Strategy::parse_or_single("round-robin"), Strategy::Single);
        assert_eq!(Strategy::parse_or_single("fastest"), Strategy::Fastest);
    }

    #[test]
    fn test_strategy_serializes_lowercase() {
        let json = serde_json::to_string(&Strategy::Consensus).unwrap();
        assert_eq!(json, r#""consensus""#);
    }

    #[test]
    fn test_option_defaults() {
        let options = GenerationOptions::default();
        assert!((options.temperature_or_default() - 0.7).abs() < f32::EPSILON);
        assert!((options.top_p_or_default() - 0.95).abs() < f32::EPSILON);
        assert_eq!(options.system_or_default(), DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn test_cache_fingerprint_ignores_strategy_and_provider() {
        let a = GenerationOptions {
            strategy: Some(Strategy::Weighted),
            provider: Some("groq".to_string()),
            temperature: Some(0.3),
            ..GenerationOptions::default()
        };
        let b = GenerationOptions {
            temperature: Some(0.3),
            ..GenerationOptions::default()
        };
        assert_eq!(a.cache_fingerprint(), b.cache_fingerprint());

        let c = GenerationOptions {
            temperature: Some(0.9),
            ..GenerationOptions::default()
        };
        assert_ne!(b.cache_fingerprint(), c.cache_fingerprint());
    }

    #[test]
    fn test_usage_total_is_sum_of_parts() {
        let usage = Usage::new(Some(12), Some(30));
        assert_eq!(usage.total_tokens, Some(42));
        assert_eq!(Usage::new(Some(12), None).total_tokens, None);
    }

    #[test]
    fn test_usage_accumulate_keeps_reported_counts() {
        let usages = [Usage::new(Some(10), Some(5)), Usage::new(None, Some(7))];
        let total = Usage::accumulate(usages.iter());
        assert_eq!(total.input_tokens, Some(10));
        assert_eq!(total.output_tokens, Some(12));
        assert_eq!(total.total_tokens, Some(15));
    }

    #[test]
    fn test_retryable_errors() {
        let rate_limited = ProviderError::Vendor {
            provider: "groq".into(),
            status: 429,
            message: "slow down".into(),
        };
        let bad_request = ProviderError::Vendor {
            provider: "groq".into(),
            status: 400,
            message: "bad".into(),
        };
        assert!(rate_limited.is_retryable());
        assert!(!bad_request.is_retryable());
        assert!(!ProviderError::unsupported("groq", Capability::Embedding).is_retryable());
    }

    #[test]
    fn test_unsupported_message_names_capability() {
        let err = ProviderError::unsupported("claude", Capability::Embedding);
        assert_eq!(
            err.to_string(),
            "embedding generation is not supported by the claude provider"
        );
    }
}
