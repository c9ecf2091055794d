use std::collections::HashMap;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::ai::types::Strategy;

/// Weight given to providers that have no entry in the weights table.
pub const DEFAULT_PROVIDER_WEIGHT: f64 = 0.2;
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const PLACEHOLDER_API_KEY: &str = "your_key_here";

/// Application configuration loaded from environment variables.
/// Fails at startup if a variable is present but malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,
    /// When set, the response cache is backed by Redis instead of process memory.
    pub redis_url: Option<String>,
    pub ai: AiConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            port: env_parse("PORT", 8080)?,
            rust_log: env_or("RUST_LOG", "info"),
            redis_url: env_opt("REDIS_URL"),
            ai: AiConfig::from_env()?,
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// AI configuration
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderModels {
    pub text: String,
    #[serde(default)]
    pub embedding: Option<String>,
    #[serde(default)]
    pub vision: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub key: String,
    pub enabled: bool,
    #[serde(default)]
    pub api_key: Option<String>,
    pub base_url: String,
    pub models: ProviderModels,
    /// Vendor default for `max_tokens` when the request leaves it unset.
    #[serde(default)]
    pub max_tokens: Option<u32>,
    pub timeout_secs: u64,
}

impl ProviderConfig {
    fn new(key: &str, enabled: bool, base_url: &str, models: ProviderModels) -> Self {
        Self {
            key: key.to_string(),
            enabled,
            api_key: None,
            base_url: base_url.to_string(),
            models,
            max_tokens: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// A credential counts only if it is non-empty and not the sample placeholder.
    pub fn has_credentials(&self) -> bool {
        self.api_key
            .as_deref()
            .map(str::trim)
            .is_some_and(|key| !key.is_empty() && key != PLACEHOLDER_API_KEY)
    }

    pub fn api_key(&self) -> &str {
        self.api_key.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationConfig {
    pub strategy: Strategy,
    pub weights: HashMap<String, f64>,
    pub consensus_threshold: f64,
    /// Total attempts per vendor call (including the first).
    pub max_retries: u32,
}

impl AggregationConfig {
    pub fn weight_for(&self, provider: &str) -> f64 {
        self.weights
            .get(provider)
            .copied()
            .unwrap_or(DEFAULT_PROVIDER_WEIGHT)
    }
}

impl Default for AggregationConfig {
    fn default() -> Self {
        let weights = [
            ("claude", 0.30),
            ("huggingface", 0.12),
            ("groq", 0.20),
            ("cohere", 0.18),
            ("gemini", 0.20),
            ("together", 0.10),
        ]
        .into_iter()
        .map(|(key, weight)| (key.to_string(), weight))
        .collect();

        Self {
            strategy: Strategy::Weighted,
            weights,
            consensus_threshold: 0.7,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiConfig {
    /// Registry order is the order of this list.
    pub providers: Vec<ProviderConfig>,
    pub aggregation: AggregationConfig,
    pub cache: CacheConfig,
    pub default_provider: String,
}

impl Default for AiConfig {
    fn default() -> Self {
        let mut claude = ProviderConfig::new(
            "claude",
            false,
            "https://api.anthropic.com",
            ProviderModels {
                text: "claude-3-5-sonnet-20241022".to_string(),
                embedding: None,
                vision: None,
            },
        );
        claude.max_tokens = Some(4096);

        let huggingface = ProviderConfig::new(
            "huggingface",
            false,
            "https://api-inference.huggingface.co",
            ProviderModels {
                text: "google/flan-t5-base".to_string(),
                embedding: Some("sentence-transformers/all-MiniLM-L6-v2".to_string()),
                vision: None,
            },
        );

        let groq = ProviderConfig::new(
            "groq",
            true,
            "https://api.groq.com/openai/v1",
            ProviderModels {
                text: "llama-3.1-8b-instant".to_string(),
                embedding: None,
                vision: Some("llava-v1.5-7b-4096-preview".to_string()),
            },
        );

        let cohere = ProviderConfig::new(
            "cohere",
            true,
            "https://api.cohere.ai/v1",
            ProviderModels {
                text: "command".to_string(),
                embedding: Some("embed-english-v3.0".to_string()),
                vision: None,
            },
        );

        let gemini = ProviderConfig::new(
            "gemini",
            true,
            "https://generativelanguage.googleapis.com/v1beta",
            ProviderModels {
                text: "gemini-1.5-flash".to_string(),
                embedding: Some("text-embedding-004".to_string()),
                vision: Some("gemini-1.5-flash".to_string()),
            },
        );

        let together = ProviderConfig::new(
            "together",
            true,
            "https://api.together.xyz/v1",
            ProviderModels {
                text: "meta-llama/Llama-3.2-3B-Instruct-Turbo".to_string(),
                embedding: None,
                vision: None,
            },
        );

        Self {
            providers: vec![claude, huggingface, groq, cohere, gemini, together],
            aggregation: AggregationConfig::default(),
            cache: CacheConfig::default(),
            default_provider: "groq".to_string(),
        }
    }
}

impl AiConfig {
    /// Starts from the built-in defaults and applies environment overrides.
    pub fn from_env() -> Result<Self> {
        let mut config = AiConfig::default();

        for provider in &mut config.providers {
            let upper = provider.key.to_ascii_uppercase();
            provider.enabled = env_flag(&format!("AI_{upper}_ENABLED"), provider.enabled)?;
            provider.api_key = env_opt(&format!("{upper}_API_KEY"));
            if let Some(url) = env_opt(&format!("{upper}_API_URL")) {
                provider.base_url = url;
            }
            if let Some(model) = env_opt(&format!("{upper}_MODEL")) {
                provider.models.text = model;
            }
            if let Some(max_tokens) = env_opt(&format!("{upper}_MAX_TOKENS")) {
                provider.max_tokens = Some(parse_value(&format!("{upper}_MAX_TOKENS"), &max_tokens)?);
            }
            provider.timeout_secs =
                env_parse(&format!("{upper}_TIMEOUT"), provider.timeout_secs)?;
        }

        if let Some(strategy) = env_opt("AI_AGGREGATION_STRATEGY") {
            config.aggregation.strategy = Strategy::parse_or_single(&strategy);
        }
        if let Some(raw) = env_opt("AI_CONSENSUS_THRESHOLD") {
            config.aggregation.consensus_threshold =
                parse_threshold("AI_CONSENSUS_THRESHOLD", &raw)?;
        }
        config.aggregation.max_retries =
            env_parse("AI_MAX_RETRIES", config.aggregation.max_retries)?;

        config.cache.enabled = env_flag("AI_CACHE_ENABLED", config.cache.enabled)?;
        config.cache.ttl_secs = env_parse("AI_CACHE_TTL", config.cache.ttl_secs)?;
        config.default_provider = env_or("AI_DEFAULT_PROVIDER", &config.default_provider);

        Ok(config)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Env helpers
// ────────────────────────────────────────────────────────────────────────────

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    env_opt(key).unwrap_or_else(|| default.to_string())
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env_opt(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn env_flag(key: &str, default: bool) -> Result<bool> {
    match env_opt(key) {
        Some(raw) => parse_flag(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.parse::<T>()
        .with_context(|| format!("Environment variable '{key}' has an invalid value '{raw}'"))
}

/// A finite ratio, clamped into [0, 1]. NaN and infinities are rejected.
fn parse_threshold(key: &str, raw: &str) -> Result<f64> {
    let threshold: f64 = parse_value(key, raw)?;
    if !threshold.is_finite() {
        bail!("Environment variable '{key}' must be a finite number, got '{raw}'");
    }
    Ok(threshold.clamp(0.0, 1.0))
}

fn parse_flag(key: &str, raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => bail!("Environment variable '{key}' must be a boolean, got '{raw}'"),
    }
}
