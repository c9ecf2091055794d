pub mod claude;
pub mod cohere;
pub mod gemini;
pub mod huggingface;
pub mod openai_compat;

use std::sync::Arc;

use crate::ai::cache::CacheHandle;
use crate::ai::provider::{BuildError, ProviderCore, RetryPolicy, TextProvider};
use crate::config::ProviderConfig;

use self::claude::ClaudeProvider;
use self::cohere::CohereProvider;
use self::gemini::GeminiProvider;
use self::huggingface::HuggingFaceProvider;
use self::openai_compat::{OpenAiCompatProvider, GROQ, TOGETHER};

/// Constructs the adapter for a configured provider key.
pub fn build_provider(
    config: &ProviderConfig,
    cache: Option<CacheHandle>,
    retry: RetryPolicy,
) -> Result<Arc<dyn TextProvider>, BuildError> {
    let core = |default_rate_limit: u32| {
        ProviderCore::new(config.clone(), cache.clone(), retry, default_rate_limit)
    };

    let provider: Arc<dyn TextProvider> = match config.key.as_str() {
        "claude" => Arc::new(ClaudeProvider::new(core(claude::DEFAULT_RATE_LIMIT)?)),
        "groq" => Arc::new(OpenAiCompatProvider::new(
            core(GROQ.default_rate_limit)?,
            &GROQ,
        )),
        "together" => Arc::new(OpenAiCompatProvider::new(
            core(TOGETHER.default_rate_limit)?,
            &TOGETHER,
        )),
        "cohere" => Arc::new(CohereProvider::new(core(cohere::DEFAULT_RATE_LIMIT)?)),
        "gemini" => Arc::new(GeminiProvider::new(core(gemini::DEFAULT_RATE_LIMIT)?)),
        "huggingface" => Arc::new(HuggingFaceProvider::new(core(
            huggingface::DEFAULT_RATE_LIMIT,
        )?)),
        other => {
            return Err(BuildError::InvalidConfig {
                provider: other.to_string(),
                message: "no adapter exists for this provider key".to_string(),
            })
        }
    };

    Ok(provider)
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::config::{AiConfig, ProviderConfig};

    /// The default configuration for `key`, pointed at `base_url` with a usable credential.
    pub fn provider_config(key: &str, base_url: &str) -> ProviderConfig {
        let mut config = AiConfig::default()
            .providers
            .into_iter()
            .find(|p| p.key == key)
            .expect("provider key exists in default configuration");
        config.base_url = base_url.to_string();
        config.api_key = Some("test-key".to_string());
        config.enabled = true;
        config
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::provider_config;
    use super::*;

    #[test]
    fn test_builds_every_configured_provider() {
        for key in ["claude", "huggingface", "groq", "cohere", "gemini", "together"] {
            let provider =
                build_provider(&provider_config(key, "http://localhost"), None, RetryPolicy::no_retry())
                    .unwrap();
            assert_eq!(provider.key(), key);
            assert!(provider.is_available());
        }
    }

    #[test]
    fn test_capabilities_per_adapter() {
        let build = |key| {
            build_provider(&provider_config(key, "http://localhost"), None, RetryPolicy::no_retry())
                .unwrap()
        };

        assert!(build("claude").vision().is_some());
        assert!(build("claude").embeddings().is_none());
        assert!(build("cohere").embeddings().is_some());
        assert!(build("cohere").vision().is_none());
        assert!(build("gemini").embeddings().is_some());
        assert!(build("gemini").vision().is_some());
        assert!(build("huggingface").embeddings().is_some());
        assert!(build("together").vision().is_none());
    }

    #[test]
    fn test_unknown_key_is_a_build_error() {
        let mut config = provider_config("groq", "http://localhost");
        config.key = "mistral".to_string();
        let result = build_provider(&config, None, RetryPolicy::no_retry());
        assert!(matches!(result, Err(BuildError::InvalidConfig { .. })));
    }

    #[test]
    fn test_default_rate_limits() {
        let limit = |key| {
            build_provider(&provider_config(key, "http://localhost"), None, RetryPolicy::no_retry())
                .unwrap()
                .rate_limit_info()
                .limit
        };
        assert_eq!(limit("claude"), 50);
        assert_eq!(limit("groq"), 30);
        assert_eq!(limit("together"), 60);
        assert_eq!(limit("gemini"), 60);
        assert_eq!(limit("cohere"), 100);
        assert_eq!(limit("huggingface"), 100);
    }
}
