use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::ai::cache::CacheHandle;
use crate::ai::provider::{BuildError, RetryPolicy, TextProvider};
use crate::ai::providers::build_provider;
use crate::config::AiConfig;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("provider key must not be empty")]
    EmptyKey,

    #[error("provider '{0}' is already registered")]
    Duplicate(String),

    #[error(transparent)]
    Build(#[from] BuildError),
}

/// The adapters one aggregator dispatches to. Iteration order is registration order, which is
/// configuration order when built with [`ProviderRegistry::from_config`].
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn TextProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds one adapter per enabled, credentialed provider. Adapters that fail to construct
    /// are logged and left out.
    pub fn from_config(config: &AiConfig, cache: Option<CacheHandle>) -> Self {
        let retry = RetryPolicy::new(config.aggregation.max_retries);
        let mut registry = Self::new();

        for provider_config in &config.providers {
            if !provider_config.enabled || !provider_config.has_credentials() {
                continue;
            }

            let result = build_provider(provider_config, cache.clone(), retry)
                .map_err(RegistryError::from)
                .and_then(|provider| registry.register_shared(provider));

            if let Err(e) = result {
                warn!(provider = %provider_config.key, "Failed to initialize provider: {e}");
            }
        }

        info!(
            "Provider registry ready with {} provider(s): [{}]",
            registry.len(),
            registry.keys().collect::<Vec<_>>().join(", ")
        );
        registry
    }

    pub fn register<P>(&mut self, provider: P) -> Result<(), RegistryError>
    where
        P: TextProvider + 'static,
    {
        self.register_shared(Arc::new(provider))
    }

    pub fn register_shared(&mut self, provider: Arc<dyn TextProvider>) -> Result<(), RegistryError> {
        let key = provider.key().trim();
        if key.is_empty() {
            return Err(RegistryError::EmptyKey);
        }
        if self.get(key).is_some() {
            return Err(RegistryError::Duplicate(key.to_string()));
        }

        self.providers.push(provider);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Arc<dyn TextProvider>> {
        self.providers.iter().find(|p| p.key() == key)
    }

    /// Providers whose availability check currently passes, in registry order.
    pub fn available(&self) -> impl Iterator<Item = &Arc<dyn TextProvider>> {
        self.providers.iter().filter(|p| p.is_available())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.providers.iter().map(|p| p.key())
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
