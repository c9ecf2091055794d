//! In-process providers for exercising the aggregator without network access.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::ai::provider::{EmbeddingProvider, TextProvider, VisionProvider};
use crate::ai::types::{
    Completion, CompletionMetadata, Embedding, GenerationOptions, ImageAnalysis, ModelInfo,
    ProviderError, RateLimitInfo, Usage,
};

pub struct FakeProvider {
    key: String,
    text: Result<String, ProviderError>,
    available: bool,
    delay: Duration,
    embedding: Option<Vec<f64>>,
    analysis: Option<String>,
    calls: Arc<AtomicUsize>,
}

impl FakeProvider {
    pub fn ok(key: &str, text: &str) -> Self {
        Self {
            key: key.to_string(),
            text: Ok(text.to_string()),
            available: true,
            delay: Duration::ZERO,
            embedding: None,
            analysis: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(key: &str) -> Self {
        let mut provider = Self::ok(key, "");
        provider.text = Err(ProviderError::Vendor {
            provider: key.to_string(),
            status: 500,
            message: "upstream exploded".to_string(),
        });
        provider
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_embedding(mut self, vector: Vec<f64>) -> Self {
        self.embedding = Some(vector);
        self
    }

    pub fn with_analysis(mut self, analysis: &str) -> Self {
        self.analysis = Some(analysis.to_string());
        self
    }

    /// Shared counter of every vendor-facing call made on this provider.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    async fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[async_trait]
impl TextProvider for FakeProvider {
    fn key(&self) -> &str {
        &self.key
    }

    fn name(&self) -> &str {
        "Fake"
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            text_models: vec!["fake-1".to_string()],
            current_text_model: "fake-1".to_string(),
            supports_embeddings: self.embedding.is_some(),
            supports_vision: self.analysis.is_some(),
            ..ModelInfo::default()
        }
    }

    fn rate_limit_info(&self) -> RateLimitInfo {
        RateLimitInfo::with_default_limit(10)
    }

    async fn generate_text(
        &self,
        _prompt: &str,
        _options: &GenerationOptions,
    ) -> Result<Completion, ProviderError> {
        self.record_call().await;
        let text = self.text.clone()?;
        Ok(Completion {
            provider: self.key.clone(),
            model: "fake-1".to_string(),
            text,
            usage: Usage::new(Some(10), Some(5)),
            metadata: CompletionMetadata {
                response_time_ms: u64::try_from(self.delay.as_millis()).unwrap_or(0),
                finish_reason: Some("stop".to_string()),
            },
        })
    }

    async fn try_stream_text(
        &self,
        _prompt: &str,
        _options: &GenerationOptions,
        on_chunk: &mut (dyn FnMut(String) + Send),
    ) -> Result<(), ProviderError> {
        self.record_call().await;
        let text = self.text.clone()?;
        for word in text.split_inclusive(' ') {
            on_chunk(word.to_string());
        }
        Ok(())
    }

    fn embeddings(&self) -> Option<&dyn EmbeddingProvider> {
        self.embedding.as_ref().map(|_| self as &dyn EmbeddingProvider)
    }

    fn vision(&self) -> Option<&dyn VisionProvider> {
        self.analysis.as_ref().map(|_| self as &dyn VisionProvider)
    }
}

#[async_trait]
impl EmbeddingProvider for FakeProvider {
    async fn generate_embedding(&self, _text: &str) -> Result<Embedding, ProviderError> {
        self.record_call().await;
        let vector = self.embedding.clone().unwrap_or_default();
        Ok(Embedding::new(&self.key, "fake-embed", vector))
    }
}

#[async_trait]
impl VisionProvider for FakeProvider {
    async fn analyze_image(
        &self,
        _image_base64: &str,
        _prompt: &str,
    ) -> Result<ImageAnalysis, ProviderError> {
        self.record_call().await;
        Ok(ImageAnalysis {
            provider: self.key.clone(),
            model: "fake-vision".to_string(),
            analysis: self.analysis.clone().unwrap_or_default(),
            usage: Usage::default(),
        })
    }
}
