//! Dispatches one logical request across the registered providers and merges the results.
//!
//! Provider failures never escape as errors: every public operation returns an [`AiOutcome`],
//! which is either the success payload or the uniform `{ "error": true, "message": ... }`
//! record. How that record maps onto a transport status is the caller's concern.

use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::ai::cache::CacheHandle;
use crate::ai::merge::{
    average_embeddings, combine_analyses, consensus_merge, consensus_score, weighted_merge,
    AveragedEmbedding, WeightedText,
};
use crate::ai::provider::{error_chunk, TextProvider};
use crate::ai::registry::ProviderRegistry;
use crate::ai::types::{
    Completion, GenerationOptions, ModelInfo, RateLimitInfo, Strategy, Usage,
};
use crate::config::{AggregationConfig, AiConfig};

pub const NO_PROVIDERS: &str = "No providers available";
pub const ALL_PROVIDERS_FAILED: &str = "All providers failed";
pub const NO_EMBEDDING_PROVIDERS: &str = "No embedding providers available";
pub const NO_VISION_PROVIDERS: &str = "No vision providers available";

// ────────────────────────────────────────────────────────────────────────────
// Outcome types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    pub error: bool,
    pub message: String,
}

/// Success payload or the uniform failure record. Serializes as one or the other, untagged.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AiOutcome<T> {
    Success(T),
    Failure(Failure),
}

impl<T> AiOutcome<T> {
    pub fn failure(message: impl Into<String>) -> Self {
        AiOutcome::Failure(Failure {
            error: true,
            message: message.into(),
        })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AiOutcome::Success(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> AiOutcome<U> {
        match self {
            AiOutcome::Success(value) => AiOutcome::Success(f(value)),
            AiOutcome::Failure(failure) => AiOutcome::Failure(failure),
        }
    }

    pub fn into_result(self) -> Result<T, Failure> {
        match self {
            AiOutcome::Success(value) => Ok(value),
            AiOutcome::Failure(failure) => Err(failure),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndividualResponse {
    pub provider: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextGeneration {
    pub strategy: Strategy,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub providers_used: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consensus_score: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub individual_responses: Vec<IndividualResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
}

impl TextGeneration {
    fn from_completion(strategy: Strategy, completion: Completion) -> Self {
        Self {
            strategy,
            providers_used: vec![completion.provider.clone()],
            provider: Some(completion.provider),
            text: completion.text,
            consensus_score: None,
            individual_responses: Vec::new(),
            usage: Some(completion.usage),
            model: Some(completion.model),
            response_time_ms: Some(completion.metadata.response_time_ms),
        }
    }

    fn merged(strategy: Strategy, text: String, completions: &[Completion]) -> Self {
        Self {
            strategy,
            text,
            provider: None,
            providers_used: completions.iter().map(|c| c.provider.clone()).collect(),
            consensus_score: None,
            individual_responses: Vec::new(),
            usage: Some(Usage::accumulate(completions.iter().map(|c| &c.usage))),
            model: None,
            response_time_ms: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderAnalysis {
    pub provider: String,
    pub analysis: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CombinedAnalysis {
    pub analyses: Vec<ProviderAnalysis>,
    pub combined_analysis: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderListing {
    pub key: String,
    pub name: String,
    pub models: ModelInfo,
    pub rate_limit: RateLimitInfo,
}

// ────────────────────────────────────────────────────────────────────────────
// Aggregator
// ────────────────────────────────────────────────────────────────────────────

pub struct AiAggregator {
    registry: ProviderRegistry,
    settings: AggregationConfig,
    default_provider: String,
}

impl AiAggregator {
    pub fn new(
        registry: ProviderRegistry,
        settings: AggregationConfig,
        default_provider: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            settings,
            default_provider: default_provider.into(),
        }
    }

    pub fn from_config(config: &AiConfig, cache: Option<CacheHandle>) -> Self {
        let registry = ProviderRegistry::from_config(config, cache);
        Self::new(
            registry,
            config.aggregation.clone(),
            config.default_provider.clone(),
        )
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn default_provider(&self) -> &str {
        &self.default_provider
    }

    pub fn default_strategy(&self) -> Strategy {
        self.settings.strategy
    }

    /// Runs the requested strategy, or the configured default when the options name none.
    pub async fn generate_text(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> AiOutcome<TextGeneration> {
        let strategy = options.strategy.unwrap_or(self.settings.strategy);
        let request_id = Uuid::new_v4();
        let span = info_span!("ai_generate", %request_id, strategy = strategy.as_str());

        async move {
            info!(
                available = self.registry.available().count(),
                "Dispatching text generation"
            );
            match strategy {
                Strategy::Single => self.generate_single(prompt, options).await,
                Strategy::Fastest => self.generate_fastest(prompt, options).await,
                Strategy::Weighted => self.generate_weighted(prompt, options).await,
                Strategy::Consensus => self.generate_consensus(prompt, options).await,
            }
        }
        .instrument(span)
        .await
    }

    fn resolve(&self, options: &GenerationOptions) -> Result<&Arc<dyn TextProvider>, String> {
        let key = options
            .provider
            .as_deref()
            .unwrap_or(self.default_provider.as_str());
        self.registry
            .get(key)
            .filter(|p| p.is_available())
            .ok_or_else(|| format!("Provider {key} not available"))
    }

    async fn generate_single(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> AiOutcome<TextGeneration> {
        let provider = match self.resolve(options) {
            Ok(provider) => provider,
            Err(message) => {
                warn!("{message}");
                return AiOutcome::failure(message);
            }
        };

        match provider.generate_text(prompt, options).await {
            Ok(completion) => {
                AiOutcome::Success(TextGeneration::from_completion(Strategy::Single, completion))
            }
            Err(e) => {
                warn!(provider = provider.key(), "Single-provider generation failed: {e}");
                AiOutcome::failure(e.to_string())
            }
        }
    }

    /// All available providers run concurrently; the winner is the first success in registry
    /// order. Calls still running once a winner is known are aborted.
    async fn generate_fastest(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> AiOutcome<TextGeneration> {
        let providers: Vec<Arc<dyn TextProvider>> = self.registry.available().cloned().collect();
        if providers.is_empty() {
            return AiOutcome::failure(NO_PROVIDERS);
        }

        let mut handles = providers
            .into_iter()
            .map(|provider| {
                let prompt = prompt.to_string();
                let options = options.clone();
                let key = provider.key().to_string();
                let handle = tokio::spawn(
                    async move { provider.generate_text(&prompt, &options).await }
                        .in_current_span(),
                );
                (key, handle)
            })
            .collect::<Vec<_>>()
            .into_iter();

        let mut winner = None;
        for (key, handle) in handles.by_ref() {
            match handle.await {
                Ok(Ok(completion)) => {
                    winner = Some(completion);
                    break;
                }
                Ok(Err(e)) => warn!(provider = %key, "Provider failed: {e}"),
                Err(e) => warn!(provider = %key, "Provider task did not complete: {e}"),
            }
        }
        for (_, handle) in handles {
            handle.abort();
        }

        match winner {
            Some(completion) => {
                debug!(provider = %completion.provider, "Fastest strategy selected provider");
                AiOutcome::Success(TextGeneration::from_completion(Strategy::Fastest, completion))
            }
            None => AiOutcome::failure(ALL_PROVIDERS_FAILED),
        }
    }

    /// Queries every available provider concurrently and keeps the successes in registry order.
    async fn query_all(&self, prompt: &str, options: &GenerationOptions) -> Vec<Completion> {
        let providers: Vec<&Arc<dyn TextProvider>> = self.registry.available().collect();
        let results = join_all(
            providers
                .iter()
                .map(|provider| provider.generate_text(prompt, options)),
        )
        .await;

        providers
            .iter()
            .zip(results)
            .filter_map(|(provider, result)| match result {
                Ok(completion) => Some(completion),
                Err(e) => {
                    warn!(provider = provider.key(), "Provider failed: {e}");
                    None
                }
            })
            .collect()
    }

    async fn generate_weighted(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> AiOutcome<TextGeneration> {
        let completions = self.query_all(prompt, options).await;
        if completions.is_empty() {
            return AiOutcome::failure(NO_PROVIDERS);
        }
        debug!(succeeded = completions.len(), "Merging weighted responses");

        let weighted: Vec<WeightedText<'_>> = completions
            .iter()
            .map(|c| WeightedText {
                text: &c.text,
                weight: self.settings.weight_for(&c.provider),
            })
            .collect();
        let text = weighted_merge(&weighted);

        let mut generation = TextGeneration::merged(Strategy::Weighted, text, &completions);
        generation.individual_responses = completions
            .iter()
            .zip(&weighted)
            .map(|(c, w)| IndividualResponse {
                provider: c.provider.clone(),
                text: c.text.clone(),
                weight: Some(w.weight),
            })
            .collect();
        AiOutcome::Success(generation)
    }

    async fn generate_consensus(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> AiOutcome<TextGeneration> {
        let completions = self.query_all(prompt, options).await;
        if completions.is_empty() {
            return AiOutcome::failure(NO_PROVIDERS);
        }

        let texts: Vec<&str> = completions.iter().map(|c| c.text.as_str()).collect();
        let text = consensus_merge(&texts, self.settings.consensus_threshold);
        let score = consensus_score(&texts);
        debug!(succeeded = completions.len(), score, "Computed consensus");

        let mut generation = TextGeneration::merged(Strategy::Consensus, text, &completions);
        generation.consensus_score = Some(score);
        generation.individual_responses = completions
            .iter()
            .map(|c| IndividualResponse {
                provider: c.provider.clone(),
                text: c.text.clone(),
                weight: None,
            })
            .collect();
        AiOutcome::Success(generation)
    }

    /// Streams from one provider (the requested one or the default). Every outcome, including
    /// an unknown provider, is delivered through `on_chunk`.
    pub async fn stream_text(
        &self,
        prompt: &str,
        options: &GenerationOptions,
        on_chunk: &mut (dyn FnMut(String) + Send),
    ) {
        match self.resolve(options) {
            Ok(provider) => provider.stream_text(prompt, options, on_chunk).await,
            Err(message) => {
                warn!("{message}");
                on_chunk(error_chunk(&message));
            }
        }
    }

    /// Element-wise mean of the embeddings from every available embedding-capable provider.
    pub async fn generate_embedding(&self, text: &str) -> AiOutcome<AveragedEmbedding> {
        let calls = self.registry.available().filter_map(|provider| {
            let embeddings = provider.embeddings()?;
            Some(async move { (provider.key(), embeddings.generate_embedding(text).await) })
        });

        let successes: Vec<_> = join_all(calls)
            .await
            .into_iter()
            .filter_map(|(key, result)| match result {
                Ok(embedding) => Some(embedding),
                Err(e) => {
                    warn!(provider = key, "Embedding failed: {e}");
                    None
                }
            })
            .collect();

        match average_embeddings(&successes) {
            Some(averaged) => AiOutcome::Success(averaged),
            None => AiOutcome::failure(NO_EMBEDDING_PROVIDERS),
        }
    }

    /// Runs every available vision-capable provider. `image` may carry a `data:` URI prefix.
    pub async fn analyze_image(&self, image: &str, prompt: &str) -> AiOutcome<CombinedAnalysis> {
        let image = strip_data_uri(image);
        let calls = self.registry.available().filter_map(|provider| {
            let vision = provider.vision()?;
            Some(async move { (provider.key(), vision.analyze_image(image, prompt).await) })
        });

        let analyses: Vec<ProviderAnalysis> = join_all(calls)
            .await
            .into_iter()
            .filter_map(|(key, result)| match result {
                Ok(analysis) => Some(ProviderAnalysis {
                    provider: key.to_string(),
                    analysis: analysis.analysis,
                }),
                Err(e) => {
                    warn!(provider = key, "Image analysis failed: {e}");
                    None
                }
            })
            .collect();

        if analyses.is_empty() {
            return AiOutcome::failure(NO_VISION_PROVIDERS);
        }

        let combined_analysis = combine_analyses(
            analyses
                .iter()
                .map(|a| (a.provider.as_str(), a.analysis.as_str())),
        );
        AiOutcome::Success(CombinedAnalysis {
            analyses,
            combined_analysis,
        })
    }

    /// Metadata for every currently available provider, in registry order.
    pub fn available_providers(&self) -> Vec<ProviderListing> {
        self.registry
            .available()
            .map(|provider| ProviderListing {
                key: provider.key().to_string(),
                name: provider.name().to_string(),
                models: provider.model_info(),
                rate_limit: provider.rate_limit_info(),
            })
            .collect()
    }
}

/// Drops a `data:<mime>;base64,` prefix, leaving raw base64.
pub fn strip_data_uri(image: &str) -> &str {
    match image.strip_prefix("data:") {
        Some(rest) => rest.split_once(',').map_or(image, |(_, data)| data),
        None => image,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use super::*;
    use crate::ai::testing::FakeProvider;

    fn settings(weights: &[(&str, f64)], threshold: f64) -> AggregationConfig {
        AggregationConfig {
            strategy: Strategy::Weighted,
            weights: weights
                .iter()
                .map(|(k, w)| (k.to_string(), *w))
                .collect::<HashMap<_, _>>(),
            consensus_threshold: threshold,
            max_retries: 1,
        }
    }

    fn aggregator(providers: Vec<FakeProvider>) -> AiAggregator {
        let mut registry = ProviderRegistry::new();
        for provider in providers {
            registry.register(provider).unwrap();
        }
        AiAggregator::new(registry, settings(&[], 0.7), "a")
    }

    fn options(strategy: Strategy) -> GenerationOptions {
        GenerationOptions::with_strategy(strategy)
    }

    fn failure_message<T: std::fmt::Debug>(outcome: AiOutcome<T>) -> String {
        match outcome {
            AiOutcome::Failure(f) => {
                assert!(f.error);
                f.message
            }
            AiOutcome::Success(s) => panic!("expected failure, got {s:?}"),
        }
    }

    #[tokio::test]
    async fn test_unavailable_providers_are_never_called() {
        let hidden = FakeProvider::ok("hidden", "Never.").unavailable();
        let calls = hidden.call_counter();
        let agg = aggregator(vec![FakeProvider::ok("a", "Visible."), hidden]);

        for strategy in [
            Strategy::Fastest,
            Strategy::Weighted,
            Strategy::Consensus,
        ] {
            assert!(agg.generate_text("p", &options(strategy)).await.is_success());
        }
        let mut single = options(Strategy::Single);
        single.provider = Some("hidden".to_string());
        assert!(!agg.generate_text("p", &single).await.is_success());

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_single_with_unknown_provider_fails_without_calls() {
        let a = FakeProvider::ok("a", "Hello.");
        let calls = a.call_counter();
        let agg = aggregator(vec![a]);

        let mut opts = options(Strategy::Single);
        opts.provider = Some("mistral".to_string());
        let message = failure_message(agg.generate_text("p", &opts).await);

        assert_eq!(message, "Provider mistral not available");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_single_uses_default_provider_and_tags_strategy() {
        let agg = aggregator(vec![FakeProvider::ok("a", "Hello."), FakeProvider::ok("b", "Bye.")]);
        let generation = agg
            .generate_text("p", &options(Strategy::Single))
            .await
            .into_result()
            .unwrap();

        assert_eq!(generation.strategy, Strategy::Single);
        assert_eq!(generation.provider.as_deref(), Some("a"));
        assert_eq!(generation.text, "Hello.");
    }

    #[tokio::test]
    async fn test_single_surfaces_provider_failure_as_record() {
        let agg = aggregator(vec![FakeProvider::failing("a")]);
        let message = failure_message(agg.generate_text("p", &options(Strategy::Single)).await);
        assert!(message.contains("upstream exploded"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fastest_returns_first_success_in_registry_order() {
        // C finishes long before B; the winner is still B, the first success in order.
        let agg = aggregator(vec![
            FakeProvider::failing("a"),
            FakeProvider::ok("b", "From B.").with_delay(Duration::from_millis(500)),
            FakeProvider::ok("c", "From C.").with_delay(Duration::from_millis(5)),
        ]);

        let generation = agg
            .generate_text("p", &options(Strategy::Fastest))
            .await
            .into_result()
            .unwrap();
        assert_eq!(generation.provider.as_deref(), Some("b"));
        assert_eq!(generation.text, "From B.");
        assert_eq!(generation.strategy, Strategy::Fastest);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fastest_issues_calls_concurrently() {
        let agg = aggregator(vec![
            FakeProvider::failing("a").with_delay(Duration::from_secs(10)),
            FakeProvider::ok("b", "B.").with_delay(Duration::from_secs(10)),
        ]);

        let started = tokio::time::Instant::now();
        agg.generate_text("p", &options(Strategy::Fastest)).await;
        assert!(started.elapsed() < Duration::from_secs(15));
    }

    #[tokio::test]
    async fn test_fastest_all_failed() {
        let agg = aggregator(vec![FakeProvider::failing("a"), FakeProvider::failing("b")]);
        let message = failure_message(agg.generate_text("p", &options(Strategy::Fastest)).await);
        assert_eq!(message, ALL_PROVIDERS_FAILED);
    }

    #[tokio::test]
    async fn test_weighted_prefers_higher_weight_sentences() {
        let mut registry = ProviderRegistry::new();
        registry.register(FakeProvider::ok("y", "Y first. Y second.")).unwrap();
        registry.register(FakeProvider::ok("x", "X first. X second.")).unwrap();
        registry.register(FakeProvider::failing("z")).unwrap();
        let agg = AiAggregator::new(registry, settings(&[("x", 0.3), ("y", 0.1)], 0.7), "x");

        let generation = agg
            .generate_text("p", &options(Strategy::Weighted))
            .await
            .into_result()
            .unwrap();

        assert_eq!(generation.text, "X first. X second.");
        assert_eq!(generation.providers_used, vec!["y", "x"]);
        assert_eq!(generation.individual_responses.len(), 2);
        assert_eq!(generation.individual_responses[1].weight, Some(0.3));
        assert_eq!(generation.usage.unwrap().total_tokens, Some(30));
    }

    #[tokio::test]
    async fn test_consensus_merge_and_score() {
        let mut registry = ProviderRegistry::new();
        registry.register(FakeProvider::ok("a", "Shared fact. Unique to a.")).unwrap();
        registry.register(FakeProvider::ok("b", "shared FACT!")).unwrap();
        registry.register(FakeProvider::ok("c", "Shared fact.")).unwrap();
        registry.register(FakeProvider::ok("d", "Shared fact.")).unwrap();
        let agg = AiAggregator::new(registry, settings(&[], 0.7), "a");

        let generation = agg
            .generate_text("p", &options(Strategy::Consensus))
            .await
            .into_result()
            .unwrap();

        assert_eq!(generation.text, "Shared fact.");
        let score = generation.consensus_score.unwrap();
        assert!(score > 0.0 && score < 1.0);
        assert_eq!(generation.providers_used.len(), 4);
    }

    #[tokio::test]
    async fn test_consensus_score_is_one_for_single_success() {
        let agg = aggregator(vec![FakeProvider::ok("a", "Alone."), FakeProvider::failing("b")]);
        let generation = agg
            .generate_text("p", &options(Strategy::Consensus))
            .await
            .into_result()
            .unwrap();
        assert_eq!(generation.consensus_score, Some(1.0));
    }

    #[tokio::test]
    async fn test_default_strategy_comes_from_settings() {
        let agg = aggregator(vec![FakeProvider::ok("a", "One."), FakeProvider::ok("b", "Two.")]);
        let generation = agg
            .generate_text("p", &GenerationOptions::default())
            .await
            .into_result()
            .unwrap();
        assert_eq!(generation.strategy, Strategy::Weighted);
    }

    #[tokio::test]
    async fn test_zero_providers_every_operation_fails_uniformly() {
        let agg = aggregator(Vec::new());

        for strategy in [Strategy::Fastest, Strategy::Weighted, Strategy::Consensus] {
            let message = failure_message(agg.generate_text("p", &options(strategy)).await);
            assert_eq!(message, NO_PROVIDERS);
        }
        assert_eq!(
            failure_message(agg.generate_text("p", &options(Strategy::Single)).await),
            "Provider a not available"
        );
        assert_eq!(
            failure_message(agg.generate_embedding("t").await),
            NO_EMBEDDING_PROVIDERS
        );
        assert_eq!(
            failure_message(agg.analyze_image("aGk=", "p").await),
            NO_VISION_PROVIDERS
        );
        assert!(agg.available_providers().is_empty());

        let mut chunks = Vec::new();
        agg.stream_text("p", &GenerationOptions::default(), &mut |c: String| {
            chunks.push(c)
        })
        .await;
        assert_eq!(chunks, vec![r#"{"error":"Provider a not available"}"#.to_string()]);
    }

    #[tokio::test]
    async fn test_embeddings_are_averaged_across_capable_providers() {
        let agg = aggregator(vec![
            FakeProvider::ok("a", "").with_embedding(vec![1.0, 1.0]),
            FakeProvider::ok("b", ""),
            FakeProvider::ok("c", "").with_embedding(vec![3.0, 3.0]),
        ]);

        let averaged = agg.generate_embedding("text").await.into_result().unwrap();
        assert_eq!(averaged.embedding, vec![2.0, 2.0]);
        assert_eq!(averaged.dimensions, 2);
        assert_eq!(averaged.providers_used, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_image_analysis_combines_vision_providers() {
        let agg = aggregator(vec![
            FakeProvider::ok("a", "").with_analysis("A resume."),
            FakeProvider::ok("b", ""),
            FakeProvider::ok("c", "").with_analysis("A CV."),
        ]);

        let combined = agg
            .analyze_image("data:image/png;base64,aGk=", "Describe")
            .await
            .into_result()
            .unwrap();
        assert_eq!(combined.analyses.len(), 2);
        assert!(combined.combined_analysis.contains("**a**: A resume."));
        assert!(combined.combined_analysis.contains("**c**: A CV."));
    }

    #[tokio::test]
    async fn test_stream_text_forwards_chunks_from_requested_provider() {
        let agg = aggregator(vec![
            FakeProvider::ok("a", "ignored"),
            FakeProvider::ok("b", "streamed words here"),
        ]);
        let mut opts = GenerationOptions::default();
        opts.provider = Some("b".to_string());

        let mut chunks = Vec::new();
        agg.stream_text("p", &opts, &mut |c: String| chunks.push(c)).await;
        assert_eq!(chunks.concat(), "streamed words here");
    }

    #[test]
    fn test_failure_serializes_as_uniform_record() {
        let outcome: AiOutcome<TextGeneration> = AiOutcome::failure(NO_PROVIDERS);
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            serde_json::json!({ "error": true, "message": "No providers available" })
        );
    }

    #[test]
    fn test_strip_data_uri() {
        assert_eq!(strip_data_uri("data:image/jpeg;base64,AAAA"), "AAAA");
        assert_eq!(strip_data_uri("AAAA"), "AAAA");
        assert_eq!(strip_data_uri("data:broken"), "data:broken");
    }

    #[test]
    fn test_available_providers_lists_metadata() {
        let agg = aggregator(vec![
            FakeProvider::ok("a", ""),
            FakeProvider::ok("b", "").unavailable(),
        ]);
        let listing = agg.available_providers();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].key, "a");
        assert_eq!(listing[0].name, "Fake");
        assert_eq!(listing[0].rate_limit.limit, 10);
    }
}
