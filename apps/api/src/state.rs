use std::sync::Arc;

use crate::ai::aggregator::AiAggregator;
use crate::resume::TextExtractor;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<AiAggregator>,
    /// Document-to-text step of resume parsing. Default: PdfTextExtractor.
    pub extractor: Arc<dyn TextExtractor>,
}

impl AppState {
    pub fn new(aggregator: AiAggregator, extractor: Arc<dyn TextExtractor>) -> Self {
        Self {
            aggregator: Arc::new(aggregator),
            extractor,
        }
    }

    /// State over in-process fakes; the first provider key should be `fake` so it is also the
    /// default provider.
    #[cfg(test)]
    pub fn for_tests(providers: Vec<crate::ai::testing::FakeProvider>) -> Self {
        use crate::ai::registry::ProviderRegistry;
        use crate::config::AggregationConfig;
        use crate::resume::PdfTextExtractor;

        let mut registry = ProviderRegistry::new();
        for provider in providers {
            registry.register(provider).unwrap();
        }
        Self::new(
            AiAggregator::new(registry, AggregationConfig::default(), "fake"),
            Arc::new(PdfTextExtractor),
        )
    }
}
