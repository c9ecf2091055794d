mod ai;
mod config;
mod errors;
mod materials;
mod models;
mod resume;
mod routes;
mod state;
mod validation;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::ai::aggregator::AiAggregator;
use crate::ai::cache::{CacheHandle, InMemoryCache, RedisCache, ResponseCache};
use crate::config::Config;
use crate::resume::PdfTextExtractor;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on malformed env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting CareerAI API v{}", env!("CARGO_PKG_VERSION"));

    let cache = build_cache(&config);

    let aggregator = AiAggregator::from_config(&config.ai, cache);
    info!(
        providers = aggregator.registry().len(),
        default_provider = aggregator.default_provider(),
        strategy = %aggregator.default_strategy(),
        "AI aggregator initialized"
    );

    let state = AppState::new(aggregator, Arc::new(PdfTextExtractor));

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Redis when `REDIS_URL` is set and valid, process memory otherwise.
fn build_cache(config: &Config) -> Option<CacheHandle> {
    if !config.ai.cache.enabled {
        info!("Response cache disabled");
        return None;
    }

    let store: Arc<dyn ResponseCache> = match config.redis_url.as_deref() {
        Some(url) => match redis::Client::open(url) {
            Ok(client) => {
                info!("Response cache backed by Redis");
                Arc::new(RedisCache::new(client))
            }
            Err(e) => {
                warn!("Invalid REDIS_URL, falling back to in-memory cache: {e}");
                Arc::new(InMemoryCache::new())
            }
        },
        None => {
            info!("Response cache backed by process memory");
            Arc::new(InMemoryCache::new())
        }
    };

    Some(CacheHandle::new(
        store,
        Duration::from_secs(config.ai.cache.ttl_secs),
    ))
}
