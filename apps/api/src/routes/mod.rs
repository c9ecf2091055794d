pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    http::Uri,
    routing::{get, post},
    Router,
};

use crate::ai::handlers as ai;
use crate::errors::AppError;
use crate::materials::handlers as materials;
use crate::resume::handlers as resume;
use crate::state::AppState;

async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(format!("No route for {}", uri.path()))
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // AI API
        .route("/api/v1/ai/generate-text", post(ai::handle_generate_text))
        .route("/api/v1/ai/stream-text", post(ai::handle_stream_text))
        .route(
            "/api/v1/ai/generate-embedding",
            post(ai::handle_generate_embedding),
        )
        .route("/api/v1/ai/analyze-image", post(ai::handle_analyze_image))
        .route("/api/v1/ai/providers", get(ai::handle_list_providers))
        .route("/api/v1/ai/cover-letter", post(ai::handle_cover_letter))
        .route(
            "/api/v1/ai/optimize-resume",
            post(ai::handle_optimize_resume),
        )
        // Application materials
        .route(
            "/api/v1/applications/generate",
            post(materials::handle_generate_materials),
        )
        // Resume parsing
        .route(
            "/api/v1/resumes/parse",
            post(resume::handle_parse_resume)
                .layer(DefaultBodyLimit::max(resume::MAX_UPLOAD_BYTES)),
        )
        .fallback(not_found)
        .with_state(state)
}
