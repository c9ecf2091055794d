//! Axum route handlers for the AI API.
//!
//! Every handler validates its body field by field and then hands off to the aggregator.
//! Aggregation failures are returned with 200 and the `{ "error": true, ... }` record.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::ai::aggregator::{AiOutcome, CombinedAnalysis, ProviderListing, TextGeneration};
use crate::ai::merge::AveragedEmbedding;
use crate::ai::prompts::{
    cover_letter_prompt, resume_optimization_prompt, CoverLetterInput, OptimizationFocus, Tone,
    COVER_LETTER_SYSTEM, RESUME_OPTIMIZATION_SYSTEM,
};
use crate::ai::types::{GenerationOptions, Strategy};
use crate::errors::AppError;
use crate::state::AppState;
use crate::validation::FieldErrors;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct GenerateTextRequest {
    pub prompt: Option<String>,
    pub strategy: Option<String>,
    pub provider: Option<String>,
    pub max_tokens: Option<i64>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub system: Option<String>,
}

impl GenerateTextRequest {
    fn validate(self) -> Result<(String, GenerationOptions), AppError> {
        let mut errors = FieldErrors::new();

        let prompt = errors.required_text("prompt", self.prompt.as_deref(), 1, 10_000);
        let strategy = errors.one_of("strategy", self.strategy.as_deref(), |s| {
            s.parse::<Strategy>().ok()
        });
        let provider = self
            .provider
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string);
        if strategy == Some(Strategy::Single) && provider.is_none() {
            errors.add(
                "provider",
                "The provider field is required when strategy is single.",
            );
        }
        errors.range("max_tokens", self.max_tokens, 10, 4000);
        errors.range("temperature", self.temperature, 0.0, 2.0);
        errors.range("top_p", self.top_p, 0.0, 1.0);
        errors.optional_text("system", self.system.as_deref(), 1000);

        errors.into_result()?;

        let options = GenerationOptions {
            strategy,
            provider,
            max_tokens: self.max_tokens.and_then(|t| u32::try_from(t).ok()),
            temperature: self.temperature.map(|t| t as f32),
            top_p: self.top_p.map(|p| p as f32),
            system: self.system,
            stop: Vec::new(),
        };
        Ok((prompt, options))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct EmbeddingRequest {
    pub text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AnalyzeImageRequest {
    pub image: Option<String>,
    pub prompt: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProvidersResponse {
    pub providers: Vec<ProviderListing>,
    pub count: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct CoverLetterRequest {
    pub job_title: Option<String>,
    pub company_name: Option<String>,
    pub job_description: Option<String>,
    pub user_skills: Option<String>,
    pub user_experience: Option<String>,
    pub tone: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CoverLetterResponse {
    pub cover_letter: String,
    pub providers_used: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OptimizeResumeRequest {
    pub resume_content: Option<String>,
    pub job_description: Option<String>,
    pub optimization_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OptimizeResumeResponse {
    pub optimized_resume: String,
    pub consensus_score: Option<f64>,
    pub providers_used: Vec<String>,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/ai/generate-text
pub async fn handle_generate_text(
    State(state): State<AppState>,
    payload: Result<Json<GenerateTextRequest>, JsonRejection>,
) -> Result<Json<AiOutcome<TextGeneration>>, AppError> {
    let Json(request) = payload?;
    let (prompt, options) = request.validate()?;

    Ok(Json(state.aggregator.generate_text(&prompt, &options).await))
}

/// POST /api/v1/ai/stream-text
///
/// One SSE `data:` event per chunk from the requested (or default) provider. Strategy is
/// ignored; streaming always targets a single provider.
pub async fn handle_stream_text(
    State(state): State<AppState>,
    payload: Result<Json<GenerateTextRequest>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let Json(mut request) = payload?;
    request.strategy = None;
    let (prompt, options) = request.validate()?;

    let (tx, rx) = mpsc::unbounded_channel::<String>();
    let aggregator = Arc::clone(&state.aggregator);
    tokio::spawn(async move {
        aggregator
            .stream_text(&prompt, &options, &mut |chunk: String| {
                // A closed receiver means the client went away.
                let _ = tx.send(chunk);
            })
            .await;
        debug!("Stream finished");
    });

    let events = stream::unfold(rx, |mut rx| async move {
        rx.recv()
            .await
            .map(|chunk| (Ok(Event::default().data(chunk)), rx))
    });
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// POST /api/v1/ai/generate-embedding
pub async fn handle_generate_embedding(
    State(state): State<AppState>,
    payload: Result<Json<EmbeddingRequest>, JsonRejection>,
) -> Result<Json<AiOutcome<AveragedEmbedding>>, AppError> {
    let Json(request) = payload?;
    let mut errors = FieldErrors::new();
    let text = errors.required_text("text", request.text.as_deref(), 1, 5000);
    errors.into_result()?;

    Ok(Json(state.aggregator.generate_embedding(&text).await))
}

/// POST /api/v1/ai/analyze-image
pub async fn handle_analyze_image(
    State(state): State<AppState>,
    payload: Result<Json<AnalyzeImageRequest>, JsonRejection>,
) -> Result<Json<AiOutcome<CombinedAnalysis>>, AppError> {
    let Json(request) = payload?;
    let mut errors = FieldErrors::new();
    let image = errors.required_text("image", request.image.as_deref(), 1, usize::MAX);
    let prompt = errors.required_text("prompt", request.prompt.as_deref(), 1, 1000);
    errors.into_result()?;

    Ok(Json(state.aggregator.analyze_image(&image, &prompt).await))
}

/// GET /api/v1/ai/providers
pub async fn handle_list_providers(State(state): State<AppState>) -> Json<ProvidersResponse> {
    let providers = state.aggregator.available_providers();
    Json(ProvidersResponse {
        count: providers.len(),
        providers,
    })
}

/// POST /api/v1/ai/cover-letter
///
/// Weighted strategy with a career-counselor system prompt.
pub async fn handle_cover_letter(
    State(state): State<AppState>,
    payload: Result<Json<CoverLetterRequest>, JsonRejection>,
) -> Result<Json<AiOutcome<CoverLetterResponse>>, AppError> {
    let Json(request) = payload?;
    let mut errors = FieldErrors::new();
    let job_title = errors.required_text("job_title", request.job_title.as_deref(), 1, 200);
    let company_name =
        errors.required_text("company_name", request.company_name.as_deref(), 1, 200);
    let job_description =
        errors.required_text("job_description", request.job_description.as_deref(), 1, 5000);
    let user_skills = errors.required_text("user_skills", request.user_skills.as_deref(), 1, 2000);
    let user_experience =
        errors.required_text("user_experience", request.user_experience.as_deref(), 1, 3000);
    let tone = errors
        .one_of("tone", request.tone.as_deref(), Tone::parse)
        .unwrap_or_default();
    errors.into_result()?;

    let prompt = cover_letter_prompt(&CoverLetterInput {
        job_title: &job_title,
        company_name: &company_name,
        job_description: &job_description,
        user_skills: &user_skills,
        user_experience: &user_experience,
        tone,
    });
    let options = GenerationOptions {
        strategy: Some(Strategy::Weighted),
        max_tokens: Some(1500),
        temperature: Some(0.8),
        system: Some(COVER_LETTER_SYSTEM.to_string()),
        ..GenerationOptions::default()
    };

    let outcome = state.aggregator.generate_text(&prompt, &options).await;
    Ok(Json(outcome.map(|generation| CoverLetterResponse {
        cover_letter: generation.text,
        providers_used: generation.providers_used,
    })))
}

/// POST /api/v1/ai/optimize-resume
///
/// Consensus strategy, so the reply only keeps content most providers agree on.
pub async fn handle_optimize_resume(
    State(state): State<AppState>,
    payload: Result<Json<OptimizeResumeRequest>, JsonRejection>,
) -> Result<Json<AiOutcome<OptimizeResumeResponse>>, AppError> {
    let Json(request) = payload?;
    let mut errors = FieldErrors::new();
    let resume_content =
        errors.required_text("resume_content", request.resume_content.as_deref(), 1, 10_000);
    let job_description =
        errors.required_text("job_description", request.job_description.as_deref(), 1, 5000);
    let focus = errors
        .one_of(
            "optimization_type",
            request.optimization_type.as_deref(),
            OptimizationFocus::parse,
        )
        .unwrap_or_default();
    errors.into_result()?;

    let prompt = resume_optimization_prompt(&resume_content, &job_description, focus);
    let options = GenerationOptions {
        strategy: Some(Strategy::Consensus),
        max_tokens: Some(2000),
        temperature: Some(0.7),
        system: Some(RESUME_OPTIMIZATION_SYSTEM.to_string()),
        ..GenerationOptions::default()
    };

    let outcome = state.aggregator.generate_text(&prompt, &options).await;
    Ok(Json(outcome.map(|generation| OptimizeResumeResponse {
        optimized_resume: generation.text,
        consensus_score: generation.consensus_score,
        providers_used: generation.providers_used,
    })))
}
