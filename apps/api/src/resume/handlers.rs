//! Axum route handlers for resume parsing.

use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    Json,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::errors::AppError;
use crate::resume::{parse_resume_text, ParsedResume};
use crate::state::AppState;
use crate::validation::FieldErrors;

/// Upload ceiling for the resume route.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ParseResumeResponse {
    Parsed {
        success: bool,
        data: ParsedResume,
        raw_text: String,
    },
    Failed {
        success: bool,
        error: String,
    },
}

/// POST /api/v1/resumes/parse
///
/// Multipart upload with the document in the `resume` field. Extraction problems are a 422;
/// an AI failure is reported in the body with `success: false`.
pub async fn handle_parse_resume(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ParseResumeResponse>, AppError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?
    {
        if field.name() != Some("resume") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        upload = Some((file_name, bytes));
        break;
    }

    let Some((file_name, bytes)) = upload else {
        let mut errors = FieldErrors::new();
        errors.add("resume", "The resume field is required.");
        return Err(AppError::Validation(errors));
    };

    let extractor = Arc::clone(&state.extractor);
    let name = file_name.clone();
    let raw_text = tokio::task::spawn_blocking(move || extractor.extract(&name, &bytes))
        .await
        .map_err(|e| {
            AppError::Internal(anyhow::anyhow!("spawn_blocking failed in resume extraction: {e}"))
        })??;

    match parse_resume_text(&state.aggregator, &raw_text).await {
        Ok(data) => {
            info!(%file_name, extracted_name = %data.profile.candidate_name, "Resume parsed successfully");
            Ok(Json(ParseResumeResponse::Parsed {
                success: true,
                data,
                raw_text,
            }))
        }
        Err(e) => {
            warn!(%file_name, "Resume parsing failed: {e}");
            Ok(Json(ParseResumeResponse::Failed {
                success: false,
                error: e.to_string(),
            }))
        }
    }
}
