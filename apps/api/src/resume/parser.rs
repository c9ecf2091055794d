use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::ai::aggregator::AiAggregator;
use crate::ai::response_parser::parse_json_object;
use crate::ai::types::{GenerationOptions, Strategy};
use crate::models::{CandidateProfile, ContactInfo};
use crate::resume::prompts::resume_parsing_prompt;

#[derive(Debug, Error)]
pub enum ResumeParseError {
    #[error("AI parsing failed: {0}")]
    Aggregation(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParsedResume {
    #[serde(flatten)]
    pub profile: CandidateProfile,
    pub contact_info: ContactInfo,
}

/// Structures raw resume text with one single-provider call. A reply that cannot be read as
/// JSON yields the all-empty profile; only an aggregation failure is an error.
pub async fn parse_resume_text(
    aggregator: &AiAggregator,
    resume_text: &str,
) -> Result<ParsedResume, ResumeParseError> {
    let options = GenerationOptions {
        strategy: Some(Strategy::Single),
        max_tokens: Some(1500),
        temperature: Some(0.3),
        ..GenerationOptions::default()
    };

    let generation = aggregator
        .generate_text(&resume_parsing_prompt(resume_text), &options)
        .await
        .into_result()
        .map_err(|failure| ResumeParseError::Aggregation(failure.message))?;

    match parse_json_object(&generation.text) {
        Some(parsed) => {
            info!(parsed_with = %parsed.strategy, "Parsed resume response");
            Ok(clean(&parsed.fields))
        }
        None => {
            let preview: String = generation.text.chars().take(500).collect();
            warn!("Failed to parse AI resume response: {preview}");
            Ok(ParsedResume::default())
        }
    }
}

/// Missing or mistyped fields become empty strings; years fall back to 0.
fn clean(fields: &Map<String, Value>) -> ParsedResume {
    let text = |key: &str| fields.get(key).map(text_value).unwrap_or_default();

    let contact_info = match fields.get("contact_info") {
        Some(Value::Object(contact)) => ContactInfo {
            email: contact.get("email").map(text_value).unwrap_or_default(),
            phone: contact.get("phone").map(text_value).unwrap_or_default(),
            location: contact.get("location").map(text_value).unwrap_or_default(),
        },
        _ => ContactInfo::default(),
    };

    ParsedResume {
        profile: CandidateProfile {
            candidate_name: text("candidate_name"),
            current_role: text("current_role"),
            years_experience: fields.get("years_experience").map_or(0, years_value),
            skills_list: text("skills_list"),
            career_highlights: text("career_highlights"),
            education_details: text("education_details"),
        },
        contact_info,
    }
}

fn text_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.trim().to_string(),
        Value::Number(number) => number.to_string(),
        Value::Array(items) => items
            .iter()
            .map(text_value)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

/// Numbers and numeric strings truncate toward zero; anything else is 0.
fn years_value(value: &Value) -> u32 {
    let years = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    match years {
        Some(years) if years.is_finite() && years > 0.0 => years.min(u32::MAX as f64) as u32,
        _ => 0,
    }
}
