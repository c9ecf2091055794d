use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use tracing::{error, info};

use crate::ai::aggregator::AiAggregator;
use crate::ai::response_parser::{parse_response, SectionField};
use crate::ai::types::{GenerationOptions, Strategy};
use crate::materials::prompts::{materials_prompt, MATERIALS_SYSTEM};
use crate::materials::Section;
use crate::models::{CandidateProfile, JobPosting};

#[derive(Debug, Clone)]
pub struct MaterialsRequest {
    pub job: JobPosting,
    pub profile: CandidateProfile,
    pub strategy: Strategy,
    /// Empty means every section.
    pub sections: Vec<Section>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplicationMaterials {
    pub strategy: Strategy,
    pub materials: BTreeMap<Section, String>,
    /// True when generation or parsing failed and `materials` holds the fixed error text.
    pub degraded: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub providers_used: Vec<String>,
}

impl ApplicationMaterials {
    fn degraded(strategy: Strategy, sections: &[Section]) -> Self {
        Self {
            strategy,
            materials: sections
                .iter()
                .map(|s| (*s, s.error_text().to_string()))
                .collect(),
            degraded: true,
            providers_used: Vec::new(),
        }
    }
}

/// Requested sections in first-mention order, or all of them when none were named.
fn requested_sections(sections: &[Section]) -> Vec<Section> {
    if sections.is_empty() {
        return Section::ALL.to_vec();
    }
    let mut unique = Vec::with_capacity(sections.len());
    for section in sections {
        if !unique.contains(section) {
            unique.push(*section);
        }
    }
    unique
}

/// Generates the requested sections in one call. Never fails: an aggregation or parse
/// failure yields the degraded result.
pub async fn generate_materials(
    aggregator: &AiAggregator,
    request: &MaterialsRequest,
) -> ApplicationMaterials {
    let sections = requested_sections(&request.sections);
    let prompt = materials_prompt(&request.job, &request.profile, &sections);
    let options = GenerationOptions {
        strategy: Some(request.strategy),
        max_tokens: Some(2000),
        temperature: Some(0.7),
        system: Some(MATERIALS_SYSTEM.to_string()),
        ..GenerationOptions::default()
    };

    let generation = match aggregator.generate_text(&prompt, &options).await.into_result() {
        Ok(generation) => generation,
        Err(failure) => {
            error!("AI generation failed: {}", failure.message);
            return ApplicationMaterials::degraded(request.strategy, &sections);
        }
    };

    let fields: Vec<SectionField> = sections.iter().map(|s| s.field()).collect();
    let parsed = match parse_response(&generation.text, &fields) {
        Ok(parsed) => parsed,
        Err(e) => {
            let preview: String = generation.text.chars().take(500).collect();
            error!(provider = ?generation.provider, "Failed to parse materials response: {e}; content: {preview}");
            return ApplicationMaterials::degraded(request.strategy, &sections);
        }
    };
    info!(
        strategy = %request.strategy,
        parsed_with = %parsed.strategy,
        "Generated application materials"
    );

    let materials = sections
        .iter()
        .map(|section| {
            let content = parsed
                .fields
                .get(section.key())
                .and_then(value_text)
                .unwrap_or_else(|| section.field().placeholder.to_string());
            (*section, content)
        })
        .collect();

    ApplicationMaterials {
        strategy: request.strategy,
        materials,
        degraded: false,
        providers_used: generation.providers_used,
    }
}

/// Models sometimes answer a text field with a list of bullets; those are joined one per line.
fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(value_text)
                .collect::<Vec<_>>()
                .join("\n"),
        ),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::registry::ProviderRegistry;
    use crate::ai::testing::FakeProvider;
    use crate::config::AggregationConfig;

    fn aggregator(provider: FakeProvider) -> AiAggregator {
        let mut registry = ProviderRegistry::new();
        registry.register(provider).unwrap();
        AiAggregator::new(registry, AggregationConfig::default(), "fake")
    }

    fn request(sections: Vec<Section>) -> MaterialsRequest {
        MaterialsRequest {
            job: JobPosting {
                job_title: "Data Engineer".to_string(),
                company_name: "Globex".to_string(),
                job_description: "Pipelines".to_string(),
            },
            profile: CandidateProfile::default(),
            strategy: Strategy::Single,
            sections,
        }
    }

    #[tokio::test]
    async fn test_materials_from_fenced_json() {
        let reply = "Here you go:\n```json\n{\"ats_keywords\": \"spark, sql\", \"cover_letter\": \"Dear Globex\", \"resume_experience\": [\"Built X\", \"Led Y\"]}\n```";
        let agg = aggregator(FakeProvider::ok("fake", reply));

        let result = generate_materials(
            &agg,
            &request(vec![
                Section::AtsKeywords,
                Section::ResumeExperience,
                Section::CoverLetter,
            ]),
        )
        .await;

        assert!(!result.degraded);
        assert_eq!(result.materials.len(), 3);
        assert_eq!(result.materials[&Section::AtsKeywords], "spark, sql");
        assert_eq!(result.materials[&Section::ResumeExperience], "Built X\nLed Y");
        assert_eq!(result.providers_used, vec!["fake"]);
    }

    #[tokio::test]
    async fn test_only_requested_sections_are_returned() {
        let reply = r#"{"ats_keywords": "a", "resume_summary": "b", "linkedin_post": "c"}"#;
        let agg = aggregator(FakeProvider::ok("fake", reply));

        let result = generate_materials(&agg, &request(vec![Section::LinkedinPost])).await;
        assert_eq!(result.materials.len(), 1);
        assert_eq!(result.materials[&Section::LinkedinPost], "c");
    }

    #[tokio::test]
    async fn test_aggregation_failure_is_degraded() {
        let agg = aggregator(FakeProvider::failing("fake"));
        let result = generate_materials(&agg, &request(Vec::new())).await;

        assert!(result.degraded);
        assert_eq!(result.materials.len(), 5);
        assert_eq!(
            result.materials[&Section::CoverLetter],
            "Error generating cover letter. Please try again."
        );
    }

    #[tokio::test]
    async fn test_unparseable_reply_is_degraded() {
        let agg = aggregator(FakeProvider::ok("fake", "I cannot help with that."));
        let result = generate_materials(&agg, &request(Vec::new())).await;
        assert!(result.degraded);
    }

    #[tokio::test]
    async fn test_markdown_sections_fall_back_to_placeholders() {
        let reply = "**Keywords**: rust, tokio\n**Summary**: Systems engineer.";
        let agg = aggregator(FakeProvider::ok("fake", reply));
        let result = generate_materials(&agg, &request(Vec::new())).await;

        assert!(!result.degraded);
        assert_eq!(result.materials[&Section::AtsKeywords], "rust, tokio");
        assert_eq!(result.materials[&Section::ResumeSummary], "Systems engineer.");
        assert_eq!(
            result.materials[&Section::CoverLetter],
            Section::CoverLetter.field().placeholder
        );
    }

    #[test]
    fn test_requested_sections_dedups_and_defaults() {
        assert_eq!(requested_sections(&[]).len(), 5);
        assert_eq!(
            requested_sections(&[Section::CoverLetter, Section::AtsKeywords, Section::CoverLetter]),
            vec![Section::CoverLetter, Section::AtsKeywords]
        );
    }
}
