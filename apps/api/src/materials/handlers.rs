//! Axum route handlers for application materials.

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use serde::Deserialize;

use crate::ai::types::Strategy;
use crate::errors::AppError;
use crate::materials::{generate_materials, ApplicationMaterials, MaterialsRequest, Section};
use crate::models::{CandidateProfile, JobPosting};
use crate::state::AppState;
use crate::validation::FieldErrors;

#[derive(Debug, Default, Deserialize)]
pub struct GenerateMaterialsRequest {
    pub job_title: Option<String>,
    pub company_name: Option<String>,
    pub job_description: Option<String>,
    pub candidate_name: Option<String>,
    pub current_role: Option<String>,
    pub years_experience: Option<i64>,
    pub skills_list: Option<String>,
    pub career_highlights: Option<String>,
    pub education_details: Option<String>,
    pub strategy: Option<String>,
    pub sections: Option<Vec<String>>,
}

impl GenerateMaterialsRequest {
    fn validate(self) -> Result<MaterialsRequest, AppError> {
        let mut errors = FieldErrors::new();

        let job = JobPosting {
            job_title: errors.required_text("job_title", self.job_title.as_deref(), 1, 255),
            company_name: errors.required_text(
                "company_name",
                self.company_name.as_deref(),
                1,
                255,
            ),
            job_description: errors.required_text(
                "job_description",
                self.job_description.as_deref(),
                50,
                usize::MAX,
            ),
        };

        // These may come from a parsed resume, so each is only required to be present here.
        let profile = CandidateProfile {
            candidate_name: errors.required_text(
                "candidate_name",
                self.candidate_name.as_deref(),
                1,
                255,
            ),
            current_role: self.current_role.clone().unwrap_or_default(),
            years_experience: match self.years_experience {
                Some(years) => u32::try_from(years).unwrap_or(0),
                None => {
                    errors.add("years_experience", "The years_experience field is required.");
                    0
                }
            },
            skills_list: errors.required_text(
                "skills_list",
                self.skills_list.as_deref(),
                1,
                usize::MAX,
            ),
            career_highlights: errors.required_text(
                "career_highlights",
                self.career_highlights.as_deref(),
                20,
                usize::MAX,
            ),
            education_details: errors.required_text(
                "education_details",
                self.education_details.as_deref(),
                1,
                usize::MAX,
            ),
        };
        errors.optional_text("current_role", self.current_role.as_deref(), 255);
        errors.range("years_experience", self.years_experience, 0, 50);

        let strategy = errors
            .one_of("strategy", self.strategy.as_deref(), |s| s.parse::<Strategy>().ok())
            .unwrap_or(Strategy::Weighted);

        let mut sections = Vec::new();
        for name in self.sections.iter().flatten() {
            match Section::parse(name) {
                Some(section) => sections.push(section),
                None => errors.add("sections", format!("The selected section '{name}' is invalid.")),
            }
        }

        errors.into_result()?;
        Ok(MaterialsRequest {
            job,
            profile,
            strategy,
            sections,
        })
    }
}

/// POST /api/v1/applications/generate
///
/// Generates the requested sections (all five by default). Generation problems come back as a
/// degraded result, not an error status.
pub async fn handle_generate_materials(
    State(state): State<AppState>,
    payload: Result<Json<GenerateMaterialsRequest>, JsonRejection>,
) -> Result<Json<ApplicationMaterials>, AppError> {
    let Json(request) = payload?;
    let request = request.validate()?;

    let materials = generate_materials(&state.aggregator, &request).await;
    Ok(Json(materials))
}
