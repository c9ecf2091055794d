use serde::{Deserialize, Serialize};

/// The posting a set of application materials is written for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobPosting {
    pub job_title: String,
    pub company_name: String,
    pub job_description: String,
}

/// Candidate details either typed in by the user or recovered from an uploaded resume.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CandidateProfile {
    pub candidate_name: String,
    pub current_role: String,
    pub years_experience: u32,
    pub skills_list: String,
    pub career_highlights: String,
    pub education_details: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactInfo {
    pub email: String,
    pub phone: String,
    pub location: String,
}
