//! Application materials: ATS keywords, resume summary and bullets, cover letter, and a
//! LinkedIn post, generated in one aggregated call and recovered with the response parser.

pub mod generator;
pub mod handlers;
pub mod prompts;

use serde::Serialize;

use crate::ai::response_parser::SectionField;

pub use generator::{generate_materials, ApplicationMaterials, MaterialsRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    AtsKeywords,
    ResumeSummary,
    ResumeExperience,
    CoverLetter,
    LinkedinPost,
}

impl Section {
    pub const ALL: [Section; 5] = [
        Section::AtsKeywords,
        Section::ResumeSummary,
        Section::ResumeExperience,
        Section::CoverLetter,
        Section::LinkedinPost,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Section::AtsKeywords => "ats_keywords",
            Section::ResumeSummary => "resume_summary",
            Section::ResumeExperience => "resume_experience",
            Section::CoverLetter => "cover_letter",
            Section::LinkedinPost => "linkedin_post",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.key() == value)
    }

    /// What the model is asked to put in this field.
    pub fn description(self) -> &'static str {
        match self {
            Section::AtsKeywords => "Comma-separated list of 15-20 ATS keywords from job description",
            Section::ResumeSummary => {
                "Tailored 3-5 sentence professional summary that highlights relevant experience and value proposition"
            }
            Section::ResumeExperience => {
                "5-7 bullet points of relevant experience, each starting with action verbs and including quantified achievements where possible"
            }
            Section::CoverLetter => {
                "Personalized, role-specific cover letter (3-4 paragraphs) that connects experience to job requirements"
            }
            Section::LinkedinPost => {
                "50-100 word engaging LinkedIn post about applying for this role, expressing enthusiasm and fit"
            }
        }
    }

    /// Returned in place of content when generation or parsing fails outright.
    pub fn error_text(self) -> &'static str {
        match self {
            Section::AtsKeywords => "Error generating keywords. Please try again.",
            Section::ResumeSummary => "Error generating summary. Please try again.",
            Section::ResumeExperience => "Error generating experience. Please try again.",
            Section::CoverLetter => "Error generating cover letter. Please try again.",
            Section::LinkedinPost => "Error generating LinkedIn post. Please try again.",
        }
    }

    pub fn field(self) -> SectionField {
        let (label, placeholder) = match self {
            Section::AtsKeywords => (
                "keywords",
                "job title, company name, relevant skills, industry terms",
            ),
            Section::ResumeSummary => (
                "summary",
                "Professional with relevant experience seeking new opportunities.",
            ),
            Section::ResumeExperience => (
                "experience",
                "• Relevant experience in the field\n• Strong track record of achievements\n• Proven ability to deliver results",
            ),
            Section::CoverLetter => (
                "cover letter",
                "Dear Hiring Manager,\n\nI am writing to express my interest in this position...",
            ),
            Section::LinkedinPost => (
                "linkedin",
                "Excited to apply for this new opportunity! Looking forward to bringing my skills to the team.",
            ),
        };
        SectionField {
            key: self.key(),
            label,
            placeholder,
        }
    }
}
