use crate::materials::Section;
use crate::models::{CandidateProfile, JobPosting};

/// System prompt for materials generation. Enforces JSON-only output.
pub const MATERIALS_SYSTEM: &str = r#"You are an expert career coach, resume strategist, and professional writer.
You create tailored, ATS-friendly application materials that are authentic, persuasive, and free of generic filler.

CRITICAL: You MUST return your response as valid JSON only. No additional text, explanations, or formatting.
Start your response with { and end with }. Do not use code blocks or markdown formatting.

Style Guidelines:
- Keep resume and cover letter ATS-friendly but human-sounding
- Quantify achievements wherever possible
- Avoid clichés like 'hardworking' or 'responsible for'
- Ensure LinkedIn post is engaging, positive, and share-ready
- Use action verbs for resume bullets
- Make content specific to the role and company

Example response format:
{
    "ats_keywords": "software engineer, python, react, node.js, agile",
    "resume_summary": "Experienced software engineer with 5+ years...",
    "resume_experience": "• Led development of web applications...",
    "cover_letter": "Dear Hiring Manager...",
    "linkedin_post": "Excited to announce..."
}"#;

/// Job, candidate profile, then a JSON skeleton listing only `sections`.
pub fn materials_prompt(job: &JobPosting, profile: &CandidateProfile, sections: &[Section]) -> String {
    let mut prompt = format!(
        "Job Title: {}\nCompany Name: {}\nJob Description:\n{}\n\n",
        job.job_title, job.company_name, job.job_description
    );

    prompt.push_str("Candidate Profile:\n");
    prompt.push_str(&format!("Name: {}\n", profile.candidate_name));
    prompt.push_str(&format!("Current Role: {}\n", profile.current_role));
    prompt.push_str(&format!("Years of Experience: {}\n", profile.years_experience));
    prompt.push_str(&format!("Key Skills: {}\n", profile.skills_list));
    prompt.push_str(&format!("Career Highlights:\n{}\n", profile.career_highlights));
    prompt.push_str(&format!("Education: {}\n\n", profile.education_details));

    let fields: Vec<String> = sections
        .iter()
        .map(|s| format!("    \"{}\": \"{}\"", s.key(), s.description()))
        .collect();

    prompt.push_str("Please return your output in the following JSON format:\n{\n");
    prompt.push_str(&fields.join(",\n"));
    prompt.push_str("\n}");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_lists_only_requested_sections() {
        let job = JobPosting {
            job_title: "Platform Engineer".to_string(),
            company_name: "Initech".to_string(),
            job_description: "Run the fleet.".to_string(),
        };
        let profile = CandidateProfile {
            candidate_name: "Sam".to_string(),
            years_experience: 7,
            ..CandidateProfile::default()
        };

        let prompt = materials_prompt(&job, &profile, &[Section::CoverLetter, Section::LinkedinPost]);
        assert!(prompt.contains("Company Name: Initech"));
        assert!(prompt.contains("Years of Experience: 7"));
        assert!(prompt.contains("\"cover_letter\""));
        assert!(prompt.contains("\"linkedin_post\""));
        assert!(!prompt.contains("\"ats_keywords\""));
        assert!(prompt.ends_with("\n}"));
    }
}
