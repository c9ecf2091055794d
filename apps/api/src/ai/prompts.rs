// Prompt templates for the career-writing endpoints served directly from the AI routes.

pub const COVER_LETTER_SYSTEM: &str = "You are an expert career counselor and professional writer \
    specializing in creating compelling cover letters.";

pub const RESUME_OPTIMIZATION_SYSTEM: &str =
    "You are an expert resume writer and ATS optimization specialist.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Tone {
    #[default]
    Professional,
    Friendly,
    Enthusiastic,
}

impl Tone {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "professional" => Some(Tone::Professional),
            "friendly" => Some(Tone::Friendly),
            "enthusiastic" => Some(Tone::Enthusiastic),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tone::Professional => "professional",
            Tone::Friendly => "friendly",
            Tone::Enthusiastic => "enthusiastic",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OptimizationFocus {
    Keywords,
    Format,
    #[default]
    Both,
}

impl OptimizationFocus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "keywords" => Some(OptimizationFocus::Keywords),
            "format" => Some(OptimizationFocus::Format),
            "both" => Some(OptimizationFocus::Both),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OptimizationFocus::Keywords => "keywords",
            OptimizationFocus::Format => "format",
            OptimizationFocus::Both => "both",
        }
    }
}

pub struct CoverLetterInput<'a> {
    pub job_title: &'a str,
    pub company_name: &'a str,
    pub job_description: &'a str,
    pub user_skills: &'a str,
    pub user_experience: &'a str,
    pub tone: Tone,
}

pub fn cover_letter_prompt(input: &CoverLetterInput<'_>) -> String {
    let tone = input.tone.as_str();
    format!(
        "Write a compelling {tone} cover letter for the following position:

Job Title: {job_title}
Company: {company_name}

Job Description:
{job_description}

Candidate Skills:
{user_skills}

Candidate Experience:
{user_experience}

Please create a well-structured cover letter that:
1. Shows enthusiasm for the role and company
2. Highlights relevant skills and experience
3. Demonstrates understanding of the job requirements
4. Includes specific examples of achievements
5. Maintains a {tone} tone throughout
6. Follows standard business letter format",
        job_title = input.job_title,
        company_name = input.company_name,
        job_description = input.job_description,
        user_skills = input.user_skills,
        user_experience = input.user_experience,
    )
}

pub fn resume_optimization_prompt(
    resume_content: &str,
    job_description: &str,
    focus: OptimizationFocus,
) -> String {
    let mut prompt = format!(
        "Optimize the following resume for ATS systems and the specific job description provided:

Current Resume:
{resume_content}

Target Job Description:
{job_description}

Optimization Focus: {}

Please provide an optimized version that:",
        focus.as_str()
    );

    if matches!(focus, OptimizationFocus::Keywords | OptimizationFocus::Both) {
        prompt.push_str(
            "
1. Incorporates relevant keywords from the job description
2. Uses industry-standard terminology
3. Includes quantifiable achievements",
        );
    }

    if matches!(focus, OptimizationFocus::Format | OptimizationFocus::Both) {
        prompt.push_str(
            "
4. Uses ATS-friendly formatting
5. Organizes sections logically
6. Ensures clear hierarchy and readability",
        );
    }

    prompt.push_str(
        "
7. Maintains truthfulness while highlighting strengths
8. Tailors content specifically to the target position",
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cover_letter_prompt_uses_tone_twice() {
        let prompt = cover_letter_prompt(&CoverLetterInput {
            job_title: "Backend Engineer",
            company_name: "Acme",
            job_description: "Build APIs",
            user_skills: "Rust",
            user_experience: "5 years",
            tone: Tone::Friendly,
        });
        assert!(prompt.starts_with("Write a compelling friendly cover letter"));
        assert!(prompt.contains("Maintains a friendly tone throughout"));
        assert!(prompt.contains("Company: Acme"));
    }

    #[test]
    fn test_optimization_prompt_sections_follow_focus() {
        let keywords = resume_optimization_prompt("cv", "jd", OptimizationFocus::Keywords);
        assert!(keywords.contains("Incorporates relevant keywords"));
        assert!(!keywords.contains("ATS-friendly formatting"));

        let both = resume_optimization_prompt("cv", "jd", OptimizationFocus::Both);
        assert!(both.contains("Incorporates relevant keywords"));
        assert!(both.contains("ATS-friendly formatting"));
        assert!(both.contains("Maintains truthfulness"));
    }
}
