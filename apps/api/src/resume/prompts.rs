/// Resume structuring prompt. The model is asked for JSON only; the parser still tolerates
/// fences and prose around it.
pub fn resume_parsing_prompt(resume_text: &str) -> String {
    format!(
        r#"Extract and structure the following information from this resume text. Return only valid JSON format.

Resume Text:
{resume_text}

Extract these details and return in this exact JSON format:
{{
    "candidate_name": "Full name of the candidate",
    "current_role": "Current or most recent job title",
    "years_experience": "Total years of professional experience (number only)",
    "skills_list": "Comma-separated list of key technical and professional skills",
    "career_highlights": "3-5 bullet points of major achievements and experience highlights",
    "education_details": "Education background including degrees, institutions, and years",
    "contact_info": {{
        "email": "Email address if found",
        "phone": "Phone number if found",
        "location": "Location/city if mentioned"
    }}
}}

Focus on:
- Technical skills, programming languages, frameworks, tools
- Quantifiable achievements (numbers, percentages, dollar amounts)
- Leadership experience and team management
- Education credentials and certifications
- Years of experience in relevant fields

If information is not available, use reasonable defaults or leave as empty string."#
    )
}
