//! Answers one application question from the merged profile.

use serde::Serialize;
use tracing::info;

use crate::applications::models::{ApplicationRow, QuestionRow};
use crate::applications::prompts::RESPONSE_GENERATION_PROMPT;
use crate::documents::models::ExtractedProfile;
use crate::llm_client::prompts::{fill_template, APPLICANT_VOICE_SYSTEM};
use crate::llm_client::{LlmError, TextGenerator};

pub const EMPTY_CONTEXT: &str = "No user information available.";
const MAX_RESPONSIBILITIES: usize = 3;

#[derive(Debug, Clone, Serialize)]
pub struct GeneratedResponse {
    pub response: String,
    /// Exact prompt sent to the model, stored alongside the answer.
    pub prompt: String,
}

/// Renders a profile as the plain-text block the generation prompt embeds.
pub fn build_user_context(profile: &ExtractedProfile) -> String {
    let mut parts: Vec<String> = Vec::new();

    if let Some(name) = &profile.name {
        parts.push(format!("Name: {name}"));
    }
    if let Some(email) = &profile.email {
        parts.push(format!("Email: {email}"));
    }
    if let Some(summary) = &profile.summary {
        parts.push(format!("\nSummary: {summary}"));
    }

    if !profile.education.is_empty() {
        parts.push("\nEducation:".to_string());
        for edu in &profile.education {
            let mut line = format!(
                "  - {} in {} from {}",
                or_blank(&edu.degree),
                or_blank(&edu.field),
                or_blank(&edu.institution)
            );
            if let Some(year) = &edu.graduation_year {
                line.push_str(&format!(" ({year})"));
            }
            if let Some(gpa) = &edu.gpa {
                line.push_str(&format!(", GPA: {gpa}"));
            }
            parts.push(line);
        }
    }

    if !profile.experience.is_empty() {
        parts.push("\nWork Experience:".to_string());
        for exp in &profile.experience {
            parts.push(format!(
                "  - {} at {}",
                or_blank(&exp.title),
                or_blank(&exp.company)
            ));
            parts.push(format!("    Duration: {}", or_blank(&exp.duration)));
            if !exp.responsibilities.is_empty() {
                let top: Vec<&str> = exp
                    .responsibilities
                    .iter()
                    .take(MAX_RESPONSIBILITIES)
                    .map(String::as_str)
                    .collect();
                parts.push(format!("    Responsibilities: {}", top.join(", ")));
            }
        }
    }

    if !profile.projects.is_empty() {
        parts.push("\nProjects:".to_string());
        for project in &profile.projects {
            let mut line = format!("  - {}", or_blank(&project.name));
            if let Some(description) = &project.description {
                line.push_str(&format!(": {description}"));
            }
            if !project.technologies.is_empty() {
                line.push_str(&format!(" [{}]", project.technologies.join(", ")));
            }
            parts.push(line);
        }
    }

    if !profile.skills.is_empty() {
        parts.push(format!("\nSkills: {}", profile.skills.join(", ")));
    }
    if !profile.certifications.is_empty() {
        parts.push(format!("\nCertifications: {}", profile.certifications.join(", ")));
    }
    if !profile.languages.is_empty() {
        parts.push(format!("\nLanguages: {}", profile.languages.join(", ")));
    }

    if parts.is_empty() {
        EMPTY_CONTEXT.to_string()
    } else {
        parts.join("\n")
    }
}

fn or_blank(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("")
}

pub fn build_response_prompt(
    question: &QuestionRow,
    application: &ApplicationRow,
    profile: &ExtractedProfile,
) -> String {
    let question_type = question.question_type();
    let user_context = build_user_context(profile);
    fill_template(
        RESPONSE_GENERATION_PROMPT,
        &[
            ("title", application.title.as_str()),
            ("organisation", application.company_or_institution.as_str()),
            ("application_type", application.application_type().as_str()),
            ("question_text", question.question_text.as_str()),
            ("question_type", question_type.as_str()),
            ("length_guidance", question_type.length_guidance()),
            ("user_context", user_context.as_str()),
        ],
    )
}

pub async fn generate_response(
    llm: &dyn TextGenerator,
    question: &QuestionRow,
    application: &ApplicationRow,
    profile: &ExtractedProfile,
) -> Result<GeneratedResponse, LlmError> {
    let prompt = build_response_prompt(question, application, profile);
    let reply = llm.generate(&prompt, APPLICANT_VOICE_SYSTEM).await?;

    let response = reply.trim().to_string();
    if response.is_empty() {
        return Err(LlmError::EmptyContent);
    }

    info!(
        "Generated response for {} question (length: {} chars)",
        question.question_type(),
        response.chars().count()
    );
    Ok(GeneratedResponse { response, prompt })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::models::{EducationRecord, ExperienceRecord, ProjectRecord};
    use crate::llm_client::testing::ScriptedGenerator;
    use chrono::Utc;
    use uuid::Uuid;

    fn application() -> ApplicationRow {
        ApplicationRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            application_type: "scholarship".to_string(),
            title: "Graduate Research Fellowship".to_string(),
            company_or_institution: "Example Foundation".to_string(),
            url: None,
            description: String::new(),
            created_at: Utc::now(),
        }
    }

    fn question(text: &str, question_type: &str) -> QuestionRow {
        QuestionRow {
            id: Uuid::new_v4(),
            application_id: Uuid::new_v4(),
            question_text: text.to_string(),
            question_type: question_type.to_string(),
            is_required: true,
            is_extracted: true,
            sort_order: 1,
            created_at: Utc::now(),
        }
    }

    fn profile() -> ExtractedProfile {
        ExtractedProfile {
            name: Some("Jane Doe".to_string()),
            email: Some("jane@example.com".to_string()),
            education: vec![EducationRecord {
                institution: Some("MIT".to_string()),
                degree: Some("BSc".to_string()),
                field: Some("Physics".to_string()),
                graduation_year: Some("2021".to_string()),
                gpa: Some("3.9".to_string()),
            }],
            experience: vec![ExperienceRecord {
                company: Some("Acme".to_string()),
                title: Some("Engineer".to_string()),
                duration: Some("2021-2023".to_string()),
                responsibilities: vec![
                    "Built APIs".to_string(),
                    "Led migrations".to_string(),
                    "Mentored interns".to_string(),
                    "Wrote docs".to_string(),
                ],
            }],
            projects: vec![ProjectRecord {
                name: Some("Trackly".to_string()),
                description: Some("Application tracker".to_string()),
                technologies: vec!["Rust".to_string()],
            }],
            skills: vec!["Rust".to_string(), "SQL".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_user_context_rendering() {
        let context = build_user_context(&profile());
        assert!(context.starts_with("Name: Jane Doe\nEmail: jane@example.com"));
        assert!(context.contains("\nEducation:\n  - BSc in Physics from MIT (2021), GPA: 3.9"));
        assert!(context.contains("  - Engineer at Acme\n    Duration: 2021-2023"));
        assert!(context.contains("Responsibilities: Built APIs, Led migrations, Mentored interns"));
        assert!(!context.contains("Wrote docs"));
        assert!(context.contains("  - Trackly: Application tracker [Rust]"));
        assert!(context.ends_with("\nSkills: Rust, SQL"));
    }

    #[test]
    fn test_empty_profile_uses_fallback_context() {
        assert_eq!(build_user_context(&ExtractedProfile::default()), EMPTY_CONTEXT);
    }

    #[test]
    fn test_prompt_carries_question_application_and_guidance() {
        let prompt = build_response_prompt(
            &question("Why this fellowship?", "essay"),
            &application(),
            &profile(),
        );
        assert!(prompt.contains("QUESTION: Why this fellowship?"));
        assert!(prompt.contains("QUESTION TYPE: essay"));
        assert!(prompt.contains("Graduate Research Fellowship at Example Foundation (scholarship)"));
        assert!(prompt.contains("2-4 paragraphs"));
        assert!(prompt.contains("Name: Jane Doe"));
    }

    #[test]
    fn test_placeholders_in_user_text_stay_literal() {
        let mut application = application();
        application.title = "Dev {question_text}".to_string();
        let prompt = build_response_prompt(
            &question("Why {organisation}?", "essay"),
            &application,
            &ExtractedProfile::default(),
        );
        assert!(prompt.contains("APPLICATION: Dev {question_text} at Example Foundation"));
        assert!(prompt.contains("QUESTION: Why {organisation}?"));
    }

    #[tokio::test]
    async fn test_generate_response_trims_and_returns_prompt() {
        let llm = ScriptedGenerator::new(["\n  I am passionate about physics research.  \n"]);
        let generated = generate_response(
            &llm,
            &question("Why?", "short_answer"),
            &application(),
            &ExtractedProfile::default(),
        )
        .await
        .unwrap();
        assert_eq!(generated.response, "I am passionate about physics research.");
        assert_eq!(Some(generated.prompt.clone()), llm.last_prompt());
        assert!(generated.prompt.contains(EMPTY_CONTEXT));
    }

    #[tokio::test]
    async fn test_blank_reply_is_an_error() {
        let llm = ScriptedGenerator::new(["   "]);
        let err = generate_response(
            &llm,
            &question("Why?", "custom"),
            &application(),
            &profile(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, LlmError::EmptyContent));
    }
}
