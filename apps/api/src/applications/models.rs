use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

use crate::documents::models::value_to_string;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationType {
    #[default]
    Job,
    Scholarship,
}

impl ApplicationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationType::Job => "job",
            ApplicationType::Scholarship => "scholarship",
        }
    }
}

impl FromStr for ApplicationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "job" => Ok(ApplicationType::Job),
            "scholarship" => Ok(ApplicationType::Scholarship),
            other => Err(format!("unknown application type '{other}'")),
        }
    }
}

impl fmt::Display for ApplicationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    ShortAnswer,
    Essay,
    Experience,
    Education,
    Skills,
    #[default]
    #[serde(other)]
    Custom,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::ShortAnswer => "short_answer",
            QuestionType::Essay => "essay",
            QuestionType::Experience => "experience",
            QuestionType::Education => "education",
            QuestionType::Skills => "skills",
            QuestionType::Custom => "custom",
        }
    }

    /// Anything unrecognised is a custom question.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "short_answer" => QuestionType::ShortAnswer,
            "essay" => QuestionType::Essay,
            "experience" => QuestionType::Experience,
            "education" => QuestionType::Education,
            "skills" => QuestionType::Skills,
            _ => QuestionType::Custom,
        }
    }

    /// Answer length guidance included in the generation prompt.
    pub fn length_guidance(&self) -> &'static str {
        match self {
            QuestionType::ShortAnswer => "1-3 sentences, concise and direct",
            QuestionType::Essay => "2-4 paragraphs, detailed with examples",
            QuestionType::Experience => "1-2 paragraphs highlighting relevant work",
            QuestionType::Education => "1-2 paragraphs about educational background",
            QuestionType::Skills => "a bulleted list or paragraph of relevant skills",
            QuestionType::Custom => "adapt the length to what the question asks for",
        }
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One question as returned by the question-extraction prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedQuestion {
    #[serde(default, alias = "text", deserialize_with = "lenient_text")]
    pub question_text: String,
    #[serde(default, alias = "type", deserialize_with = "lenient_question_type")]
    pub question_type: QuestionType,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_required: bool,
}

fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<Value>::deserialize(deserializer)?
        .and_then(value_to_string)
        .unwrap_or_default())
}

fn lenient_question_type<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<QuestionType, D::Error> {
    Ok(Option::<Value>::deserialize(deserializer)?
        .and_then(value_to_string)
        .map(|s| QuestionType::parse_lenient(&s))
        .unwrap_or_default())
}

fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Bool(b)) => b,
        Some(Value::String(s)) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "yes"),
        _ => false,
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Rows
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ApplicationRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub application_type: String,
    pub title: String,
    pub company_or_institution: String,
    pub url: Option<String>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl ApplicationRow {
    pub fn application_type(&self) -> ApplicationType {
        self.application_type.parse().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QuestionRow {
    pub id: Uuid,
    pub application_id: Uuid,
    pub question_text: String,
    pub question_type: String,
    pub is_required: bool,
    pub is_extracted: bool,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
}

impl QuestionRow {
    pub fn question_type(&self) -> QuestionType {
        QuestionType::parse_lenient(&self.question_type)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ResponseRow {
    pub id: Uuid,
    pub question_id: Uuid,
    pub generated_response: String,
    pub edited_response: Option<String>,
    pub is_ai_generated: bool,
    pub generation_prompt: String,
    pub generated_at: Option<DateTime<Utc>>,
    pub version: i32,
}

impl ResponseRow {
    /// The user's edit when there is one, otherwise the generated text.
    pub fn final_response(&self) -> &str {
        match self.edited_response.as_deref() {
            Some(edited) if !edited.trim().is_empty() => edited,
            _ => &self.generated_response,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_question_type_is_custom() {
        let q: ExtractedQuestion = serde_json::from_value(json!({
            "question_text": "Why us?",
            "question_type": "motivation",
            "is_required": true
        }))
        .unwrap();
        assert_eq!(q.question_type, QuestionType::Custom);
        assert!(q.is_required);
    }

    #[test]
    fn test_extracted_question_accepts_short_keys() {
        let q: ExtractedQuestion = serde_json::from_value(json!({
            "text": "Describe a project you led.",
            "type": "Short Answer"
        }))
        .unwrap();
        assert_eq!(q.question_text, "Describe a project you led.");
        assert_eq!(q.question_type, QuestionType::ShortAnswer);
        assert!(!q.is_required);
    }

    #[test]
    fn test_is_required_tolerates_strings_and_null() {
        let q: ExtractedQuestion = serde_json::from_value(json!({
            "question_text": "GPA?", "question_type": null, "is_required": "yes"
        }))
        .unwrap();
        assert!(q.is_required);
        assert_eq!(q.question_type, QuestionType::Custom);
    }

    #[test]
    fn test_final_response_prefers_edit() {
        let mut row = ResponseRow {
            id: Uuid::nil(),
            question_id: Uuid::nil(),
            generated_response: "generated".to_string(),
            edited_response: None,
            is_ai_generated: true,
            generation_prompt: String::new(),
            generated_at: None,
            version: 1,
        };
        assert_eq!(row.final_response(), "generated");
        row.edited_response = Some("mine".to_string());
        assert_eq!(row.final_response(), "mine");
        row.edited_response = Some("   ".to_string());
        assert_eq!(row.final_response(), "generated");
    }

    #[test]
    fn test_application_type_parsing() {
        assert_eq!("Scholarship".parse::<ApplicationType>(), Ok(ApplicationType::Scholarship));
        assert!("internship".parse::<ApplicationType>().is_err());
    }
}
