use serde_json::Value;
use tracing::{error, info, warn};

use crate::applications::models::{ApplicationType, ExtractedQuestion};
use crate::applications::prompts::{build_question_extraction_prompt, MAX_PAGE_CHARS};
use crate::llm_client::prompts::{truncate_chars, JSON_ONLY_SYSTEM};
use crate::llm_client::{parse_json_reply, LlmError, TextGenerator};

/// Asks the model for the questions on an application page.
///
/// A reply that is not a JSON array yields no questions. Transport and API failures
/// propagate so the job can retry.
pub async fn extract_questions(
    llm: &dyn TextGenerator,
    content: &str,
    application_type: ApplicationType,
) -> Result<Vec<ExtractedQuestion>, LlmError> {
    let prompt = build_question_extraction_prompt(
        application_type.as_str(),
        truncate_chars(content, MAX_PAGE_CHARS),
    );
    let reply = llm.generate(&prompt, JSON_ONLY_SYSTEM).await?;

    let items: Vec<Value> = match parse_json_reply(&reply) {
        Ok(items) => items,
        Err(e) => {
            error!("Failed to parse question extraction reply as JSON: {e}");
            return Ok(Vec::new());
        }
    };

    let questions: Vec<ExtractedQuestion> = items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<ExtractedQuestion>(item) {
            Ok(q) => Some(q),
            Err(e) => {
                warn!("Skipping malformed extracted question: {e}");
                None
            }
        })
        .filter_map(|mut q| {
            q.question_text = q.question_text.trim().to_string();
            (!q.question_text.is_empty()).then_some(q)
        })
        .collect();

    info!(
        "Extracted {} questions from {} application",
        questions.len(),
        application_type
    );
    Ok(questions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::applications::models::QuestionType;
    use crate::llm_client::testing::ScriptedGenerator;

    #[tokio::test]
    async fn test_extracts_typed_questions() {
        let llm = ScriptedGenerator::new([r#"```json
[
  {"question_text": "Why do you want this role?", "question_type": "essay", "is_required": true},
  {"question_text": "  ", "question_type": "short_answer"},
  {"question_text": "Tell us something fun.", "question_type": "icebreaker"},
  42
]
```"#]);
        let questions = extract_questions(&llm, "page text", ApplicationType::Job)
            .await
            .unwrap();
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].question_type, QuestionType::Essay);
        assert!(questions[0].is_required);
        assert_eq!(questions[1].question_type, QuestionType::Custom);
        assert!(!questions[1].is_required);
    }

    #[tokio::test]
    async fn test_prompt_names_application_type_and_truncates() {
        let llm = ScriptedGenerator::new(["[]"]);
        let content = "q".repeat(MAX_PAGE_CHARS + 100);
        let questions = extract_questions(&llm, &content, ApplicationType::Scholarship)
            .await
            .unwrap();
        assert!(questions.is_empty());
        let prompt = llm.last_prompt().unwrap();
        assert!(prompt.starts_with("Analyze this scholarship application page"));
        assert!(!prompt.contains(&"q".repeat(MAX_PAGE_CHARS + 1)));
    }

    #[tokio::test]
    async fn test_non_json_reply_yields_no_questions() {
        let llm = ScriptedGenerator::new(["I found three questions: ..."]);
        let questions = extract_questions(&llm, "page", ApplicationType::Job)
            .await
            .unwrap();
        assert!(questions.is_empty());
    }

    #[tokio::test]
    async fn test_api_failure_propagates() {
        let llm = ScriptedGenerator::failing(500);
        assert!(extract_questions(&llm, "page", ApplicationType::Job).await.is_err());
    }
}
