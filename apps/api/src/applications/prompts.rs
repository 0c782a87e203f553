// Application LLM prompt templates.
// All prompts for the applications module are defined here.

use crate::llm_client::prompts::fill_template;

/// Maximum number of scraped page characters sent to the model.
pub const MAX_PAGE_CHARS: usize = 8_000;

pub const QUESTION_EXTRACTION_PROMPT: &str = r#"Analyze this {application_type} application page and extract all questions that applicants need to answer.

PAGE CONTENT:
{content}

OUTPUT SCHEMA (return a JSON array with exactly this structure):
[
  {
    "question_text": "the full question text",
    "question_type": "short_answer" | "essay" | "experience" | "education" | "skills" | "custom",
    "is_required": true | false
  }
]

RULES:
1. Only include actual questions, not general descriptions.
2. Classify question types accurately:
   - short_answer: brief responses (1-2 sentences)
   - essay: long-form responses (paragraphs)
   - experience: work experience questions
   - education: education background questions
   - skills: technical or soft skills questions
   - custom: other types of questions
3. Mark questions as required if explicitly stated or if they seem mandatory.
4. If no questions are found, return an empty array [].
5. Return ONLY the JSON array, no additional text."#;

pub const RESPONSE_GENERATION_PROMPT: &str = r#"You are helping a user answer an application question professionally and authentically.

APPLICATION: {title} at {organisation} ({application_type})
QUESTION: {question_text}
QUESTION TYPE: {question_type}

USER'S INFORMATION:
{user_context}

Generate a professional, tailored response that:
1. Directly answers the question
2. Uses specific examples and details from the user's background
3. Is appropriate in length for the question type: {length_guidance}
4. Maintains a professional yet authentic tone
5. Highlights achievements and qualifications relevant to the question and the application
6. Does NOT include generic advice or platitudes
7. Does NOT mention that this is AI-generated

Return ONLY the response text, no preamble or explanation."#;

pub fn build_question_extraction_prompt(application_type: &str, content: &str) -> String {
    fill_template(
        QUESTION_EXTRACTION_PROMPT,
        &[("application_type", application_type), ("content", content)],
    )
}
