// Document extraction prompt templates.
// All prompts for the documents module are defined here.

use crate::llm_client::prompts::fill_template;

/// Maximum number of document characters sent to the model.
pub const MAX_DOCUMENT_CHARS: usize = 10_000;

/// How much raw text is kept as a summary when the model reply cannot be parsed.
pub const FALLBACK_SUMMARY_CHARS: usize = 2_000;

pub const DOCUMENT_EXTRACTION_PROMPT: &str = r#"Extract structured information from this {document_type}.

DOCUMENT TEXT:
{document_text}

OUTPUT SCHEMA (return exactly this structure):
{
  "name": "full name",
  "email": "email address",
  "phone": "phone number",
  "summary": "one or two sentence professional summary, if the document has one",
  "education": [
    {
      "institution": "school name",
      "degree": "degree type",
      "field": "field of study",
      "graduation_year": "year",
      "gpa": "GPA if mentioned"
    }
  ],
  "experience": [
    {
      "company": "company name",
      "title": "job title",
      "duration": "time period",
      "responsibilities": ["list", "of", "key", "responsibilities"]
    }
  ],
  "projects": [
    {
      "name": "project name",
      "description": "what it does",
      "technologies": ["tech1", "tech2"]
    }
  ],
  "skills": ["skill1", "skill2", "skill3"],
  "certifications": ["cert1", "cert2"],
  "languages": ["spoken or written languages"]
}

RULES:
1. Extract all available information.
2. Use null or empty arrays for missing information. Never invent values.
3. Copy names, dates and grades exactly as written in the document.
4. Return ONLY the JSON object, no additional text."#;

pub fn build_extraction_prompt(document_type: &str, document_text: &str) -> String {
    fill_template(
        DOCUMENT_EXTRACTION_PROMPT,
        &[("document_type", document_type), ("document_text", document_text)],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extraction_prompt_fills_placeholders() {
        let prompt = build_extraction_prompt("transcript", "BSc Physics, 2019");
        assert!(prompt.starts_with("Extract structured information from this transcript."));
        assert!(prompt.contains("BSc Physics, 2019"));
        assert!(!prompt.contains("{document_text}"));
        assert!(prompt.contains("\"languages\""));
    }
}
