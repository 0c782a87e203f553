//! Folds a user's extraction fragments into one profile.
//!
//! Fragments arrive newest first. Scalars keep the first non-empty value seen, simple string
//! lists are unioned case-insensitively, record lists are concatenated. A fragment that does
//! not fit its data type is skipped; merging never fails.

use std::collections::HashSet;

use serde_json::Value;
use tracing::warn;

use crate::documents::models::{
    value_to_records, value_to_string, value_to_string_list, ExtractedDataType,
    ExtractedInformationRow, ExtractedProfile,
};

pub fn merge_fragments(fragments: &[ExtractedInformationRow]) -> ExtractedProfile {
    let mut profile = ExtractedProfile::default();
    let mut seen_skills = HashSet::new();
    let mut seen_certifications = HashSet::new();
    let mut seen_languages = HashSet::new();

    for fragment in fragments {
        let Ok(data_type) = fragment.data_type.parse::<ExtractedDataType>() else {
            warn!(
                "Skipping fragment {} with unknown data type '{}'",
                fragment.id, fragment.data_type
            );
            continue;
        };
        let content = fragment.content.clone();

        let merged = match data_type {
            ExtractedDataType::Name => fill_scalar(&mut profile.name, content),
            ExtractedDataType::Email => fill_scalar(&mut profile.email, content),
            ExtractedDataType::Phone => fill_scalar(&mut profile.phone, content),
            ExtractedDataType::Summary => fill_scalar(&mut profile.summary, content),
            ExtractedDataType::Education => extend_records(&mut profile.education, content),
            ExtractedDataType::Experience => extend_records(&mut profile.experience, content),
            ExtractedDataType::Projects => extend_records(&mut profile.projects, content),
            ExtractedDataType::Skills => union_list(&mut profile.skills, &mut seen_skills, content),
            ExtractedDataType::Certifications => {
                union_list(&mut profile.certifications, &mut seen_certifications, content)
            }
            ExtractedDataType::Languages => {
                union_list(&mut profile.languages, &mut seen_languages, content)
            }
        };

        if !merged {
            warn!(
                "Skipping malformed {} fragment {} from document {}",
                data_type.as_str(),
                fragment.id,
                fragment.document_id
            );
        }
    }

    profile
}

/// Returns false when the content has the wrong shape for a scalar.
fn fill_scalar(slot: &mut Option<String>, content: Value) -> bool {
    if matches!(content, Value::Array(_) | Value::Object(_)) {
        return false;
    }
    if slot.is_none() {
        *slot = value_to_string(content);
    }
    true
}

fn extend_records<T: serde::de::DeserializeOwned>(target: &mut Vec<T>, content: Value) -> bool {
    if !matches!(content, Value::Array(_) | Value::Object(_)) {
        return matches!(content, Value::Null);
    }
    target.extend(value_to_records(content));
    true
}

fn union_list(target: &mut Vec<String>, seen: &mut HashSet<String>, content: Value) -> bool {
    if matches!(content, Value::Object(_)) {
        return false;
    }
    for item in value_to_string_list(content) {
        if seen.insert(item.to_lowercase()) {
            target.push(item);
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use serde_json::json;
    use uuid::Uuid;

    fn fragment(data_type: &str, content: Value, age_days: i64) -> ExtractedInformationRow {
        ExtractedInformationRow {
            id: Uuid::new_v4(),
            document_id: Uuid::new_v4(),
            data_type: data_type.to_string(),
            content,
            confidence_score: 0.0,
            extracted_at: Utc::now() - Duration::days(age_days),
        }
    }

    #[test]
    fn test_first_non_empty_scalar_wins() {
        let fragments = vec![
            fragment("name", json!("   "), 0),
            fragment("name", json!("Jane Q. Doe"), 1),
            fragment("name", json!("Jane Doe"), 2),
            fragment("phone", json!(5551234), 2),
        ];
        let profile = merge_fragments(&fragments);
        assert_eq!(profile.name.as_deref(), Some("Jane Q. Doe"));
        assert_eq!(profile.phone.as_deref(), Some("5551234"));
    }

    #[test]
    fn test_simple_lists_deduplicate_case_insensitively() {
        let fragments = vec![
            fragment("skills", json!(["Rust", " python ", "SQL"]), 0),
            fragment("skills", json!(["rust", "Python", "Go"]), 1),
            fragment("languages", json!("English"), 1),
        ];
        let profile = merge_fragments(&fragments);
        assert_eq!(profile.skills, vec!["Rust", "python", "SQL", "Go"]);
        assert_eq!(profile.languages, vec!["English"]);
    }

    #[test]
    fn test_complex_lists_concatenate_in_order() {
        let fragments = vec![
            fragment("experience", json!([{"company": "Acme", "title": "Engineer"}]), 0),
            fragment("experience", json!([{"company": "Initech", "title": "Intern"}]), 3),
            fragment("education", json!({"institution": "MIT", "degree": "BSc"}), 3),
        ];
        let profile = merge_fragments(&fragments);
        let companies: Vec<_> = profile
            .experience
            .iter()
            .filter_map(|e| e.company.as_deref())
            .collect();
        assert_eq!(companies, vec!["Acme", "Initech"]);
        assert_eq!(profile.education.len(), 1);
    }

    #[test]
    fn test_malformed_fragments_are_skipped() {
        let fragments = vec![
            fragment("name", json!({"first": "Jane"}), 0),
            fragment("skills", json!({"not": "a list"}), 0),
            fragment("education", json!("MIT"), 0),
            fragment("hobbies", json!(["chess"]), 0),
            fragment("name", json!("Jane Doe"), 1),
            fragment("skills", json!(["Rust"]), 1),
        ];
        let profile = merge_fragments(&fragments);
        assert_eq!(profile.name.as_deref(), Some("Jane Doe"));
        assert_eq!(profile.skills, vec!["Rust"]);
        assert!(profile.education.is_empty());
    }

    #[test]
    fn test_no_fragments_gives_empty_profile() {
        assert!(merge_fragments(&[]).is_empty());
    }
}
