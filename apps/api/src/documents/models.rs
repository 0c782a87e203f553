use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use sqlx::FromRow;
use uuid::Uuid;

// ────────────────────────────────────────────────────────────────────────────
// Enumerations
// ────────────────────────────────────────────────────────────────────────────

/// What the user says a document is. Travels into the extraction prompt as a hint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Resume,
    Transcript,
    Certificate,
    #[default]
    Other,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Resume => "resume",
            DocumentType::Transcript => "transcript",
            DocumentType::Certificate => "certificate",
            DocumentType::Other => "other",
        }
    }
}

impl FromStr for DocumentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "resume" => Ok(DocumentType::Resume),
            "transcript" => Ok(DocumentType::Transcript),
            "certificate" => Ok(DocumentType::Certificate),
            "other" | "" => Ok(DocumentType::Other),
            other => Err(format!("unknown document type '{other}'")),
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of one stored extraction fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractedDataType {
    Name,
    Email,
    Phone,
    Summary,
    Education,
    Experience,
    Projects,
    Skills,
    Certifications,
    Languages,
}

impl ExtractedDataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractedDataType::Name => "name",
            ExtractedDataType::Email => "email",
            ExtractedDataType::Phone => "phone",
            ExtractedDataType::Summary => "summary",
            ExtractedDataType::Education => "education",
            ExtractedDataType::Experience => "experience",
            ExtractedDataType::Projects => "projects",
            ExtractedDataType::Skills => "skills",
            ExtractedDataType::Certifications => "certifications",
            ExtractedDataType::Languages => "languages",
        }
    }
}

impl FromStr for ExtractedDataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "name" => ExtractedDataType::Name,
            "email" => ExtractedDataType::Email,
            "phone" => ExtractedDataType::Phone,
            "summary" => ExtractedDataType::Summary,
            "education" => ExtractedDataType::Education,
            "experience" => ExtractedDataType::Experience,
            "projects" => ExtractedDataType::Projects,
            "skills" => ExtractedDataType::Skills,
            "certifications" => ExtractedDataType::Certifications,
            "languages" => ExtractedDataType::Languages,
            other => return Err(format!("unknown data type '{other}'")),
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Extraction schema
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EducationRecord {
    #[serde(default, deserialize_with = "lenient_string")]
    pub institution: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub degree: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub field: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub graduation_year: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub gpa: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperienceRecord {
    #[serde(default, deserialize_with = "lenient_string")]
    pub company: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub duration: Option<String>,
    #[serde(default, deserialize_with = "lenient_string_list")]
    pub responsibilities: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_string_list")]
    pub technologies: Vec<String>,
}

/// The fixed schema the extraction prompt asks for, and the shape of a merged user profile.
///
/// Deserialization is lenient: the model is allowed to send numbers where strings are
/// expected, a lone string where a list is expected, or nulls anywhere.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedProfile {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub phone: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub summary: Option<String>,
    #[serde(default, deserialize_with = "lenient_records")]
    pub education: Vec<EducationRecord>,
    #[serde(default, deserialize_with = "lenient_records")]
    pub experience: Vec<ExperienceRecord>,
    #[serde(default, deserialize_with = "lenient_records")]
    pub projects: Vec<ProjectRecord>,
    #[serde(default, deserialize_with = "lenient_string_list")]
    pub skills: Vec<String>,
    #[serde(default, deserialize_with = "lenient_string_list")]
    pub certifications: Vec<String>,
    #[serde(default, deserialize_with = "lenient_string_list")]
    pub languages: Vec<String>,
}

impl ExtractedProfile {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.email.is_none()
            && self.phone.is_none()
            && self.summary.is_none()
            && self.education.is_empty()
            && self.experience.is_empty()
            && self.projects.is_empty()
            && self.skills.is_empty()
            && self.certifications.is_empty()
            && self.languages.is_empty()
    }

    /// Splits the profile into storable fragments, one per non-empty field.
    pub fn into_fragments(self) -> Vec<(ExtractedDataType, Value)> {
        let mut fragments = Vec::new();

        let scalars = [
            (ExtractedDataType::Name, self.name),
            (ExtractedDataType::Email, self.email),
            (ExtractedDataType::Phone, self.phone),
            (ExtractedDataType::Summary, self.summary),
        ];
        for (data_type, value) in scalars {
            if let Some(value) = value {
                fragments.push((data_type, Value::String(value)));
            }
        }

        if !self.education.is_empty() {
            fragments.push((ExtractedDataType::Education, json!(self.education)));
        }
        if !self.experience.is_empty() {
            fragments.push((ExtractedDataType::Experience, json!(self.experience)));
        }
        if !self.projects.is_empty() {
            fragments.push((ExtractedDataType::Projects, json!(self.projects)));
        }

        let lists = [
            (ExtractedDataType::Skills, self.skills),
            (ExtractedDataType::Certifications, self.certifications),
            (ExtractedDataType::Languages, self.languages),
        ];
        for (data_type, items) in lists {
            if !items.is_empty() {
                fragments.push((data_type, json!(items)));
            }
        }

        fragments
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Lenient field decoding
// ────────────────────────────────────────────────────────────────────────────

pub(crate) fn value_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub(crate) fn value_to_string_list(value: Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.into_iter().filter_map(value_to_string).collect(),
        other => value_to_string(other).into_iter().collect(),
    }
}

pub(crate) fn value_to_records<T: DeserializeOwned>(value: Value) -> Vec<T> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .filter(Value::is_object)
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        obj @ Value::Object(_) => serde_json::from_value(obj).ok().into_iter().collect(),
        _ => Vec::new(),
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<Value>::deserialize(deserializer)?.and_then(value_to_string))
}

fn lenient_string_list<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<String>, D::Error> {
    Ok(Option::<Value>::deserialize(deserializer)?
        .map(value_to_string_list)
        .unwrap_or_default())
}

fn lenient_records<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(Option::<Value>::deserialize(deserializer)?
        .map(value_to_records)
        .unwrap_or_default())
}

// ────────────────────────────────────────────────────────────────────────────
// Rows
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DocumentRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub document_type: String,
    pub original_filename: String,
    pub s3_key: String,
    pub file_size: Option<i64>,
    pub is_processed: bool,
    pub processed_at: Option<DateTime<Utc>>,
    pub processing_error: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

impl DocumentRow {
    pub fn document_type(&self) -> DocumentType {
        self.document_type.parse().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExtractedInformationRow {
    pub id: Uuid,
    pub document_id: Uuid,
    pub data_type: String,
    pub content: Value,
    pub confidence_score: f64,
    pub extracted_at: DateTime<Utc>,
}
