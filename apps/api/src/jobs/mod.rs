//! Background Job Orchestrator.
//!
//! Every pipeline step is a `Job`. Steps chain by enqueueing their follow-up job, so a
//! failure in one step is retried on its own without replaying the steps before it.

pub mod queue;
pub mod worker;

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Job {
    ProcessDocument {
        document_id: Uuid,
    },
    ExtractInformation {
        document_id: Uuid,
        /// Parsed text handed over from `ProcessDocument`. Re-parsed from storage when absent.
        #[serde(default)]
        text: Option<String>,
    },
    ReprocessDocument {
        document_id: Uuid,
        #[serde(default)]
        force: bool,
    },
    BulkProcessDocuments {
        document_ids: Vec<Uuid>,
    },
    CleanupOldDocuments {
        days: i64,
        #[serde(default)]
        delete: bool,
    },
    ScrapeApplication {
        application_id: Uuid,
        #[serde(default)]
        then_generate: bool,
    },
    ExtractQuestions {
        application_id: Uuid,
        #[serde(default)]
        content: Option<String>,
        #[serde(default)]
        then_generate: bool,
    },
    GenerateResponse {
        question_id: Uuid,
    },
    BatchGenerateResponses {
        application_id: Uuid,
        #[serde(default)]
        regenerate: bool,
    },
}

impl Job {
    pub fn kind(&self) -> &'static str {
        match self {
            Job::ProcessDocument { .. } => "process_document",
            Job::ExtractInformation { .. } => "extract_information",
            Job::ReprocessDocument { .. } => "reprocess_document",
            Job::BulkProcessDocuments { .. } => "bulk_process_documents",
            Job::CleanupOldDocuments { .. } => "cleanup_old_documents",
            Job::ScrapeApplication { .. } => "scrape_application",
            Job::ExtractQuestions { .. } => "extract_questions",
            Job::GenerateResponse { .. } => "generate_response",
            Job::BatchGenerateResponses { .. } => "batch_generate_responses",
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            Job::ProcessDocument { .. }
            | Job::ExtractInformation { .. }
            | Job::ExtractQuestions { .. }
            | Job::GenerateResponse { .. } => RetryPolicy::new(3, Duration::from_secs(60)),
            Job::ScrapeApplication { .. } => RetryPolicy::new(5, Duration::from_secs(30)),
            Job::ReprocessDocument { .. }
            | Job::BulkProcessDocuments { .. }
            | Job::CleanupOldDocuments { .. }
            | Job::BatchGenerateResponses { .. } => RetryPolicy::none(),
        }
    }

    /// The document this job works on, if any. Used by the failure hook.
    pub fn document_id(&self) -> Option<Uuid> {
        match self {
            Job::ProcessDocument { document_id } | Job::ExtractInformation { document_id, .. } => {
                Some(*document_id)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEnvelope {
    pub id: Uuid,
    pub job: Job,
    /// Number of failed runs so far. 0 on first delivery.
    pub attempt: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl JobEnvelope {
    pub fn new(job: Job) -> Self {
        Self {
            id: Uuid::new_v4(),
            job,
            attempt: 0,
            enqueued_at: Utc::now(),
        }
    }

    /// The same job, one attempt later.
    pub fn next_attempt(self) -> Self {
        Self {
            attempt: self.attempt + 1,
            enqueued_at: Utc::now(),
            ..self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    pub const fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Backoff before retry number `attempt + 1`: `base_delay * 2^attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .unwrap_or(Duration::MAX)
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

#[derive(Debug, Error)]
pub enum JobError {
    /// Infrastructure trouble (network, model, database). Worth another attempt.
    #[error("{0}")]
    Retryable(#[from] anyhow::Error),

    /// Missing rows, unreadable files, invalid input. Retrying cannot help.
    #[error("{0}")]
    Fatal(anyhow::Error),
}

impl JobError {
    pub fn fatal(message: impl Into<String>) -> Self {
        JobError::Fatal(anyhow::anyhow!(message.into()))
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, JobError::Retryable(_))
    }
}

impl From<crate::documents::parser::ParseError> for JobError {
    fn from(e: crate::documents::parser::ParseError) -> Self {
        JobError::Fatal(e.into())
    }
}

impl From<crate::llm_client::LlmError> for JobError {
    fn from(e: crate::llm_client::LlmError) -> Self {
        JobError::Retryable(e.into())
    }
}

impl From<crate::jobs::queue::QueueError> for JobError {
    fn from(e: crate::jobs::queue::QueueError) -> Self {
        JobError::Retryable(e.into())
    }
}

/// Outcome summary of a finished job, logged by the worker.
pub type JobResult = Result<serde_json::Value, JobError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_serializes_with_kind_tag() {
        let job = Job::ReprocessDocument {
            document_id: Uuid::nil(),
            force: true,
        };
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["kind"], "reprocess_document");
        assert_eq!(value["force"], true);
        assert_eq!(job.kind(), "reprocess_document");
    }

    #[test]
    fn test_optional_job_fields_default() {
        let job: Job = serde_json::from_value(serde_json::json!({
            "kind": "extract_questions",
            "application_id": Uuid::nil(),
        }))
        .unwrap();
        assert_eq!(
            job,
            Job::ExtractQuestions {
                application_id: Uuid::nil(),
                content: None,
                then_generate: false,
            }
        );
    }

    #[test]
    fn test_retry_policies_per_job() {
        let process = Job::ProcessDocument {
            document_id: Uuid::nil(),
        };
        assert_eq!(
            process.retry_policy(),
            RetryPolicy::new(3, Duration::from_secs(60))
        );
        let scrape = Job::ScrapeApplication {
            application_id: Uuid::nil(),
            then_generate: false,
        };
        assert_eq!(scrape.retry_policy().max_retries, 5);
        let bulk = Job::BulkProcessDocuments {
            document_ids: vec![],
        };
        assert!(!bulk.retry_policy().should_retry(0));
    }

    #[test]
    fn test_backoff_doubles_per_attempt() {
        let policy = RetryPolicy::new(3, Duration::from_secs(60));
        assert_eq!(policy.delay_for(0), Duration::from_secs(60));
        assert_eq!(policy.delay_for(1), Duration::from_secs(120));
        assert_eq!(policy.delay_for(2), Duration::from_secs(240));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert_eq!(policy.delay_for(40), Duration::MAX);
    }

    #[test]
    fn test_next_attempt_keeps_identity() {
        let envelope = JobEnvelope::new(Job::GenerateResponse {
            question_id: Uuid::nil(),
        });
        let retried = envelope.clone().next_attempt();
        assert_eq!(retried.id, envelope.id);
        assert_eq!(retried.attempt, 1);
        assert_eq!(retried.job, envelope.job);
    }

    #[test]
    fn test_parse_errors_are_fatal() {
        let err: JobError =
            crate::documents::parser::ParseError::UnsupportedFormat(".exe".into()).into();
        assert!(!err.is_retryable());
        let err: JobError = anyhow::anyhow!("connection reset").into();
        assert!(err.is_retryable());
    }
}
