//! Document jobs: parse, extract, reprocess, bulk fan-out and cleanup.

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::documents::extraction::extract_document_information;
use crate::documents::models::DocumentRow;
use crate::documents::store;
use crate::jobs::queue::JobQueue;
use crate::jobs::{Job, JobError, JobResult};
use crate::state::AppState;

/// Gap between parsing a document and extracting from it.
const EXTRACTION_DELAY: Duration = Duration::from_secs(2);

async fn load_document(state: &AppState, document_id: Uuid) -> Result<DocumentRow, JobError> {
    store::get_document(&state.db, document_id)
        .await?
        .ok_or_else(|| JobError::fatal(format!("Document with id {document_id} does not exist")))
}

async fn parse_stored_document(state: &AppState, document: &DocumentRow) -> Result<String, JobError> {
    let bytes = store::get_object(&state.s3, &state.config.s3_bucket, &document.s3_key).await?;
    let parsed = state
        .parser
        .parse(bytes, &document.original_filename, document.document_type())
        .await?;
    Ok(parsed.text)
}

/// Parses the stored file, marks the document processed and queues extraction.
pub async fn process_document(state: &AppState, document_id: Uuid) -> JobResult {
    let document = load_document(state, document_id).await?;
    info!("Processing document: {}", document.original_filename);

    let text = parse_stored_document(state, &document).await?;
    info!("Extracted {} characters from document", text.chars().count());

    let extraction_job_id = mark_then_queue_extraction(
        store::mark_processed(&state.db, document_id),
        state.queue.as_ref(),
        document_id,
        text,
    )
    .await?;

    Ok(json!({
        "status": "success",
        "document_id": document_id,
        "filename": document.original_filename,
        "processed_at": Utc::now(),
        "extraction_job_id": extraction_job_id,
    }))
}

/// Awaits `mark_processed` before queueing extraction. A failed mark is retried on its own;
/// only a marked document gets an `ExtractInformation` job, so fragments are stored once.
async fn mark_then_queue_extraction(
    mark_processed: impl Future<Output = anyhow::Result<()>>,
    queue: &dyn JobQueue,
    document_id: Uuid,
    text: String,
) -> Result<Uuid, JobError> {
    mark_processed.await?;
    let job = Job::ExtractInformation {
        document_id,
        text: Some(text),
    };
    Ok(queue.submit(job, EXTRACTION_DELAY).await?)
}

/// Runs the model over the document text and stores one fragment per extracted field.
pub async fn extract_information(
    state: &AppState,
    document_id: Uuid,
    text: Option<String>,
) -> JobResult {
    let document = load_document(state, document_id).await?;
    info!("Extracting information from: {}", document.original_filename);

    let text = match text.filter(|t| !t.trim().is_empty()) {
        Some(text) => text,
        None => parse_stored_document(state, &document).await?,
    };

    let profile =
        extract_document_information(state.llm.as_ref(), &text, document.document_type()).await?;
    let fragments = profile.into_fragments();
    let extraction_types: Vec<&str> = fragments.iter().map(|(t, _)| t.as_str()).collect();

    let created = store::insert_fragments(&state.db, document_id, &fragments).await?;

    Ok(json!({
        "status": "success",
        "document_id": document_id,
        "extracted_records": created,
        "extraction_types": extraction_types,
    }))
}

pub async fn reprocess_document(state: &AppState, document_id: Uuid, force: bool) -> JobResult {
    let document = load_document(state, document_id).await?;

    if document.is_processed && !force {
        info!("Document {} already processed, skipping", document_id);
        return Ok(json!({
            "status": "skipped",
            "document_id": document_id,
            "message": "Document already processed, use force=true to reprocess",
        }));
    }

    if force {
        let cleared = store::delete_fragments(&state.db, document_id).await?;
        info!(
            "Cleared {} extracted fragments for document {}",
            cleared, document_id
        );
    }

    store::reset_processing(&state.db, document_id).await?;
    let processing_job_id = state
        .queue
        .submit(Job::ProcessDocument { document_id }, Duration::ZERO)
        .await?;

    Ok(json!({
        "status": "success",
        "document_id": document_id,
        "processing_job_id": processing_job_id,
    }))
}

/// Queues one `ProcessDocument` per id. A failure to queue one id does not stop the rest.
pub async fn bulk_process_documents(state: &AppState, document_ids: &[Uuid]) -> JobResult {
    let mut results = Vec::with_capacity(document_ids.len());

    for (i, document_id) in document_ids.iter().enumerate() {
        let job = Job::ProcessDocument {
            document_id: *document_id,
        };
        match state.queue.submit(job, Duration::ZERO).await {
            Ok(job_id) => results.push(json!({
                "document_id": document_id,
                "job_id": job_id,
                "status": "queued",
            })),
            Err(e) => {
                warn!("Error queueing document {}: {}", document_id, e);
                results.push(json!({
                    "document_id": document_id,
                    "status": "error",
                    "error": e.to_string(),
                }));
            }
        }
        info!("Bulk processing progress: {}/{}", i + 1, document_ids.len());
    }

    let queued = results.iter().filter(|r| r["status"] == "queued").count();
    Ok(json!({
        "status": "success",
        "total_documents": document_ids.len(),
        "queued": queued,
        "failed": results.len() - queued,
        "results": results,
    }))
}

/// Finds unprocessed documents older than `days`. Rows and stored files are removed only
/// when `delete` is set.
pub async fn cleanup_old_documents(state: &AppState, days: i64, delete: bool) -> JobResult {
    if days < 0 {
        return Err(JobError::fatal(format!("days must not be negative, got {days}")));
    }
    let cutoff = chrono::Duration::try_days(days)
        .and_then(|window| Utc::now().checked_sub_signed(window))
        .ok_or_else(|| JobError::fatal(format!("days is out of range: {days}")))?;
    let stale = store::stale_unprocessed_documents(&state.db, cutoff).await?;
    info!("Found {} old documents that could be cleaned up", stale.len());

    let mut deleted = 0usize;
    if delete {
        for document in &stale {
            if let Err(e) =
                store::delete_object(&state.s3, &state.config.s3_bucket, &document.s3_key).await
            {
                warn!("Keeping document {} after storage error: {}", document.id, e);
                continue;
            }
            store::delete_document(&state.db, document.id).await?;
            deleted += 1;
        }
    }

    Ok(json!({
        "status": "success",
        "cutoff_date": cutoff,
        "documents_found": stale.len(),
        "documents_deleted": deleted,
    }))
}

/// Failure hook: leaves the document unprocessed with the error text for the user to see.
pub async fn record_failure(state: &AppState, document_id: Uuid, error: &JobError) {
    if let Err(e) = store::mark_failed(&state.db, document_id, &error.to_string()).await {
        warn!(
            "Could not record processing failure for document {}: {}",
            document_id, e
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::queue::InMemoryJobQueue;

    #[tokio::test]
    async fn test_failed_mark_queues_no_extraction() {
        let queue = InMemoryJobQueue::new();
        let result = mark_then_queue_extraction(
            async { Err::<(), _>(anyhow::anyhow!("connection reset")) },
            &queue,
            Uuid::from_u128(1),
            "resume text".to_string(),
        )
        .await;

        assert!(matches!(result, Err(JobError::Retryable(_))));
        assert!(queue.pending().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_marked_document_queues_one_delayed_extraction() {
        let queue = InMemoryJobQueue::new();
        let document_id = Uuid::from_u128(2);

        let job_id = mark_then_queue_extraction(
            async { Ok::<(), anyhow::Error>(()) },
            &queue,
            document_id,
            "resume text".to_string(),
        )
        .await
        .unwrap();

        let pending = queue.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].0.id, job_id);
        assert_eq!(pending[0].1, EXTRACTION_DELAY);
        assert_eq!(
            pending[0].0.job,
            Job::ExtractInformation {
                document_id,
                text: Some("resume text".to_string()),
            }
        );
    }
}
