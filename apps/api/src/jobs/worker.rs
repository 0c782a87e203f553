use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::applications::pipeline as applications;
use crate::documents::pipeline as documents;
use crate::jobs::queue::JobQueue;
use crate::jobs::{Job, JobEnvelope, JobError, JobResult};
use crate::state::AppState;

/// Sleep between polls of an empty queue.
const POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Sleep after the queue itself failed (e.g. Redis unreachable).
const QUEUE_ERROR_BACKOFF: Duration = Duration::from_secs(5);

const CLEANUP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);
/// Unprocessed documents older than this are reported by the scheduled sweep.
pub const CLEANUP_AGE_DAYS: i64 = 365;

#[derive(Debug)]
pub enum JobOutcome {
    Completed(Value),
    Retrying { attempt: u32, delay: Duration },
    Failed(JobError),
}

/// Starts `concurrency` workers draining the queue. They run until the process exits.
pub fn spawn_workers(state: AppState, concurrency: usize) -> Vec<JoinHandle<()>> {
    let concurrency = concurrency.max(1);
    info!("Starting {} background workers", concurrency);
    (0..concurrency)
        .map(|worker_id| {
            let state = state.clone();
            tokio::spawn(async move { worker_loop(worker_id, state).await })
        })
        .collect()
}

/// Queues a report-only `CleanupOldDocuments` once a day.
pub fn spawn_cleanup_schedule(queue: Arc<dyn JobQueue>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(CLEANUP_INTERVAL);
        // The first tick completes immediately; skip it so startup stays quiet.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let job = Job::CleanupOldDocuments {
                days: CLEANUP_AGE_DAYS,
                delete: false,
            };
            match queue.submit(job, Duration::ZERO).await {
                Ok(job_id) => info!(%job_id, "Scheduled document cleanup queued"),
                Err(e) => error!("Could not queue scheduled cleanup: {}", e),
            }
        }
    })
}

async fn worker_loop(worker_id: usize, state: AppState) {
    loop {
        match state.queue.dequeue().await {
            Ok(Some(envelope)) => {
                run_envelope(&state, envelope).await;
            }
            Ok(None) => tokio::time::sleep(POLL_INTERVAL).await,
            Err(e) => {
                error!(worker_id, "Job queue unavailable: {}", e);
                tokio::time::sleep(QUEUE_ERROR_BACKOFF).await;
            }
        }
    }
}

/// Runs one delivery end to end: dispatch, then retry scheduling or the failure hook.
pub async fn run_envelope(state: &AppState, envelope: JobEnvelope) -> JobOutcome {
    info!(
        job_id = %envelope.id,
        kind = envelope.job.kind(),
        attempt = envelope.attempt,
        "Job started"
    );

    let document_id = envelope.job.document_id();
    let result = dispatch(state, &envelope.job).await;
    let outcome = settle(state.queue.as_ref(), envelope, result).await;

    if let (JobOutcome::Failed(error), Some(document_id)) = (&outcome, document_id) {
        documents::record_failure(state, document_id, error).await;
    }
    outcome
}

pub async fn dispatch(state: &AppState, job: &Job) -> JobResult {
    match job {
        Job::ProcessDocument { document_id } => {
            documents::process_document(state, *document_id).await
        }
        Job::ExtractInformation { document_id, text } => {
            documents::extract_information(state, *document_id, text.clone()).await
        }
        Job::ReprocessDocument { document_id, force } => {
            documents::reprocess_document(state, *document_id, *force).await
        }
        Job::BulkProcessDocuments { document_ids } => {
            documents::bulk_process_documents(state, document_ids).await
        }
        Job::CleanupOldDocuments { days, delete } => {
            documents::cleanup_old_documents(state, *days, *delete).await
        }
        Job::ScrapeApplication {
            application_id,
            then_generate,
        } => applications::scrape_application(state, *application_id, *then_generate).await,
        Job::ExtractQuestions {
            application_id,
            content,
            then_generate,
        } => {
            applications::extract_application_questions(
                state,
                *application_id,
                content.clone(),
                *then_generate,
            )
            .await
        }
        Job::GenerateResponse { question_id } => {
            applications::generate_question_response(state, *question_id).await
        }
        Job::BatchGenerateResponses {
            application_id,
            regenerate,
        } => applications::batch_generate_responses(state, *application_id, *regenerate).await,
    }
}

/// Decides what happens after a run: done, re-enqueued with backoff, or failed for good.
async fn settle(queue: &dyn JobQueue, envelope: JobEnvelope, result: JobResult) -> JobOutcome {
    let job_id = envelope.id;
    let kind = envelope.job.kind();

    let error = match result {
        Ok(summary) => {
            info!(%job_id, kind, summary = %summary, "Job completed");
            return JobOutcome::Completed(summary);
        }
        Err(error) => error,
    };

    let policy = envelope.job.retry_policy();
    if !error.is_retryable() || !policy.should_retry(envelope.attempt) {
        error!(
            %job_id,
            kind,
            attempt = envelope.attempt,
            "Job failed permanently: {}",
            error
        );
        return JobOutcome::Failed(error);
    }

    let delay = policy.delay_for(envelope.attempt);
    let next = envelope.next_attempt();
    let attempt = next.attempt;
    warn!(
        %job_id,
        kind,
        attempt,
        "Job failed, retrying in {}s: {}",
        delay.as_secs(),
        error
    );

    match queue.enqueue(next, delay).await {
        Ok(()) => JobOutcome::Retrying { attempt, delay },
        Err(e) => {
            error!(%job_id, kind, "Could not re-enqueue job for retry: {}", e);
            JobOutcome::Failed(error)
        }
    }
}
