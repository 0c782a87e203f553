//! Application jobs: scrape, question extraction and answer generation.

use std::time::Duration;

use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::applications::models::ApplicationRow;
use crate::applications::questions::extract_questions;
use crate::applications::responder::generate_response;
use crate::applications::scraper::ScrapeError;
use crate::applications::store;
use crate::documents::merge::merge_fragments;
use crate::documents::store as document_store;
use crate::jobs::{Job, JobError, JobResult};
use crate::state::AppState;

impl From<ScrapeError> for JobError {
    fn from(e: ScrapeError) -> Self {
        match e {
            ScrapeError::InvalidUrl(_) => JobError::Fatal(e.into()),
            other => JobError::Retryable(other.into()),
        }
    }
}

async fn load_application(state: &AppState, application_id: Uuid) -> Result<ApplicationRow, JobError> {
    store::get_application(&state.db, application_id)
        .await?
        .ok_or_else(|| {
            JobError::fatal(format!("Application with id {application_id} does not exist"))
        })
}

/// Scrapes the application URL, fills a blank description and queues question extraction.
pub async fn scrape_application(
    state: &AppState,
    application_id: Uuid,
    then_generate: bool,
) -> JobResult {
    let application = load_application(state, application_id).await?;
    let url = application
        .url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| JobError::fatal(format!("Application {application_id} has no URL to scrape")))?;

    let page = state.scraper.scrape_url(url).await?;

    let description_filled = if page.content.is_empty() {
        false
    } else {
        store::fill_empty_description(&state.db, application_id, &page.content).await?
    };

    let extraction_job_id = if page.content.is_empty() {
        warn!("Scraped page for application {} has no text", application_id);
        None
    } else {
        let job = Job::ExtractQuestions {
            application_id,
            content: Some(page.content.clone()),
            then_generate,
        };
        Some(state.queue.submit(job, Duration::ZERO).await?)
    };

    Ok(json!({
        "status": "success",
        "application_id": application_id,
        "url": page.url,
        "title": page.title,
        "content_length": page.content.chars().count(),
        "description_filled": description_filled,
        "extraction_job_id": extraction_job_id,
    }))
}

/// Extracts questions from scraped content (or the stored description) and stores the new ones.
pub async fn extract_application_questions(
    state: &AppState,
    application_id: Uuid,
    content: Option<String>,
    then_generate: bool,
) -> JobResult {
    let application = load_application(state, application_id).await?;
    info!("Extracting questions for: {}", application.title);

    let content = content
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| application.description.clone());
    if content.trim().is_empty() {
        warn!(
            "No content available for question extraction: {}",
            application_id
        );
        return Ok(json!({
            "status": "skipped",
            "application_id": application_id,
            "message": "No content available for extraction",
        }));
    }

    let questions =
        extract_questions(state.llm.as_ref(), &content, application.application_type()).await?;
    let created = store::insert_extracted_questions(&state.db, application_id, &questions).await?;

    let generation_job_id = if then_generate {
        let job = Job::BatchGenerateResponses {
            application_id,
            regenerate: false,
        };
        Some(state.queue.submit(job, Duration::ZERO).await?)
    } else {
        None
    };

    Ok(json!({
        "status": "success",
        "application_id": application_id,
        "questions_found": questions.len(),
        "questions_extracted": created.len(),
        "question_ids": created,
        "generation_job_id": generation_job_id,
    }))
}

/// Generates and stores the answer to one question from the owner's merged profile.
pub async fn generate_question_response(state: &AppState, question_id: Uuid) -> JobResult {
    let question = store::get_question(&state.db, question_id)
        .await?
        .ok_or_else(|| JobError::fatal(format!("Question with id {question_id} does not exist")))?;
    let application = load_application(state, question.application_id).await?;

    let preview: String = question.question_text.chars().take(50).collect();
    info!("Generating response for question: {}...", preview);

    let fragments = document_store::fragments_for_user(&state.db, application.user_id).await?;
    let profile = merge_fragments(&fragments);

    let generated =
        generate_response(state.llm.as_ref(), &question, &application, &profile).await?;
    let response = store::upsert_generated_response(&state.db, question_id, &generated).await?;

    Ok(json!({
        "status": "success",
        "question_id": question_id,
        "response_id": response.id,
        "created": response.version == 1,
        "response_length": generated.response.chars().count(),
        "fragments_used": fragments.len(),
    }))
}

/// Queues `GenerateResponse` for every question, or only unanswered ones unless `regenerate`.
pub async fn batch_generate_responses(
    state: &AppState,
    application_id: Uuid,
    regenerate: bool,
) -> JobResult {
    load_application(state, application_id).await?;
    let questions = store::list_questions(&state.db, application_id).await?;

    if questions.is_empty() {
        warn!("No questions found for application {}", application_id);
        return Ok(json!({
            "status": "skipped",
            "application_id": application_id,
            "message": "No questions found",
        }));
    }

    let to_process: Vec<Uuid> = if regenerate {
        questions.iter().map(|q| q.id).collect()
    } else {
        store::question_ids_without_response(&state.db, application_id).await?
    };

    if to_process.is_empty() {
        info!(
            "All questions already have responses for application {}",
            application_id
        );
        return Ok(json!({
            "status": "skipped",
            "application_id": application_id,
            "message": "All questions already have responses",
        }));
    }

    let mut job_ids = Vec::with_capacity(to_process.len());
    for question_id in &to_process {
        let job = Job::GenerateResponse {
            question_id: *question_id,
        };
        job_ids.push(state.queue.submit(job, Duration::ZERO).await?);
    }

    Ok(json!({
        "status": "success",
        "application_id": application_id,
        "total_questions": questions.len(),
        "questions_to_process": to_process.len(),
        "job_ids": job_ids,
    }))
}
