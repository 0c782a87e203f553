use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::applications::models::{ApplicationRow, ApplicationType, QuestionRow, ResponseRow};
use crate::applications::scraper::{validate_url, PageMetadata};
use crate::applications::store::{self, NewApplication};
use crate::errors::AppError;
use crate::jobs::Job;
use crate::routes::{accept_job, JobAccepted, OptionalJson};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateApplicationRequest {
    pub user_id: Uuid,
    #[serde(default)]
    pub application_type: ApplicationType,
    pub title: String,
    pub company_or_institution: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct ChainRequest {
    /// Continue into answer generation once questions are stored.
    #[serde(default)]
    pub then_generate: bool,
}

#[derive(Deserialize, Default)]
pub struct BatchGenerateRequest {
    #[serde(default)]
    pub regenerate: bool,
}

#[derive(Deserialize)]
pub struct ScrapePreviewRequest {
    pub url: String,
}

#[derive(Serialize)]
pub struct QuestionWithResponse {
    #[serde(flatten)]
    pub question: QuestionRow,
    pub response: Option<ResponseRow>,
    pub final_response: Option<String>,
}

impl From<(QuestionRow, Option<ResponseRow>)> for QuestionWithResponse {
    fn from((question, response): (QuestionRow, Option<ResponseRow>)) -> Self {
        let final_response = response.as_ref().map(|r| r.final_response().to_string());
        Self {
            question,
            response,
            final_response,
        }
    }
}

async fn require_application(state: &AppState, id: Uuid) -> Result<ApplicationRow, AppError> {
    store::get_application(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Application {id} not found")))
}

fn normalize_url(url: Option<String>) -> Result<Option<String>, AppError> {
    match url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty()) {
        Some(url) => {
            validate_url(&url).map_err(|e| AppError::Validation(e.to_string()))?;
            Ok(Some(url))
        }
        None => Ok(None),
    }
}

/// POST /api/v1/applications
pub async fn handle_create_application(
    State(state): State<AppState>,
    Json(req): Json<CreateApplicationRequest>,
) -> Result<(StatusCode, Json<ApplicationRow>), AppError> {
    if req.title.trim().is_empty() {
        return Err(AppError::Validation("title must not be empty".to_string()));
    }
    if req.company_or_institution.trim().is_empty() {
        return Err(AppError::Validation(
            "company_or_institution must not be empty".to_string(),
        ));
    }
    let url = normalize_url(req.url)?;

    let application = store::insert_application(
        &state.db,
        NewApplication {
            user_id: req.user_id,
            application_type: req.application_type,
            title: req.title.trim(),
            company_or_institution: req.company_or_institution.trim(),
            url: url.as_deref(),
            description: req.description.as_deref().unwrap_or_default(),
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(application)))
}

/// POST /api/v1/applications/:id/scrape
pub async fn handle_scrape_application(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    OptionalJson(req): OptionalJson<ChainRequest>,
) -> Result<(StatusCode, Json<JobAccepted>), AppError> {
    let application = require_application(&state, id).await?;
    if application.url.as_deref().map_or(true, |u| u.trim().is_empty()) {
        return Err(AppError::Validation(format!(
            "Application {id} has no URL to scrape"
        )));
    }
    accept_job(
        &state,
        Job::ScrapeApplication {
            application_id: id,
            then_generate: req.then_generate,
        },
    )
    .await
}

/// POST /api/v1/applications/:id/extract-questions
/// Extracts from the stored description.
pub async fn handle_extract_questions(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    OptionalJson(req): OptionalJson<ChainRequest>,
) -> Result<(StatusCode, Json<JobAccepted>), AppError> {
    require_application(&state, id).await?;
    accept_job(
        &state,
        Job::ExtractQuestions {
            application_id: id,
            content: None,
            then_generate: req.then_generate,
        },
    )
    .await
}

/// GET /api/v1/applications/:id/questions
pub async fn handle_list_questions(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<QuestionWithResponse>>, AppError> {
    require_application(&state, id).await?;
    let rows = store::questions_with_responses(&state.db, id).await?;
    Ok(Json(rows.into_iter().map(QuestionWithResponse::from).collect()))
}

/// POST /api/v1/applications/:id/responses
pub async fn handle_batch_generate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    OptionalJson(req): OptionalJson<BatchGenerateRequest>,
) -> Result<(StatusCode, Json<JobAccepted>), AppError> {
    require_application(&state, id).await?;
    accept_job(
        &state,
        Job::BatchGenerateResponses {
            application_id: id,
            regenerate: req.regenerate,
        },
    )
    .await
}

/// POST /api/v1/questions/:id/response
pub async fn handle_generate_response(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<JobAccepted>), AppError> {
    store::get_question(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Question {id} not found")))?;
    accept_job(&state, Job::GenerateResponse { question_id: id }).await
}

/// POST /api/v1/scrape/preview
/// Synchronous, best-effort metadata lookup for a URL before an application is created.
pub async fn handle_scrape_preview(
    State(state): State<AppState>,
    Json(req): Json<ScrapePreviewRequest>,
) -> Result<Json<PageMetadata>, AppError> {
    validate_url(&req.url).map_err(|e| AppError::Validation(e.to_string()))?;
    Ok(Json(state.scraper.extract_metadata(&req.url).await))
}
