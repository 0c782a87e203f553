use axum::{
    extract::{multipart::MultipartError, Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::applications::responder::build_user_context;
use crate::documents::merge::merge_fragments;
use crate::documents::models::{DocumentRow, DocumentType, ExtractedInformationRow, ExtractedProfile};
use crate::documents::parser::DocumentFormat;
use crate::documents::store::{self, NewDocument};
use crate::errors::AppError;
use crate::jobs::Job;
use crate::routes::{accept_job, JobAccepted, OptionalJson};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct UserIdQuery {
    pub user_id: Uuid,
}

#[derive(Serialize)]
pub struct UploadResponse {
    pub document: DocumentRow,
    pub job_id: Uuid,
}

#[derive(Serialize)]
pub struct DocumentDetailResponse {
    pub document: DocumentRow,
    pub extracted_information: Vec<ExtractedInformationRow>,
}

#[derive(Serialize)]
pub struct ProfileResponse {
    pub user_id: Uuid,
    pub fragment_count: usize,
    pub profile: ExtractedProfile,
    /// The plain-text block used as generation context.
    pub context: String,
}

#[derive(Deserialize, Default)]
pub struct ReprocessRequest {
    #[serde(default)]
    pub force: bool,
}

#[derive(Deserialize)]
pub struct BulkProcessRequest {
    pub document_ids: Vec<Uuid>,
}

struct UploadedFile {
    filename: String,
    content_type: Option<String>,
    bytes: Bytes,
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(e.body_text())
    } else {
        AppError::Validation(format!("Invalid multipart body: {}", e.body_text()))
    }
}

/// POST /api/v1/documents
/// Multipart fields: `user_id`, `document_type` (optional), `file`.
pub async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    let mut user_id: Option<Uuid> = None;
    let mut document_type = DocumentType::default();
    let mut file: Option<UploadedFile> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "user_id" => {
                let raw = field.text().await.map_err(multipart_error)?;
                user_id = Some(
                    raw.trim()
                        .parse()
                        .map_err(|_| AppError::Validation(format!("Invalid user_id '{raw}'")))?,
                );
            }
            "document_type" => {
                let raw = field.text().await.map_err(multipart_error)?;
                document_type = raw.parse().map_err(AppError::Validation)?;
            }
            "file" => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| AppError::Validation("file field has no filename".to_string()))?;
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(multipart_error)?;
                file = Some(UploadedFile {
                    filename,
                    content_type,
                    bytes,
                });
            }
            _ => {}
        }
    }

    let user_id = user_id.ok_or_else(|| AppError::Validation("user_id is required".to_string()))?;
    let file = file.ok_or_else(|| AppError::Validation("file is required".to_string()))?;

    DocumentFormat::from_filename(&file.filename)?;
    if file.bytes.is_empty() {
        return Err(AppError::Validation("Uploaded file is empty".to_string()));
    }
    if file.bytes.len() > state.config.max_upload_bytes {
        return Err(AppError::PayloadTooLarge(format!(
            "File is {} bytes; the limit is {} bytes",
            file.bytes.len(),
            state.config.max_upload_bytes
        )));
    }

    let document_id = Uuid::new_v4();
    let s3_key = store::document_key(user_id, document_id, &file.filename);
    let file_size = i64::try_from(file.bytes.len()).unwrap_or(i64::MAX);

    store::put_object(
        &state.s3,
        &state.config.s3_bucket,
        &s3_key,
        file.bytes,
        file.content_type.as_deref(),
    )
    .await
    .map_err(|e| AppError::S3(e.to_string()))?;

    let document = store::insert_document(
        &state.db,
        NewDocument {
            id: document_id,
            user_id,
            document_type,
            original_filename: &file.filename,
            s3_key: &s3_key,
            file_size,
        },
    )
    .await?;

    let (_, Json(JobAccepted { job_id, .. })) =
        accept_job(&state, Job::ProcessDocument { document_id }).await?;
    info!(
        "Uploaded document {} ({}) for user {}",
        document_id, document.original_filename, user_id
    );

    Ok((StatusCode::ACCEPTED, Json(UploadResponse { document, job_id })))
}

/// GET /api/v1/documents?user_id=
pub async fn handle_list_documents(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<Vec<DocumentRow>>, AppError> {
    Ok(Json(store::list_documents(&state.db, params.user_id).await?))
}

async fn require_document(state: &AppState, id: Uuid) -> Result<DocumentRow, AppError> {
    store::get_document(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Document {id} not found")))
}

/// GET /api/v1/documents/:id
pub async fn handle_get_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DocumentDetailResponse>, AppError> {
    let document = require_document(&state, id).await?;
    let extracted_information = store::fragments_for_document(&state.db, id).await?;
    Ok(Json(DocumentDetailResponse {
        document,
        extracted_information,
    }))
}

/// POST /api/v1/documents/:id/reprocess
pub async fn handle_reprocess(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    OptionalJson(req): OptionalJson<ReprocessRequest>,
) -> Result<(StatusCode, Json<JobAccepted>), AppError> {
    require_document(&state, id).await?;
    accept_job(
        &state,
        Job::ReprocessDocument {
            document_id: id,
            force: req.force,
        },
    )
    .await
}

/// POST /api/v1/documents/bulk-process
pub async fn handle_bulk_process(
    State(state): State<AppState>,
    Json(req): Json<BulkProcessRequest>,
) -> Result<(StatusCode, Json<JobAccepted>), AppError> {
    if req.document_ids.is_empty() {
        return Err(AppError::Validation(
            "document_ids must not be empty".to_string(),
        ));
    }
    accept_job(
        &state,
        Job::BulkProcessDocuments {
            document_ids: req.document_ids,
        },
    )
    .await
}

/// GET /api/v1/profile?user_id=
/// Merges every extraction fragment of the user into one profile.
pub async fn handle_get_profile(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<ProfileResponse>, AppError> {
    let fragments = store::fragments_for_user(&state.db, params.user_id).await?;
    let profile = merge_fragments(&fragments);
    let context = build_user_context(&profile);
    Ok(Json(ProfileResponse {
        user_id: params.user_id,
        fragment_count: fragments.len(),
        profile,
        context,
    }))
}
