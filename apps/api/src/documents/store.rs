use std::path::Path;

use anyhow::Result;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::documents::models::{DocumentRow, DocumentType, ExtractedDataType, ExtractedInformationRow};

// ────────────────────────────────────────────────────────────────────────────
// Object storage
// ────────────────────────────────────────────────────────────────────────────

/// `documents/{user_id}/{document_id}/{filename}`. Only the final path component of the
/// client-supplied filename is kept.
pub fn document_key(user_id: Uuid, document_id: Uuid, filename: &str) -> String {
    let name = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .unwrap_or("upload");
    format!("documents/{user_id}/{document_id}/{name}")
}

pub async fn put_object(
    s3: &aws_sdk_s3::Client,
    bucket: &str,
    key: &str,
    body: Bytes,
    content_type: Option<&str>,
) -> Result<()> {
    s3.put_object()
        .bucket(bucket)
        .key(key)
        .body(ByteStream::from(body))
        .set_content_type(content_type.map(str::to_string))
        .send()
        .await
        .map_err(|e| anyhow::anyhow!("S3 upload failed: {e}"))?;

    info!("Uploaded document to s3://{}/{}", bucket, key);
    Ok(())
}

pub async fn get_object(s3: &aws_sdk_s3::Client, bucket: &str, key: &str) -> Result<Bytes> {
    let object = s3
        .get_object()
        .bucket(bucket)
        .key(key)
        .send()
        .await
        .map_err(|e| anyhow::anyhow!("S3 download failed for {key}: {e}"))?;

    let data = object
        .body
        .collect()
        .await
        .map_err(|e| anyhow::anyhow!("S3 body read failed for {key}: {e}"))?;
    Ok(data.into_bytes())
}

pub async fn delete_object(s3: &aws_sdk_s3::Client, bucket: &str, key: &str) -> Result<()> {
    s3.delete_object()
        .bucket(bucket)
        .key(key)
        .send()
        .await
        .map_err(|e| anyhow::anyhow!("S3 delete failed for {key}: {e}"))?;
    Ok(())
}

// ────────────────────────────────────────────────────────────────────────────
// documents
// ────────────────────────────────────────────────────────────────────────────

pub struct NewDocument<'a> {
    pub id: Uuid,
    pub user_id: Uuid,
    pub document_type: DocumentType,
    pub original_filename: &'a str,
    pub s3_key: &'a str,
    pub file_size: i64,
}

pub async fn insert_document(pool: &PgPool, doc: NewDocument<'_>) -> Result<DocumentRow> {
    Ok(sqlx::query_as::<_, DocumentRow>(
        r#"
        INSERT INTO documents (id, user_id, document_type, original_filename, s3_key, file_size)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(doc.id)
    .bind(doc.user_id)
    .bind(doc.document_type.as_str())
    .bind(doc.original_filename)
    .bind(doc.s3_key)
    .bind(doc.file_size)
    .fetch_one(pool)
    .await?)
}

pub async fn get_document(pool: &PgPool, id: Uuid) -> Result<Option<DocumentRow>> {
    Ok(
        sqlx::query_as::<_, DocumentRow>("SELECT * FROM documents WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?,
    )
}

pub async fn list_documents(pool: &PgPool, user_id: Uuid) -> Result<Vec<DocumentRow>> {
    Ok(sqlx::query_as::<_, DocumentRow>(
        "SELECT * FROM documents WHERE user_id = $1 ORDER BY uploaded_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?)
}

pub async fn mark_processed(pool: &PgPool, id: Uuid) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE documents
        SET is_processed = TRUE, processed_at = NOW(), processing_error = NULL
        WHERE id = $1
        "#,
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn mark_failed(pool: &PgPool, id: Uuid, error: &str) -> Result<()> {
    sqlx::query(
        "UPDATE documents SET is_processed = FALSE, processing_error = $2 WHERE id = $1",
    )
    .bind(id)
    .bind(error)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn reset_processing(pool: &PgPool, id: Uuid) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE documents
        SET is_processed = FALSE, processed_at = NULL, processing_error = NULL
        WHERE id = $1
        "#,
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Unprocessed documents uploaded before `cutoff`, oldest first.
pub async fn stale_unprocessed_documents(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
) -> Result<Vec<DocumentRow>> {
    Ok(sqlx::query_as::<_, DocumentRow>(
        r#"
        SELECT * FROM documents
        WHERE is_processed = FALSE AND uploaded_at < $1
        ORDER BY uploaded_at
        "#,
    )
    .bind(cutoff)
    .fetch_all(pool)
    .await?)
}

pub async fn delete_document(pool: &PgPool, id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM documents WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

// ────────────────────────────────────────────────────────────────────────────
// extracted_information
// ────────────────────────────────────────────────────────────────────────────

/// Stores one row per fragment in a single transaction. Returns the number stored.
pub async fn insert_fragments(
    pool: &PgPool,
    document_id: Uuid,
    fragments: &[(ExtractedDataType, Value)],
) -> Result<usize> {
    let mut tx = pool.begin().await?;
    for (data_type, content) in fragments {
        sqlx::query(
            r#"
            INSERT INTO extracted_information (document_id, data_type, content, confidence_score)
            VALUES ($1, $2, $3, 0.0)
            "#,
        )
        .bind(document_id)
        .bind(data_type.as_str())
        .bind(content)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(fragments.len())
}

pub async fn delete_fragments(pool: &PgPool, document_id: Uuid) -> Result<u64> {
    let result = sqlx::query("DELETE FROM extracted_information WHERE document_id = $1")
        .bind(document_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn fragments_for_document(
    pool: &PgPool,
    document_id: Uuid,
) -> Result<Vec<ExtractedInformationRow>> {
    Ok(sqlx::query_as::<_, ExtractedInformationRow>(
        "SELECT * FROM extracted_information WHERE document_id = $1 ORDER BY data_type",
    )
    .bind(document_id)
    .fetch_all(pool)
    .await?)
}

/// Every fragment from the user's documents, newest first.
pub async fn fragments_for_user(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Vec<ExtractedInformationRow>> {
    Ok(sqlx::query_as::<_, ExtractedInformationRow>(
        r#"
        SELECT ei.*
        FROM extracted_information ei
        JOIN documents d ON d.id = ei.document_id
        WHERE d.user_id = $1
        ORDER BY ei.extracted_at DESC, d.uploaded_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?)
}
