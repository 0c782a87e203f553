use std::collections::{HashMap, HashSet};

use anyhow::Result;
use sqlx::PgPool;
use uuid::Uuid;

use crate::applications::models::{
    ApplicationRow, ApplicationType, ExtractedQuestion, QuestionRow, ResponseRow,
};
use crate::applications::responder::GeneratedResponse;

// ────────────────────────────────────────────────────────────────────────────
// applications
// ────────────────────────────────────────────────────────────────────────────

pub struct NewApplication<'a> {
    pub user_id: Uuid,
    pub application_type: ApplicationType,
    pub title: &'a str,
    pub company_or_institution: &'a str,
    pub url: Option<&'a str>,
    pub description: &'a str,
}

pub async fn insert_application(pool: &PgPool, app: NewApplication<'_>) -> Result<ApplicationRow> {
    Ok(sqlx::query_as::<_, ApplicationRow>(
        r#"
        INSERT INTO applications
            (id, user_id, application_type, title, company_or_institution, url, description)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(app.user_id)
    .bind(app.application_type.as_str())
    .bind(app.title)
    .bind(app.company_or_institution)
    .bind(app.url)
    .bind(app.description)
    .fetch_one(pool)
    .await?)
}

pub async fn get_application(pool: &PgPool, id: Uuid) -> Result<Option<ApplicationRow>> {
    Ok(
        sqlx::query_as::<_, ApplicationRow>("SELECT * FROM applications WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?,
    )
}

/// Fills the description only when it is still blank. Returns whether a row changed.
pub async fn fill_empty_description(pool: &PgPool, id: Uuid, description: &str) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE applications SET description = $2 WHERE id = $1 AND btrim(description) = ''",
    )
    .bind(id)
    .bind(description)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

// ────────────────────────────────────────────────────────────────────────────
// questions
// ────────────────────────────────────────────────────────────────────────────

pub async fn get_question(pool: &PgPool, id: Uuid) -> Result<Option<QuestionRow>> {
    Ok(
        sqlx::query_as::<_, QuestionRow>("SELECT * FROM questions WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?,
    )
}

pub async fn list_questions(pool: &PgPool, application_id: Uuid) -> Result<Vec<QuestionRow>> {
    Ok(sqlx::query_as::<_, QuestionRow>(
        "SELECT * FROM questions WHERE application_id = $1 ORDER BY sort_order, created_at",
    )
    .bind(application_id)
    .fetch_all(pool)
    .await?)
}

/// Inserts the extracted questions the application does not already have (case-insensitive
/// text match), numbering them after the current highest `sort_order`. Returns the new ids.
pub async fn insert_extracted_questions(
    pool: &PgPool,
    application_id: Uuid,
    questions: &[ExtractedQuestion],
) -> Result<Vec<Uuid>> {
    let mut tx = pool.begin().await?;

    let existing: Vec<(String, i32)> =
        sqlx::query_as("SELECT question_text, sort_order FROM questions WHERE application_id = $1")
            .bind(application_id)
            .fetch_all(&mut *tx)
            .await?;

    let mut created = Vec::new();
    for (question, sort_order) in plan_new_questions(&existing, questions) {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO questions
                (id, application_id, question_text, question_type, is_required, is_extracted, sort_order)
            VALUES ($1, $2, $3, $4, $5, TRUE, $6)
            "#,
        )
        .bind(id)
        .bind(application_id)
        .bind(&question.question_text)
        .bind(question.question_type.as_str())
        .bind(question.is_required)
        .bind(sort_order)
        .execute(&mut *tx)
        .await?;
        created.push(id);
    }

    tx.commit().await?;
    Ok(created)
}

/// Picks the extracted questions not already present, matching text case-insensitively after
/// trimming (against stored rows and earlier entries of the same batch), and numbers them
/// after the highest existing `sort_order`.
fn plan_new_questions<'q>(
    existing: &[(String, i32)],
    extracted: &'q [ExtractedQuestion],
) -> Vec<(&'q ExtractedQuestion, i32)> {
    let mut seen: HashSet<String> = existing
        .iter()
        .map(|(text, _)| text.trim().to_lowercase())
        .collect();
    let mut next_order = existing.iter().map(|(_, order)| *order).max().unwrap_or(0) + 1;

    let mut planned = Vec::new();
    for question in extracted {
        if !seen.insert(question.question_text.trim().to_lowercase()) {
            continue;
        }
        planned.push((question, next_order));
        next_order += 1;
    }
    planned
}

pub async fn question_ids_without_response(pool: &PgPool, application_id: Uuid) -> Result<Vec<Uuid>> {
    Ok(sqlx::query_scalar(
        r#"
        SELECT q.id
        FROM questions q
        LEFT JOIN responses r ON r.question_id = q.id
        WHERE q.application_id = $1 AND r.id IS NULL
        ORDER BY q.sort_order
        "#,
    )
    .bind(application_id)
    .fetch_all(pool)
    .await?)
}

// ────────────────────────────────────────────────────────────────────────────
// responses
// ────────────────────────────────────────────────────────────────────────────

/// Stores a generated answer. A user's edited text is left untouched; `version` counts
/// generations.
pub async fn upsert_generated_response(
    pool: &PgPool,
    question_id: Uuid,
    generated: &GeneratedResponse,
) -> Result<ResponseRow> {
    Ok(sqlx::query_as::<_, ResponseRow>(
        r#"
        INSERT INTO responses
            (question_id, generated_response, generation_prompt, is_ai_generated, generated_at)
        VALUES ($1, $2, $3, TRUE, NOW())
        ON CONFLICT (question_id) DO UPDATE
        SET generated_response = EXCLUDED.generated_response,
            generation_prompt  = EXCLUDED.generation_prompt,
            is_ai_generated    = TRUE,
            generated_at       = NOW(),
            version            = responses.version + 1
        RETURNING *
        "#,
    )
    .bind(question_id)
    .bind(&generated.response)
    .bind(&generated.prompt)
    .fetch_one(pool)
    .await?)
}

/// Questions in display order, each paired with its response when one exists.
pub async fn questions_with_responses(
    pool: &PgPool,
    application_id: Uuid,
) -> Result<Vec<(QuestionRow, Option<ResponseRow>)>> {
    let questions = list_questions(pool, application_id).await?;
    let ids: Vec<Uuid> = questions.iter().map(|q| q.id).collect();

    let responses = sqlx::query_as::<_, ResponseRow>(
        "SELECT * FROM responses WHERE question_id = ANY($1)",
    )
    .bind(&ids)
    .fetch_all(pool)
    .await?;

    let mut by_question: HashMap<Uuid, ResponseRow> =
        responses.into_iter().map(|r| (r.question_id, r)).collect();

    Ok(questions
        .into_iter()
        .map(|q| {
            let response = by_question.remove(&q.id);
            (q, response)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::applications::models::QuestionType;

    fn question(text: &str) -> ExtractedQuestion {
        ExtractedQuestion {
            question_text: text.to_string(),
            question_type: QuestionType::Essay,
            is_required: false,
        }
    }

    fn planned(plan: &[(&ExtractedQuestion, i32)]) -> Vec<(String, i32)> {
        plan.iter()
            .map(|(q, order)| (q.question_text.clone(), *order))
            .collect()
    }

    #[test]
    fn test_existing_questions_match_ignoring_case_and_whitespace() {
        let existing = vec![("Why do you want this role?".to_string(), 1)];
        let extracted = [
            question("  why do you WANT this role?  "),
            question("Describe a project you led."),
        ];
        let plan = plan_new_questions(&existing, &extracted);
        assert_eq!(
            planned(&plan),
            vec![("Describe a project you led.".to_string(), 2)]
        );
    }

    #[test]
    fn test_duplicates_within_one_batch_are_inserted_once() {
        let extracted = [
            question("What are your goals?"),
            question("WHAT ARE YOUR GOALS?"),
            question("List your skills."),
        ];
        let plan = plan_new_questions(&[], &extracted);
        assert_eq!(
            planned(&plan),
            vec![
                ("What are your goals?".to_string(), 1),
                ("List your skills.".to_string(), 2),
            ]
        );
    }

    #[test]
    fn test_order_starts_at_one_without_existing_questions() {
        let extracted = [question("First?")];
        assert_eq!(planned(&plan_new_questions(&[], &extracted)), vec![("First?".to_string(), 1)]);
    }

    #[test]
    fn test_order_continues_after_highest_existing() {
        let existing = vec![("A?".to_string(), 2), ("B?".to_string(), 7), ("C?".to_string(), 3)];
        let extracted = [question("D?"), question("E?")];
        assert_eq!(
            planned(&plan_new_questions(&existing, &extracted)),
            vec![("D?".to_string(), 8), ("E?".to_string(), 9)]
        );
    }
}
