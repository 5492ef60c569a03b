//! Axum route handlers for resume ingestion.
//!
//! Upload stores the raw bytes, answers immediately with `processing`, and
//! hands the parse off to a background task. Clients follow progress either
//! by polling `/resume/status/{id}` or over the SSE stream.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Multipart, Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use bytes::Bytes;
use chrono::Utc;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::PgPool;
use tracing::{error, info};
use uuid::Uuid;

use crate::auth::middleware::AuthUser;
use crate::auth::token::verify_access_token;
use crate::errors::AppError;
use crate::models::resume::{
    ResumeRow, STATUS_DONE, STATUS_ERROR, STATUS_NOT_FOUND, STATUS_PROCESSING,
};
use crate::parser::ResumeParser;
use crate::state::AppState;

/// How often the SSE stream re-reads the resume row.
const STREAM_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Upper bound on how long a single SSE connection is served.
const STREAM_BUDGET_TICKS: u32 = 300;

#[derive(Debug, Serialize)]
pub struct ResumeUploadResponse {
    pub resume_id: Uuid,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct ResumeStatusResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed_data: Option<Value>,
}

/// POST /resume/upload
///
/// Accepts a multipart form with a `file` field, records the resume as
/// `processing`, and spawns the background parse.
pub async fn handle_upload(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthUser>,
    mut multipart: Multipart,
) -> Result<Json<ResumeUploadResponse>, AppError> {
    let mut upload: Option<(String, Bytes)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Malformed multipart body: {e}")))?
    {
        if field.name() == Some("file") {
            let filename = field
                .file_name()
                .unwrap_or("resume.pdf")
                .to_string();
            let contents = field
                .bytes()
                .await
                .map_err(|e| AppError::Validation(format!("Failed to read upload: {e}")))?;
            upload = Some((filename, contents));
            break;
        }
    }

    let (filename, contents) = upload
        .ok_or_else(|| AppError::Validation("Missing 'file' field in upload".to_string()))?;
    if contents.is_empty() {
        return Err(AppError::Validation("Uploaded file is empty".to_string()));
    }

    let resume_id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO resumes (id, user_id, filename, status)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(resume_id)
    .bind(user.id)
    .bind(&filename)
    .bind(STATUS_PROCESSING)
    .execute(&state.db)
    .await?;

    info!("Accepted resume {resume_id} ({filename}) for user {}", user.id);

    tokio::spawn(parse_and_store(
        state.db.clone(),
        state.parser.clone(),
        resume_id,
        contents,
        filename,
    ));

    Ok(Json(ResumeUploadResponse {
        resume_id,
        status: STATUS_PROCESSING.to_string(),
    }))
}

/// Background task: runs the external parse and records the outcome.
async fn parse_and_store(
    db: PgPool,
    parser: Arc<dyn ResumeParser>,
    resume_id: Uuid,
    contents: Bytes,
    filename: String,
) {
    let outcome = parser.parse(contents, &filename).await;

    let result = match outcome {
        Ok(parsed) => {
            sqlx::query("UPDATE resumes SET status = $1, parsed_data = $2 WHERE id = $3")
                .bind(STATUS_DONE)
                .bind(&parsed)
                .bind(resume_id)
                .execute(&db)
                .await
        }
        Err(e) => {
            error!("Parsing resume {resume_id} failed: {e}");
            sqlx::query("UPDATE resumes SET status = $1, error_message = $2 WHERE id = $3")
                .bind(STATUS_ERROR)
                .bind(e.to_string())
                .bind(resume_id)
                .execute(&db)
                .await
        }
    };

    match result {
        Ok(_) => info!("Resume {resume_id} processing finished"),
        Err(e) => error!("Failed to record parse outcome for resume {resume_id}: {e}"),
    }
}

/// GET /resume/status/{id}
///
/// Returns the current lifecycle status. Unknown ids and other users'
/// resumes both answer `not_found` rather than 404, matching what the
/// polling client expects.
pub async fn handle_status(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthUser>,
    Path(resume_id): Path<Uuid>,
) -> Result<Json<ResumeStatusResponse>, AppError> {
    let resume: Option<ResumeRow> =
        sqlx::query_as("SELECT * FROM resumes WHERE id = $1 AND user_id = $2")
            .bind(resume_id)
            .bind(user.id)
            .fetch_optional(&state.db)
            .await?;

    let Some(resume) = resume else {
        return Ok(Json(ResumeStatusResponse {
            status: STATUS_NOT_FOUND.to_string(),
            parsed_data: None,
        }));
    };

    let parsed_data = if resume.status == STATUS_DONE {
        resume.parsed_data
    } else {
        None
    };

    Ok(Json(ResumeStatusResponse {
        status: resume.status,
        parsed_data,
    }))
}

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    /// Bearer token passed as a query parameter; EventSource cannot set headers.
    pub token: String,
}

/// GET /resume/stream/{id}?token=...
///
/// Server-Sent Events stream of status transitions. Emits an event on every
/// change and closes after a terminal status (`done`, `error`) or once the
/// connection budget runs out.
pub async fn handle_stream(
    State(state): State<AppState>,
    Path(resume_id): Path<Uuid>,
    Query(query): Query<StreamQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let user_id = verify_access_token(&state.config.secret_key, &query.token)
        .map_err(|e| AppError::Unauthorized(format!("Invalid token: {e}")))?;

    let exists: Option<ResumeRow> =
        sqlx::query_as("SELECT * FROM resumes WHERE id = $1 AND user_id = $2")
            .bind(resume_id)
            .bind(user_id)
            .fetch_optional(&state.db)
            .await?;
    if exists.is_none() {
        return Err(AppError::NotFound(
            "Resume not found or access denied".to_string(),
        ));
    }

    let stream = status_event_stream(state.db.clone(), resume_id, user_id);
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

struct StreamState {
    db: PgPool,
    last_status: Option<String>,
    ticks_left: u32,
    closed: bool,
}

fn status_event_stream(
    db: PgPool,
    resume_id: Uuid,
    user_id: Uuid,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let initial = StreamState {
        db,
        last_status: None,
        ticks_left: STREAM_BUDGET_TICKS,
        closed: false,
    };

    futures::stream::unfold(initial, move |mut s| async move {
        if s.closed {
            return None;
        }

        loop {
            let row: Result<Option<ResumeRow>, sqlx::Error> =
                sqlx::query_as("SELECT * FROM resumes WHERE id = $1 AND user_id = $2")
                    .bind(resume_id)
                    .bind(user_id)
                    .fetch_optional(&s.db)
                    .await;

            let resume = match row {
                Ok(Some(resume)) => resume,
                Ok(None) => {
                    s.closed = true;
                    let event = status_event(STATUS_ERROR, resume_id, Some("Resume was deleted"));
                    return Some((Ok(event), s));
                }
                Err(e) => {
                    error!("SSE status read failed for resume {resume_id}: {e}");
                    s.closed = true;
                    let event = status_event(STATUS_ERROR, resume_id, Some("Status read failed"));
                    return Some((Ok(event), s));
                }
            };

            if s.last_status.as_deref() != Some(resume.status.as_str()) {
                s.last_status = Some(resume.status.clone());
                let terminal = resume.status == STATUS_DONE || resume.status == STATUS_ERROR;
                if terminal {
                    s.closed = true;
                }
                let event = status_event(
                    &resume.status,
                    resume_id,
                    resume.error_message.as_deref(),
                );
                return Some((Ok(event), s));
            }

            if s.ticks_left == 0 {
                return None;
            }
            s.ticks_left -= 1;
            tokio::time::sleep(STREAM_POLL_INTERVAL).await;
        }
    })
}

fn status_event(status: &str, resume_id: Uuid, error_message: Option<&str>) -> Event {
    Event::default().data(status_event_payload(status, resume_id, error_message).to_string())
}

fn status_event_payload(status: &str, resume_id: Uuid, error_message: Option<&str>) -> Value {
    let mut data = json!({
        "status": status,
        "timestamp": Utc::now().to_rfc3339(),
    });
    if status == STATUS_DONE {
        data["resume_id"] = json!(resume_id);
    }
    if status == STATUS_ERROR {
        data["error"] = json!(error_message.unwrap_or("Processing error"));
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_done_event_names_the_resume() {
        let id = Uuid::new_v4();
        let payload = status_event_payload(STATUS_DONE, id, None);
        assert_eq!(payload["status"], STATUS_DONE);
        assert_eq!(payload["resume_id"], json!(id));
        assert!(payload.get("error").is_none());
    }

    #[test]
    fn test_error_event_carries_message() {
        let payload = status_event_payload(STATUS_ERROR, Uuid::new_v4(), Some("parse failed"));
        assert_eq!(payload["error"], "parse failed");
    }

    #[test]
    fn test_error_event_defaults_message() {
        let payload = status_event_payload(STATUS_ERROR, Uuid::new_v4(), None);
        assert_eq!(payload["error"], "Processing error");
    }

    #[test]
    fn test_processing_event_is_bare() {
        let payload = status_event_payload(STATUS_PROCESSING, Uuid::new_v4(), None);
        assert!(payload.get("resume_id").is_none());
        assert!(payload.get("error").is_none());
    }
}
