//! Axum route handlers for resume-grounded chat.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::auth::middleware::AuthUser;
use crate::errors::AppError;
use crate::llm_client::prompts::build_chat_messages;
use crate::models::chat::{ChatMessageRow, ResumeChatSummaryRow, ROLE_ASSISTANT, ROLE_USER};
use crate::models::resume::{ResumeRow, STATUS_DONE};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub resume_id: Uuid,
    pub user_message: String,
}

/// Wire shape of a single chat message.
#[derive(Debug, Serialize)]
pub struct ChatMessageOut {
    pub message_type: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub messages: Vec<ChatMessageOut>,
    pub resume_id: Uuid,
    pub resume_name: String,
}

#[derive(Debug, Serialize)]
pub struct ChatHistoryResponse {
    pub resume_id: Uuid,
    pub resume_name: String,
    pub parsed_data: Value,
    pub messages: Vec<ChatMessageOut>,
}

/// POST /v1/chat/completions
///
/// Appends the user message to the conversation, asks the chat model for a
/// reply grounded in the parsed resume, and returns both new messages.
pub async fn handle_completions(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthUser>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    if request.user_message.trim().is_empty() {
        return Err(AppError::Validation(
            "user_message cannot be empty".to_string(),
        ));
    }

    let resume = fetch_owned_resume(&state, request.resume_id, user.id).await?;
    let resume = match resume {
        Some(r) if r.status == STATUS_DONE => r,
        _ => {
            return Err(AppError::NotFound(
                "Resume not ready or not found.".to_string(),
            ))
        }
    };

    insert_message(&state, &resume, user.id, ROLE_USER, &request.user_message).await?;

    let history = fetch_history(&state, resume.id, user.id).await?;
    let parsed_data = resume.parsed_data.clone().unwrap_or_default();
    let messages = build_chat_messages(&parsed_data, &history, &request.user_message);

    let reply = state
        .llm
        .complete(&messages)
        .await
        .map_err(|e| AppError::Llm(e.to_string()))?;

    insert_message(&state, &resume, user.id, ROLE_ASSISTANT, &reply).await?;

    Ok(Json(ChatResponse {
        messages: vec![
            ChatMessageOut {
                message_type: ROLE_USER.to_string(),
                content: request.user_message,
            },
            ChatMessageOut {
                message_type: ROLE_ASSISTANT.to_string(),
                content: reply,
            },
        ],
        resume_id: resume.id,
        resume_name: resume.filename,
    }))
}

/// GET /v1/chat/resume-chats
///
/// One summary per resume the caller has chatted about, carrying the most
/// recent message, newest conversation first.
pub async fn handle_resume_chats(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthUser>,
) -> Result<Json<Vec<ResumeChatSummaryRow>>, AppError> {
    let rows: Vec<ResumeChatSummaryRow> = sqlx::query_as(
        r#"
        SELECT * FROM (
            SELECT DISTINCT ON (c.resume_id)
                r.id AS resume_id,
                r.filename AS resume_name,
                c.content AS last_message,
                c.created_at AS last_message_at
            FROM chats c
            JOIN resumes r ON r.id = c.resume_id
            WHERE c.user_id = $1 AND r.user_id = $1
            ORDER BY c.resume_id, c.created_at DESC
        ) latest
        ORDER BY last_message_at DESC
        "#,
    )
    .bind(user.id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(rows))
}

/// GET /v1/chat/history/{resume_id}
///
/// Full conversation for one resume, oldest first, plus the parsed resume
/// so the client can render the document next to the chat.
pub async fn handle_history(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthUser>,
    Path(resume_id): Path<Uuid>,
) -> Result<Json<ChatHistoryResponse>, AppError> {
    let resume = fetch_owned_resume(&state, resume_id, user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("Resume not found.".to_string()))?;

    let messages = fetch_history(&state, resume.id, user.id).await?;

    Ok(Json(ChatHistoryResponse {
        resume_id: resume.id,
        resume_name: resume.filename,
        parsed_data: resume.parsed_data.unwrap_or_default(),
        messages: messages
            .into_iter()
            .map(|m| ChatMessageOut {
                message_type: m.message_type,
                content: m.content,
            })
            .collect(),
    }))
}

async fn fetch_owned_resume(
    state: &AppState,
    resume_id: Uuid,
    user_id: Uuid,
) -> Result<Option<ResumeRow>, AppError> {
    Ok(
        sqlx::query_as("SELECT * FROM resumes WHERE id = $1 AND user_id = $2")
            .bind(resume_id)
            .bind(user_id)
            .fetch_optional(&state.db)
            .await?,
    )
}

async fn fetch_history(
    state: &AppState,
    resume_id: Uuid,
    user_id: Uuid,
) -> Result<Vec<ChatMessageRow>, AppError> {
    Ok(sqlx::query_as(
        r#"
        SELECT * FROM chats
        WHERE resume_id = $1 AND user_id = $2
        ORDER BY created_at ASC
        "#,
    )
    .bind(resume_id)
    .bind(user_id)
    .fetch_all(&state.db)
    .await?)
}

async fn insert_message(
    state: &AppState,
    resume: &ResumeRow,
    user_id: Uuid,
    message_type: &str,
    content: &str,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO chats (id, resume_id, user_id, message_type, content)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(resume.id)
    .bind(user_id)
    .bind(message_type)
    .bind(content)
    .execute(&state.db)
    .await?;
    Ok(())
}
