use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Message author, stored as `message_type` text (`user` or `assistant`).
pub const ROLE_USER: &str = "user";
pub const ROLE_ASSISTANT: &str = "assistant";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ChatMessageRow {
    pub id: Uuid,
    pub resume_id: Uuid,
    pub user_id: Uuid,
    pub message_type: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// One row per resume the user has chatted about, carrying its latest message.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ResumeChatSummaryRow {
    pub resume_id: Uuid,
    pub resume_name: String,
    pub last_message: String,
    pub last_message_at: DateTime<Utc>,
}
