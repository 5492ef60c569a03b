use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// Resume processing lifecycle: `processing` at upload, then `done` or `error`.
/// `not_found` is a synthetic status returned for unknown ids, never stored.
pub const STATUS_PROCESSING: &str = "processing";
pub const STATUS_DONE: &str = "done";
pub const STATUS_ERROR: &str = "error";
pub const STATUS_NOT_FOUND: &str = "not_found";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ResumeRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub filename: String,
    pub status: String,
    pub parsed_data: Option<Value>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}
