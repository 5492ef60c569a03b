use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub hashed_password: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Public view of a user, as returned by `/auth/register`.
#[derive(Debug, Clone, Serialize)]
pub struct UserOut {
    pub id: Uuid,
    pub email: String,
    pub is_active: bool,
}

impl From<UserRow> for UserOut {
    fn from(row: UserRow) -> Self {
        UserOut {
            id: row.id,
            email: row.email,
            is_active: row.is_active,
        }
    }
}
