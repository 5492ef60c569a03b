use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

/// Creates and returns a PostgreSQL connection pool.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    info!("Connecting to PostgreSQL...");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    info!("PostgreSQL connection pool established");
    Ok(pool)
}

/// Creates the application tables if they do not exist yet.
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    let statements = [
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id UUID PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            hashed_password TEXT NOT NULL,
            is_active BOOLEAN NOT NULL DEFAULT TRUE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS resumes (
            id UUID PRIMARY KEY,
            user_id UUID NOT NULL REFERENCES users(id),
            filename TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'processing',
            parsed_data JSONB,
            error_message TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS chats (
            id UUID PRIMARY KEY,
            resume_id UUID NOT NULL REFERENCES resumes(id),
            user_id UUID NOT NULL REFERENCES users(id),
            message_type TEXT NOT NULL,
            content TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
        "CREATE INDEX IF NOT EXISTS idx_resumes_user ON resumes (user_id)",
        "CREATE INDEX IF NOT EXISTS idx_chats_resume ON chats (resume_id, created_at)",
    ];

    for stmt in statements {
        sqlx::query(stmt).execute(pool).await?;
    }

    info!("Database schema ensured");
    Ok(())
}
