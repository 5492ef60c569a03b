use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub secret_key: String,
    pub openai_api_key: String,
    pub vlm_api_key: String,
    pub vlm_base_url: String,
    pub cors_origin: Option<String>,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            secret_key: require_env("SECRET_KEY")?,
            openai_api_key: require_env("OPENAI_API_KEY")?,
            vlm_api_key: require_env("VLM_API_KEY")?,
            vlm_base_url: std::env::var("VLM_BASE_URL")
                .unwrap_or_else(|_| "https://api.vlm.run/v1".to_string()),
            cors_origin: std::env::var("CORS_ORIGIN").ok(),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}
