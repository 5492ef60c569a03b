//! Axum route handlers for authentication.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::token::create_access_token;
use crate::auth::{hash_password, verify_password};
use crate::errors::AppError;
use crate::models::user::{UserOut, UserRow};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

/// POST /auth/token
///
/// Exchanges email/password credentials for a bearer token.
pub async fn handle_login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let email = normalize_email(&request.email);
    if email.is_empty() || request.password.is_empty() {
        return Err(AppError::Validation(
            "Please enter both email and password.".to_string(),
        ));
    }

    let user: Option<UserRow> = sqlx::query_as("SELECT * FROM users WHERE email = $1")
        .bind(&email)
        .fetch_optional(&state.db)
        .await?;

    // Same response for unknown email and wrong password
    let denied = || AppError::Unauthorized("Incorrect email or password".to_string());
    let user = user.ok_or_else(denied)?;
    if !verify_password(&request.password, &user.hashed_password)? {
        return Err(denied());
    }

    if !user.is_active {
        return Err(AppError::Unauthorized("Inactive user".to_string()));
    }

    let access_token = create_access_token(&state.config.secret_key, user.id)
        .map_err(|e| AppError::Internal(e.into()))?;

    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer".to_string(),
    }))
}

/// POST /auth/register
///
/// Creates a new user account. Field checks that the original client performed
/// in the browser are enforced here instead.
pub async fn handle_register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<UserOut>, AppError> {
    let email = normalize_email(&request.email);
    validate_registration(&email, &request.password).map_err(AppError::Validation)?;

    let existing: Option<UserRow> = sqlx::query_as("SELECT * FROM users WHERE email = $1")
        .bind(&email)
        .fetch_optional(&state.db)
        .await?;
    if existing.is_some() {
        return Err(AppError::Validation("Email already registered".to_string()));
    }

    let hashed_password = hash_password(&request.password)?;

    let user: UserRow = sqlx::query_as(
        r#"
        INSERT INTO users (id, email, hashed_password)
        VALUES ($1, $2, $3)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&email)
    .bind(&hashed_password)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(user.into()))
}

/// Canonical form used for storage and lookup, so `Ada@Example.com` and
/// `ada@example.com` resolve to the same account.
fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Field checks applied before touching the database. Expects an
/// already-normalized email.
fn validate_registration(email: &str, password: &str) -> Result<(), String> {
    if email.is_empty() || password.is_empty() {
        return Err("Please fill in all fields".to_string());
    }
    if !is_plausible_email(email) {
        return Err("Invalid email address".to_string());
    }
    if password.len() < 6 {
        return Err("Password must be at least 6 characters".to_string());
    }
    Ok(())
}

/// Minimal shape check: something before the @, a dotted domain after it.
fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plausible_emails() {
        assert!(is_plausible_email("ada@example.com"));
        assert!(is_plausible_email("a.b+c@mail.co.uk"));
    }

    #[test]
    fn test_implausible_emails() {
        assert!(!is_plausible_email("ada"));
        assert!(!is_plausible_email("@example.com"));
        assert!(!is_plausible_email("ada@localhost"));
    }

    #[test]
    fn test_normalize_email_lowercases_and_trims() {
        assert_eq!(normalize_email("  Ada@Example.COM "), "ada@example.com");
        assert_eq!(normalize_email("ada@example.com"), "ada@example.com");
    }

    #[test]
    fn test_registered_casing_matches_at_login() {
        // Both handlers must agree on the stored form.
        let stored = normalize_email("Ada@Example.com");
        let looked_up = normalize_email(" ADA@example.COM");
        assert_eq!(stored, looked_up);
    }

    #[test]
    fn test_registration_rejects_empty_fields() {
        assert_eq!(
            validate_registration("", "secret1"),
            Err("Please fill in all fields".to_string())
        );
        assert_eq!(
            validate_registration("ada@example.com", ""),
            Err("Please fill in all fields".to_string())
        );
    }

    #[test]
    fn test_registration_rejects_short_password() {
        assert_eq!(
            validate_registration("ada@example.com", "12345"),
            Err("Password must be at least 6 characters".to_string())
        );
    }

    #[test]
    fn test_registration_rejects_bad_email() {
        assert_eq!(
            validate_registration("ada", "secret1"),
            Err("Invalid email address".to_string())
        );
    }

    #[test]
    fn test_registration_accepts_valid_fields() {
        assert_eq!(validate_registration("ada@example.com", "secret1"), Ok(()));
    }
}
