pub mod auth;
pub mod chat;
pub mod health;
pub mod resume;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};

use crate::auth::middleware::authenticate;
use crate::state::AppState;

/// Resume uploads are capped at 10 MiB.
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    // Token and registration endpoints plus the SSE stream (which carries its
    // token as a query parameter) stay outside the bearer-auth middleware.
    let public = Router::new()
        .route("/health", get(health::health_handler))
        .route("/auth/token", post(auth::handle_login))
        .route("/auth/register", post(auth::handle_register))
        .route("/resume/stream/:id", get(resume::handle_stream));

    let protected = Router::new()
        .route(
            "/resume/upload",
            post(resume::handle_upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/resume/status/:id", get(resume::handle_status))
        .route("/v1/chat/completions", post(chat::handle_completions))
        .route("/v1/chat/resume-chats", get(chat::handle_resume_chats))
        .route("/v1/chat/history/:resume_id", get(chat::handle_history))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            authenticate,
        ));

    public.merge(protected).with_state(state)
}
