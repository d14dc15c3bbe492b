pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    http::{Method, Uri},
    routing::{get, post},
    Router,
};

use crate::errors::AppError;
use crate::session::handlers;
use crate::state::AppState;

/// Upload cap plus headroom for the answers field and multipart framing.
const MAX_REQUEST_BYTES: usize = 12 * 1024 * 1024;

async fn not_found(method: Method, uri: Uri) -> AppError {
    AppError::NotFound(format!("No route for {method} {uri}"))
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route(
            "/api/v1/sessions/:id/answers",
            post(handlers::handle_submit_answers),
        )
        .route("/api/v1/sessions/:id/resume", post(handlers::handle_resume))
        .route(
            "/api/v1/sessions/:id",
            get(handlers::handle_get_session).delete(handlers::handle_new_session),
        )
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BYTES))
        .with_state(state)
}
