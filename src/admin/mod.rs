//! Operator endpoints, mounted under `/admin` when enabled.
//!
//! Authenticated with the static API key from `admin.api_key`, independent of
//! tenant sessions.

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::{get_stats, get_status, post_snapshot};
use crate::http::server::AppState;

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/status", get(get_status))
        .route("/stats", get(get_stats))
        .route("/snapshot", post(post_snapshot))
        .layer(middleware::from_fn_with_state(state, admin_auth_middleware))
}
