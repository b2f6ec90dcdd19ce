use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use sha2::{Digest, Sha256};

use crate::http::middleware::auth::bearer_token;
use crate::http::response::ApiError;
use crate::http::server::AppState;

/// Compare digests so the check takes the same time for every wrong key.
fn key_matches(presented: &str, expected: &str) -> bool {
    let a = Sha256::digest(presented.as_bytes());
    let b = Sha256::digest(expected.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let authorized = {
        let cfg = state.config.load();
        bearer_token(request.headers())
            .map(|key| key_matches(key, &cfg.admin.api_key))
            .unwrap_or(false)
    };

    if authorized {
        next.run(request).await
    } else {
        tracing::warn!(path = %request.uri().path(), "Rejected admin request");
        ApiError::new(StatusCode::UNAUTHORIZED, "unauthorized", "invalid admin key").into_response()
    }
}
