//! Request size limits and cross-origin policy.
//!
//! JSON routes share `security.max_body_size`; the upload route overrides it
//! with `storage.max_attachment_bytes` plus room for multipart framing.
//! Oversized bodies are rejected with 413 before the handler runs.

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::config::CrmConfig;

/// Slack for multipart boundaries and part headers.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn json_body_limit(config: &CrmConfig) -> DefaultBodyLimit {
    DefaultBodyLimit::max(config.security.max_body_size)
}

pub fn upload_body_limit(config: &CrmConfig) -> DefaultBodyLimit {
    DefaultBodyLimit::max(
        config
            .storage
            .max_attachment_bytes
            .saturating_add(MULTIPART_OVERHEAD),
    )
}

/// CORS for the configured browser origins; `None` when the list is empty.
pub fn cors_layer(config: &CrmConfig) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = config
        .security
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim_end_matches('/')) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    if origins.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .max_age(Duration::from_secs(600)),
    )
}
