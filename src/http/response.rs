//! Error responses.
//!
//! Every failure leaves the API as
//! ```text
//! {"error": {"code": "...", "message": "...", "details": ...}}
//! ```
//! with `details` present only when there is something structured to add
//! (field errors, version numbers).

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use crate::error::CrmError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    pub fn rate_limited() -> Self {
        Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            "rate_limited",
            "too many requests, slow down",
        )
    }
}

/// HTTP status for a domain error.
pub fn status_for(error: &CrmError) -> StatusCode {
    match error {
        CrmError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CrmError::NotFound { .. } => StatusCode::NOT_FOUND,
        CrmError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        CrmError::Forbidden(_) => StatusCode::FORBIDDEN,
        CrmError::Conflict(_) | CrmError::VersionConflict { .. } | CrmError::Transition(_) => {
            StatusCode::CONFLICT
        }
        CrmError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        CrmError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        CrmError::Storage(_) | CrmError::Serialization(_) | CrmError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl From<CrmError> for ApiError {
    fn from(error: CrmError) -> Self {
        let status = status_for(&error);
        if status.is_server_error() {
            tracing::error!(error = %error, "Request failed");
            return Self::new(status, error.code(), "internal server error");
        }

        let details = match &error {
            CrmError::Validation(fields) => Some(json!({ "fields": fields })),
            CrmError::VersionConflict {
                expected, actual, ..
            } => Some(json!({ "expected": expected, "actual": actual })),
            CrmError::PayloadTooLarge { limit, .. } => Some(json!({ "limit": limit })),
            _ => None,
        };
        Self {
            status,
            code: error.code(),
            message: error.to_string(),
            details,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::MissingJsonContentType(_) => Self::new(
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "unsupported_media_type",
                "expected content-type: application/json",
            ),
            JsonRejection::BytesRejection(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                Self::new(e.status(), "payload_too_large", e.body_text())
            }
            JsonRejection::JsonDataError(e) => Self::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_failed",
                e.body_text(),
            ),
            other => Self::new(StatusCode::BAD_REQUEST, "malformed_json", other.body_text()),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(error: MultipartError) -> Self {
        let status = error.status();
        let code = if status == StatusCode::PAYLOAD_TOO_LARGE {
            "payload_too_large"
        } else {
            "bad_request"
        };
        Self::new(status, code, error.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut error = json!({
            "code": self.code,
            "message": self.message,
        });
        if let Some(details) = self.details {
            error["details"] = details;
        }
        (self.status, Json(json!({ "error": error }))).into_response()
    }
}

impl IntoResponse for CrmError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}

/// Handler result.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FieldError;
    use crate::model::LeadCategory;
    use crate::pipeline::TransitionError;

    async fn body(error: CrmError) -> (StatusCode, Value) {
        let response = error.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_validation_lists_fields() {
        let (status, json) = body(CrmError::Validation(vec![FieldError::new(
            "name",
            "is required",
        )]))
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json["error"]["code"], "validation_failed");
        assert_eq!(json["error"]["details"]["fields"][0]["field"], "name");
    }

    #[tokio::test]
    async fn test_conflicts_are_409() {
        let (status, json) = body(CrmError::VersionConflict {
            entity: "lead",
            id: "x".into(),
            expected: 2,
            actual: 3,
        })
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["error"]["details"]["actual"], 3);

        let (status, json) =
            body(TransitionError::SameCategory(LeadCategory::Assigned).into()).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["error"]["code"], "invalid_transition");
    }

    #[tokio::test]
    async fn test_internal_errors_are_opaque() {
        let (status, json) = body(CrmError::Internal("db exploded at 0xdead".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"]["message"], "internal server error");
        assert!(json["error"].get("details").is_none());
    }

    #[test]
    fn test_status_map() {
        assert_eq!(
            status_for(&CrmError::not_found("lead", "1")),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&CrmError::Unauthorized("x".into())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_for(&CrmError::PayloadTooLarge { size: 2, limit: 1 }),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            status_for(&CrmError::UnsupportedMediaType("a/b".into())),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
    }
}
