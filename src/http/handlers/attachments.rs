//! Multipart upload and raw download of lead attachments.

use axum::extract::{Multipart, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::Json;

use crate::auth::AuthContext;
use crate::error::CrmError;
use crate::http::request::ApiPath;
use crate::http::response::ApiResult;
use crate::http::server::AppState;
use crate::model::{Attachment, AttachmentId, LeadId};
use crate::services::Upload;

const FILE_FIELD: &str = "file";
const X_CONTENT_SHA256: HeaderName = HeaderName::from_static("x-content-sha256");

pub async fn list(
    State(state): State<AppState>,
    ctx: AuthContext,
    ApiPath(lead_id): ApiPath<LeadId>,
) -> ApiResult<Json<Vec<Attachment>>> {
    Ok(Json(state.crm.storage.list(&ctx, lead_id)?))
}

/// `multipart/form-data` with a single `file` part.
pub async fn upload(
    State(state): State<AppState>,
    ctx: AuthContext,
    ApiPath(lead_id): ApiPath<LeadId>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<Attachment>)> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or("file").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field.bytes().await?;

        let upload = Upload {
            filename,
            content_type,
            bytes: bytes.to_vec(),
        };
        let attachment = state.crm.storage.upload(&ctx, lead_id, upload).await?;
        return Ok((StatusCode::CREATED, Json(attachment)));
    }
    Err(CrmError::invalid(FILE_FIELD, "multipart part `file` is required").into())
}

pub async fn download(
    State(state): State<AppState>,
    ctx: AuthContext,
    ApiPath(id): ApiPath<AttachmentId>,
) -> ApiResult<(HeaderMap, Vec<u8>)> {
    let (attachment, bytes) = state.crm.storage.download(&ctx, id).await?;

    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&attachment.content_type) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    let disposition = format!(
        "attachment; filename=\"{}\"",
        attachment.filename.replace(['"', '\\'], "_")
    );
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    if let Ok(value) = HeaderValue::from_str(&attachment.sha256) {
        headers.insert(X_CONTENT_SHA256, value);
    }
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("private, no-cache"));
    Ok((headers, bytes))
}

pub async fn delete(
    State(state): State<AppState>,
    ctx: AuthContext,
    ApiPath(id): ApiPath<AttachmentId>,
) -> ApiResult<StatusCode> {
    state.crm.storage.delete(&ctx, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
