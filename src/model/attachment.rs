//! Files attached to leads.

use serde::{Deserialize, Serialize};

use super::ids::{AttachmentId, LeadId, TenantId, UserId};

/// Metadata of a stored file; the bytes live on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub id: AttachmentId,
    pub tenant_id: TenantId,
    pub lead_id: LeadId,
    pub filename: String,
    pub content_type: String,
    pub size: u64,
    /// Hex SHA-256 of the content.
    pub sha256: String,
    pub uploaded_by: Option<UserId>,
    pub created_at: i64,
}
