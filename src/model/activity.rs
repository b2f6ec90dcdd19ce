//! Timeline records of actions taken on leads.

use serde::{Deserialize, Serialize};

use super::ids::{ActivityId, AttachmentId, LeadId, QuoteId, TenantId, UserId};
use super::lead::LeadCategory;
use super::quote::QuoteStatus;

/// User-logged interaction types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Note,
    Call,
    Email,
    Meeting,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActivityKind {
    LeadCreated,
    CategoryChanged {
        from: LeadCategory,
        to: LeadCategory,
        #[serde(default)]
        forced: bool,
    },
    Assigned {
        from: Option<UserId>,
        to: Option<UserId>,
    },
    FieldsUpdated {
        fields: Vec<String>,
    },
    Interaction {
        kind: InteractionKind,
        body: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_mins: Option<u32>,
    },
    QuoteCreated {
        quote_id: QuoteId,
        number: String,
    },
    QuoteStatusChanged {
        quote_id: QuoteId,
        from: QuoteStatus,
        to: QuoteStatus,
    },
    AttachmentAdded {
        attachment_id: AttachmentId,
        filename: String,
    },
    AttachmentRemoved {
        attachment_id: AttachmentId,
        filename: String,
    },
    LeadArchived,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub id: ActivityId,
    pub tenant_id: TenantId,
    pub lead_id: Option<LeadId>,
    /// `None` for system-generated records.
    pub actor: Option<UserId>,
    pub kind: ActivityKind,
    /// Store-wide sequence; breaks ties between equal timestamps.
    pub seq: u64,
    pub created_at: i64,
}
