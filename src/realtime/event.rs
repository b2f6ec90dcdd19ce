//! Mutation events pushed to subscribers.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::{now_millis, LeadId, TenantId};

/// What changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "lead.created")]
    LeadCreated,
    #[serde(rename = "lead.updated")]
    LeadUpdated,
    #[serde(rename = "lead.category_changed")]
    LeadCategoryChanged,
    #[serde(rename = "lead.assigned")]
    LeadAssigned,
    #[serde(rename = "lead.archived")]
    LeadArchived,
    #[serde(rename = "activity.created")]
    ActivityCreated,
    #[serde(rename = "quote.created")]
    QuoteCreated,
    #[serde(rename = "quote.updated")]
    QuoteUpdated,
    #[serde(rename = "quote.status_changed")]
    QuoteStatusChanged,
    #[serde(rename = "attachment.added")]
    AttachmentAdded,
    #[serde(rename = "attachment.removed")]
    AttachmentRemoved,
    #[serde(rename = "user.updated")]
    UserUpdated,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::LeadCreated => "lead.created",
            EventType::LeadUpdated => "lead.updated",
            EventType::LeadCategoryChanged => "lead.category_changed",
            EventType::LeadAssigned => "lead.assigned",
            EventType::LeadArchived => "lead.archived",
            EventType::ActivityCreated => "activity.created",
            EventType::QuoteCreated => "quote.created",
            EventType::QuoteUpdated => "quote.updated",
            EventType::QuoteStatusChanged => "quote.status_changed",
            EventType::AttachmentAdded => "attachment.added",
            EventType::AttachmentRemoved => "attachment.removed",
            EventType::UserUpdated => "user.updated",
        }
    }
}

/// Subscription room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Room {
    Tenant(TenantId),
    Lead(LeadId),
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Room::Tenant(id) => write!(f, "tenant:{id}"),
            Room::Lead(id) => write!(f, "lead:{id}"),
        }
    }
}

/// Envelope sent to WebSocket clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrmEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub tenant_id: TenantId,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub lead_id: Option<LeadId>,
    pub data: serde_json::Value,
    pub at: i64,
}

impl CrmEvent {
    pub fn new(
        event_type: EventType,
        tenant_id: TenantId,
        lead_id: Option<LeadId>,
        data: impl Serialize,
    ) -> Self {
        Self {
            event_type,
            tenant_id,
            lead_id,
            data: serde_json::to_value(data).unwrap_or(serde_json::Value::Null),
            at: now_millis(),
        }
    }

    /// Rooms that receive this event.
    pub fn rooms(&self) -> Vec<Room> {
        let mut rooms = vec![Room::Tenant(self.tenant_id)];
        if let Some(lead) = self.lead_id {
            rooms.push(Room::Lead(lead));
        }
        rooms
    }
}
