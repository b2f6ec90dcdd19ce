//! Lead timelines.

use serde::Deserialize;
use std::sync::Arc;

use super::emit;
use crate::auth::{AuthContext, Permission};
use crate::error::{CrmError, CrmResult};
use crate::model::{
    now_millis, Activity, ActivityId, ActivityKind, InteractionKind, LeadId, Page, PageRequest,
    TenantId, UserId,
};
use crate::realtime::{CrmEvent, EventType, Hub};
use crate::store::Store;
use crate::validation::Validator;

const MAX_BODY_LEN: usize = 5_000;
const MAX_DURATION_MINS: u32 = 24 * 60;

/// A note, call, email or meeting logged by a user.
#[derive(Debug, Clone, Deserialize)]
pub struct NewInteraction {
    pub kind: InteractionKind,
    pub body: String,
    #[serde(default)]
    pub duration_mins: Option<u32>,
}

#[derive(Clone)]
pub struct ActivityService {
    store: Arc<Store>,
    hub: Hub,
}

impl ActivityService {
    pub fn new(store: Arc<Store>, hub: Hub) -> Self {
        Self { store, hub }
    }

    /// Append a timeline record and announce it.
    pub fn record(
        &self,
        tenant: TenantId,
        lead: Option<LeadId>,
        actor: Option<UserId>,
        kind: ActivityKind,
    ) -> Activity {
        let activity = Activity {
            id: ActivityId::new(),
            tenant_id: tenant,
            lead_id: lead,
            actor,
            kind,
            seq: self.store.next_activity_seq(),
            created_at: now_millis(),
        };
        self.store.activities.insert(activity.id, activity.clone());
        self.store.touch();
        emit(
            &self.hub,
            CrmEvent::new(EventType::ActivityCreated, tenant, lead, &activity),
        );
        activity
    }

    pub fn log_interaction(
        &self,
        ctx: &AuthContext,
        lead_id: LeadId,
        input: NewInteraction,
    ) -> CrmResult<Activity> {
        ctx.require(Permission::ActivityWrite)?;
        let lead = self.store.leads.get(ctx.tenant_id, lead_id)?;
        if lead.is_archived() {
            return Err(CrmError::Conflict("lead is archived".to_string()));
        }

        let mut v = Validator::new();
        let body = v.required_text("body", &input.body, MAX_BODY_LEN);
        if let Some(mins) = input.duration_mins {
            v.check(
                mins > 0 && mins <= MAX_DURATION_MINS,
                "duration_mins",
                "must be between 1 and 1440",
            );
        }
        v.finish()?;

        let activity = self.record(
            ctx.tenant_id,
            Some(lead_id),
            Some(ctx.user_id),
            ActivityKind::Interaction {
                kind: input.kind,
                body,
                duration_mins: input.duration_mins,
            },
        );
        tracing::debug!(lead = %lead_id, kind = ?input.kind, "Interaction logged");
        Ok(activity)
    }

    /// Timeline of one lead, newest first.
    pub fn list_for_lead(
        &self,
        ctx: &AuthContext,
        lead_id: LeadId,
        page: PageRequest,
    ) -> CrmResult<Page<Activity>> {
        ctx.require(Permission::ActivityRead)?;
        self.store.leads.get(ctx.tenant_id, lead_id)?;
        let items = self
            .store
            .activities
            .list_where(ctx.tenant_id, |a| a.lead_id == Some(lead_id));
        Ok(Page::from_sorted(newest_first(items), page))
    }

    /// Tenant-wide feed, newest first.
    pub fn list_for_tenant(&self, ctx: &AuthContext, page: PageRequest) -> CrmResult<Page<Activity>> {
        ctx.require(Permission::ActivityRead)?;
        let items = self.store.activities.list(ctx.tenant_id);
        Ok(Page::from_sorted(newest_first(items), page))
    }
}

fn newest_first(mut items: Vec<Activity>) -> Vec<Activity> {
    items.sort_by(|a, b| b.seq.cmp(&a.seq));
    items
}
