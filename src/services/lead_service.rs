//! Leads and the pipeline board.
//!
//! Every write reads the current document, applies the change and
//! compare-and-swaps on `version`; the whole read-modify-write is retried
//! when another writer got there first.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use super::activity_service::ActivityService;
use super::{emit, write_with_retry};
use crate::auth::{AuthContext, Permission};
use crate::cache::TtlCache;
use crate::config::SharedConfig;
use crate::error::{CrmError, CrmResult};
use crate::model::{
    now_millis, ActivityKind, InteractionKind, Lead, LeadCategory, LeadId, LeadSource, Page,
    PageRequest, TenantId, User, UserId,
};
use crate::observability::metrics;
use crate::pipeline;
use crate::realtime::{CrmEvent, EventType, Hub};
use crate::store::Store;
use crate::validation::Validator;

/// Newest leads shown per board column.
pub const BOARD_COLUMN_LIMIT: usize = 20;
const MAX_BULK: usize = 200;
const MAX_NAME_LEN: usize = 200;
const MAX_NOTES_LEN: usize = 5_000;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NewLead {
    pub name: String,
    pub company: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub source: Option<LeadSource>,
    pub value_cents: Option<i64>,
    pub tags: Vec<String>,
    pub notes: Option<String>,
    pub assignee: Option<UserId>,
}

/// Field patch; an empty string clears an optional field.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LeadPatch {
    pub name: Option<String>,
    pub company: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub source: Option<LeadSource>,
    pub value_cents: Option<i64>,
    pub tags: Option<Vec<String>>,
    pub notes: Option<String>,
    pub expected_version: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LeadFilter {
    pub category: Option<LeadCategory>,
    pub assignee: Option<UserId>,
    pub source: Option<LeadSource>,
    pub tag: Option<String>,
    /// Case-insensitive match on name, company or email.
    pub q: Option<String>,
    pub include_archived: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryChange {
    pub category: LeadCategory,
    #[serde(default)]
    pub forced: bool,
    #[serde(default)]
    pub expected_version: Option<u64>,
    /// Logged as a note alongside the move.
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssignRequest {
    pub user_id: UserId,
    #[serde(default)]
    pub expected_version: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BulkAssign {
    pub lead_ids: Vec<LeadId>,
    pub user_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkFailure {
    pub lead_id: LeadId,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkAssignResult {
    pub assigned: Vec<LeadId>,
    pub failed: Vec<BulkFailure>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionOptions {
    pub current: LeadCategory,
    pub allowed: Vec<LeadCategory>,
    /// Caller may force a non-adjacent move.
    pub can_force: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadCard {
    pub id: LeadId,
    pub name: String,
    pub company: Option<String>,
    pub assignee: Option<UserId>,
    pub value_cents: Option<i64>,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardColumn {
    pub category: LeadCategory,
    pub label: String,
    pub count: usize,
    pub value_cents: i64,
    pub leads: Vec<LeadCard>,
}

/// Kanban view of a tenant's open leads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Board {
    pub columns: Vec<BoardColumn>,
    pub total: usize,
    pub generated_at: i64,
}

fn set_if_changed<T: PartialEq + Clone>(
    slot: &mut T,
    value: &Option<T>,
    field: &str,
    changed: &mut Vec<String>,
) {
    if let Some(value) = value {
        if slot != value {
            *slot = value.clone();
            changed.push(field.to_string());
        }
    }
}

/// A validated `LeadPatch`.
struct CleanPatch {
    name: Option<String>,
    company: Option<Option<String>>,
    email: Option<Option<String>>,
    phone: Option<Option<String>>,
    notes: Option<Option<String>>,
    source: Option<LeadSource>,
    value_cents: Option<Option<i64>>,
    tags: Option<Vec<String>>,
}

impl CleanPatch {
    fn validate(patch: &LeadPatch) -> CrmResult<Self> {
        let mut v = Validator::new();
        let clean = Self {
            name: patch
                .name
                .as_deref()
                .map(|n| v.required_text("name", n, MAX_NAME_LEN)),
            company: patch
                .company
                .as_deref()
                .map(|c| v.optional_text("company", Some(c), MAX_NAME_LEN)),
            email: patch
                .email
                .as_deref()
                .map(|e| v.optional_email("email", Some(e))),
            phone: patch
                .phone
                .as_deref()
                .map(|p| v.optional_phone("phone", Some(p))),
            notes: patch
                .notes
                .as_deref()
                .map(|n| v.optional_text("notes", Some(n), MAX_NOTES_LEN)),
            source: patch.source,
            value_cents: patch.value_cents.map(Some),
            tags: patch.tags.as_deref().map(|t| v.tags("tags", t)),
        };
        if let Some(value) = patch.value_cents {
            v.check(value >= 0, "value_cents", "must not be negative");
        }
        v.finish()?;
        Ok(clean)
    }

    fn apply(&self, lead: &mut Lead) -> Vec<String> {
        let mut changed = Vec::new();
        set_if_changed(&mut lead.name, &self.name, "name", &mut changed);
        set_if_changed(&mut lead.company, &self.company, "company", &mut changed);
        set_if_changed(&mut lead.email, &self.email, "email", &mut changed);
        set_if_changed(&mut lead.phone, &self.phone, "phone", &mut changed);
        set_if_changed(&mut lead.notes, &self.notes, "notes", &mut changed);
        set_if_changed(&mut lead.source, &self.source, "source", &mut changed);
        set_if_changed(&mut lead.value_cents, &self.value_cents, "value_cents", &mut changed);
        set_if_changed(&mut lead.tags, &self.tags, "tags", &mut changed);
        changed
    }
}

fn matches_filter(lead: &Lead, filter: &LeadFilter, q: Option<&str>, tag: Option<&str>) -> bool {
    if lead.is_archived() && !filter.include_archived {
        return false;
    }
    if filter.category.is_some_and(|c| c != lead.category) {
        return false;
    }
    if filter.assignee.is_some() && filter.assignee != lead.assignee {
        return false;
    }
    if filter.source.is_some_and(|s| s != lead.source) {
        return false;
    }
    if let Some(tag) = tag {
        if !lead.tags.iter().any(|t| t == tag) {
            return false;
        }
    }
    if let Some(q) = q {
        let hit = |field: Option<&str>| field.is_some_and(|f| f.to_lowercase().contains(q));
        if !(hit(Some(lead.name.as_str())) || hit(lead.company.as_deref()) || hit(lead.email.as_deref())) {
            return false;
        }
    }
    true
}

#[derive(Clone)]
pub struct LeadService {
    store: Arc<Store>,
    config: SharedConfig,
    hub: Hub,
    activities: ActivityService,
    boards: TtlCache<TenantId, Board>,
}

impl LeadService {
    pub fn new(
        store: Arc<Store>,
        config: SharedConfig,
        hub: Hub,
        activities: ActivityService,
        board_ttl: Duration,
    ) -> Self {
        Self {
            store,
            config,
            hub,
            activities,
            boards: TtlCache::new("board", board_ttl),
        }
    }

    pub fn create_lead(&self, ctx: &AuthContext, input: NewLead) -> CrmResult<Lead> {
        ctx.require(Permission::LeadCreate)?;

        let mut v = Validator::new();
        let name = v.required_text("name", &input.name, MAX_NAME_LEN);
        let company = v.optional_text("company", input.company.as_deref(), MAX_NAME_LEN);
        let email = v.optional_email("email", input.email.as_deref());
        let phone = v.optional_phone("phone", input.phone.as_deref());
        let notes = v.optional_text("notes", input.notes.as_deref(), MAX_NOTES_LEN);
        let tags = v.tags("tags", &input.tags);
        if let Some(value) = input.value_cents {
            v.check(value >= 0, "value_cents", "must not be negative");
        }
        v.finish()?;

        if let Some(email) = &email {
            self.ensure_email_free(ctx.tenant_id, email, None)?;
        }

        // Users who cannot assign own every lead they create.
        let assignee = if ctx.has(Permission::LeadAssign) {
            match input.assignee {
                Some(user_id) => Some(self.assignable(ctx.tenant_id, user_id)?.id),
                None => None,
            }
        } else {
            if input.assignee.is_some_and(|id| id != ctx.user_id) {
                return Err(CrmError::Forbidden(
                    "leads can only be assigned to yourself".to_string(),
                ));
            }
            Some(ctx.user_id)
        };
        let category = if assignee.is_some() {
            LeadCategory::Assigned
        } else {
            LeadCategory::Unassigned
        };

        let now = now_millis();
        let lead = Lead {
            id: LeadId::new(),
            tenant_id: ctx.tenant_id,
            name,
            company,
            email,
            phone,
            source: input.source.unwrap_or_default(),
            category,
            assignee,
            value_cents: input.value_cents,
            tags,
            notes,
            created_by: Some(ctx.user_id),
            created_at: now,
            updated_at: now,
            category_changed_at: now,
            version: 1,
            archived_at: None,
        };
        self.store.leads.insert(lead.id, lead.clone());
        self.store.touch();

        self.activities
            .record(ctx.tenant_id, Some(lead.id), Some(ctx.user_id), ActivityKind::LeadCreated);
        if assignee.is_some() {
            self.activities.record(
                ctx.tenant_id,
                Some(lead.id),
                Some(ctx.user_id),
                ActivityKind::Assigned {
                    from: None,
                    to: assignee,
                },
            );
        }
        emit(
            &self.hub,
            CrmEvent::new(EventType::LeadCreated, ctx.tenant_id, Some(lead.id), &lead),
        );
        self.boards.invalidate(&ctx.tenant_id);
        tracing::info!(tenant = %ctx.tenant_id, lead = %lead.id, category = %lead.category, "Lead created");
        Ok(lead)
    }

    pub fn get_lead(&self, ctx: &AuthContext, id: LeadId) -> CrmResult<Lead> {
        ctx.require(Permission::LeadRead)?;
        self.store.leads.get(ctx.tenant_id, id)
    }

    /// Matching leads, most recently updated first.
    pub fn list_leads(
        &self,
        ctx: &AuthContext,
        filter: &LeadFilter,
        page: PageRequest,
    ) -> CrmResult<Page<Lead>> {
        ctx.require(Permission::LeadRead)?;
        let q = filter
            .q
            .as_deref()
            .map(|q| q.trim().to_lowercase())
            .filter(|q| !q.is_empty());
        let tag = filter.tag.as_deref().map(|t| t.trim().to_lowercase());

        let mut leads = self.store.leads.list_where(ctx.tenant_id, |lead| {
            matches_filter(lead, filter, q.as_deref(), tag.as_deref())
        });
        leads.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(Page::from_sorted(leads, page))
    }

    pub async fn update_lead(&self, ctx: &AuthContext, id: LeadId, patch: LeadPatch) -> CrmResult<Lead> {
        let clean = CleanPatch::validate(&patch)?;
        let mut changed = Vec::new();

        let (before, after) = self
            .write_lead(ctx, id, patch.expected_version, |lead| {
                ctx.require_lead_write(lead)?;
                let mut next = lead.clone();
                changed = clean.apply(&mut next);
                if changed.is_empty() {
                    return Ok(None);
                }
                if let (true, Some(email)) = (changed.iter().any(|f| f == "email"), &next.email) {
                    self.ensure_email_free(ctx.tenant_id, email, Some(id))?;
                }
                Ok(Some(next))
            })
            .await?;

        if before.version != after.version {
            self.activities.record(
                ctx.tenant_id,
                Some(id),
                Some(ctx.user_id),
                ActivityKind::FieldsUpdated {
                    fields: changed.clone(),
                },
            );
            emit(
                &self.hub,
                CrmEvent::new(
                    EventType::LeadUpdated,
                    ctx.tenant_id,
                    Some(id),
                    serde_json::json!({ "lead": &after, "fields": changed }),
                ),
            );
            self.boards.invalidate(&ctx.tenant_id);
        }
        Ok(after)
    }

    /// Move a lead to another pipeline category.
    pub async fn change_category(
        &self,
        ctx: &AuthContext,
        id: LeadId,
        change: CategoryChange,
    ) -> CrmResult<Lead> {
        if change.forced {
            ctx.require(Permission::PipelineOverride)?;
        }
        let note = {
            let mut v = Validator::new();
            let note = v.optional_text("note", change.note.as_deref(), MAX_NOTES_LEN);
            v.finish()?;
            note
        };
        let to = change.category;

        let (before, after) = self
            .write_lead(ctx, id, change.expected_version, |lead| {
                ctx.require_lead_write(lead)?;
                let mut next = lead.clone();
                if to == LeadCategory::Unassigned {
                    next.assignee = None;
                }
                pipeline::check_transition(lead.category, to, next.assignee.is_some(), change.forced)?;
                next.category = to;
                next.category_changed_at = now_millis();
                Ok(Some(next))
            })
            .await?;

        self.category_changed(ctx, &before, &after, change.forced);
        if before.assignee != after.assignee {
            self.assignment_changed(ctx, &before, &after);
        }
        if let Some(body) = note {
            self.activities.record(
                ctx.tenant_id,
                Some(id),
                Some(ctx.user_id),
                ActivityKind::Interaction {
                    kind: InteractionKind::Note,
                    body,
                    duration_mins: None,
                },
            );
        }
        Ok(after)
    }

    /// Give a lead an owner; users without `lead_assign` may only claim
    /// unassigned leads for themselves.
    pub async fn assign(&self, ctx: &AuthContext, id: LeadId, request: AssignRequest) -> CrmResult<Lead> {
        let can_assign = ctx.has(Permission::LeadAssign);
        if !can_assign && request.user_id != ctx.user_id {
            return Err(CrmError::Forbidden(
                "role cannot assign leads to other users".to_string(),
            ));
        }
        if !can_assign {
            ctx.require(Permission::LeadWriteOwn)?;
        }
        let target = self.assignable(ctx.tenant_id, request.user_id)?;

        let (before, after) = self
            .write_lead(ctx, id, request.expected_version, |lead| {
                if !can_assign
                    && lead.assignee != Some(ctx.user_id)
                    && lead.category != LeadCategory::Unassigned
                {
                    return Err(CrmError::Forbidden(
                        "only unassigned leads can be claimed".to_string(),
                    ));
                }
                if lead.category == LeadCategory::Junk {
                    return Err(CrmError::Conflict(
                        "junk leads must be recycled before assignment".to_string(),
                    ));
                }
                if lead.assignee == Some(target.id) {
                    return Ok(None);
                }
                let mut next = lead.clone();
                next.assignee = Some(target.id);
                if lead.category == LeadCategory::Unassigned {
                    next.category = LeadCategory::Assigned;
                    next.category_changed_at = now_millis();
                }
                Ok(Some(next))
            })
            .await?;

        if before.version != after.version {
            self.assignment_changed(ctx, &before, &after);
            if before.category != after.category {
                self.category_changed(ctx, &before, &after, false);
            }
        }
        Ok(after)
    }

    /// Remove the owner; leads in owner-only categories fall back to
    /// `unassigned`.
    pub async fn unassign(&self, ctx: &AuthContext, id: LeadId, expected_version: Option<u64>) -> CrmResult<Lead> {
        let can_assign = ctx.has(Permission::LeadAssign);
        let (before, after) = self
            .write_lead(ctx, id, expected_version, |lead| {
                if !can_assign {
                    ctx.require_lead_write(lead)?;
                }
                if lead.assignee.is_none() {
                    return Ok(None);
                }
                let mut next = lead.clone();
                next.assignee = None;
                if pipeline::requires_assignee(lead.category) {
                    next.category = LeadCategory::Unassigned;
                    next.category_changed_at = now_millis();
                }
                Ok(Some(next))
            })
            .await?;

        if before.version != after.version {
            self.assignment_changed(ctx, &before, &after);
            if before.category != after.category {
                self.category_changed(ctx, &before, &after, false);
            }
        }
        Ok(after)
    }

    /// Assign many leads; each lead succeeds or fails on its own.
    pub async fn bulk_assign(&self, ctx: &AuthContext, request: BulkAssign) -> CrmResult<BulkAssignResult> {
        ctx.require(Permission::LeadAssign)?;
        let mut v = Validator::new();
        v.check(!request.lead_ids.is_empty(), "lead_ids", "must not be empty");
        v.check(
            request.lead_ids.len() <= MAX_BULK,
            "lead_ids",
            "at most 200 leads per request",
        );
        v.finish()?;
        self.assignable(ctx.tenant_id, request.user_id)?;

        let mut seen = HashSet::new();
        let mut result = BulkAssignResult::default();
        for lead_id in request.lead_ids {
            if !seen.insert(lead_id) {
                continue;
            }
            let assign = AssignRequest {
                user_id: request.user_id,
                expected_version: None,
            };
            match self.assign(ctx, lead_id, assign).await {
                Ok(_) => result.assigned.push(lead_id),
                Err(e) => result.failed.push(BulkFailure {
                    lead_id,
                    code: e.code().to_string(),
                    message: e.to_string(),
                }),
            }
        }
        tracing::info!(
            assignee = %request.user_id,
            assigned = result.assigned.len(),
            failed = result.failed.len(),
            "Bulk assignment finished"
        );
        Ok(result)
    }

    /// Soft delete; archived leads stay readable but refuse writes.
    pub async fn archive_lead(&self, ctx: &AuthContext, id: LeadId) -> CrmResult<Lead> {
        ctx.require(Permission::LeadDelete)?;
        let (_, after) = self
            .write_lead(ctx, id, None, |lead| {
                let mut next = lead.clone();
                next.archived_at = Some(now_millis());
                Ok(Some(next))
            })
            .await?;

        self.activities
            .record(ctx.tenant_id, Some(id), Some(ctx.user_id), ActivityKind::LeadArchived);
        emit(
            &self.hub,
            CrmEvent::new(EventType::LeadArchived, ctx.tenant_id, Some(id), &after),
        );
        self.boards.invalidate(&ctx.tenant_id);
        tracing::info!(tenant = %ctx.tenant_id, lead = %id, "Lead archived");
        Ok(after)
    }

    /// Categories the caller may move this lead to right now.
    pub fn allowed_transitions(&self, ctx: &AuthContext, id: LeadId) -> CrmResult<TransitionOptions> {
        let lead = self.get_lead(ctx, id)?;
        let writable = !lead.is_archived() && ctx.can_modify_lead(&lead);
        let allowed = if writable {
            pipeline::allowed_targets(lead.category, lead.assignee.is_some())
        } else {
            Vec::new()
        };
        Ok(TransitionOptions {
            current: lead.category,
            allowed,
            can_force: writable && ctx.has(Permission::PipelineOverride),
        })
    }

    pub fn board(&self, ctx: &AuthContext) -> CrmResult<Board> {
        ctx.require(Permission::LeadRead)?;
        let tenant = ctx.tenant_id;
        self.boards
            .get_or_insert_with(tenant, || Ok::<_, CrmError>(self.build_board(tenant)))
    }

    pub fn purge_cache(&self) -> usize {
        self.boards.purge_expired()
    }

    fn build_board(&self, tenant: TenantId) -> Board {
        let mut leads = self.store.leads.list_where(tenant, |l| !l.is_archived());
        leads.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        let mut columns: Vec<BoardColumn> = LeadCategory::ALL
            .iter()
            .map(|category| BoardColumn {
                category: *category,
                label: category.label().to_string(),
                count: 0,
                value_cents: 0,
                leads: Vec::new(),
            })
            .collect();

        let total = leads.len();
        for lead in leads {
            let column = &mut columns[lead.category.position()];
            column.count += 1;
            column.value_cents = column
                .value_cents
                .saturating_add(lead.value_cents.unwrap_or(0));
            if column.leads.len() < BOARD_COLUMN_LIMIT {
                column.leads.push(LeadCard {
                    id: lead.id,
                    name: lead.name,
                    company: lead.company,
                    assignee: lead.assignee,
                    value_cents: lead.value_cents,
                    updated_at: lead.updated_at,
                });
            }
        }

        Board {
            columns,
            total,
            generated_at: now_millis(),
        }
    }

    /// Retried read-modify-write of one lead; archived leads refuse writes.
    async fn write_lead<F>(
        &self,
        ctx: &AuthContext,
        id: LeadId,
        expected_version: Option<u64>,
        mut apply: F,
    ) -> CrmResult<(Lead, Lead)>
    where
        F: FnMut(&Lead) -> CrmResult<Option<Lead>>,
    {
        let retries = self.config.load().retries.clone();
        write_with_retry(
            &self.store,
            &self.store.leads,
            &retries,
            ctx.tenant_id,
            id,
            expected_version,
            |lead| {
                if lead.is_archived() {
                    return Err(CrmError::Conflict("lead is archived".to_string()));
                }
                Ok(apply(lead)?.map(|mut next| {
                    next.updated_at = now_millis();
                    next
                }))
            },
        )
        .await
    }

    fn category_changed(&self, ctx: &AuthContext, before: &Lead, after: &Lead, forced: bool) {
        self.activities.record(
            ctx.tenant_id,
            Some(after.id),
            Some(ctx.user_id),
            ActivityKind::CategoryChanged {
                from: before.category,
                to: after.category,
                forced,
            },
        );
        metrics::record_lead_transition(before.category.as_str(), after.category.as_str());
        emit(
            &self.hub,
            CrmEvent::new(
                EventType::LeadCategoryChanged,
                ctx.tenant_id,
                Some(after.id),
                serde_json::json!({
                    "lead": after,
                    "from": before.category,
                    "to": after.category,
                    "forced": forced,
                }),
            ),
        );
        self.boards.invalidate(&ctx.tenant_id);
        tracing::info!(
            lead = %after.id,
            from = %before.category,
            to = %after.category,
            forced,
            "Lead category changed"
        );
    }

    fn assignment_changed(&self, ctx: &AuthContext, before: &Lead, after: &Lead) {
        self.activities.record(
            ctx.tenant_id,
            Some(after.id),
            Some(ctx.user_id),
            ActivityKind::Assigned {
                from: before.assignee,
                to: after.assignee,
            },
        );
        emit(
            &self.hub,
            CrmEvent::new(
                EventType::LeadAssigned,
                ctx.tenant_id,
                Some(after.id),
                serde_json::json!({
                    "lead": after,
                    "from": before.assignee,
                    "to": after.assignee,
                }),
            ),
        );
        self.boards.invalidate(&ctx.tenant_id);
    }

    /// An active user of the tenant who may own leads.
    fn assignable(&self, tenant: TenantId, user_id: UserId) -> CrmResult<User> {
        let user = self
            .store
            .users
            .find(tenant, user_id)
            .ok_or_else(|| CrmError::invalid("user_id", "no such user"))?;
        if !user.active {
            return Err(CrmError::invalid("user_id", "user is deactivated"));
        }
        if !user.role.can_own_leads() {
            return Err(CrmError::invalid("user_id", "viewers cannot own leads"));
        }
        Ok(user)
    }

    fn ensure_email_free(&self, tenant: TenantId, email: &str, except: Option<LeadId>) -> CrmResult<()> {
        let taken = self.store.leads.count_where(tenant, |l| {
            !l.is_archived() && Some(l.id) != except && l.email.as_deref() == Some(email)
        }) > 0;
        if taken {
            return Err(CrmError::Conflict(format!(
                "a lead with email `{email}` already exists"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
impl NewLead {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;
    use crate::pipeline::TransitionError;
    use crate::realtime::Room;
    use crate::services::testing::{config, Fixture};

    fn move_to(category: LeadCategory) -> CategoryChange {
        CategoryChange {
            category,
            forced: false,
            expected_version: None,
            note: None,
        }
    }

    fn assign_to(user_id: UserId) -> AssignRequest {
        AssignRequest {
            user_id,
            expected_version: None,
        }
    }

    #[test]
    fn test_create_validates_every_field() {
        let fx = Fixture::new();
        let input = NewLead {
            name: " ".into(),
            email: Some("not-an-email".into()),
            value_cents: Some(-5),
            ..Default::default()
        };
        match fx.crm.leads.create_lead(&fx.admin, input).unwrap_err() {
            CrmError::Validation(fields) => assert_eq!(fields.len(), 3),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_email_among_open_leads() {
        let fx = Fixture::new();
        let input = NewLead {
            email: Some("Ada@Example.com".into()),
            ..NewLead::named("Ada")
        };
        fx.crm.leads.create_lead(&fx.admin, input.clone()).unwrap();
        let err = fx.crm.leads.create_lead(&fx.admin, input).unwrap_err();
        assert!(matches!(err, CrmError::Conflict(_)));
    }

    #[test]
    fn test_agent_leads_are_self_assigned() {
        let fx = Fixture::new();
        let agent = fx.user("agent@acme.test", Role::Agent);
        let lead = fx.crm.leads.create_lead(&agent, NewLead::named("Ada")).unwrap();
        assert_eq!(lead.assignee, Some(agent.user_id));
        assert_eq!(lead.category, LeadCategory::Assigned);

        let manager_lead = fx.crm.leads.create_lead(&fx.admin, NewLead::named("Bob")).unwrap();
        assert_eq!(manager_lead.category, LeadCategory::Unassigned);
    }

    #[tokio::test]
    async fn test_pipeline_walk_and_adjacency() {
        let fx = Fixture::new();
        let agent = fx.user("agent@acme.test", Role::Agent);
        let lead = fx.crm.leads.create_lead(&fx.admin, NewLead::named("Ada")).unwrap();

        // No assignee yet: the assignee rule blocks the move.
        let err = fx
            .crm
            .leads
            .change_category(&fx.admin, lead.id, move_to(LeadCategory::Assigned))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CrmError::Transition(TransitionError::AssigneeRequired(_))
        ));

        let lead = fx.crm.leads.assign(&fx.admin, lead.id, assign_to(agent.user_id)).await.unwrap();
        assert_eq!(lead.category, LeadCategory::Assigned);

        let lead = fx
            .crm
            .leads
            .change_category(&agent, lead.id, move_to(LeadCategory::WorkingOn))
            .await
            .unwrap();
        assert_eq!(lead.category, LeadCategory::WorkingOn);

        let err = fx
            .crm
            .leads
            .change_category(&agent, lead.id, move_to(LeadCategory::Negotiation))
            .await
            .unwrap_err();
        assert!(matches!(err, CrmError::Transition(TransitionError::NotAdjacent { .. })));
    }

    #[tokio::test]
    async fn test_forced_move_needs_override() {
        let fx = Fixture::new();
        let agent = fx.user("agent@acme.test", Role::Agent);
        let lead = fx.crm.leads.create_lead(&agent, NewLead::named("Ada")).unwrap();
        let forced = CategoryChange {
            forced: true,
            ..move_to(LeadCategory::Negotiation)
        };

        let err = fx
            .crm
            .leads
            .change_category(&agent, lead.id, forced.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, CrmError::Forbidden(_)));

        let lead = fx
            .crm
            .leads
            .change_category(&fx.admin, lead.id, forced)
            .await
            .unwrap();
        assert_eq!(lead.category, LeadCategory::Negotiation);
    }

    #[tokio::test]
    async fn test_agent_cannot_touch_foreign_leads() {
        let fx = Fixture::new();
        let owner = fx.user("owner@acme.test", Role::Agent);
        let other = fx.user("other@acme.test", Role::Agent);
        let lead = fx.crm.leads.create_lead(&owner, NewLead::named("Ada")).unwrap();

        let err = fx
            .crm
            .leads
            .change_category(&other, lead.id, move_to(LeadCategory::WorkingOn))
            .await
            .unwrap_err();
        assert!(matches!(err, CrmError::Forbidden(_)));

        let err = fx
            .crm
            .leads
            .assign(&other, lead.id, assign_to(other.user_id))
            .await
            .unwrap_err();
        assert!(matches!(err, CrmError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_agent_claims_unassigned_lead() {
        let fx = Fixture::new();
        let agent = fx.user("agent@acme.test", Role::Agent);
        let lead = fx.crm.leads.create_lead(&fx.admin, NewLead::named("Ada")).unwrap();
        let lead = fx
            .crm
            .leads
            .assign(&agent, lead.id, assign_to(agent.user_id))
            .await
            .unwrap();
        assert_eq!(lead.assignee, Some(agent.user_id));
        assert_eq!(lead.category, LeadCategory::Assigned);
    }

    #[tokio::test]
    async fn test_unassign_and_junk_rules() {
        let fx = Fixture::new();
        let agent = fx.user("agent@acme.test", Role::Agent);
        let lead = fx.crm.leads.create_lead(&agent, NewLead::named("Ada")).unwrap();

        let lead = fx.crm.leads.unassign(&fx.admin, lead.id, None).await.unwrap();
        assert_eq!(lead.assignee, None);
        assert_eq!(lead.category, LeadCategory::Unassigned);

        let lead = fx
            .crm
            .leads
            .change_category(&fx.admin, lead.id, move_to(LeadCategory::Junk))
            .await
            .unwrap();
        let err = fx
            .crm
            .leads
            .assign(&fx.admin, lead.id, assign_to(agent.user_id))
            .await
            .unwrap_err();
        assert!(matches!(err, CrmError::Conflict(_)));

        let lead = fx
            .crm
            .leads
            .change_category(&fx.admin, lead.id, move_to(LeadCategory::Unassigned))
            .await
            .unwrap();
        assert_eq!(lead.category, LeadCategory::Unassigned);
    }

    #[tokio::test]
    async fn test_viewer_cannot_own_leads() {
        let fx = Fixture::new();
        let viewer = fx.user("viewer@acme.test", Role::Viewer);
        let lead = fx.crm.leads.create_lead(&fx.admin, NewLead::named("Ada")).unwrap();
        let err = fx
            .crm
            .leads
            .assign(&fx.admin, lead.id, assign_to(viewer.user_id))
            .await
            .unwrap_err();
        assert!(matches!(err, CrmError::Validation(_)));
    }

    #[tokio::test]
    async fn test_stale_expected_version_conflicts() {
        let fx = Fixture::new();
        let lead = fx.crm.leads.create_lead(&fx.admin, NewLead::named("Ada")).unwrap();
        let patch = LeadPatch {
            company: Some("Analytical Engines".into()),
            expected_version: Some(lead.version),
            ..Default::default()
        };
        let updated = fx.crm.leads.update_lead(&fx.admin, lead.id, patch.clone()).await.unwrap();
        assert_eq!(updated.version, lead.version + 1);

        let err = fx.crm.leads.update_lead(&fx.admin, lead.id, patch).await.unwrap_err();
        assert_eq!(err.code(), "version_conflict");
        assert!(matches!(
            err,
            CrmError::VersionConflict { expected, actual, .. } if expected == lead.version && actual == lead.version + 1
        ));

        // Pinned writes fail on the first attempt rather than retrying.
        let far_ahead = LeadPatch {
            company: Some("Difference Engines".into()),
            expected_version: Some(lead.version + 5),
            ..Default::default()
        };
        let err = fx.crm.leads.update_lead(&fx.admin, lead.id, far_ahead).await.unwrap_err();
        assert_eq!(err.code(), "version_conflict");
        assert_eq!(
            fx.crm.leads.get_lead(&fx.admin, lead.id).unwrap().version,
            lead.version + 1
        );
    }

    #[tokio::test]
    async fn test_update_records_changed_fields_only() {
        let fx = Fixture::new();
        let lead = fx
            .crm
            .leads
            .create_lead(
                &fx.admin,
                NewLead {
                    company: Some("Acme".into()),
                    ..NewLead::named("Ada")
                },
            )
            .unwrap();

        let patch = LeadPatch {
            name: Some("Ada".into()),
            company: Some("".into()),
            tags: Some(vec!["VIP".into()]),
            ..Default::default()
        };
        let updated = fx.crm.leads.update_lead(&fx.admin, lead.id, patch).await.unwrap();
        assert_eq!(updated.company, None);
        assert_eq!(updated.tags, vec!["vip"]);

        let feed = fx
            .crm
            .activities
            .list_for_lead(&fx.admin, lead.id, PageRequest::default())
            .unwrap();
        assert_eq!(
            feed.items[0].kind,
            ActivityKind::FieldsUpdated {
                fields: vec!["company".into(), "tags".into()]
            }
        );

        // nothing changes: no new version
        let same = fx
            .crm
            .leads
            .update_lead(&fx.admin, lead.id, LeadPatch::default())
            .await
            .unwrap();
        assert_eq!(same.version, updated.version);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_all_land() {
        let mut cfg = config();
        cfg.retries.max_attempts = 50;
        let fx = Fixture::with_config(cfg);
        let lead = fx.crm.leads.create_lead(&fx.admin, NewLead::named("Ada")).unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let leads = fx.crm.leads.clone();
            let ctx = fx.admin.clone();
            handles.push(tokio::spawn(async move {
                let patch = LeadPatch {
                    notes: Some(format!("writer {i}")),
                    ..Default::default()
                };
                leads.update_lead(&ctx, lead.id, patch).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let lead = fx.crm.leads.get_lead(&fx.admin, lead.id).unwrap();
        assert_eq!(lead.version, 1 + 8);
    }

    #[tokio::test]
    async fn test_list_filters_and_search() {
        let fx = Fixture::new();
        let agent = fx.user("agent@acme.test", Role::Agent);
        fx.crm
            .leads
            .create_lead(
                &fx.admin,
                NewLead {
                    company: Some("Globex".into()),
                    tags: vec!["vip".into()],
                    ..NewLead::named("Hank")
                },
            )
            .unwrap();
        fx.crm.leads.create_lead(&agent, NewLead::named("Marge")).unwrap();

        let by_text = LeadFilter {
            q: Some("glob".into()),
            ..Default::default()
        };
        let page = fx.crm.leads.list_leads(&fx.admin, &by_text, PageRequest::default()).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].name, "Hank");

        let mine = LeadFilter {
            assignee: Some(agent.user_id),
            ..Default::default()
        };
        let page = fx.crm.leads.list_leads(&agent, &mine, PageRequest::default()).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].name, "Marge");

        let tagged = LeadFilter {
            tag: Some("VIP".into()),
            ..Default::default()
        };
        assert_eq!(
            fx.crm.leads.list_leads(&fx.admin, &tagged, PageRequest::default()).unwrap().total,
            1
        );
    }

    #[tokio::test]
    async fn test_archived_leads_leave_the_board() {
        let fx = Fixture::new();
        let lead = fx
            .crm
            .leads
            .create_lead(
                &fx.admin,
                NewLead {
                    value_cents: Some(500_00),
                    ..NewLead::named("Ada")
                },
            )
            .unwrap();

        let board = fx.crm.leads.board(&fx.admin).unwrap();
        assert_eq!(board.columns.len(), 12);
        assert_eq!(board.columns[0].count, 1);
        assert_eq!(board.columns[0].value_cents, 500_00);

        fx.crm.leads.archive_lead(&fx.admin, lead.id).await.unwrap();
        let board = fx.crm.leads.board(&fx.admin).unwrap();
        assert_eq!(board.total, 0);

        let err = fx
            .crm
            .leads
            .update_lead(&fx.admin, lead.id, LeadPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CrmError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_bulk_assign_reports_each_lead() {
        let fx = Fixture::new();
        let agent = fx.user("agent@acme.test", Role::Agent);
        let other = fx.other_tenant("globex");
        let mine = fx.crm.leads.create_lead(&fx.admin, NewLead::named("Ada")).unwrap();
        let foreign = fx.crm.leads.create_lead(&other, NewLead::named("Bob")).unwrap();

        let result = fx
            .crm
            .leads
            .bulk_assign(
                &fx.admin,
                BulkAssign {
                    lead_ids: vec![mine.id, foreign.id, mine.id],
                    user_id: agent.user_id,
                },
            )
            .await
            .unwrap();
        assert_eq!(result.assigned, vec![mine.id]);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].code, "not_found");
    }

    #[tokio::test]
    async fn test_category_change_reaches_lead_room() {
        let fx = Fixture::new();
        let agent = fx.user("agent@acme.test", Role::Agent);
        let lead = fx.crm.leads.create_lead(&agent, NewLead::named("Ada")).unwrap();
        let mut rx = fx.crm.hub.subscribe(Room::Lead(lead.id));

        fx.crm
            .leads
            .change_category(&agent, lead.id, move_to(LeadCategory::WorkingOn))
            .await
            .unwrap();

        let mut types = Vec::new();
        while let Ok(event) = rx.try_recv() {
            types.push(event.event_type);
        }
        assert!(types.contains(&EventType::LeadCategoryChanged));
        assert!(types.contains(&EventType::ActivityCreated));
    }

    #[tokio::test]
    async fn test_transition_options() {
        let fx = Fixture::new();
        let agent = fx.user("agent@acme.test", Role::Agent);
        let viewer = fx.user("viewer@acme.test", Role::Viewer);
        let lead = fx.crm.leads.create_lead(&agent, NewLead::named("Ada")).unwrap();

        let options = fx.crm.leads.allowed_transitions(&agent, lead.id).unwrap();
        assert_eq!(options.current, LeadCategory::Assigned);
        assert!(options.allowed.contains(&LeadCategory::WorkingOn));
        assert!(!options.can_force);

        let options = fx.crm.leads.allowed_transitions(&viewer, lead.id).unwrap();
        assert!(options.allowed.is_empty());
    }
}
