//! Tenant-partitioned document store.
//!
//! # Layout
//! ```text
//! Store
//!   ├─ tenants      (+ slug index)
//!   ├─ users        (+ (tenant, email) index)
//!   ├─ leads        versioned
//!   ├─ activities   sequenced
//!   ├─ quotes       versioned
//!   └─ attachments  metadata only; bytes on disk
//! ```
//!
//! Every mutation bumps a generation counter. The maintenance task flushes a
//! JSON snapshot whenever the generation moved past the last persisted one.

pub mod collection;
pub mod snapshot;

pub use collection::{Collection, TenantScoped, Versioned};
pub use snapshot::Snapshot;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::error::{CrmError, CrmResult};
use crate::model::{
    Activity, ActivityId, Attachment, AttachmentId, Lead, LeadId, Quote, QuoteId, Tenant,
    TenantId, User, UserId,
};
use crate::observability::metrics;

/// Document counts for operator views.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct StoreStats {
    pub tenants: usize,
    pub users: usize,
    pub leads: usize,
    pub activities: usize,
    pub quotes: usize,
    pub attachments: usize,
}

pub struct Store {
    pub tenants: Collection<TenantId, Tenant>,
    pub users: Collection<UserId, User>,
    pub leads: Collection<LeadId, Lead>,
    pub activities: Collection<ActivityId, Activity>,
    pub quotes: Collection<QuoteId, Quote>,
    pub attachments: Collection<AttachmentId, Attachment>,
    tenant_slugs: DashMap<String, TenantId>,
    user_emails: DashMap<(TenantId, String), UserId>,
    activity_seq: AtomicU64,
    generation: AtomicU64,
    persisted_generation: AtomicU64,
    /// Held for a whole snapshot write so files land in generation order.
    snapshot_lock: Mutex<()>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self {
            tenants: Collection::new("tenant"),
            users: Collection::new("user"),
            leads: Collection::new("lead"),
            activities: Collection::new("activity"),
            quotes: Collection::new("quote"),
            attachments: Collection::new("attachment"),
            tenant_slugs: DashMap::new(),
            user_emails: DashMap::new(),
            activity_seq: AtomicU64::new(0),
            generation: AtomicU64::new(0),
            persisted_generation: AtomicU64::new(0),
            snapshot_lock: Mutex::new(()),
        }
    }

    /// Record that something changed.
    pub fn touch(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn is_dirty(&self) -> bool {
        self.generation() != self.persisted_generation.load(Ordering::Acquire)
    }

    pub fn mark_persisted(&self, generation: u64) {
        self.persisted_generation.fetch_max(generation, Ordering::AcqRel);
    }

    pub fn next_activity_seq(&self) -> u64 {
        self.activity_seq.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Insert a tenant; slugs are unique.
    pub fn insert_tenant(&self, tenant: Tenant) -> CrmResult<Tenant> {
        match self.tenant_slugs.entry(tenant.slug.clone()) {
            Entry::Occupied(_) => Err(CrmError::Conflict(format!(
                "tenant slug `{}` is taken",
                tenant.slug
            ))),
            Entry::Vacant(slot) => {
                slot.insert(tenant.id);
                self.tenants.insert(tenant.id, tenant.clone());
                self.touch();
                Ok(tenant)
            }
        }
    }

    pub fn tenant_by_slug(&self, slug: &str) -> Option<Tenant> {
        let id = *self.tenant_slugs.get(slug)?;
        self.tenants.get_unscoped(id)
    }

    /// Insert a user; emails are unique per tenant.
    pub fn insert_user(&self, user: User) -> CrmResult<User> {
        match self.user_emails.entry((user.tenant_id, user.email.clone())) {
            Entry::Occupied(_) => Err(CrmError::Conflict(format!(
                "a user with email `{}` already exists",
                user.email
            ))),
            Entry::Vacant(slot) => {
                slot.insert(user.id);
                self.users.insert(user.id, user.clone());
                self.touch();
                Ok(user)
            }
        }
    }

    pub fn user_by_email(&self, tenant: TenantId, email: &str) -> Option<User> {
        let id = *self.user_emails.get(&(tenant, email.to_string()))?;
        self.users.find(tenant, id)
    }

    /// Reserve the next quote number of a tenant.
    pub fn next_quote_seq(&self, tenant: TenantId) -> CrmResult<u64> {
        let seq = self.tenants.update(tenant, tenant, |t| {
            let seq = t.next_quote_seq;
            t.next_quote_seq += 1;
            Ok(seq)
        })?;
        self.touch();
        Ok(seq)
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            tenants: self.tenants.len(),
            users: self.users.len(),
            leads: self.leads.len(),
            activities: self.activities.len(),
            quotes: self.quotes.len(),
            attachments: self.attachments.len(),
        }
    }

    /// Publish collection sizes as gauges.
    pub fn report_metrics(&self) {
        let stats = self.stats();
        metrics::record_store_size("tenants", stats.tenants);
        metrics::record_store_size("users", stats.users);
        metrics::record_store_size("leads", stats.leads);
        metrics::record_store_size("activities", stats.activities);
        metrics::record_store_size("quotes", stats.quotes);
        metrics::record_store_size("attachments", stats.attachments);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{now_millis, LeadCategory, LeadSource, Role};

    fn user(tenant: TenantId, email: &str) -> User {
        let now = now_millis();
        User {
            id: UserId::new(),
            tenant_id: tenant,
            email: email.to_string(),
            name: "Test".into(),
            role: Role::Agent,
            password_hash: String::new(),
            password_salt: String::new(),
            active: true,
            created_at: now,
            updated_at: now,
            last_login_at: None,
        }
    }

    pub(crate) fn lead(tenant: TenantId) -> Lead {
        let now = now_millis();
        Lead {
            id: LeadId::new(),
            tenant_id: tenant,
            name: "Ada".into(),
            company: None,
            email: None,
            phone: None,
            source: LeadSource::Website,
            category: LeadCategory::Unassigned,
            assignee: None,
            value_cents: None,
            tags: vec![],
            notes: None,
            created_by: None,
            created_at: now,
            updated_at: now,
            category_changed_at: now,
            version: 1,
            archived_at: None,
        }
    }

    #[test]
    fn test_slug_and_email_uniqueness() {
        let store = Store::new();
        let tenant = store.insert_tenant(Tenant::new("Acme", "acme", 0)).unwrap();
        assert!(matches!(
            store.insert_tenant(Tenant::new("Other", "acme", 0)),
            Err(CrmError::Conflict(_))
        ));
        assert_eq!(store.tenant_by_slug("acme").unwrap().id, tenant.id);

        store.insert_user(user(tenant.id, "a@acme.io")).unwrap();
        assert!(store.insert_user(user(tenant.id, "a@acme.io")).is_err());
        // Same email in another tenant is fine.
        store.insert_user(user(TenantId::new(), "a@acme.io")).unwrap();
    }

    #[test]
    fn test_cross_tenant_reads_look_missing() {
        let store = Store::new();
        let tenant = TenantId::new();
        let doc = lead(tenant);
        store.leads.insert(doc.id, doc.clone());

        assert!(store.leads.find(tenant, doc.id).is_some());
        let err = store.leads.get(TenantId::new(), doc.id).unwrap_err();
        assert!(matches!(err, CrmError::NotFound { entity: "lead", .. }));
        assert!(store.leads.remove(TenantId::new(), doc.id).is_err());
        assert!(store.leads.list(TenantId::new()).is_empty());
    }

    #[test]
    fn test_compare_and_swap() {
        let store = Store::new();
        let tenant = TenantId::new();
        let doc = lead(tenant);
        store.leads.insert(doc.id, doc.clone());

        let mut changed = doc.clone();
        changed.name = "Grace".into();
        let saved = store.leads.compare_and_swap(tenant, doc.id, 1, changed.clone()).unwrap();
        assert_eq!(saved.version, 2);

        let err = store.leads.compare_and_swap(tenant, doc.id, 1, changed).unwrap_err();
        assert!(matches!(
            err,
            CrmError::VersionConflict { expected: 1, actual: 2, .. }
        ));
    }

    #[test]
    fn test_quote_sequence_and_dirty_flag() {
        let store = Store::new();
        assert!(!store.is_dirty());
        let tenant = store.insert_tenant(Tenant::new("Acme", "acme", 0)).unwrap();
        assert!(store.is_dirty());
        assert_eq!(store.next_quote_seq(tenant.id).unwrap(), 1);
        assert_eq!(store.next_quote_seq(tenant.id).unwrap(), 2);

        store.mark_persisted(store.generation());
        assert!(!store.is_dirty());
    }
}
