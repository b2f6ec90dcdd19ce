//! Business services.
//!
//! # Data Flow
//! ```text
//! handler → service (AuthContext: permission + tenant scope, validation)
//!     → store (scoped read, compare-and-swap write, retried on conflict)
//!     → ActivityService::record (timeline)
//!     → Hub::publish (tenant room + lead room)
//! ```
//!
//! Every service is cheap to clone; handlers receive them through `Crm`.

pub mod activity_service;
pub mod lead_service;
pub mod quote_service;
pub mod storage_service;
pub mod tenant_service;
pub mod user_service;

pub use activity_service::{ActivityService, NewInteraction};
pub use lead_service::{
    AssignRequest, Board, BoardColumn, BulkAssign, BulkAssignResult, CategoryChange, LeadFilter,
    LeadPatch, LeadService, NewLead, TransitionOptions,
};
pub use quote_service::{NewQuote, QuoteFilter, QuotePatch, QuoteService};
pub use storage_service::{StorageService, Upload};
pub use tenant_service::{NewTenant, NewTenantAdmin, TenantCreated, TenantPatch, TenantService};
pub use user_service::{
    LoginRequest, LoginResponse, NewUser, PasswordChange, UserPatch, UserService,
};

use std::fmt::Display;
use std::future;
use std::hash::Hash;
use std::sync::Arc;

use crate::auth::SessionStore;
use crate::config::{RetryConfig, SharedConfig};
use crate::error::{CrmError, CrmResult};
use crate::model::TenantId;
use crate::observability::metrics;
use crate::realtime::{CrmEvent, Hub};
use crate::resilience::retry_on_conflict;
use crate::store::{Collection, Store, TenantScoped, Versioned};

/// Every service wired to one store, hub and session table.
#[derive(Clone)]
pub struct Crm {
    pub store: Arc<Store>,
    pub hub: Hub,
    pub sessions: SessionStore,
    pub config: SharedConfig,
    pub tenants: TenantService,
    pub users: UserService,
    pub activities: ActivityService,
    pub leads: LeadService,
    pub quotes: QuoteService,
    pub storage: StorageService,
}

impl Crm {
    pub fn new(store: Arc<Store>, config: SharedConfig) -> Self {
        let (capacity, cache) = {
            let cfg = config.load();
            (cfg.realtime.channel_capacity, cfg.cache.clone())
        };
        let hub = Hub::new(capacity);
        let sessions = SessionStore::new();

        let activities = ActivityService::new(store.clone(), hub.clone());
        let tenants = TenantService::new(
            store.clone(),
            config.clone(),
            sessions.clone(),
            cache.tenant_ttl(),
        );
        let users = UserService::new(
            store.clone(),
            config.clone(),
            sessions.clone(),
            hub.clone(),
            tenants.clone(),
        );
        let leads = LeadService::new(
            store.clone(),
            config.clone(),
            hub.clone(),
            activities.clone(),
            cache.board_ttl(),
        );
        let quotes = QuoteService::new(
            store.clone(),
            config.clone(),
            hub.clone(),
            activities.clone(),
        );
        let storage = StorageService::new(
            store.clone(),
            config.clone(),
            hub.clone(),
            activities.clone(),
        );

        Self {
            store,
            hub,
            sessions,
            config,
            tenants,
            users,
            activities,
            leads,
            quotes,
            storage,
        }
    }
}

/// Publish an event and count it.
pub(crate) fn emit(hub: &Hub, event: CrmEvent) {
    metrics::record_event_published(event.event_type.as_str());
    hub.publish(event);
}

/// Read-modify-write with compare-and-swap, retried on version conflicts.
///
/// `apply` returns `None` when nothing changes; the document is then
/// returned unchanged as both halves of the pair. A caller-supplied
/// `expected_version` pins the write to that version: a mismatch fails at
/// once with `VersionConflict` and the write is never retried.
pub(crate) async fn write_with_retry<K, V, F>(
    store: &Store,
    collection: &Collection<K, V>,
    retries: &RetryConfig,
    tenant: TenantId,
    id: K,
    expected_version: Option<u64>,
    mut apply: F,
) -> CrmResult<(V, V)>
where
    K: Eq + Hash + Copy + Display,
    V: Clone + TenantScoped + Versioned,
    F: FnMut(&V) -> CrmResult<Option<V>>,
{
    if expected_version.is_some() {
        return try_write(store, collection, tenant, id, expected_version, &mut apply);
    }
    retry_on_conflict(retries, |_attempt| {
        future::ready(try_write(
            store,
            collection,
            tenant,
            id,
            expected_version,
            &mut apply,
        ))
    })
    .await
}

fn try_write<K, V, F>(
    store: &Store,
    collection: &Collection<K, V>,
    tenant: TenantId,
    id: K,
    expected_version: Option<u64>,
    apply: &mut F,
) -> CrmResult<(V, V)>
where
    K: Eq + Hash + Copy + Display,
    V: Clone + TenantScoped + Versioned,
    F: FnMut(&V) -> CrmResult<Option<V>>,
{
    let current = collection.get(tenant, id)?;
    if let Some(expected) = expected_version {
        if expected != current.version() {
            return Err(CrmError::VersionConflict {
                entity: collection.entity(),
                id: id.to_string(),
                expected,
                actual: current.version(),
            });
        }
    }

    match apply(&current)? {
        None => Ok((current.clone(), current)),
        Some(next) => {
            let saved = collection.compare_and_swap(tenant, id, current.version(), next)?;
            store.touch();
            Ok((current, saved))
        }
    }
}
