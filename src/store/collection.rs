//! Tenant-scoped concurrent document collection.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt::Display;
use std::hash::Hash;

use crate::error::{CrmError, CrmResult};
use crate::model::{Activity, Attachment, Lead, Quote, Tenant, TenantId, User};

/// Documents that belong to exactly one tenant.
pub trait TenantScoped {
    fn tenant_id(&self) -> TenantId;
}

/// Documents updated through compare-and-swap.
pub trait Versioned {
    fn version(&self) -> u64;
    fn set_version(&mut self, version: u64);
}

macro_rules! scoped {
    ($($ty:ty),*) => {
        $(impl TenantScoped for $ty {
            fn tenant_id(&self) -> TenantId {
                self.tenant_id
            }
        })*
    };
}

scoped!(User, Lead, Activity, Quote, Attachment);

impl TenantScoped for Tenant {
    fn tenant_id(&self) -> TenantId {
        self.id
    }
}

impl Versioned for Lead {
    fn version(&self) -> u64 {
        self.version
    }

    fn set_version(&mut self, version: u64) {
        self.version = version;
    }
}

impl Versioned for Quote {
    fn version(&self) -> u64 {
        self.version
    }

    fn set_version(&mut self, version: u64) {
        self.version = version;
    }
}

/// A map of documents where every read is filtered by tenant.
///
/// A document of another tenant is indistinguishable from a missing one.
pub struct Collection<K, V> {
    entity: &'static str,
    inner: DashMap<K, V>,
}

impl<K, V> Collection<K, V>
where
    K: Eq + Hash + Copy + Display,
    V: Clone + TenantScoped,
{
    pub fn new(entity: &'static str) -> Self {
        Self {
            entity,
            inner: DashMap::new(),
        }
    }

    pub fn entity(&self) -> &'static str {
        self.entity
    }

    pub fn insert(&self, id: K, doc: V) {
        self.inner.insert(id, doc);
    }

    pub fn find(&self, tenant: TenantId, id: K) -> Option<V> {
        self.inner
            .get(&id)
            .filter(|r| r.value().tenant_id() == tenant)
            .map(|r| r.value().clone())
    }

    pub fn get(&self, tenant: TenantId, id: K) -> CrmResult<V> {
        self.find(tenant, id)
            .ok_or_else(|| CrmError::not_found(self.entity, id))
    }

    /// Lookup across tenants; operator paths only.
    pub fn get_unscoped(&self, id: K) -> Option<V> {
        self.inner.get(&id).map(|r| r.value().clone())
    }

    pub fn list(&self, tenant: TenantId) -> Vec<V> {
        self.list_where(tenant, |_| true)
    }

    pub fn list_where(&self, tenant: TenantId, pred: impl Fn(&V) -> bool) -> Vec<V> {
        self.inner
            .iter()
            .filter(|r| r.value().tenant_id() == tenant && pred(r.value()))
            .map(|r| r.value().clone())
            .collect()
    }

    pub fn count_where(&self, tenant: TenantId, pred: impl Fn(&V) -> bool) -> usize {
        self.inner
            .iter()
            .filter(|r| r.value().tenant_id() == tenant && pred(r.value()))
            .count()
    }

    /// Mutate in place while holding the shard lock.
    ///
    /// The closure must not touch this collection.
    pub fn update<R>(
        &self,
        tenant: TenantId,
        id: K,
        f: impl FnOnce(&mut V) -> CrmResult<R>,
    ) -> CrmResult<R> {
        let mut entry = self
            .inner
            .get_mut(&id)
            .filter(|r| r.value().tenant_id() == tenant)
            .ok_or_else(|| CrmError::not_found(self.entity, id))?;
        f(entry.value_mut())
    }

    pub fn remove(&self, tenant: TenantId, id: K) -> CrmResult<V> {
        self.inner
            .remove_if(&id, |_, v| v.tenant_id() == tenant)
            .map(|(_, v)| v)
            .ok_or_else(|| CrmError::not_found(self.entity, id))
    }

    /// Remove a document only if `check` accepts it, under the shard lock.
    pub fn remove_checked(
        &self,
        tenant: TenantId,
        id: K,
        check: impl FnOnce(&V) -> CrmResult<()>,
    ) -> CrmResult<V> {
        match self.inner.entry(id) {
            Entry::Occupied(entry) if entry.get().tenant_id() == tenant => {
                check(entry.get())?;
                Ok(entry.remove())
            }
            _ => Err(CrmError::not_found(self.entity, id)),
        }
    }

    pub fn all(&self) -> Vec<V> {
        self.inner.iter().map(|r| r.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl<K, V> Collection<K, V>
where
    K: Eq + Hash + Copy + Display,
    V: Clone + TenantScoped + Versioned,
{
    /// Replace a document if its stored version equals `expected`.
    ///
    /// The stored copy gets version `expected + 1`.
    pub fn compare_and_swap(&self, tenant: TenantId, id: K, expected: u64, mut doc: V) -> CrmResult<V> {
        let entity = self.entity;
        self.update(tenant, id, |current| {
            let actual = current.version();
            if actual != expected {
                return Err(CrmError::VersionConflict {
                    entity,
                    id: id.to_string(),
                    expected,
                    actual,
                });
            }
            doc.set_version(expected + 1);
            *current = doc.clone();
            Ok(doc)
        })
    }
}
