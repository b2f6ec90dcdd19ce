//! Bearer token sessions.

use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::model::{now_millis, Role, TenantId, UserId};

/// A logged-in user.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: UserId,
    pub tenant_id: TenantId,
    pub role: Role,
    pub created_at: i64,
    pub expires_at: i64,
}

impl Session {
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}

/// Concurrent token → session map.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<DashMap<String, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session and return its token.
    pub fn open(&self, user_id: UserId, tenant_id: TenantId, role: Role, ttl_secs: u64) -> (String, Session) {
        let token = format!(
            "{}{}",
            Uuid::new_v4().simple(),
            Uuid::new_v4().simple()
        );
        let now = now_millis();
        let session = Session {
            user_id,
            tenant_id,
            role,
            created_at: now,
            expires_at: now.saturating_add((ttl_secs as i64).saturating_mul(1000)),
        };
        self.inner.insert(token.clone(), session.clone());
        (token, session)
    }

    /// Look up a live session; expired ones are removed on sight.
    pub fn get(&self, token: &str) -> Option<Session> {
        let now = now_millis();
        let session = self.inner.get(token).map(|r| r.value().clone())?;
        if session.is_expired(now) {
            self.inner.remove(token);
            return None;
        }
        Some(session)
    }

    pub fn revoke(&self, token: &str) -> bool {
        self.inner.remove(token).is_some()
    }

    /// Drop every session of a user, e.g. after deactivation.
    pub fn revoke_user(&self, user_id: UserId) -> usize {
        let before = self.inner.len();
        self.inner.retain(|_, s| s.user_id != user_id);
        before - self.inner.len()
    }

    /// Drop every session of a tenant, e.g. after suspension.
    pub fn revoke_tenant(&self, tenant_id: TenantId) -> usize {
        let before = self.inner.len();
        self.inner.retain(|_, s| s.tenant_id != tenant_id);
        before - self.inner.len()
    }

    pub fn purge_expired(&self) -> usize {
        let now = now_millis();
        let before = self.inner.len();
        self.inner.retain(|_, s| !s.is_expired(now));
        before - self.inner.len()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_get_revoke() {
        let store = SessionStore::new();
        let (token, _) = store.open(UserId::new(), TenantId::new(), Role::Agent, 60);
        assert_eq!(token.len(), 64);
        assert!(store.get(&token).is_some());
        assert!(store.revoke(&token));
        assert!(store.get(&token).is_none());
    }

    #[test]
    fn test_expired_sessions_are_purged() {
        let store = SessionStore::new();
        let (token, _) = store.open(UserId::new(), TenantId::new(), Role::Agent, 0);
        store.open(UserId::new(), TenantId::new(), Role::Agent, 60);
        assert!(store.get(&token).is_none());
        assert_eq!(store.purge_expired(), 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_revoke_user_and_tenant() {
        let store = SessionStore::new();
        let tenant = TenantId::new();
        let user = UserId::new();
        store.open(user, tenant, Role::Agent, 60);
        store.open(user, tenant, Role::Agent, 60);
        store.open(UserId::new(), tenant, Role::Admin, 60);
        assert_eq!(store.revoke_user(user), 2);
        assert_eq!(store.revoke_tenant(tenant), 1);
        assert!(store.is_empty());
    }
}
