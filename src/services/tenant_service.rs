//! Tenant lifecycle and settings.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::user_service::{new_user_record, NewUser};
use crate::auth::{AuthContext, Permission, SessionStore};
use crate::cache::TtlCache;
use crate::config::{BootstrapConfig, SharedConfig};
use crate::error::{CrmError, CrmResult};
use crate::model::{
    now_millis, Page, PageRequest, Role, Tenant, TenantId, TenantSettings, TenantStatus,
    UserView, PLATFORM_SLUG,
};
use crate::store::Store;
use crate::validation::{is_valid_currency, is_valid_slug, Validator};

const MAX_NAME_LEN: usize = 100;
const MAX_LEAD_SOURCES: usize = 50;

#[derive(Debug, Clone, Deserialize)]
pub struct NewTenantAdmin {
    pub email: String,
    pub name: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTenant {
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub settings: Option<TenantSettings>,
    pub admin: NewTenantAdmin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantCreated {
    pub tenant: Tenant,
    pub admin: UserView,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TenantPatch {
    pub name: Option<String>,
    pub settings: Option<TenantSettings>,
}

fn validate_settings(v: &mut Validator, settings: &TenantSettings) {
    v.check(
        is_valid_currency(&settings.currency),
        "settings.currency",
        "must be a three-letter ISO code",
    );
    v.check(
        settings.default_tax_rate_bps <= 10_000,
        "settings.default_tax_rate_bps",
        "must be at most 10000",
    );
    v.check(
        (1..=365).contains(&settings.quote_validity_days),
        "settings.quote_validity_days",
        "must be between 1 and 365",
    );
    v.check(
        settings.lead_sources.len() <= MAX_LEAD_SOURCES,
        "settings.lead_sources",
        "too many entries",
    );
}

#[derive(Clone)]
pub struct TenantService {
    store: Arc<Store>,
    config: SharedConfig,
    sessions: SessionStore,
    by_slug: TtlCache<String, Tenant>,
}

impl TenantService {
    pub fn new(store: Arc<Store>, config: SharedConfig, sessions: SessionStore, ttl: Duration) -> Self {
        Self {
            store,
            config,
            sessions,
            by_slug: TtlCache::new("tenant_slug", ttl),
        }
    }

    /// Create a tenant together with its first admin.
    pub fn create_tenant(&self, ctx: &AuthContext, input: NewTenant) -> CrmResult<TenantCreated> {
        ctx.require(Permission::TenantManage)?;

        let mut v = Validator::new();
        let name = v.required_text("name", &input.name, MAX_NAME_LEN);
        let slug = input.slug.trim().to_lowercase();
        v.check(
            is_valid_slug(&slug),
            "slug",
            "must be 3-40 lowercase letters, digits or dashes",
        );
        v.check(slug != PLATFORM_SLUG, "slug", "is reserved");
        let settings = input.settings.unwrap_or_default();
        validate_settings(&mut v, &settings);
        v.finish()?;

        let now = now_millis();
        let mut tenant = Tenant::new(name, slug, now);
        tenant.settings = settings;

        let admin_input = NewUser {
            email: input.admin.email,
            name: input.admin.name,
            role: Role::Admin,
            password: input.admin.password,
        };
        let min_len = self.config.load().auth.min_password_len;
        let admin = new_user_record(tenant.id, &admin_input, min_len)?;

        let tenant = self.store.insert_tenant(tenant)?;
        let admin = self.store.insert_user(admin)?;
        tracing::info!(tenant = %tenant.id, slug = %tenant.slug, "Tenant created");

        Ok(TenantCreated {
            tenant,
            admin: UserView::from(&admin),
        })
    }

    /// Seed the platform tenant and its operator account into an empty store.
    ///
    /// Returns the operator when one was created.
    pub fn ensure_platform(&self, bootstrap: &BootstrapConfig) -> CrmResult<Option<UserView>> {
        let tenant = match self.store.tenant_by_slug(PLATFORM_SLUG) {
            Some(tenant) => tenant,
            None => self
                .store
                .insert_tenant(Tenant::new("Platform", PLATFORM_SLUG, now_millis()))?,
        };

        let has_operator = self.store.users.count_where(tenant.id, |u| {
            u.role == Role::SuperAdmin && u.active
        }) > 0;
        if has_operator {
            return Ok(None);
        }

        let input = NewUser {
            email: bootstrap.email.clone(),
            name: bootstrap.name.clone(),
            role: Role::SuperAdmin,
            password: bootstrap.password.clone(),
        };
        let min_len = self.config.load().auth.min_password_len;
        let operator = self.store.insert_user(new_user_record(tenant.id, &input, min_len)?)?;
        tracing::info!(user = %operator.id, email = %operator.email, "Bootstrapped platform operator");
        Ok(Some(UserView::from(&operator)))
    }

    pub fn list_tenants(&self, ctx: &AuthContext, page: PageRequest) -> CrmResult<Page<Tenant>> {
        ctx.require(Permission::TenantManage)?;
        let mut tenants = self.store.tenants.all();
        tenants.sort_by(|a, b| a.slug.cmp(&b.slug));
        Ok(Page::from_sorted(tenants, page))
    }

    /// Operators see every tenant; everyone else only their own.
    pub fn get_tenant(&self, ctx: &AuthContext, id: TenantId) -> CrmResult<Tenant> {
        if id != ctx.tenant_id && !ctx.has(Permission::TenantManage) {
            return Err(CrmError::not_found("tenant", id));
        }
        self.store.tenants.get(id, id)
    }

    pub fn current_tenant(&self, ctx: &AuthContext) -> CrmResult<Tenant> {
        self.get_tenant(ctx, ctx.tenant_id)
    }

    pub fn update_tenant(&self, ctx: &AuthContext, id: TenantId, patch: TenantPatch) -> CrmResult<Tenant> {
        if id == ctx.tenant_id {
            ctx.require(Permission::TenantSettings)?;
        } else if !ctx.has(Permission::TenantManage) {
            return Err(CrmError::not_found("tenant", id));
        }

        let mut v = Validator::new();
        let name = patch
            .name
            .as_deref()
            .map(|n| v.required_text("name", n, MAX_NAME_LEN));
        if let Some(settings) = &patch.settings {
            validate_settings(&mut v, settings);
        }
        v.finish()?;

        let updated = self.store.tenants.update(id, id, |tenant| {
            if let Some(name) = name {
                tenant.name = name;
            }
            if let Some(settings) = patch.settings {
                tenant.settings = settings;
            }
            tenant.updated_at = now_millis();
            Ok(tenant.clone())
        })?;
        self.store.touch();
        self.by_slug.invalidate(&updated.slug);
        Ok(updated)
    }

    /// Suspend or reactivate a tenant. Suspension ends its sessions.
    pub fn set_status(&self, ctx: &AuthContext, id: TenantId, status: TenantStatus) -> CrmResult<Tenant> {
        ctx.require(Permission::TenantManage)?;
        let current = self.store.tenants.get(id, id)?;
        if current.is_platform() && status == TenantStatus::Suspended {
            return Err(CrmError::Conflict(
                "the platform tenant cannot be suspended".to_string(),
            ));
        }

        let updated = self.store.tenants.update(id, id, |tenant| {
            tenant.status = status;
            tenant.updated_at = now_millis();
            Ok(tenant.clone())
        })?;
        self.store.touch();
        self.by_slug.invalidate(&updated.slug);

        if status == TenantStatus::Suspended {
            let revoked = self.sessions.revoke_tenant(id);
            tracing::warn!(tenant = %id, revoked, "Tenant suspended");
        } else {
            tracing::info!(tenant = %id, "Tenant activated");
        }
        Ok(updated)
    }

    /// Slug lookup used on the login path.
    pub fn resolve_slug(&self, slug: &str) -> Option<Tenant> {
        let key = slug.to_string();
        if let Some(tenant) = self.by_slug.get(&key) {
            return Some(tenant);
        }
        let tenant = self.store.tenant_by_slug(slug)?;
        self.by_slug.insert(key, tenant.clone());
        Some(tenant)
    }

    pub fn purge_cache(&self) -> usize {
        self.by_slug.purge_expired()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::shared;
    use crate::services::testing::{config, Fixture};
    use crate::services::Crm;

    fn operator(crm: &Crm) -> AuthContext {
        let bootstrap = BootstrapConfig {
            email: "ops@example.test".into(),
            password: "operator-pass".into(),
            name: "Ops".into(),
        };
        let view = crm.tenants.ensure_platform(&bootstrap).unwrap().unwrap();
        AuthContext::new(view.id, view.tenant_id, Role::SuperAdmin)
    }

    fn new_tenant(slug: &str) -> NewTenant {
        NewTenant {
            name: "Initech".into(),
            slug: slug.into(),
            settings: None,
            admin: NewTenantAdmin {
                email: "lumbergh@initech.test".into(),
                name: "Bill".into(),
                password: "tps-reports".into(),
            },
        }
    }

    #[test]
    fn test_bootstrap_is_idempotent() {
        let crm = Crm::new(Arc::new(Store::new()), shared(config()));
        let ops = operator(&crm);
        let bootstrap = BootstrapConfig {
            email: "ops@example.test".into(),
            password: "operator-pass".into(),
            name: "Ops".into(),
        };
        assert!(crm.tenants.ensure_platform(&bootstrap).unwrap().is_none());
        assert_eq!(crm.store.tenants.len(), 1);
        assert_eq!(crm.tenants.current_tenant(&ops).unwrap().slug, PLATFORM_SLUG);
    }

    #[test]
    fn test_operator_creates_tenant_with_admin() {
        let crm = Crm::new(Arc::new(Store::new()), shared(config()));
        let ops = operator(&crm);
        let created = crm.tenants.create_tenant(&ops, new_tenant("initech")).unwrap();
        assert_eq!(created.admin.role, Role::Admin);
        assert_eq!(created.admin.tenant_id, created.tenant.id);

        let err = crm.tenants.create_tenant(&ops, new_tenant("initech")).unwrap_err();
        assert!(matches!(err, CrmError::Conflict(_)));

        let err = crm.tenants.create_tenant(&ops, new_tenant(PLATFORM_SLUG)).unwrap_err();
        assert!(matches!(err, CrmError::Validation(_)));
    }

    #[test]
    fn test_admin_cannot_create_tenants() {
        let fx = Fixture::new();
        let err = fx
            .crm
            .tenants
            .create_tenant(&fx.admin, new_tenant("initech"))
            .unwrap_err();
        assert!(matches!(err, CrmError::Forbidden(_)));
    }

    #[test]
    fn test_other_tenant_is_not_found() {
        let fx = Fixture::new();
        let other = fx.other_tenant("globex");
        let err = fx.crm.tenants.get_tenant(&fx.admin, other.tenant_id).unwrap_err();
        assert!(matches!(err, CrmError::NotFound { .. }));
    }

    #[test]
    fn test_settings_validated() {
        let fx = Fixture::new();
        let patch = TenantPatch {
            name: None,
            settings: Some(TenantSettings {
                currency: "usd".into(),
                ..Default::default()
            }),
        };
        let err = fx
            .crm
            .tenants
            .update_tenant(&fx.admin, fx.tenant, patch)
            .unwrap_err();
        assert!(matches!(err, CrmError::Validation(_)));
    }

    #[test]
    fn test_suspension_blocks_login_and_platform_is_protected() {
        let fx = Fixture::new();
        let ops = operator(&fx.crm);

        let err = fx
            .crm
            .tenants
            .set_status(&ops, ops.tenant_id, TenantStatus::Suspended)
            .unwrap_err();
        assert!(matches!(err, CrmError::Conflict(_)));

        // warm the slug cache first; suspension must invalidate it
        assert!(fx.crm.tenants.resolve_slug("acme").unwrap().is_active());
        fx.crm
            .tenants
            .set_status(&ops, fx.tenant, TenantStatus::Suspended)
            .unwrap();
        assert!(!fx.crm.tenants.resolve_slug("acme").unwrap().is_active());
    }
}
