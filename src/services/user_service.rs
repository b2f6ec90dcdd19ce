//! Accounts, login and sessions.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};

use super::emit;
use super::tenant_service::TenantService;
use crate::auth::{hash_password, verify_password, AuthContext, Permission, SessionStore};
use crate::config::SharedConfig;
use crate::error::{CrmError, CrmResult};
use crate::model::{
    now_millis, Page, PageRequest, Role, Tenant, TenantId, User, UserId, UserView,
};
use crate::realtime::{CrmEvent, EventType, Hub};
use crate::store::Store;
use crate::validation::Validator;

const MAX_NAME_LEN: usize = 100;
const MAX_PASSWORD_LEN: usize = 128;

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub role: Role,
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPatch {
    pub name: Option<String>,
    pub role: Option<Role>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    /// Tenant slug.
    pub tenant: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: i64,
    pub user: UserView,
    pub tenant: Tenant,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PasswordChange {
    pub current_password: String,
    pub new_password: String,
}

/// Validate input and build a user document with a hashed password.
pub(crate) fn new_user_record(
    tenant: TenantId,
    input: &NewUser,
    min_password_len: usize,
) -> CrmResult<User> {
    let mut v = Validator::new();
    let email = v.email("email", &input.email);
    let name = v.required_text("name", &input.name, MAX_NAME_LEN);
    check_password(&mut v, "password", &input.password, min_password_len);
    v.finish()?;

    let now = now_millis();
    let password = hash_password(&input.password);
    Ok(User {
        id: UserId::new(),
        tenant_id: tenant,
        email,
        name,
        role: input.role,
        password_hash: password.hash,
        password_salt: password.salt,
        active: true,
        created_at: now,
        updated_at: now,
        last_login_at: None,
    })
}

fn check_password(v: &mut Validator, field: &str, password: &str, min_len: usize) {
    let len = password.chars().count();
    if len < min_len {
        v.error(field, format!("must be at least {min_len} characters"));
    } else if len > MAX_PASSWORD_LEN {
        v.error(field, format!("must be at most {MAX_PASSWORD_LEN} characters"));
    }
}

fn is_admin(role: Role) -> bool {
    matches!(role, Role::Admin | Role::SuperAdmin)
}

#[derive(Clone)]
pub struct UserService {
    store: Arc<Store>,
    config: SharedConfig,
    sessions: SessionStore,
    hub: Hub,
    tenants: TenantService,
    /// Serializes role and activation changes per tenant so the last-admin
    /// check and the write see the same state.
    admin_locks: Arc<DashMap<TenantId, Arc<Mutex<()>>>>,
}

impl UserService {
    pub fn new(
        store: Arc<Store>,
        config: SharedConfig,
        sessions: SessionStore,
        hub: Hub,
        tenants: TenantService,
    ) -> Self {
        Self {
            store,
            config,
            sessions,
            hub,
            tenants,
            admin_locks: Arc::new(DashMap::new()),
        }
    }

    fn admin_lock(&self, tenant: TenantId) -> Arc<Mutex<()>> {
        self.admin_locks.entry(tenant).or_default().clone()
    }

    pub fn create_user(&self, ctx: &AuthContext, input: NewUser) -> CrmResult<UserView> {
        ctx.require(Permission::UserManage)?;
        if input.role == Role::SuperAdmin {
            return Err(CrmError::Forbidden(
                "super_admin accounts cannot be created".to_string(),
            ));
        }

        let min_len = self.config.load().auth.min_password_len;
        let user = new_user_record(ctx.tenant_id, &input, min_len)?;
        let user = self.store.insert_user(user)?;
        tracing::info!(tenant = %ctx.tenant_id, user = %user.id, role = %user.role, "User created");
        Ok(UserView::from(&user))
    }

    /// Users of the caller's tenant ordered by name.
    pub fn list_users(&self, ctx: &AuthContext, page: PageRequest) -> CrmResult<Page<UserView>> {
        ctx.require(Permission::UserRead)?;
        let mut users = self.store.users.list(ctx.tenant_id);
        users.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        let views = users.iter().map(UserView::from).collect();
        Ok(Page::from_sorted(views, page))
    }

    pub fn get_user(&self, ctx: &AuthContext, id: UserId) -> CrmResult<UserView> {
        if id != ctx.user_id {
            ctx.require(Permission::UserRead)?;
        }
        let user = self.store.users.get(ctx.tenant_id, id)?;
        Ok(UserView::from(&user))
    }

    pub fn me(&self, ctx: &AuthContext) -> CrmResult<UserView> {
        self.get_user(ctx, ctx.user_id)
    }

    pub fn update_user(&self, ctx: &AuthContext, id: UserId, patch: UserPatch) -> CrmResult<UserView> {
        ctx.require(Permission::UserManage)?;
        let lock = self.admin_lock(ctx.tenant_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.store.users.get(ctx.tenant_id, id)?;
        self.check_manageable(ctx, &current)?;

        let mut v = Validator::new();
        let name = patch
            .name
            .as_deref()
            .map(|n| v.required_text("name", n, MAX_NAME_LEN));
        if patch.role == Some(Role::SuperAdmin) && current.role != Role::SuperAdmin {
            v.error("role", "super_admin cannot be granted");
        }
        v.finish()?;

        let next_role = patch.role.unwrap_or(current.role);
        self.ensure_admin_remains(&current, next_role, current.active)?;

        let updated = self.store.users.update(ctx.tenant_id, id, |user| {
            if let Some(name) = name {
                user.name = name;
            }
            user.role = next_role;
            user.updated_at = now_millis();
            Ok(user.clone())
        })?;
        self.store.touch();

        if updated.role != current.role {
            tracing::info!(user = %id, from = %current.role, to = %updated.role, "Role changed");
        }
        Ok(self.announce(&updated))
    }

    /// Activate or deactivate an account; deactivation ends its sessions.
    pub fn set_active(&self, ctx: &AuthContext, id: UserId, active: bool) -> CrmResult<UserView> {
        ctx.require(Permission::UserManage)?;
        if id == ctx.user_id && !active {
            return Err(CrmError::Conflict(
                "users cannot deactivate themselves".to_string(),
            ));
        }
        let lock = self.admin_lock(ctx.tenant_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.store.users.get(ctx.tenant_id, id)?;
        self.check_manageable(ctx, &current)?;
        self.ensure_admin_remains(&current, current.role, active)?;

        let updated = self.store.users.update(ctx.tenant_id, id, |user| {
            user.active = active;
            user.updated_at = now_millis();
            Ok(user.clone())
        })?;
        self.store.touch();

        if !active {
            let revoked = self.sessions.revoke_user(id);
            tracing::info!(user = %id, revoked, "User deactivated");
        }
        Ok(self.announce(&updated))
    }

    /// Exchange credentials for a session token.
    pub fn authenticate(&self, request: LoginRequest) -> CrmResult<LoginResponse> {
        let invalid = || CrmError::Unauthorized("invalid credentials".to_string());

        let slug = request.tenant.trim().to_lowercase();
        let tenant = self.tenants.resolve_slug(&slug).ok_or_else(invalid)?;
        if !tenant.is_active() {
            return Err(CrmError::Forbidden("tenant is suspended".to_string()));
        }

        let email = crate::validation::normalize_email(&request.email);
        let user = self
            .store
            .user_by_email(tenant.id, &email)
            .filter(|u| u.active)
            .ok_or_else(invalid)?;
        if !verify_password(&request.password, &user.password_hash, &user.password_salt) {
            tracing::warn!(tenant = %tenant.slug, user = %user.id, "Login failed");
            return Err(invalid());
        }

        let now = now_millis();
        let user = self.store.users.update(tenant.id, user.id, |u| {
            u.last_login_at = Some(now);
            Ok(u.clone())
        })?;
        self.store.touch();

        let ttl = self.config.load().auth.session_ttl_secs;
        let (token, session) = self.sessions.open(user.id, tenant.id, user.role, ttl);
        tracing::info!(tenant = %tenant.slug, user = %user.id, "Login succeeded");

        Ok(LoginResponse {
            token,
            expires_at: session.expires_at,
            user: UserView::from(&user),
            tenant,
        })
    }

    /// Resolve a bearer token to the caller's current identity.
    pub fn resolve_session(&self, token: &str) -> CrmResult<AuthContext> {
        let session = self
            .sessions
            .get(token)
            .ok_or_else(|| CrmError::Unauthorized("invalid or expired session".to_string()))?;

        let tenant = self
            .store
            .tenants
            .find(session.tenant_id, session.tenant_id)
            .filter(Tenant::is_active)
            .ok_or_else(|| CrmError::Unauthorized("tenant is not active".to_string()))?;
        let user = self
            .store
            .users
            .find(tenant.id, session.user_id)
            .filter(|u| u.active)
            .ok_or_else(|| CrmError::Unauthorized("account is disabled".to_string()))?;

        Ok(AuthContext::new(user.id, tenant.id, user.role))
    }

    pub fn change_password(&self, ctx: &AuthContext, change: PasswordChange) -> CrmResult<()> {
        let user = self.store.users.get(ctx.tenant_id, ctx.user_id)?;
        if !verify_password(&change.current_password, &user.password_hash, &user.password_salt) {
            return Err(CrmError::invalid("current_password", "is incorrect"));
        }

        let mut v = Validator::new();
        let min_len = self.config.load().auth.min_password_len;
        check_password(&mut v, "new_password", &change.new_password, min_len);
        v.finish()?;

        let hashed = hash_password(&change.new_password);
        self.store.users.update(ctx.tenant_id, ctx.user_id, |u| {
            u.password_hash = hashed.hash;
            u.password_salt = hashed.salt;
            u.updated_at = now_millis();
            Ok(())
        })?;
        self.store.touch();
        tracing::info!(user = %ctx.user_id, "Password changed");
        Ok(())
    }

    pub fn logout(&self, token: &str) -> bool {
        self.sessions.revoke(token)
    }

    fn check_manageable(&self, ctx: &AuthContext, target: &User) -> CrmResult<()> {
        if target.role == Role::SuperAdmin && ctx.role != Role::SuperAdmin {
            return Err(CrmError::Forbidden(
                "super_admin accounts are managed by operators".to_string(),
            ));
        }
        Ok(())
    }

    /// Refuse a change that would leave the tenant without an active admin.
    fn ensure_admin_remains(&self, user: &User, next_role: Role, next_active: bool) -> CrmResult<()> {
        let loses_admin = user.active && is_admin(user.role) && !(next_active && is_admin(next_role));
        if !loses_admin {
            return Ok(());
        }
        let others = self.store.users.count_where(user.tenant_id, |u| {
            u.id != user.id && u.active && is_admin(u.role)
        });
        if others == 0 {
            return Err(CrmError::Conflict(
                "the last active admin cannot be demoted or deactivated".to_string(),
            ));
        }
        Ok(())
    }

    fn announce(&self, user: &User) -> UserView {
        let view = UserView::from(user);
        emit(
            &self.hub,
            CrmEvent::new(EventType::UserUpdated, user.tenant_id, None, &view),
        );
        view
    }
}
