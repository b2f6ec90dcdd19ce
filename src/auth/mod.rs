//! Authentication and authorization.
//!
//! # Data Flow
//! ```text
//! POST /auth/login → UserService::authenticate → password.rs → session.rs (token)
//!
//! Authorization: Bearer <token>
//!     → http middleware → session.rs lookup → user/tenant still active?
//!     → AuthContext attached to the request
//!     → services call ctx.require(Permission::…)
//! ```

pub mod password;
pub mod permissions;
pub mod session;

pub use password::{hash_password, verify_password, PasswordHash};
pub use permissions::{role_allows, Permission};
pub use session::{Session, SessionStore};

use crate::error::{CrmError, CrmResult};
use crate::model::{Lead, Role, TenantId, UserId};

/// Identity of the caller, resolved once per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: UserId,
    pub tenant_id: TenantId,
    pub role: Role,
}

impl AuthContext {
    pub fn new(user_id: UserId, tenant_id: TenantId, role: Role) -> Self {
        Self {
            user_id,
            tenant_id,
            role,
        }
    }

    pub fn has(&self, permission: Permission) -> bool {
        role_allows(self.role, permission)
    }

    pub fn require(&self, permission: Permission) -> CrmResult<()> {
        if self.has(permission) {
            Ok(())
        } else {
            Err(CrmError::Forbidden(format!(
                "role {} lacks permission {:?}",
                self.role, permission
            )))
        }
    }

    /// Write access to one lead: any lead, or own leads only.
    pub fn can_modify_lead(&self, lead: &Lead) -> bool {
        self.has(Permission::LeadWriteAny)
            || (self.has(Permission::LeadWriteOwn) && lead.assignee == Some(self.user_id))
    }

    pub fn require_lead_write(&self, lead: &Lead) -> CrmResult<()> {
        if self.can_modify_lead(lead) {
            Ok(())
        } else {
            Err(CrmError::Forbidden(
                "lead is not assigned to the current user".to_string(),
            ))
        }
    }
}
