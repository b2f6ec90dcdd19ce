//! Role to permission mapping.

use serde::Serialize;

use crate::model::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    TenantManage,
    TenantSettings,
    UserRead,
    UserManage,
    LeadRead,
    LeadCreate,
    /// Modify leads assigned to oneself.
    LeadWriteOwn,
    LeadWriteAny,
    LeadAssign,
    LeadDelete,
    /// Skip pipeline adjacency.
    PipelineOverride,
    QuoteRead,
    QuoteWrite,
    QuoteApprove,
    ActivityRead,
    ActivityWrite,
    FileRead,
    FileWrite,
}

use Permission::*;

const READ: &[Permission] = &[UserRead, LeadRead, QuoteRead, ActivityRead, FileRead];

const MANAGER: &[Permission] = &[
    UserRead,
    LeadRead,
    LeadCreate,
    LeadWriteOwn,
    LeadWriteAny,
    LeadAssign,
    PipelineOverride,
    QuoteRead,
    QuoteWrite,
    QuoteApprove,
    ActivityRead,
    ActivityWrite,
    FileRead,
    FileWrite,
];

const AGENT: &[Permission] = &[
    UserRead,
    LeadRead,
    LeadCreate,
    LeadWriteOwn,
    QuoteRead,
    QuoteWrite,
    ActivityRead,
    ActivityWrite,
    FileRead,
    FileWrite,
];

/// Whether `role` grants `permission`.
pub fn role_allows(role: Role, permission: Permission) -> bool {
    match role {
        Role::SuperAdmin => true,
        Role::Admin => permission != TenantManage,
        Role::Manager => MANAGER.contains(&permission),
        Role::Agent => AGENT.contains(&permission),
        Role::Viewer => READ.contains(&permission),
    }
}
