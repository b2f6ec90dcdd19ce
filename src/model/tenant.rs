//! Tenant documents.

use serde::{Deserialize, Serialize};

use super::ids::TenantId;

/// Slug reserved for the operator tenant created at bootstrap.
pub const PLATFORM_SLUG: &str = "platform";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    Active,
    /// Logins and existing sessions are refused.
    Suspended,
}

/// Per-tenant business defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TenantSettings {
    /// ISO-4217 code used for new quotes.
    pub currency: String,
    /// Default quote tax rate in basis points.
    pub default_tax_rate_bps: u32,
    /// Days a sent quote stays valid.
    pub quote_validity_days: u32,
    /// Extra lead source labels offered by the UI.
    pub lead_sources: Vec<String>,
}

impl Default for TenantSettings {
    fn default() -> Self {
        Self {
            currency: "USD".to_string(),
            default_tax_rate_bps: 0,
            quote_validity_days: 30,
            lead_sources: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    pub slug: String,
    pub status: TenantStatus,
    pub settings: TenantSettings,
    /// Next quote number to hand out.
    pub next_quote_seq: u64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Tenant {
    pub fn new(name: impl Into<String>, slug: impl Into<String>, now: i64) -> Self {
        Self {
            id: TenantId::new(),
            name: name.into(),
            slug: slug.into(),
            status: TenantStatus::Active,
            settings: TenantSettings::default(),
            next_quote_seq: 1,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == TenantStatus::Active
    }

    pub fn is_platform(&self) -> bool {
        self.slug == PLATFORM_SLUG
    }
}
