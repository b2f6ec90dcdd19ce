//! CRM domain documents.
//!
//! # Documents
//! ```text
//! Tenant ─┬─ User
//!         ├─ Lead ─┬─ Activity (timeline)
//!         │        ├─ Quote
//!         │        └─ Attachment
//!         └─ Activity (tenant feed)
//! ```
//!
//! Every document carries its `tenant_id`; the store never hands a document
//! to a caller of another tenant.

pub mod activity;
pub mod attachment;
pub mod ids;
pub mod lead;
pub mod quote;
pub mod tenant;
pub mod user;

pub use activity::{Activity, ActivityKind, InteractionKind};
pub use attachment::Attachment;
pub use ids::{ActivityId, AttachmentId, LeadId, QuoteId, TenantId, UserId};
pub use lead::{Lead, LeadCategory, LeadSource};
pub use quote::{LineItem, Quote, QuoteStatus, QuoteTotals};
pub use tenant::{Tenant, TenantSettings, TenantStatus, PLATFORM_SLUG};
pub use user::{Role, User, UserView};

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall clock time in Unix milliseconds.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Pagination input, normalized before use.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageRequest {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl PageRequest {
    pub const DEFAULT_PER_PAGE: u32 = 25;
    pub const MAX_PER_PAGE: u32 = 100;

    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: Some(page),
            per_page: Some(per_page),
        }
    }

    /// Returns `(page, per_page)` with page >= 1 and per_page clamped.
    pub fn normalized(&self) -> (u32, u32) {
        let page = self.page.unwrap_or(1).max(1);
        let per_page = self
            .per_page
            .unwrap_or(Self::DEFAULT_PER_PAGE)
            .clamp(1, Self::MAX_PER_PAGE);
        (page, per_page)
    }
}

/// One page of results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: u32,
    pub per_page: u32,
}

impl<T> Page<T> {
    /// Slice an already sorted result set.
    pub fn from_sorted(all: Vec<T>, request: PageRequest) -> Self {
        let (page, per_page) = request.normalized();
        let total = all.len();
        let start = ((page - 1) as usize).saturating_mul(per_page as usize);
        let items = all
            .into_iter()
            .skip(start)
            .take(per_page as usize)
            .collect();
        Self {
            items,
            total,
            page,
            per_page,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_request_normalization() {
        assert_eq!(PageRequest::default().normalized(), (1, 25));
        assert_eq!(PageRequest::new(0, 0).normalized(), (1, 1));
        assert_eq!(PageRequest::new(3, 1000).normalized(), (3, 100));
    }

    #[test]
    fn test_page_slicing() {
        let page = Page::from_sorted((1..=7).collect::<Vec<_>>(), PageRequest::new(2, 3));
        assert_eq!(page.items, vec![4, 5, 6]);
        assert_eq!(page.total, 7);

        let past_end = Page::from_sorted((1..=7).collect::<Vec<_>>(), PageRequest::new(5, 3));
        assert!(past_end.items.is_empty());
        assert_eq!(past_end.total, 7);
    }
}
