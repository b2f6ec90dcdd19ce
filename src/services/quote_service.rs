//! Quotes: drafting, sending, decisions and expiry.
//!
//! ```text
//! draft ──send──▶ sent ──accept──▶ accepted
//!                  │  └──reject──▶ rejected
//!                  └──valid_until passed──▶ expired
//! ```

use serde::Deserialize;
use std::sync::Arc;

use super::activity_service::ActivityService;
use super::{emit, write_with_retry};
use crate::auth::{AuthContext, Permission};
use crate::config::SharedConfig;
use crate::error::{CrmError, CrmResult};
use crate::model::{
    now_millis, ActivityKind, Lead, LeadId, LineItem, Page, PageRequest, Quote, QuoteId,
    QuoteStatus, QuoteTotals,
};
use crate::realtime::{CrmEvent, EventType, Hub};
use crate::store::Store;
use crate::validation::{is_valid_currency, Validator};

const MAX_LINE_ITEMS: usize = 100;
const MAX_TITLE_LEN: usize = 200;
const MAX_NOTES_LEN: usize = 5_000;
const DAY_MS: i64 = 86_400_000;

#[derive(Debug, Clone, Deserialize)]
pub struct NewQuote {
    pub lead_id: LeadId,
    pub title: String,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
    #[serde(default)]
    pub discount_cents: i64,
    /// Defaults to the tenant setting.
    #[serde(default)]
    pub tax_rate_bps: Option<u32>,
    #[serde(default)]
    pub validity_days: Option<u32>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct QuotePatch {
    pub title: Option<String>,
    pub line_items: Option<Vec<LineItem>>,
    pub discount_cents: Option<i64>,
    pub tax_rate_bps: Option<u32>,
    pub validity_days: Option<u32>,
    pub notes: Option<String>,
    pub expected_version: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct QuoteFilter {
    pub lead_id: Option<LeadId>,
    pub status: Option<QuoteStatus>,
}

fn validate_items(v: &mut Validator, items: &[LineItem]) -> Vec<LineItem> {
    if items.len() > MAX_LINE_ITEMS {
        v.error("line_items", format!("at most {MAX_LINE_ITEMS} items are allowed"));
    }
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let description =
                v.required_text(&format!("line_items[{i}].description"), &item.description, MAX_TITLE_LEN);
            if item.quantity == 0 {
                v.error(&format!("line_items[{i}].quantity"), "must be at least 1");
            }
            if item.unit_price_cents < 0 {
                v.error(&format!("line_items[{i}].unit_price_cents"), "must not be negative");
            }
            LineItem {
                description,
                quantity: item.quantity,
                unit_price_cents: item.unit_price_cents,
            }
        })
        .collect()
}

fn validate_terms(v: &mut Validator, tax_rate_bps: Option<u32>, validity_days: Option<u32>) {
    if let Some(bps) = tax_rate_bps {
        v.check(bps <= 10_000, "tax_rate_bps", "must be at most 10000");
    }
    if let Some(days) = validity_days {
        v.check((1..=365).contains(&days), "validity_days", "must be between 1 and 365");
    }
}

fn status_conflict(quote: &Quote, action: &str) -> CrmError {
    CrmError::Conflict(format!(
        "cannot {action} quote {} in status {}",
        quote.number, quote.status
    ))
}

#[derive(Clone)]
pub struct QuoteService {
    store: Arc<Store>,
    config: SharedConfig,
    hub: Hub,
    activities: ActivityService,
}

impl QuoteService {
    pub fn new(store: Arc<Store>, config: SharedConfig, hub: Hub, activities: ActivityService) -> Self {
        Self {
            store,
            config,
            hub,
            activities,
        }
    }

    pub fn create_quote(&self, ctx: &AuthContext, input: NewQuote) -> CrmResult<Quote> {
        ctx.require(Permission::QuoteWrite)?;
        let lead = self.writable_lead(ctx, input.lead_id)?;
        let tenant = self.store.tenants.get(ctx.tenant_id, ctx.tenant_id)?;

        let mut v = Validator::new();
        let title = v.required_text("title", &input.title, MAX_TITLE_LEN);
        let line_items = validate_items(&mut v, &input.line_items);
        validate_terms(&mut v, input.tax_rate_bps, input.validity_days);
        let notes = v.optional_text("notes", input.notes.as_deref(), MAX_NOTES_LEN);
        let currency = input
            .currency
            .map(|c| c.trim().to_uppercase())
            .unwrap_or_else(|| tenant.settings.currency.clone());
        v.check(is_valid_currency(&currency), "currency", "must be a three-letter ISO code");
        v.finish()?;

        let tax_rate_bps = input
            .tax_rate_bps
            .unwrap_or(tenant.settings.default_tax_rate_bps);
        let totals = QuoteTotals::compute(&line_items, input.discount_cents, tax_rate_bps)?;
        let seq = self.store.next_quote_seq(ctx.tenant_id)?;

        let now = now_millis();
        let quote = Quote {
            id: QuoteId::new(),
            tenant_id: ctx.tenant_id,
            lead_id: lead.id,
            number: Quote::format_number(seq),
            title,
            status: QuoteStatus::Draft,
            line_items,
            tax_rate_bps,
            currency,
            totals,
            validity_days: input
                .validity_days
                .unwrap_or(tenant.settings.quote_validity_days),
            valid_until: None,
            notes,
            created_by: Some(ctx.user_id),
            created_at: now,
            updated_at: now,
            sent_at: None,
            decided_at: None,
            version: 1,
        };
        self.store.quotes.insert(quote.id, quote.clone());
        self.store.touch();

        self.activities.record(
            ctx.tenant_id,
            Some(lead.id),
            Some(ctx.user_id),
            ActivityKind::QuoteCreated {
                quote_id: quote.id,
                number: quote.number.clone(),
            },
        );
        emit(
            &self.hub,
            CrmEvent::new(EventType::QuoteCreated, ctx.tenant_id, Some(lead.id), &quote),
        );
        tracing::info!(tenant = %ctx.tenant_id, quote = %quote.number, total = quote.totals.total_cents, "Quote created");
        Ok(quote)
    }

    /// Fetch a quote; an overdue one is expired on the way out.
    pub fn get_quote(&self, ctx: &AuthContext, id: QuoteId) -> CrmResult<Quote> {
        ctx.require(Permission::QuoteRead)?;
        let quote = self.store.quotes.get(ctx.tenant_id, id)?;
        Ok(self.refresh(quote, now_millis()))
    }

    /// Newest first, optionally by lead and status.
    pub fn list_quotes(&self, ctx: &AuthContext, filter: &QuoteFilter, page: PageRequest) -> CrmResult<Page<Quote>> {
        ctx.require(Permission::QuoteRead)?;
        let now = now_millis();
        let mut quotes: Vec<Quote> = self
            .store
            .quotes
            .list_where(ctx.tenant_id, |q| filter.lead_id.map_or(true, |id| q.lead_id == id))
            .into_iter()
            .map(|q| self.refresh(q, now))
            .filter(|q| filter.status.map_or(true, |s| q.status == s))
            .collect();
        quotes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(Page::from_sorted(quotes, page))
    }

    pub async fn update_quote(&self, ctx: &AuthContext, id: QuoteId, patch: QuotePatch) -> CrmResult<Quote> {
        ctx.require(Permission::QuoteWrite)?;
        let existing = self.store.quotes.get(ctx.tenant_id, id)?;
        self.writable_lead(ctx, existing.lead_id)?;

        let mut v = Validator::new();
        let title = patch
            .title
            .as_deref()
            .map(|t| v.required_text("title", t, MAX_TITLE_LEN));
        let items = patch
            .line_items
            .as_deref()
            .map(|items| validate_items(&mut v, items));
        validate_terms(&mut v, patch.tax_rate_bps, patch.validity_days);
        let notes = patch
            .notes
            .as_deref()
            .map(|n| v.optional_text("notes", Some(n), MAX_NOTES_LEN));
        v.finish()?;

        let (_, after) = self
            .write_quote(ctx, id, patch.expected_version, |quote| {
                if quote.status != QuoteStatus::Draft {
                    return Err(status_conflict(quote, "edit"));
                }
                let mut next = quote.clone();
                if let Some(title) = &title {
                    next.title = title.clone();
                }
                if let Some(items) = &items {
                    next.line_items = items.clone();
                }
                if let Some(bps) = patch.tax_rate_bps {
                    next.tax_rate_bps = bps;
                }
                if let Some(days) = patch.validity_days {
                    next.validity_days = days;
                }
                if let Some(notes) = &notes {
                    next.notes = notes.clone();
                }
                let discount = patch.discount_cents.unwrap_or(quote.totals.discount_cents);
                next.totals = QuoteTotals::compute(&next.line_items, discount, next.tax_rate_bps)?;
                Ok(Some(next))
            })
            .await?;

        emit(
            &self.hub,
            CrmEvent::new(EventType::QuoteUpdated, ctx.tenant_id, Some(after.lead_id), &after),
        );
        Ok(after)
    }

    /// Draft → sent; validity starts counting now.
    pub async fn send_quote(&self, ctx: &AuthContext, id: QuoteId) -> CrmResult<Quote> {
        ctx.require(Permission::QuoteWrite)?;
        let existing = self.store.quotes.get(ctx.tenant_id, id)?;
        self.writable_lead(ctx, existing.lead_id)?;

        let (before, after) = self
            .write_quote(ctx, id, None, |quote| {
                if quote.status != QuoteStatus::Draft {
                    return Err(status_conflict(quote, "send"));
                }
                if quote.line_items.is_empty() {
                    return Err(CrmError::invalid(
                        "line_items",
                        "a quote needs at least one line item",
                    ));
                }
                let now = now_millis();
                let mut next = quote.clone();
                next.status = QuoteStatus::Sent;
                next.sent_at = Some(now);
                next.valid_until = Some(now + i64::from(quote.validity_days) * DAY_MS);
                Ok(Some(next))
            })
            .await?;

        self.status_changed(Some(ctx), &before, &after);
        Ok(after)
    }

    pub async fn accept_quote(&self, ctx: &AuthContext, id: QuoteId) -> CrmResult<Quote> {
        self.decide(ctx, id, QuoteStatus::Accepted).await
    }

    pub async fn reject_quote(&self, ctx: &AuthContext, id: QuoteId) -> CrmResult<Quote> {
        self.decide(ctx, id, QuoteStatus::Rejected).await
    }

    /// Remove a draft.
    pub fn delete_quote(&self, ctx: &AuthContext, id: QuoteId) -> CrmResult<Quote> {
        ctx.require(Permission::QuoteWrite)?;
        let existing = self.store.quotes.get(ctx.tenant_id, id)?;
        self.writable_lead(ctx, existing.lead_id)?;

        let removed = self.store.quotes.remove_checked(ctx.tenant_id, id, |quote| {
            if quote.status != QuoteStatus::Draft {
                return Err(status_conflict(quote, "delete"));
            }
            Ok(())
        })?;
        self.store.touch();
        emit(
            &self.hub,
            CrmEvent::new(
                EventType::QuoteUpdated,
                ctx.tenant_id,
                Some(removed.lead_id),
                serde_json::json!({ "quote": &removed, "deleted": true }),
            ),
        );
        tracing::info!(quote = %removed.number, "Draft quote deleted");
        Ok(removed)
    }

    /// Expire every sent quote past its validity date, across tenants.
    pub fn expire_due(&self, now: i64) -> usize {
        let overdue: Vec<Quote> = self
            .store
            .quotes
            .all()
            .into_iter()
            .filter(|q| q.is_overdue(now))
            .collect();

        let expired = overdue
            .into_iter()
            .filter(|q| self.mark_expired(q, now).is_ok())
            .count();
        if expired > 0 {
            tracing::info!(expired, "Expired overdue quotes");
        }
        expired
    }

    async fn decide(&self, ctx: &AuthContext, id: QuoteId, to: QuoteStatus) -> CrmResult<Quote> {
        ctx.require(Permission::QuoteApprove)?;
        let action = if to == QuoteStatus::Accepted { "accept" } else { "reject" };
        let current = self.get_quote(ctx, id)?;
        if current.status == QuoteStatus::Expired {
            return Err(CrmError::Conflict(format!("quote {} has expired", current.number)));
        }

        let (before, after) = self
            .write_quote(ctx, id, None, |quote| {
                let now = now_millis();
                if quote.status != QuoteStatus::Sent || quote.is_overdue(now) {
                    return Err(status_conflict(quote, action));
                }
                let mut next = quote.clone();
                next.status = to;
                next.decided_at = Some(now);
                Ok(Some(next))
            })
            .await?;

        self.status_changed(Some(ctx), &before, &after);
        Ok(after)
    }

    async fn write_quote<F>(
        &self,
        ctx: &AuthContext,
        id: QuoteId,
        expected_version: Option<u64>,
        mut apply: F,
    ) -> CrmResult<(Quote, Quote)>
    where
        F: FnMut(&Quote) -> CrmResult<Option<Quote>>,
    {
        let retries = self.config.load().retries.clone();
        write_with_retry(
            &self.store,
            &self.store.quotes,
            &retries,
            ctx.tenant_id,
            id,
            expected_version,
            |quote| {
                Ok(apply(quote)?.map(|mut next| {
                    next.updated_at = now_millis();
                    next
                }))
            },
        )
        .await
    }

    fn refresh(&self, quote: Quote, now: i64) -> Quote {
        if !quote.is_overdue(now) {
            return quote;
        }
        match self.mark_expired(&quote, now) {
            Ok(expired) => expired,
            // lost a race with another writer; show what is stored
            Err(_) => self
                .store
                .quotes
                .find(quote.tenant_id, quote.id)
                .unwrap_or(quote),
        }
    }

    fn mark_expired(&self, quote: &Quote, now: i64) -> CrmResult<Quote> {
        let mut next = quote.clone();
        next.status = QuoteStatus::Expired;
        next.decided_at = Some(now);
        next.updated_at = now;
        let saved = self
            .store
            .quotes
            .compare_and_swap(quote.tenant_id, quote.id, quote.version, next)?;
        self.store.touch();
        self.status_changed(None, quote, &saved);
        Ok(saved)
    }

    fn status_changed(&self, ctx: Option<&AuthContext>, before: &Quote, after: &Quote) {
        self.activities.record(
            after.tenant_id,
            Some(after.lead_id),
            ctx.map(|c| c.user_id),
            ActivityKind::QuoteStatusChanged {
                quote_id: after.id,
                from: before.status,
                to: after.status,
            },
        );
        emit(
            &self.hub,
            CrmEvent::new(
                EventType::QuoteStatusChanged,
                after.tenant_id,
                Some(after.lead_id),
                serde_json::json!({ "quote": after, "from": before.status, "to": after.status }),
            ),
        );
        tracing::info!(quote = %after.number, from = %before.status, to = %after.status, "Quote status changed");
    }

    /// The quote's lead, if the caller may write to it.
    fn writable_lead(&self, ctx: &AuthContext, lead_id: LeadId) -> CrmResult<Lead> {
        let lead = self.store.leads.get(ctx.tenant_id, lead_id)?;
        if lead.is_archived() {
            return Err(CrmError::Conflict("lead is archived".to_string()));
        }
        ctx.require_lead_write(&lead)?;
        Ok(lead)
    }
}
