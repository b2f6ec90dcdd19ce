//! Quotes attached to leads.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{LeadId, QuoteId, TenantId, UserId};
use crate::error::{CrmError, CrmResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    Draft,
    Sent,
    Accepted,
    Rejected,
    Expired,
}

impl QuoteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuoteStatus::Draft => "draft",
            QuoteStatus::Sent => "sent",
            QuoteStatus::Accepted => "accepted",
            QuoteStatus::Rejected => "rejected",
            QuoteStatus::Expired => "expired",
        }
    }

    /// No further status change is possible.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            QuoteStatus::Accepted | QuoteStatus::Rejected | QuoteStatus::Expired
        )
    }
}

impl fmt::Display for QuoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

/// Computed amounts of a quote, all in cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QuoteTotals {
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
}

impl QuoteTotals {
    /// Compute totals; tax is rounded half up on the discounted subtotal.
    pub fn compute(items: &[LineItem], discount_cents: i64, tax_rate_bps: u32) -> CrmResult<Self> {
        let overflow = || CrmError::invalid("line_items", "amounts are too large");

        let mut subtotal: i64 = 0;
        for item in items {
            let line = item
                .unit_price_cents
                .checked_mul(i64::from(item.quantity))
                .ok_or_else(overflow)?;
            subtotal = subtotal.checked_add(line).ok_or_else(overflow)?;
        }

        if discount_cents < 0 {
            return Err(CrmError::invalid("discount_cents", "must not be negative"));
        }
        if discount_cents > subtotal {
            return Err(CrmError::invalid(
                "discount_cents",
                "must not exceed the subtotal",
            ));
        }

        let taxable = subtotal - discount_cents;
        let tax = (i128::from(taxable) * i128::from(tax_rate_bps) + 5_000) / 10_000;
        let tax = i64::try_from(tax).map_err(|_| overflow())?;
        let total = taxable.checked_add(tax).ok_or_else(overflow)?;

        Ok(Self {
            subtotal_cents: subtotal,
            discount_cents,
            tax_cents: tax,
            total_cents: total,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub id: QuoteId,
    pub tenant_id: TenantId,
    pub lead_id: LeadId,
    /// Human number, unique per tenant (`Q-000042`).
    pub number: String,
    pub title: String,
    pub status: QuoteStatus,
    pub line_items: Vec<LineItem>,
    pub tax_rate_bps: u32,
    pub currency: String,
    #[serde(flatten)]
    pub totals: QuoteTotals,
    /// Days the quote stays valid once sent.
    pub validity_days: u32,
    pub valid_until: Option<i64>,
    pub notes: Option<String>,
    pub created_by: Option<UserId>,
    pub created_at: i64,
    pub updated_at: i64,
    pub sent_at: Option<i64>,
    pub decided_at: Option<i64>,
    pub version: u64,
}

impl Quote {
    pub fn format_number(seq: u64) -> String {
        format!("Q-{seq:06}")
    }

    /// Sent and past its validity date.
    pub fn is_overdue(&self, now: i64) -> bool {
        self.status == QuoteStatus::Sent && self.valid_until.is_some_and(|until| until < now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(quantity: u32, unit_price_cents: i64) -> LineItem {
        LineItem {
            description: "Seat licence".into(),
            quantity,
            unit_price_cents,
        }
    }

    #[test]
    fn test_totals_with_discount_and_tax() {
        let totals = QuoteTotals::compute(&[item(3, 10_00), item(1, 5_50)], 1_50, 825).unwrap();
        assert_eq!(totals.subtotal_cents, 35_50);
        assert_eq!(totals.discount_cents, 1_50);
        // 3400 * 0.0825 = 280.5 -> 281
        assert_eq!(totals.tax_cents, 281);
        assert_eq!(totals.total_cents, 34_00 + 281);
    }

    #[test]
    fn test_discount_cannot_exceed_subtotal() {
        let err = QuoteTotals::compute(&[item(1, 100)], 101, 0).unwrap_err();
        assert!(matches!(err, CrmError::Validation(_)));
    }

    #[test]
    fn test_overflow_is_validation_error() {
        let err = QuoteTotals::compute(&[item(u32::MAX, i64::MAX / 2)], 0, 0).unwrap_err();
        assert!(matches!(err, CrmError::Validation(_)));
    }

    #[test]
    fn test_number_format() {
        assert_eq!(Quote::format_number(42), "Q-000042");
    }
}
