//! Sales leads and the 12 pipeline categories.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ids::{LeadId, TenantId, UserId};

/// Stage of a lead in the sales pipeline.
///
/// The first ten variants form the track, in order; `NotInterested` and
/// `Junk` are side stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadCategory {
    Unassigned,
    Assigned,
    WorkingOn,
    Contacted,
    FollowUp,
    Qualified,
    QuoteRequested,
    QuoteSent,
    Negotiation,
    Pipeline,
    NotInterested,
    Junk,
}

impl LeadCategory {
    /// All categories in board column order.
    pub const ALL: [LeadCategory; 12] = [
        LeadCategory::Unassigned,
        LeadCategory::Assigned,
        LeadCategory::WorkingOn,
        LeadCategory::Contacted,
        LeadCategory::FollowUp,
        LeadCategory::Qualified,
        LeadCategory::QuoteRequested,
        LeadCategory::QuoteSent,
        LeadCategory::Negotiation,
        LeadCategory::Pipeline,
        LeadCategory::NotInterested,
        LeadCategory::Junk,
    ];

    /// Column index on the board.
    pub fn position(&self) -> usize {
        *self as usize
    }

    /// Index on the track, `None` for side stages.
    pub fn track_index(&self) -> Option<usize> {
        match self {
            LeadCategory::NotInterested | LeadCategory::Junk => None,
            other => Some(other.position()),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LeadCategory::Unassigned => "unassigned",
            LeadCategory::Assigned => "assigned",
            LeadCategory::WorkingOn => "working_on",
            LeadCategory::Contacted => "contacted",
            LeadCategory::FollowUp => "follow_up",
            LeadCategory::Qualified => "qualified",
            LeadCategory::QuoteRequested => "quote_requested",
            LeadCategory::QuoteSent => "quote_sent",
            LeadCategory::Negotiation => "negotiation",
            LeadCategory::Pipeline => "pipeline",
            LeadCategory::NotInterested => "not_interested",
            LeadCategory::Junk => "junk",
        }
    }

    /// Human label for board headers.
    pub fn label(&self) -> &'static str {
        match self {
            LeadCategory::Unassigned => "Unassigned",
            LeadCategory::Assigned => "Assigned",
            LeadCategory::WorkingOn => "Working On",
            LeadCategory::Contacted => "Contacted",
            LeadCategory::FollowUp => "Follow Up",
            LeadCategory::Qualified => "Qualified",
            LeadCategory::QuoteRequested => "Quote Requested",
            LeadCategory::QuoteSent => "Quote Sent",
            LeadCategory::Negotiation => "Negotiation",
            LeadCategory::Pipeline => "Pipeline",
            LeadCategory::NotInterested => "Not Interested",
            LeadCategory::Junk => "Junk",
        }
    }
}

impl fmt::Display for LeadCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeadCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LeadCategory::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown lead category `{s}`"))
    }
}

/// Where a lead came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LeadSource {
    Website,
    Referral,
    ColdCall,
    Event,
    Partner,
    #[default]
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    pub tenant_id: TenantId,
    /// Contact name.
    pub name: String,
    pub company: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub source: LeadSource,
    pub category: LeadCategory,
    pub assignee: Option<UserId>,
    pub value_cents: Option<i64>,
    pub tags: Vec<String>,
    pub notes: Option<String>,
    pub created_by: Option<UserId>,
    pub created_at: i64,
    pub updated_at: i64,
    pub category_changed_at: i64,
    /// Incremented on every write; used for compare-and-swap.
    pub version: u64,
    pub archived_at: Option<i64>,
}

impl Lead {
    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_twelve_categories_in_order() {
        assert_eq!(LeadCategory::ALL.len(), 12);
        for (i, c) in LeadCategory::ALL.iter().enumerate() {
            assert_eq!(c.position(), i);
        }
        assert_eq!(LeadCategory::Pipeline.track_index(), Some(9));
        assert_eq!(LeadCategory::Junk.track_index(), None);
    }

    #[test]
    fn test_category_string_forms_agree_with_serde() {
        for c in LeadCategory::ALL {
            let json = serde_json::to_string(&c).unwrap();
            assert_eq!(json, format!("\"{}\"", c.as_str()));
            assert_eq!(c.as_str().parse::<LeadCategory>().unwrap(), c);
        }
        assert!("closed".parse::<LeadCategory>().is_err());
    }
}
