//! Lead category state machine.
//!
//! # Track
//! ```text
//! unassigned ⇄ assigned ⇄ working_on ⇄ contacted ⇄ follow_up ⇄ qualified
//!            ⇄ quote_requested ⇄ quote_sent ⇄ negotiation ⇄ pipeline
//!
//! assigned..=negotiation ──▶ not_interested ──▶ working_on | junk
//! assigned..=negotiation ──▶ junk ──▶ unassigned
//! unassigned ──▶ junk
//! ```
//!
//! # Rules
//! - Moves along the track are to an adjacent stage only.
//! - Every category except `unassigned` and `junk` needs an assignee.
//! - Forced moves skip adjacency but never the assignee rule.

use thiserror::Error;

use crate::model::LeadCategory;

/// Why a category change was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("lead is already in category {0}")]
    SameCategory(LeadCategory),

    #[error("cannot move lead from {from} to {to}")]
    NotAdjacent { from: LeadCategory, to: LeadCategory },

    #[error("category {0} requires an assignee")]
    AssigneeRequired(LeadCategory),
}

/// Whether a lead in this category must have an owner.
pub fn requires_assignee(category: LeadCategory) -> bool {
    !matches!(category, LeadCategory::Unassigned | LeadCategory::Junk)
}

fn is_adjacent(from: LeadCategory, to: LeadCategory) -> bool {
    use LeadCategory::*;

    match (from, to) {
        (Unassigned, Assigned) | (Unassigned, Junk) => true,
        (NotInterested, WorkingOn) | (NotInterested, Junk) => true,
        (Junk, Unassigned) => true,
        (from, NotInterested | Junk) => {
            from.position() >= Assigned.position() && from.position() <= Negotiation.position()
        }
        (from, to) => match (from.track_index(), to.track_index()) {
            (Some(a), Some(b)) => a.abs_diff(b) == 1,
            _ => false,
        },
    }
}

/// Validate a category change.
///
/// `has_assignee` describes the lead after the move; entering `unassigned`
/// always clears the assignee so the flag is ignored for that target.
pub fn check_transition(
    from: LeadCategory,
    to: LeadCategory,
    has_assignee: bool,
    forced: bool,
) -> Result<(), TransitionError> {
    if from == to {
        return Err(TransitionError::SameCategory(from));
    }
    if !forced && !is_adjacent(from, to) {
        return Err(TransitionError::NotAdjacent { from, to });
    }
    if requires_assignee(to) && !has_assignee {
        return Err(TransitionError::AssigneeRequired(to));
    }
    Ok(())
}

/// Categories reachable from `from` without forcing.
pub fn allowed_targets(from: LeadCategory, has_assignee: bool) -> Vec<LeadCategory> {
    LeadCategory::ALL
        .iter()
        .copied()
        .filter(|to| check_transition(from, *to, has_assignee, false).is_ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use LeadCategory::*;

    #[test]
    fn test_track_moves_are_adjacent_only() {
        assert!(check_transition(Assigned, WorkingOn, true, false).is_ok());
        assert!(check_transition(WorkingOn, Assigned, true, false).is_ok());
        assert!(check_transition(Negotiation, Pipeline, true, false).is_ok());
        assert!(check_transition(Pipeline, Negotiation, true, false).is_ok());
        assert_eq!(
            check_transition(Assigned, Contacted, true, false),
            Err(TransitionError::NotAdjacent {
                from: Assigned,
                to: Contacted
            })
        );
    }

    #[test]
    fn test_same_category_rejected_even_when_forced() {
        assert_eq!(
            check_transition(Qualified, Qualified, true, true),
            Err(TransitionError::SameCategory(Qualified))
        );
    }

    #[test]
    fn test_assignee_rule_holds_for_forced_moves() {
        assert_eq!(
            check_transition(Unassigned, Assigned, false, false),
            Err(TransitionError::AssigneeRequired(Assigned))
        );
        assert_eq!(
            check_transition(Unassigned, Negotiation, false, true),
            Err(TransitionError::AssigneeRequired(Negotiation))
        );
        assert!(check_transition(Unassigned, Negotiation, true, true).is_ok());
    }

    #[test]
    fn test_side_stages() {
        assert!(check_transition(Contacted, NotInterested, true, false).is_ok());
        assert!(check_transition(Negotiation, Junk, true, false).is_ok());
        assert!(check_transition(Pipeline, Junk, true, false).is_err());
        assert!(check_transition(NotInterested, WorkingOn, true, false).is_ok());
        assert!(check_transition(NotInterested, Contacted, true, false).is_err());
        assert!(check_transition(Junk, Unassigned, false, false).is_ok());
        assert!(check_transition(Junk, Assigned, true, false).is_err());
        assert!(check_transition(Unassigned, Junk, false, false).is_ok());
    }

    #[test]
    fn test_release_to_unassigned_only_from_assigned() {
        assert!(check_transition(Assigned, Unassigned, true, false).is_ok());
        assert!(check_transition(WorkingOn, Unassigned, true, false).is_err());
    }

    #[test]
    fn test_allowed_targets() {
        assert_eq!(allowed_targets(Unassigned, false), vec![Junk]);
        assert_eq!(allowed_targets(Unassigned, true), vec![Assigned, Junk]);
        assert_eq!(
            allowed_targets(Qualified, true),
            vec![FollowUp, QuoteRequested, NotInterested, Junk]
        );
        assert_eq!(allowed_targets(Pipeline, true), vec![Negotiation]);
    }
}
