//! Append conditions are the optimistic concurrency predicate evaluated atomically with
//! an insert.
use crate::event::Position;
use crate::query::Query;

/// The condition under which an append is allowed to succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendCondition {
    /// Always succeeds, provided the batch itself is valid.
    Unconditional,
    /// Fails if the store contains any event matching `query`, optionally restricted to
    /// positions strictly after `after`.
    FailIfEventsMatch {
        /// The query defining the consistency boundary.
        query: Query,
        /// If present, only events at a position strictly greater than this one count
        /// against the condition. `None` means "fail if any matching event exists now".
        after: Option<Position>,
    },
}

impl AppendCondition {
    /// Builds a `FailIfEventsMatch` condition.
    pub fn fail_if_events_match(query: Query, after: Option<Position>) -> Self {
        Self::FailIfEventsMatch { query, after }
    }

    /// The query this condition checks against, if any.
    pub fn query(&self) -> Option<&Query> {
        match self {
            AppendCondition::Unconditional => None,
            AppendCondition::FailIfEventsMatch { query, .. } => Some(query),
        }
    }

    /// The position cursor this condition checks against, if any.
    pub fn after(&self) -> Option<Position> {
        match self {
            AppendCondition::Unconditional => None,
            AppendCondition::FailIfEventsMatch { after, .. } => *after,
        }
    }
}
