use crate::pagination::batch::BatchDescriptor;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single dispatched unit of work.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum WorkUnit {
    /// One element of a list-mode item set, with its position in the list.
    Item { index: usize, item: String },

    /// One offset/limit page.
    Page(BatchDescriptor),
}

impl WorkUnit {
    /// Scheduler key used in logs and in-flight bookkeeping.
    pub fn key(&self) -> u64 {
        match self {
            WorkUnit::Item { index, .. } => *index as u64,
            WorkUnit::Page(batch) => batch.offset,
        }
    }

    pub fn as_page(&self) -> Option<&BatchDescriptor> {
        match self {
            WorkUnit::Page(batch) => Some(batch),
            WorkUnit::Item { .. } => None,
        }
    }

    pub fn as_item(&self) -> Option<&str> {
        match self {
            WorkUnit::Item { item, .. } => Some(item),
            WorkUnit::Page(_) => None,
        }
    }
}

impl fmt::Display for WorkUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkUnit::Item { index, item } => write!(f, "item #{index} ({item})"),
            WorkUnit::Page(batch) => write!(f, "page {batch}"),
        }
    }
}

/// Result of a unit that did not raise.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOutcome {
    /// Work done, more may follow.
    Processed,

    /// Work done and the source has nothing after this unit (empty or short page).
    Exhausted,

    /// Nothing usable came back. Logged and counted, never fatal.
    Failed,
}

impl UnitOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, UnitOutcome::Failed)
    }

    /// Whether a pagination lane should keep extending past this unit.
    pub fn has_more(&self) -> bool {
        matches!(self, UnitOutcome::Processed)
    }
}
