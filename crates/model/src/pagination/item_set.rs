use serde::{Deserialize, Serialize};

/// What a source enumerator hands to the scheduler. `items` present selects
/// list mode, absent selects pagination mode.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ItemSet {
    pub start_offset: u64,

    /// Size of the whole set, counted from offset 0 (not from
    /// `start_offset`). Advisory only; pagination still stops on the first
    /// empty or short page.
    pub total_count: Option<u64>,

    /// Opaque locators (object keys, file paths, URLs).
    pub items: Option<Vec<String>>,
}

impl ItemSet {
    pub fn list(items: Vec<String>, start_offset: u64) -> Self {
        ItemSet {
            start_offset,
            total_count: Some(items.len() as u64),
            items: Some(items),
        }
    }

    pub fn paged(start_offset: u64, total_count: Option<u64>) -> Self {
        ItemSet {
            start_offset,
            total_count,
            items: None,
        }
    }

    pub fn is_list_mode(&self) -> bool {
        self.items.is_some()
    }

    /// Number of list items that will actually be dispatched.
    pub fn pending_items(&self) -> usize {
        self.items
            .as_ref()
            .map(|items| items.len().saturating_sub(self.start_offset as usize))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_mode_counts_from_start_offset() {
        let set = ItemSet::list(vec!["a".into(), "b".into(), "c".into()], 1);
        assert!(set.is_list_mode());
        assert_eq!(set.pending_items(), 2);
        assert_eq!(set.total_count, Some(3));
    }

    #[test]
    fn start_offset_past_end_leaves_nothing_pending() {
        let set = ItemSet::list(vec!["a".into()], 5);
        assert_eq!(set.pending_items(), 0);
    }

    #[test]
    fn paged_set_has_no_items() {
        let set = ItemSet::paged(20, None);
        assert!(!set.is_list_mode());
        assert_eq!(set.pending_items(), 0);
    }
}
