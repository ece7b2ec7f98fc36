use model::{
    execution::unit::{UnitOutcome, WorkUnit},
    pagination::{batch::BatchDescriptor, item_set::ItemSet},
};

/// The stream of units a run draws from.
#[derive(Debug)]
pub(crate) enum Lane {
    List {
        items: Vec<String>,
        next: usize,
    },
    Pages {
        next: BatchDescriptor,
        /// Exclusive end offset when the source supplied a count.
        end: Option<u64>,
        /// An offset probe decides where data ends, so a failed page is
        /// skipped rather than taken as the end.
        probed: bool,
        done: bool,
    },
}

impl Lane {
    pub(crate) fn new(set: ItemSet, page_size: u64, probed: bool) -> Self {
        match set.items {
            Some(items) => Lane::List {
                items,
                next: set.start_offset as usize,
            },
            None => Lane::Pages {
                next: BatchDescriptor::new(set.start_offset, page_size.max(1)),
                end: set.total_count,
                probed,
                done: false,
            },
        }
    }

    /// The next unit, without consulting any probe.
    pub(crate) fn peek(&self) -> Option<WorkUnit> {
        match self {
            Lane::List { items, next } => items.get(*next).map(|item| WorkUnit::Item {
                index: *next,
                item: item.clone(),
            }),
            Lane::Pages { next, end, done, .. } => {
                let past_end = end.is_some_and(|end| next.offset >= end);
                (!*done && !past_end).then_some(WorkUnit::Page(*next))
            }
        }
    }

    /// Marks the unit returned by `peek` as issued.
    pub(crate) fn advance(&mut self) {
        match self {
            Lane::List { next, .. } => *next += 1,
            Lane::Pages { next, .. } => *next = next.next(),
        }
    }

    /// Stops a pagination lane from issuing further pages.
    pub(crate) fn close(&mut self) {
        if let Lane::Pages { done, .. } = self {
            *done = true;
        }
    }

    /// Feeds a completed unit's outcome back. In pagination mode anything but
    /// `Processed` means there is no data past that page, unless a probe is
    /// in charge, in which case only `Exhausted` does.
    pub(crate) fn record(&mut self, outcome: UnitOutcome) {
        if let Lane::Pages { done, probed, .. } = self {
            let closes = match outcome {
                UnitOutcome::Processed => false,
                UnitOutcome::Exhausted => true,
                UnitOutcome::Failed => !*probed,
            };
            if closes {
                *done = true;
            }
        }
    }
}
