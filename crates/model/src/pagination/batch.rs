use serde::{Deserialize, Serialize};
use std::fmt;

/// One page request in pagination mode.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchDescriptor {
    pub offset: u64,
    pub limit: u64,
}

impl BatchDescriptor {
    pub fn new(offset: u64, limit: u64) -> Self {
        BatchDescriptor { offset, limit }
    }

    /// The page immediately following this one.
    pub fn next(&self) -> BatchDescriptor {
        BatchDescriptor {
            offset: self.offset + self.limit,
            limit: self.limit,
        }
    }

    /// A page that returned fewer rows than requested is the last one.
    pub fn is_short(&self, returned: usize) -> bool {
        (returned as u64) < self.limit
    }
}

impl fmt::Display for BatchDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "offset={} limit={}", self.offset, self.limit)
    }
}
