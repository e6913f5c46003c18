use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a tab for the lifetime of a host session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TabId(pub u64);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tab-{}", self.0)
    }
}

/// Hands out tab ids. Ids are never reused, even after the tab closes.
#[derive(Debug)]
pub struct TabIdAllocator {
    next: u64,
}

impl TabIdAllocator {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn allocate(&mut self) -> TabId {
        let id = TabId(self.next);
        self.next += 1;
        id
    }
}

impl Default for TabIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
