//! Exchange listing changes.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// Symbols that appeared or disappeared since the previous listing check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingDelta {
    pub new_symbols: BTreeSet<CompactString>,
    pub delisted_symbols: BTreeSet<CompactString>,
}

impl ListingDelta {
    /// Delta between two observed symbol sets.
    pub fn between(previous: &HashSet<CompactString>, current: &HashSet<CompactString>) -> Self {
        Self {
            new_symbols: current.difference(previous).cloned().collect(),
            delisted_symbols: previous.difference(current).cloned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.new_symbols.is_empty() && self.delisted_symbols.is_empty()
    }
}
