//! Listing change tracking.
//!
//! Compares each observed symbol set against the previous one. The first
//! observation only records a baseline.

use compact_str::CompactString;
use pricealert_core::ListingDelta;
use std::collections::HashSet;
use std::sync::Mutex;
use tracing::{debug, info};

/// Remembers the last observed symbol set.
#[derive(Debug, Default)]
pub struct ListingTracker {
    previous: Mutex<Option<HashSet<CompactString>>>,
}

impl ListingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `current` and return what changed since the last call.
    pub fn observe(&self, current: HashSet<CompactString>) -> ListingDelta {
        let mut previous = match self.previous.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let delta = match previous.as_ref() {
            Some(prev) => ListingDelta::between(prev, &current),
            None => {
                info!("Listing baseline recorded ({} symbols)", current.len());
                ListingDelta::default()
            }
        };

        if !delta.is_empty() {
            info!(
                new = delta.new_symbols.len(),
                delisted = delta.delisted_symbols.len(),
                "Listing changes detected"
            );
        }

        *previous = Some(current);
        delta
    }

    /// Forget the baseline. The next observation records a fresh one.
    pub fn reset(&self) {
        let mut previous = match self.previous.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if previous.take().is_some() {
            debug!("Listing baseline discarded");
        }
    }

    /// Whether a baseline has been recorded.
    pub fn has_baseline(&self) -> bool {
        self.previous
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }
}
