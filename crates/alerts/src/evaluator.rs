//! Trigger condition evaluation.

use compact_str::CompactString;
use pricealert_core::{Alert, Condition, FixedPoint, Trigger};
use pricealert_feeds::MarketSnapshot;
use std::collections::BTreeSet;
use tracing::debug;

/// Outcome of checking one alert against one tick's market view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evaluation {
    Met,
    NotMet,
    /// No data for this alert this tick. Its state must be left untouched.
    Unavailable,
}

impl Evaluation {
    pub fn from_bool(met: bool) -> Self {
        if met {
            Evaluation::Met
        } else {
            Evaluation::NotMet
        }
    }

    /// `Some(met)` when the alert could be evaluated.
    pub fn condition_met(self) -> Option<bool> {
        match self {
            Evaluation::Met => Some(true),
            Evaluation::NotMet => Some(false),
            Evaluation::Unavailable => None,
        }
    }
}

/// Compare a price against a threshold. `==` is exact fixed-point equality.
#[inline]
pub fn compare(condition: Condition, price: FixedPoint, threshold: FixedPoint) -> bool {
    match condition {
        Condition::AtOrAbove => price >= threshold,
        Condition::AtOrBelow => price <= threshold,
        Condition::Equal => price == threshold,
    }
}

/// Evaluate `alert` against `market`.
pub fn evaluate(alert: &Alert, market: &MarketSnapshot) -> Evaluation {
    match &alert.trigger {
        Trigger::Price {
            symbol,
            condition,
            threshold,
        } => match market.price(symbol) {
            Some(sample) => Evaluation::from_bool(compare(*condition, sample.price, *threshold)),
            None => {
                debug!(alert_id = %alert.id, symbol = %symbol, "No price for symbol this tick");
                Evaluation::Unavailable
            }
        },
        Trigger::NewListing { symbols } => match &market.listing {
            Some(delta) => Evaluation::from_bool(!symbols.is_disjoint(&delta.new_symbols)),
            None => Evaluation::Unavailable,
        },
        Trigger::Delisting { symbols } => match &market.listing {
            Some(delta) => Evaluation::from_bool(!symbols.is_disjoint(&delta.delisted_symbols)),
            None => Evaluation::Unavailable,
        },
    }
}

/// Listing symbols of `alert` that appear in this tick's delta.
pub fn matched_listing_symbols(alert: &Alert, market: &MarketSnapshot) -> BTreeSet<CompactString> {
    let Some(delta) = &market.listing else {
        return BTreeSet::new();
    };
    match &alert.trigger {
        Trigger::NewListing { symbols } => symbols.intersection(&delta.new_symbols).cloned().collect(),
        Trigger::Delisting { symbols } => {
            symbols.intersection(&delta.delisted_symbols).cloned().collect()
        }
        Trigger::Price { .. } => BTreeSet::new(),
    }
}
