//! Market data source abstraction.

use crate::error::FeedError;
use async_trait::async_trait;
use compact_str::CompactString;
use pricealert_core::PriceSample;
use std::collections::{HashMap, HashSet};

/// Prices keyed by upper-case symbol.
pub type PriceMap = HashMap<CompactString, PriceSample>;

/// Read-only feed of current market state.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Fetch the last price of each requested symbol in one call.
    ///
    /// Symbols the source does not know are simply absent from the result.
    async fn get_prices(&self, symbols: &[CompactString]) -> Result<PriceMap, FeedError>;

    /// Fetch every symbol currently trading on the exchange.
    async fn get_symbols(&self) -> Result<HashSet<CompactString>, FeedError>;
}
