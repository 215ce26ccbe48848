//! Simulated market data for running without network access.

use crate::error::FeedError;
use crate::source::{MarketDataSource, PriceMap};
use async_trait::async_trait;
use chrono::Utc;
use compact_str::CompactString;
use pricealert_core::{normalize_symbol, FixedPoint, PriceSample};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

/// Prices drift sinusoidally around fixed base prices, one step per call.
pub struct SimulatedSource {
    base_prices: HashMap<CompactString, f64>,
    counter: AtomicU64,
}

impl Default for SimulatedSource {
    fn default() -> Self {
        Self::new([("BTCUSDT", 30000.0), ("ETHUSDT", 2000.0), ("SOLUSDT", 100.0)])
    }
}

impl SimulatedSource {
    pub fn new<'a>(base_prices: impl IntoIterator<Item = (&'a str, f64)>) -> Self {
        Self {
            base_prices: base_prices
                .into_iter()
                .map(|(s, p)| (normalize_symbol(s), p))
                .collect(),
            counter: AtomicU64::new(0),
        }
    }

    fn price_at(base: f64, step: u64) -> f64 {
        // +/- 3% swing so threshold alerts near the base cross back and forth
        base * (1.0 + (step as f64 * 0.05).sin() * 0.03)
    }
}

#[async_trait]
impl MarketDataSource for SimulatedSource {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn get_prices(&self, symbols: &[CompactString]) -> Result<PriceMap, FeedError> {
        let step = self.counter.fetch_add(1, Ordering::Relaxed);
        let now = Utc::now();

        Ok(symbols
            .iter()
            .filter_map(|symbol| {
                let base = self.base_prices.get(symbol.as_str())?;
                let price = FixedPoint::from_f64(Self::price_at(*base, step));
                let sample = PriceSample::new(symbol, price, now);
                Some((sample.symbol.clone(), sample))
            })
            .collect())
    }

    async fn get_symbols(&self) -> Result<HashSet<CompactString>, FeedError> {
        Ok(self.base_prices.keys().cloned().collect())
    }
}
