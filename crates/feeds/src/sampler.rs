//! Per-tick market sampling.
//!
//! One batched price request per tick, bounded by a timeout. A failed or
//! timed-out request marks every requested symbol missing for this tick.

use crate::error::FeedError;
use crate::listing::ListingTracker;
use crate::source::{MarketDataSource, PriceMap};
use compact_str::CompactString;
use pricealert_core::{ListingDelta, PriceSample};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Market view for a single tick.
#[derive(Debug, Clone, Default)]
pub struct MarketSnapshot {
    pub prices: PriceMap,
    /// Requested symbols with no price this tick.
    pub missing: BTreeSet<CompactString>,
    /// `None` when not requested or the listing fetch failed.
    pub listing: Option<ListingDelta>,
}

impl MarketSnapshot {
    pub fn price(&self, symbol: &str) -> Option<&PriceSample> {
        self.prices.get(symbol)
    }
}

/// Batches symbol lookups against a [`MarketDataSource`].
pub struct MarketSampler {
    source: Arc<dyn MarketDataSource>,
    listing: ListingTracker,
    timeout: Duration,
}

impl MarketSampler {
    pub fn new(source: Arc<dyn MarketDataSource>, timeout: Duration) -> Self {
        Self {
            source,
            listing: ListingTracker::new(),
            timeout,
        }
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Sample prices for `symbols`, and the listing delta when `with_listing` is set.
    pub async fn sample(&self, symbols: &BTreeSet<CompactString>, with_listing: bool) -> MarketSnapshot {
        let mut snapshot = MarketSnapshot::default();

        if !symbols.is_empty() {
            let requested: Vec<CompactString> = symbols.iter().cloned().collect();
            match self.fetch_prices(&requested).await {
                Ok(prices) => snapshot.prices = prices,
                Err(e) => {
                    warn!(
                        source = self.source.name(),
                        symbols = requested.len(),
                        transient = e.is_transient(),
                        error = %e,
                        "Price fetch failed, skipping affected alerts this tick"
                    );
                }
            }

            snapshot.missing = symbols
                .iter()
                .filter(|s| !snapshot.prices.contains_key(s.as_str()))
                .cloned()
                .collect();

            if !snapshot.missing.is_empty() {
                debug!(missing = ?snapshot.missing, "Symbols without a price this tick");
            }
        }

        if with_listing {
            match self.fetch_listing().await {
                Ok(delta) => snapshot.listing = Some(delta),
                Err(e) => {
                    warn!(
                        source = self.source.name(),
                        error = %e,
                        "Listing fetch failed, skipping listing alerts this tick"
                    );
                }
            }
        } else {
            self.clear_listing_baseline();
        }

        snapshot
    }

    /// Drop the listing baseline so a later listing alert only sees
    /// changes made after it became active.
    pub fn clear_listing_baseline(&self) {
        self.listing.reset();
    }

    async fn fetch_prices(&self, symbols: &[CompactString]) -> Result<PriceMap, FeedError> {
        tokio::time::timeout(self.timeout, self.source.get_prices(symbols))
            .await
            .map_err(|_| FeedError::Timeout(self.timeout))?
    }

    async fn fetch_listing(&self) -> Result<ListingDelta, FeedError> {
        let current = tokio::time::timeout(self.timeout, self.source.get_symbols())
            .await
            .map_err(|_| FeedError::Timeout(self.timeout))??;
        Ok(self.listing.observe(current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use pricealert_core::FixedPoint;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Source that knows a fixed set of prices and a scripted listing sequence.
    struct FakeSource {
        prices: Vec<(&'static str, f64)>,
        listings: Mutex<Vec<Vec<&'static str>>>,
        price_calls: AtomicUsize,
        fail_prices: bool,
        delay: Option<Duration>,
    }

    impl FakeSource {
        fn new(prices: Vec<(&'static str, f64)>) -> Self {
            Self {
                prices,
                listings: Mutex::new(Vec::new()),
                price_calls: AtomicUsize::new(0),
                fail_prices: false,
                delay: None,
            }
        }
    }

    #[async_trait]
    impl MarketDataSource for FakeSource {
        fn name(&self) -> &str {
            "fake"
        }

        async fn get_prices(&self, symbols: &[CompactString]) -> Result<PriceMap, FeedError> {
            self.price_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_prices {
                return Err(FeedError::DataUnavailable("down".to_string()));
            }
            Ok(self
                .prices
                .iter()
                .filter(|(s, _)| symbols.iter().any(|r| r.as_str() == *s))
                .map(|(s, p)| {
                    let sample = PriceSample::new(s, FixedPoint::from_f64(*p), Utc::now());
                    (sample.symbol.clone(), sample)
                })
                .collect())
        }

        async fn get_symbols(&self) -> Result<HashSet<CompactString>, FeedError> {
            let mut listings = self.listings.lock().unwrap();
            if listings.is_empty() {
                return Err(FeedError::DataUnavailable("no listing".to_string()));
            }
            Ok(listings.remove(0).into_iter().map(CompactString::new).collect())
        }
    }

    fn symbols(items: &[&str]) -> BTreeSet<CompactString> {
        items.iter().map(|s| CompactString::new(s)).collect()
    }

    #[tokio::test]
    async fn test_sample_batches_one_call_and_reports_missing() {
        let source = Arc::new(FakeSource::new(vec![("BTCUSDT", 30500.0), ("ETHUSDT", 1800.0)]));
        let sampler = MarketSampler::new(source.clone(), Duration::from_secs(5));

        let snapshot = sampler
            .sample(&symbols(&["BTCUSDT", "ETHUSDT", "XYZUSDT"]), false)
            .await;

        assert_eq!(source.price_calls.load(Ordering::SeqCst), 1);
        assert_eq!(snapshot.prices.len(), 2);
        assert_eq!(snapshot.price("BTCUSDT").unwrap().price, FixedPoint::from_f64(30500.0));
        assert_eq!(
            snapshot.missing.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
            vec!["XYZUSDT"]
        );
        assert!(snapshot.listing.is_none());
    }

    #[tokio::test]
    async fn test_failed_fetch_marks_everything_missing() {
        let mut source = FakeSource::new(vec![("BTCUSDT", 1.0)]);
        source.fail_prices = true;
        let sampler = MarketSampler::new(Arc::new(source), Duration::from_secs(5));

        let snapshot = sampler.sample(&symbols(&["BTCUSDT", "ETHUSDT"]), false).await;
        assert!(snapshot.prices.is_empty());
        assert_eq!(snapshot.missing.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_source_times_out() {
        let mut source = FakeSource::new(vec![("BTCUSDT", 1.0)]);
        source.delay = Some(Duration::from_secs(60));
        let sampler = MarketSampler::new(Arc::new(source), Duration::from_secs(5));

        let snapshot = sampler.sample(&symbols(&["BTCUSDT"]), false).await;
        assert!(snapshot.prices.is_empty());
        assert_eq!(snapshot.missing.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_symbol_set_skips_price_call() {
        let source = Arc::new(FakeSource::new(vec![]));
        let sampler = MarketSampler::new(source.clone(), Duration::from_secs(5));

        let snapshot = sampler.sample(&BTreeSet::new(), false).await;
        assert_eq!(source.price_calls.load(Ordering::SeqCst), 0);
        assert!(snapshot.missing.is_empty());
    }

    #[tokio::test]
    async fn test_listing_delta_across_ticks() {
        let source = FakeSource::new(vec![]);
        *source.listings.lock().unwrap() = vec![vec!["BTCUSDT"], vec!["BTCUSDT", "NEWUSDT"]];
        let sampler = MarketSampler::new(Arc::new(source), Duration::from_secs(5));

        let first = sampler.sample(&BTreeSet::new(), true).await;
        assert_eq!(first.listing, Some(ListingDelta::default()));

        let second = sampler.sample(&BTreeSet::new(), true).await;
        let delta = second.listing.unwrap();
        assert_eq!(
            delta.new_symbols.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
            vec!["NEWUSDT"]
        );

        // Source exhausted: listing unavailable, not an empty delta
        let third = sampler.sample(&BTreeSet::new(), true).await;
        assert!(third.listing.is_none());
    }

    #[tokio::test]
    async fn test_listing_baseline_dropped_when_not_requested() {
        let source = FakeSource::new(vec![]);
        *source.listings.lock().unwrap() = vec![vec!["BTCUSDT"], vec!["BTCUSDT", "NEWUSDT"]];
        let sampler = MarketSampler::new(Arc::new(source), Duration::from_secs(5));

        sampler.sample(&BTreeSet::new(), true).await;
        sampler.sample(&BTreeSet::new(), false).await;

        // Fresh baseline: NEWUSDT is not reported as new
        let next = sampler.sample(&BTreeSet::new(), true).await;
        assert_eq!(next.listing, Some(ListingDelta::default()));
    }
}
