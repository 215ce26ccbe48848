//! Binance REST API market data source.
//!
//! Prices come from the all-symbols ticker endpoint in a single call and are
//! filtered locally, so an unknown symbol never fails the batch.

use crate::error::FeedError;
use crate::source::{MarketDataSource, PriceMap};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use compact_str::CompactString;
use pricealert_core::{normalize_symbol, FixedPoint, PriceSample};
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;

/// Binance spot REST client.
#[derive(Debug, Clone)]
pub struct BinanceRestSource {
    client: reqwest::Client,
    base_url: String,
}

impl BinanceRestSource {
    pub const BASE_URL: &'static str = "https://api.binance.com";

    /// Create a client against `base_url` with a per-request timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FeedError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn get_json(&self, path: &str) -> Result<serde_json::Value, FeedError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if status.as_u16() == 429 || status.as_u16() == 418 {
            return Err(FeedError::RateLimitExceeded);
        }
        if !status.is_success() {
            return Err(FeedError::DataUnavailable(format!("{} returned HTTP {}", path, status)));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl MarketDataSource for BinanceRestSource {
    fn name(&self) -> &str {
        "binance"
    }

    async fn get_prices(&self, symbols: &[CompactString]) -> Result<PriceMap, FeedError> {
        if symbols.is_empty() {
            return Ok(PriceMap::new());
        }
        debug!("Binance: fetching prices for {} symbols", symbols.len());

        let json = self.get_json("/api/v3/ticker/price").await?;
        let all = parse_ticker_prices(&json, Utc::now())?;

        let wanted: HashSet<CompactString> = symbols.iter().map(|s| normalize_symbol(s)).collect();
        let result: PriceMap = all
            .into_iter()
            .filter(|(symbol, _)| wanted.contains(symbol))
            .collect();

        debug!("Binance: got {}/{} prices", result.len(), wanted.len());
        Ok(result)
    }

    async fn get_symbols(&self) -> Result<HashSet<CompactString>, FeedError> {
        let json = self.get_json("/api/v3/exchangeInfo").await?;
        parse_trading_symbols(json)
    }
}

/// Parse `[{"symbol":"BTCUSDT","price":"30000.00"}, ...]`.
/// Entries with an unreadable or zero price are dropped.
pub fn parse_ticker_prices(
    json: &serde_json::Value,
    observed_at: DateTime<Utc>,
) -> Result<PriceMap, FeedError> {
    let tickers = json
        .as_array()
        .ok_or_else(|| FeedError::ParseError("ticker response is not an array".to_string()))?;

    let mut result = PriceMap::with_capacity(tickers.len());
    for ticker in tickers {
        let Some(symbol) = ticker["symbol"].as_str() else {
            continue;
        };
        let price = match ticker["price"].as_str().map(str::parse::<FixedPoint>) {
            Some(Ok(p)) if !p.is_zero() => p,
            _ => {
                debug!("Binance: skipping unreadable price for {}", symbol);
                continue;
            }
        };

        let sample = PriceSample::new(symbol, price, observed_at);
        result.insert(sample.symbol.clone(), sample);
    }

    Ok(result)
}

/// Parse the `exchangeInfo` response into the set of symbols in `TRADING` status.
pub fn parse_trading_symbols(json: serde_json::Value) -> Result<HashSet<CompactString>, FeedError> {
    #[derive(Debug, Deserialize)]
    struct ExchangeInfo {
        symbols: Vec<SymbolInfo>,
    }

    #[derive(Debug, Deserialize)]
    struct SymbolInfo {
        symbol: String,
        status: String,
    }

    let info: ExchangeInfo = serde_json::from_value(json)?;
    Ok(info
        .symbols
        .into_iter()
        .filter(|s| s.status == "TRADING")
        .map(|s| normalize_symbol(&s.symbol))
        .collect())
}
