//! Price data structures for sampled market data.

use chrono::{DateTime, Utc};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Fixed-point number with 8 decimal places.
/// Used for price and threshold representation so that `==` alerts compare exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FixedPoint(pub u64);

impl FixedPoint {
    /// Number of decimal places (8 for price precision)
    pub const DECIMALS: u32 = 8;
    /// Scale factor: 10^8 (fits comfortably in u64 for most prices)
    pub const SCALE: u64 = 100_000_000;
    pub const ZERO: FixedPoint = FixedPoint(0);

    /// Create from f64, rounding to the nearest representable value.
    /// Negative and non-finite inputs clamp to zero.
    pub fn from_f64(value: f64) -> Self {
        if !value.is_finite() || value <= 0.0 {
            return Self::ZERO;
        }
        Self((value * Self::SCALE as f64).round() as u64)
    }

    /// Convert to f64 (for display/storage)
    pub fn to_f64(self) -> f64 {
        self.0 as f64 / Self::SCALE as f64
    }

    #[inline]
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

/// Error returned when a decimal string cannot be read as a [`FixedPoint`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid decimal price: {0:?}")]
pub struct ParsePriceError(pub String);

impl FromStr for FixedPoint {
    type Err = ParsePriceError;

    /// Parses a plain decimal string such as `"30000.00"` without going through f64.
    /// Digits past the eighth decimal place are truncated.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParsePriceError(s.to_string());
        let trimmed = s.trim();
        let (int_part, frac_part) = match trimmed.split_once('.') {
            Some((i, f)) => (i, f),
            None => (trimmed, ""),
        };

        if int_part.is_empty() && frac_part.is_empty() {
            return Err(err());
        }
        if !int_part.bytes().all(|b| b.is_ascii_digit())
            || !frac_part.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(err());
        }

        let int_value: u64 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| err())?
        };

        let mut frac_value: u64 = 0;
        let mut digits = 0;
        for b in frac_part.bytes().take(Self::DECIMALS as usize) {
            frac_value = frac_value * 10 + u64::from(b - b'0');
            digits += 1;
        }
        frac_value *= 10u64.pow(Self::DECIMALS - digits);

        int_value
            .checked_mul(Self::SCALE)
            .and_then(|v| v.checked_add(frac_value))
            .map(FixedPoint)
            .ok_or_else(err)
    }
}

impl fmt::Display for FixedPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let int = self.0 / Self::SCALE;
        let frac = self.0 % Self::SCALE;
        if frac == 0 {
            return write!(f, "{}", int);
        }
        let frac = format!("{:08}", frac);
        write!(f, "{}.{}", int, frac.trim_end_matches('0'))
    }
}

/// A single observed market price. Produced each tick, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSample {
    /// Upper-case market symbol (e.g., "BTCUSDT")
    pub symbol: CompactString,
    pub price: FixedPoint,
    pub observed_at: DateTime<Utc>,
}

impl PriceSample {
    pub fn new(symbol: &str, price: FixedPoint, observed_at: DateTime<Utc>) -> Self {
        Self {
            symbol: normalize_symbol(symbol),
            price,
            observed_at,
        }
    }
}

/// Normalize a market symbol to the upper-case form used as a map key.
pub fn normalize_symbol(symbol: &str) -> CompactString {
    CompactString::new(symbol.trim().to_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_point_conversion() {
        let one = FixedPoint::from_f64(1.0);
        assert_eq!(one.0, 100_000_000u64);

        let price = FixedPoint::from_f64(50000.5);
        assert_eq!(price.to_f64(), 50000.5);

        // 0.29 * 1e8 is 28999999.999999996 in f64
        assert_eq!(FixedPoint::from_f64(0.29).0, 29_000_000);
        assert_eq!(FixedPoint::from_f64(-3.0), FixedPoint::ZERO);
        assert_eq!(FixedPoint::from_f64(f64::NAN), FixedPoint::ZERO);
    }

    #[test]
    fn test_fixed_point_parse() {
        assert_eq!("30000.00".parse::<FixedPoint>().unwrap(), FixedPoint(3_000_000_000_000));
        assert_eq!("0.00012345".parse::<FixedPoint>().unwrap(), FixedPoint(12_345));
        assert_eq!("42".parse::<FixedPoint>().unwrap(), FixedPoint(4_200_000_000));
        assert_eq!(".5".parse::<FixedPoint>().unwrap(), FixedPoint(50_000_000));
        // Ninth decimal is dropped
        assert_eq!("1.123456789".parse::<FixedPoint>().unwrap(), FixedPoint(112_345_678));

        assert!("".parse::<FixedPoint>().is_err());
        assert!("-1".parse::<FixedPoint>().is_err());
        assert!("1e5".parse::<FixedPoint>().is_err());
        assert!("1.2.3".parse::<FixedPoint>().is_err());
        assert!("999999999999999999999".parse::<FixedPoint>().is_err());
    }

    #[test]
    fn test_fixed_point_display() {
        assert_eq!(FixedPoint::from_f64(30000.0).to_string(), "30000");
        assert_eq!(FixedPoint::from_f64(0.5).to_string(), "0.5");
        assert_eq!(FixedPoint(12_345).to_string(), "0.00012345");
    }

    #[test]
    fn test_price_sample_normalizes_symbol() {
        let sample = PriceSample::new(" btcusdt", FixedPoint::from_f64(1.0), Utc::now());
        assert_eq!(sample.symbol.as_str(), "BTCUSDT");
    }
}
