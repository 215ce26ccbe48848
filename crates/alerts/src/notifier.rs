//! Notification delivery and message rendering.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use compact_str::CompactString;
use pricealert_core::{Alert, AlertId, FixedPoint, Trigger};
use std::collections::BTreeSet;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Telegram API error: {0}")]
    Telegram(#[from] teloxide::RequestError),
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),
    #[error("Notification timed out after {0:?}")]
    Timeout(Duration),
    #[error("Notification rejected: {0}")]
    Rejected(String),
}

/// Delivers rendered alert messages. The engine never retries a failed send.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, alert_id: &AlertId, message: &str, recipient: &str) -> Result<(), NotifyError>;
}

/// Sink that only writes notifications to the log.
#[derive(Debug, Default, Clone)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, alert_id: &AlertId, message: &str, recipient: &str) -> Result<(), NotifyError> {
        info!(alert_id = %alert_id, recipient, "Alert notification: {}", message);
        Ok(())
    }
}

/// Format a price with precision chosen by magnitude.
pub fn format_price(price: FixedPoint) -> String {
    let value = price.to_f64();
    if price.is_zero() {
        "$0".to_string()
    } else if value >= 1000.0 {
        format!("${:.2}", value)
    } else if value >= 1.0 {
        format!("${:.4}", value)
    } else if value >= 0.01 {
        format!("${:.6}", value)
    } else {
        format!("${:.8}", value)
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            _ => out.push(c),
        }
    }
    out
}

fn join_symbols(symbols: &BTreeSet<CompactString>) -> String {
    symbols.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
}

/// Render the Telegram HTML body for a firing alert.
///
/// `price` is the sampled price for price alerts; `matched` holds the
/// listing symbols that triggered a listing alert.
pub fn render_message(
    alert: &Alert,
    price: Option<FixedPoint>,
    matched: &BTreeSet<CompactString>,
    now: DateTime<Utc>,
) -> String {
    let mut msg = match &alert.trigger {
        Trigger::Price {
            symbol,
            condition,
            threshold,
        } => {
            let mut msg = format!(
                "🔔 <b>{}</b> {} {}\n",
                escape_html(symbol),
                escape_html(condition.as_str()),
                format_price(*threshold)
            );
            if let Some(price) = price {
                msg.push_str(&format!("Current price: {}\n", format_price(price)));
            }
            msg
        }
        Trigger::NewListing { symbols } => {
            let shown = if matched.is_empty() { symbols } else { matched };
            format!("🆕 <b>New listing</b>: {}\n", escape_html(&join_symbols(shown)))
        }
        Trigger::Delisting { symbols } => {
            let shown = if matched.is_empty() { symbols } else { matched };
            format!("⚠️ <b>Delisting</b>: {}\n", escape_html(&join_symbols(shown)))
        }
    };

    msg.push_str(&format!(
        "Notification {}/{}\n",
        alert.repeat_count, alert.max_repeat_count
    ));
    msg.push_str(&format!("⏰ {}", now.format("%Y-%m-%d %H:%M:%S UTC")));
    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pricealert_core::Condition;

    #[test]
    fn test_format_price() {
        assert_eq!(format_price(FixedPoint::ZERO), "$0");
        assert_eq!(format_price(FixedPoint::from_f64(30500.0)), "$30500.00");
        assert_eq!(format_price(FixedPoint::from_f64(1.5)), "$1.5000");
        assert_eq!(format_price(FixedPoint::from_f64(0.05)), "$0.050000");
        assert_eq!(format_price(FixedPoint(1_234)), "$0.00001234");
    }

    #[test]
    fn test_render_price_message() {
        let mut alert =
            Alert::price("BTCUSDT", Condition::AtOrAbove, FixedPoint::from_f64(30000.0), "1")
                .with_max_repeat_count(2);
        alert.repeat_count = 1;
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();

        let msg = render_message(&alert, Some(FixedPoint::from_f64(30500.0)), &BTreeSet::new(), now);
        assert!(msg.contains("<b>BTCUSDT</b> &gt;= $30000.00"));
        assert!(msg.contains("Current price: $30500.00"));
        assert!(msg.contains("Notification 1/2"));
        assert!(msg.ends_with("⏰ 2024-01-02 03:04:05 UTC"));
    }

    #[test]
    fn test_render_listing_message_shows_matched_symbols() {
        let alert = Alert::new_listing(["NEWUSDT", "OTHERUSDT"], "1");
        let matched: BTreeSet<CompactString> = [CompactString::new("NEWUSDT")].into_iter().collect();

        let msg = render_message(&alert, None, &matched, Utc::now());
        assert!(msg.contains("New listing</b>: NEWUSDT\n"));
        assert!(!msg.contains("OTHERUSDT"));
    }

    #[tokio::test]
    async fn test_log_sink_accepts_everything() {
        let sink = LogSink;
        assert_eq!(sink.name(), "log");
        assert!(sink.send(&"a1".into(), "hello", "").await.is_ok());
    }
}
