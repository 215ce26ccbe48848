//! Alert records and their trigger rules.

use crate::error::AlertFieldError;
use crate::price::{normalize_symbol, FixedPoint};
use chrono::{DateTime, Utc};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Notification cap applied when a record does not set one.
pub const DEFAULT_MAX_REPEAT_COUNT: u32 = 5;

/// Unique alert identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertId(pub String);

impl AlertId {
    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AlertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AlertId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AlertId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Price comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Condition {
    #[serde(rename = ">=")]
    AtOrAbove,
    #[serde(rename = "<=")]
    AtOrBelow,
    #[serde(rename = "==")]
    Equal,
}

impl Condition {
    pub fn as_str(self) -> &'static str {
        match self {
            Condition::AtOrAbove => ">=",
            Condition::AtOrBelow => "<=",
            Condition::Equal => "==",
        }
    }
}

impl FromStr for Condition {
    type Err = AlertFieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            ">=" => Ok(Condition::AtOrAbove),
            "<=" => Ok(Condition::AtOrBelow),
            "==" => Ok(Condition::Equal),
            other => Err(AlertFieldError::UnknownCondition(other.to_string())),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage tag for the rule an alert carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Price,
    NewListing,
    Delisting,
}

impl AlertKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertKind::Price => "price",
            AlertKind::NewListing => "new_listing",
            AlertKind::Delisting => "delisting",
        }
    }
}

impl FromStr for AlertKind {
    type Err = AlertFieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "price" => Ok(AlertKind::Price),
            "new_listing" => Ok(AlertKind::NewListing),
            "delisting" => Ok(AlertKind::Delisting),
            other => Err(AlertFieldError::UnknownKind(other.to_string())),
        }
    }
}

/// What has to happen in the market for an alert to fire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trigger {
    /// Compare the last price of one symbol against a threshold.
    Price {
        symbol: CompactString,
        condition: Condition,
        threshold: FixedPoint,
    },
    /// Any of these symbols appears on the exchange.
    NewListing { symbols: BTreeSet<CompactString> },
    /// Any of these symbols disappears from the exchange.
    Delisting { symbols: BTreeSet<CompactString> },
}

impl Trigger {
    pub fn kind(&self) -> AlertKind {
        match self {
            Trigger::Price { .. } => AlertKind::Price,
            Trigger::NewListing { .. } => AlertKind::NewListing,
            Trigger::Delisting { .. } => AlertKind::Delisting,
        }
    }

    /// Symbol whose price must be sampled, if any.
    pub fn price_symbol(&self) -> Option<&CompactString> {
        match self {
            Trigger::Price { symbol, .. } => Some(symbol),
            _ => None,
        }
    }

    #[inline]
    pub fn is_listing(&self) -> bool {
        !matches!(self, Trigger::Price { .. })
    }
}

/// How often an alert may fire while its condition keeps holding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    /// Every tick the condition holds.
    #[default]
    Immediate,
    /// Only on the transition into "met".
    Throttled,
}

impl Frequency {
    pub fn as_str(self) -> &'static str {
        match self {
            Frequency::Immediate => "immediate",
            Frequency::Throttled => "throttled",
        }
    }
}

impl FromStr for Frequency {
    type Err = AlertFieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "immediate" => Ok(Frequency::Immediate),
            "throttled" => Ok(Frequency::Throttled),
            other => Err(AlertFieldError::UnknownFrequency(other.to_string())),
        }
    }
}

/// Suppression after a firing.
///
/// Stored as a string: `none`, a duration such as `30s`/`5m`/`1h`/`1d`,
/// or one of the presets `once_per_minute`, `once_per_hour`, `once_per_day`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SnoozeCondition {
    #[default]
    None,
    /// No re-fire until this long after `last_triggered_at`.
    Window(Duration),
}

impl SnoozeCondition {
    #[inline]
    pub fn is_none(self) -> bool {
        matches!(self, SnoozeCondition::None)
    }

    pub fn window(self) -> Option<Duration> {
        match self {
            SnoozeCondition::None => None,
            SnoozeCondition::Window(d) => Some(d),
        }
    }
}

impl FromStr for SnoozeCondition {
    type Err = AlertFieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim().to_ascii_lowercase();
        let unknown = || AlertFieldError::UnknownSnooze(s.to_string());

        match value.as_str() {
            "" | "none" => return Ok(SnoozeCondition::None),
            "once_per_minute" => return Ok(SnoozeCondition::Window(Duration::from_secs(60))),
            "once_per_hour" => return Ok(SnoozeCondition::Window(Duration::from_secs(3_600))),
            "once_per_day" => return Ok(SnoozeCondition::Window(Duration::from_secs(86_400))),
            _ => {}
        }

        let split = value.len() - 1;
        if !value.is_char_boundary(split) {
            return Err(unknown());
        }
        let (amount, unit) = value.split_at(split);
        let amount: u64 = amount.parse().map_err(|_| unknown())?;
        let secs = match unit {
            "s" => Some(amount),
            "m" => amount.checked_mul(60),
            "h" => amount.checked_mul(3_600),
            "d" => amount.checked_mul(86_400),
            _ => None,
        }
        .ok_or_else(unknown)?;

        Ok(SnoozeCondition::Window(Duration::from_secs(secs)))
    }
}

impl fmt::Display for SnoozeCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnoozeCondition::None => f.write_str("none"),
            SnoozeCondition::Window(d) => {
                let secs = d.as_secs();
                if secs != 0 && secs % 86_400 == 0 {
                    write!(f, "{}d", secs / 86_400)
                } else if secs != 0 && secs % 3_600 == 0 {
                    write!(f, "{}h", secs / 3_600)
                } else if secs != 0 && secs % 60 == 0 {
                    write!(f, "{}m", secs / 60)
                } else {
                    write!(f, "{}s", secs)
                }
            }
        }
    }
}

impl TryFrom<String> for SnoozeCondition {
    type Error = AlertFieldError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SnoozeCondition> for String {
    fn from(value: SnoozeCondition) -> Self {
        value.to_string()
    }
}

/// User alert stored in the alert store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub trigger: Trigger,
    /// Inactive alerts are never evaluated.
    pub is_active: bool,
    pub frequency: Frequency,
    pub snooze_condition: SnoozeCondition,
    /// Upper bound on notifications ever sent for this alert.
    pub max_repeat_count: u32,
    /// Notifications sent so far. Never exceeds `max_repeat_count`.
    pub repeat_count: u32,
    pub last_triggered_at: Option<DateTime<Utc>>,
    /// Result of the most recent evaluation (edge detector state).
    pub condition_met: bool,
    /// Delivery address handed to the notification sink (e.g., Telegram chat id).
    pub recipient: String,
    pub notification_method: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Alert {
    /// Create an active alert with the default notification policy.
    pub fn new(trigger: Trigger, recipient: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: AlertId::generate(),
            trigger,
            is_active: true,
            frequency: Frequency::Immediate,
            snooze_condition: SnoozeCondition::None,
            max_repeat_count: DEFAULT_MAX_REPEAT_COUNT,
            repeat_count: 0,
            last_triggered_at: None,
            condition_met: false,
            recipient: recipient.into(),
            notification_method: "telegram".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Price threshold alert, e.g. `BTCUSDT >= 30000`.
    pub fn price(
        symbol: &str,
        condition: Condition,
        threshold: FixedPoint,
        recipient: impl Into<String>,
    ) -> Self {
        Self::new(
            Trigger::Price {
                symbol: normalize_symbol(symbol),
                condition,
                threshold,
            },
            recipient,
        )
    }

    /// Alert on any of `symbols` being newly listed.
    pub fn new_listing<'a>(
        symbols: impl IntoIterator<Item = &'a str>,
        recipient: impl Into<String>,
    ) -> Self {
        let symbols = symbols.into_iter().map(normalize_symbol).collect();
        Self::new(Trigger::NewListing { symbols }, recipient)
    }

    /// Alert on any of `symbols` being delisted.
    pub fn delisting<'a>(
        symbols: impl IntoIterator<Item = &'a str>,
        recipient: impl Into<String>,
    ) -> Self {
        let symbols = symbols.into_iter().map(normalize_symbol).collect();
        Self::new(Trigger::Delisting { symbols }, recipient)
    }

    pub fn with_id(mut self, id: impl Into<AlertId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_frequency(mut self, frequency: Frequency) -> Self {
        self.frequency = frequency;
        self
    }

    pub fn with_snooze(mut self, snooze_condition: SnoozeCondition) -> Self {
        self.snooze_condition = snooze_condition;
        self
    }

    /// Set the notification cap. Zero means "use the default".
    pub fn with_max_repeat_count(mut self, max_repeat_count: u32) -> Self {
        self.max_repeat_count = if max_repeat_count == 0 {
            DEFAULT_MAX_REPEAT_COUNT
        } else {
            max_repeat_count
        };
        self
    }

    /// True once the notification cap is reached.
    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.repeat_count >= self.max_repeat_count
    }

    /// Whether firing is edge-triggered rather than every tick.
    #[inline]
    pub fn is_edge_triggered(&self) -> bool {
        self.frequency == Frequency::Throttled || !self.snooze_condition.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_alert_defaults() {
        let alert = Alert::price("btcusdt", Condition::AtOrAbove, FixedPoint::from_f64(30000.0), "42");
        assert!(alert.is_active);
        assert_eq!(alert.repeat_count, 0);
        assert_eq!(alert.max_repeat_count, DEFAULT_MAX_REPEAT_COUNT);
        assert_eq!(alert.frequency, Frequency::Immediate);
        assert_eq!(alert.snooze_condition, SnoozeCondition::None);
        assert_eq!(alert.trigger.price_symbol().map(|s| s.as_str()), Some("BTCUSDT"));
        assert!(!alert.is_edge_triggered());
    }

    #[test]
    fn test_zero_max_repeat_falls_back_to_default() {
        let alert = Alert::new_listing(["NEWUSDT"], "42").with_max_repeat_count(0);
        assert_eq!(alert.max_repeat_count, DEFAULT_MAX_REPEAT_COUNT);
        assert!(alert.trigger.is_listing());
    }

    #[test]
    fn test_condition_parse() {
        assert_eq!(">=".parse::<Condition>().unwrap(), Condition::AtOrAbove);
        assert_eq!("<=".parse::<Condition>().unwrap(), Condition::AtOrBelow);
        assert_eq!(" == ".parse::<Condition>().unwrap(), Condition::Equal);
        assert_eq!(
            ">".parse::<Condition>(),
            Err(AlertFieldError::UnknownCondition(">".to_string()))
        );
    }

    #[test]
    fn test_frequency_parse() {
        assert_eq!("".parse::<Frequency>().unwrap(), Frequency::Immediate);
        assert_eq!("Throttled".parse::<Frequency>().unwrap(), Frequency::Throttled);
        assert!("hourly".parse::<Frequency>().is_err());
    }

    #[test]
    fn test_snooze_parse() {
        assert_eq!("none".parse::<SnoozeCondition>().unwrap(), SnoozeCondition::None);
        assert_eq!("".parse::<SnoozeCondition>().unwrap(), SnoozeCondition::None);
        assert_eq!(
            "30s".parse::<SnoozeCondition>().unwrap(),
            SnoozeCondition::Window(Duration::from_secs(30))
        );
        assert_eq!(
            "5m".parse::<SnoozeCondition>().unwrap(),
            SnoozeCondition::Window(Duration::from_secs(300))
        );
        assert_eq!(
            "once_per_day".parse::<SnoozeCondition>().unwrap(),
            SnoozeCondition::Window(Duration::from_secs(86_400))
        );
        assert!("soon".parse::<SnoozeCondition>().is_err());
        assert!("5w".parse::<SnoozeCondition>().is_err());
        assert!("m".parse::<SnoozeCondition>().is_err());
    }

    #[test]
    fn test_snooze_display_round_trips_through_storage_form() {
        for raw in ["none", "45s", "5m", "2h", "1d"] {
            let parsed: SnoozeCondition = raw.parse().unwrap();
            assert_eq!(parsed.to_string(), raw);
        }
        let preset: SnoozeCondition = "once_per_hour".parse().unwrap();
        assert_eq!(preset.to_string(), "1h");
    }

    #[test]
    fn test_edge_triggered_modes() {
        let base = Alert::price("ETHUSDT", Condition::AtOrBelow, FixedPoint::from_f64(1.0), "1");
        assert!(base.clone().with_frequency(Frequency::Throttled).is_edge_triggered());
        assert!(base
            .with_snooze(SnoozeCondition::Window(Duration::from_secs(60)))
            .is_edge_triggered());
    }

    #[test]
    fn test_alert_serialization() {
        let alert = Alert::price("BTCUSDT", Condition::AtOrAbove, FixedPoint::from_f64(30000.0), "42")
            .with_snooze("5m".parse().unwrap());
        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["trigger"]["kind"], "price");
        assert_eq!(json["trigger"]["condition"], ">=");
        assert_eq!(json["snooze_condition"], "5m");

        let parsed: Alert = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, alert);
    }
}
