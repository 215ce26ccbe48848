//! SQLite alert store.

use crate::store::AlertStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pricealert_core::{
    normalize_symbol, Alert, AlertFieldError, AlertId, AlertKind, Condition, FixedPoint, Frequency,
    InvalidAlertData, SnoozeCondition, Trigger, DEFAULT_MAX_REPEAT_COUNT,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::collections::BTreeSet;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Alert not found: {0}")]
    AlertNotFound(String),
    #[error(transparent)]
    InvalidRow(#[from] InvalidAlertData),
}

const SELECT_ALERT: &str = r#"
    SELECT id, kind, symbol, symbols, condition, threshold, is_active, frequency,
           snooze_condition, max_repeat_count, repeat_count, last_triggered_at,
           condition_met, recipient, notification_method, created_at, updated_at
    FROM alerts
"#;

/// Raw `alerts` row. Timestamps are unix milliseconds.
#[derive(Debug, sqlx::FromRow)]
struct AlertRow {
    id: String,
    kind: String,
    symbol: Option<String>,
    symbols: String,
    condition: Option<String>,
    threshold: Option<String>,
    is_active: bool,
    frequency: String,
    snooze_condition: String,
    max_repeat_count: i64,
    repeat_count: i64,
    last_triggered_at: Option<i64>,
    condition_met: bool,
    recipient: String,
    notification_method: String,
    created_at: i64,
    updated_at: i64,
}

fn millis_to_utc(ms: i64, field: &'static str) -> Result<DateTime<Utc>, AlertFieldError> {
    DateTime::from_timestamp_millis(ms).ok_or(AlertFieldError::MissingField(field))
}

impl AlertRow {
    fn into_alert(self) -> Result<Alert, InvalidAlertData> {
        let id = self.id.clone();
        self.parse().map_err(|reason| InvalidAlertData::new(id, reason))
    }

    fn parse(self) -> Result<Alert, AlertFieldError> {
        let trigger = match AlertKind::from_str(&self.kind)? {
            AlertKind::Price => {
                let symbol = self
                    .symbol
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .ok_or(AlertFieldError::MissingField("symbol"))?;
                let condition: Condition = self
                    .condition
                    .as_deref()
                    .ok_or(AlertFieldError::MissingField("condition"))?
                    .parse()?;
                let raw = self
                    .threshold
                    .as_deref()
                    .ok_or(AlertFieldError::MissingField("threshold"))?;
                let threshold = FixedPoint::from_str(raw)
                    .map_err(|e| AlertFieldError::InvalidThreshold(e.to_string()))?;
                Trigger::Price {
                    symbol: normalize_symbol(symbol),
                    condition,
                    threshold,
                }
            }
            kind => {
                let list: Vec<String> = serde_json::from_str(&self.symbols)
                    .map_err(|_| AlertFieldError::MissingField("symbols"))?;
                let symbols: BTreeSet<_> = list
                    .iter()
                    .filter(|s| !s.trim().is_empty())
                    .map(|s| normalize_symbol(s))
                    .collect();
                if symbols.is_empty() {
                    return Err(AlertFieldError::MissingField("symbols"));
                }
                if kind == AlertKind::NewListing {
                    Trigger::NewListing { symbols }
                } else {
                    Trigger::Delisting { symbols }
                }
            }
        };

        let max_repeat_count = match u32::try_from(self.max_repeat_count) {
            Ok(0) | Err(_) => DEFAULT_MAX_REPEAT_COUNT,
            Ok(n) => n,
        };
        // A cap lowered below the sent count leaves the alert exhausted
        let repeat_count = u32::try_from(self.repeat_count.max(0))
            .unwrap_or(u32::MAX)
            .min(max_repeat_count);

        Ok(Alert {
            id: AlertId(self.id),
            trigger,
            is_active: self.is_active,
            frequency: self.frequency.parse::<Frequency>()?,
            snooze_condition: self.snooze_condition.parse::<SnoozeCondition>()?,
            max_repeat_count,
            repeat_count,
            last_triggered_at: self
                .last_triggered_at
                .map(|ms| millis_to_utc(ms, "last_triggered_at"))
                .transpose()?,
            condition_met: self.condition_met,
            recipient: self.recipient,
            notification_method: self.notification_method,
            created_at: millis_to_utc(self.created_at, "created_at")?,
            updated_at: millis_to_utc(self.updated_at, "updated_at")?,
        })
    }
}

/// Database connection for alerts.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect to SQLite database at the given URL and create tables if missing.
    pub async fn connect(database_url: &str) -> Result<Self, DbError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        // Every connection to `:memory:` is a separate database
        let in_memory = database_url.contains(":memory:");
        let pool = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?
        };

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<(), DbError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS alerts (
                id TEXT PRIMARY KEY NOT NULL,
                kind TEXT NOT NULL DEFAULT 'price',
                symbol TEXT,
                symbols TEXT NOT NULL DEFAULT '[]',
                condition TEXT,
                threshold TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                frequency TEXT NOT NULL DEFAULT 'immediate',
                snooze_condition TEXT NOT NULL DEFAULT 'none',
                max_repeat_count INTEGER NOT NULL DEFAULT 5,
                repeat_count INTEGER NOT NULL DEFAULT 0,
                last_triggered_at INTEGER,
                condition_met INTEGER NOT NULL DEFAULT 0,
                recipient TEXT NOT NULL DEFAULT '',
                notification_method TEXT NOT NULL DEFAULT 'telegram',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_alerts_active ON alerts(is_active)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Insert a new alert record.
    pub async fn insert(&self, alert: &Alert) -> Result<(), DbError> {
        let (symbol, symbols, condition, threshold) = match &alert.trigger {
            Trigger::Price {
                symbol,
                condition,
                threshold,
            } => (
                Some(symbol.to_string()),
                "[]".to_string(),
                Some(condition.as_str()),
                Some(threshold.to_string()),
            ),
            Trigger::NewListing { symbols } | Trigger::Delisting { symbols } => {
                let list: Vec<&str> = symbols.iter().map(|s| s.as_str()).collect();
                (
                    None,
                    serde_json::to_string(&list).unwrap_or_else(|_| "[]".to_string()),
                    None,
                    None,
                )
            }
        };

        sqlx::query(
            r#"
            INSERT INTO alerts (
                id, kind, symbol, symbols, condition, threshold, is_active, frequency,
                snooze_condition, max_repeat_count, repeat_count, last_triggered_at,
                condition_met, recipient, notification_method, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(alert.id.as_str())
        .bind(alert.trigger.kind().as_str())
        .bind(symbol)
        .bind(symbols)
        .bind(condition)
        .bind(threshold)
        .bind(alert.is_active)
        .bind(alert.frequency.as_str())
        .bind(alert.snooze_condition.to_string())
        .bind(i64::from(alert.max_repeat_count))
        .bind(i64::from(alert.repeat_count))
        .bind(alert.last_triggered_at.map(|t| t.timestamp_millis()))
        .bind(alert.condition_met)
        .bind(&alert.recipient)
        .bind(&alert.notification_method)
        .bind(alert.created_at.timestamp_millis())
        .bind(alert.updated_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        debug!(alert_id = %alert.id, kind = alert.trigger.kind().as_str(), "Inserted alert");
        Ok(())
    }

    /// Fetch one alert by id.
    pub async fn get(&self, id: &AlertId) -> Result<Alert, DbError> {
        let row = sqlx::query_as::<_, AlertRow>(&format!("{} WHERE id = ?", SELECT_ALERT))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::AlertNotFound(id.to_string()))?;
        Ok(row.into_alert()?)
    }

    /// Stop evaluating an alert without deleting it.
    pub async fn deactivate(&self, id: &AlertId) -> Result<(), DbError> {
        let result = sqlx::query("UPDATE alerts SET is_active = 0, updated_at = ? WHERE id = ?")
            .bind(Utc::now().timestamp_millis())
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        expect_one(result.rows_affected(), id)
    }

    /// Clear the notification history of an alert and reactivate it.
    pub async fn reset(&self, id: &AlertId) -> Result<(), DbError> {
        let result = sqlx::query(
            r#"
            UPDATE alerts
            SET is_active = 1, repeat_count = 0, last_triggered_at = NULL,
                condition_met = 0, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(Utc::now().timestamp_millis())
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;
        expect_one(result.rows_affected(), id)
    }

    pub async fn delete(&self, id: &AlertId) -> Result<(), DbError> {
        let result = sqlx::query("DELETE FROM alerts WHERE id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        expect_one(result.rows_affected(), id)
    }
}

fn expect_one(rows_affected: u64, id: &AlertId) -> Result<(), DbError> {
    if rows_affected == 0 {
        Err(DbError::AlertNotFound(id.to_string()))
    } else {
        Ok(())
    }
}

#[async_trait]
impl AlertStore for Database {
    async fn list_active(&self) -> Result<Vec<Result<Alert, InvalidAlertData>>, DbError> {
        let rows = sqlx::query_as::<_, AlertRow>(&format!(
            "{} WHERE is_active = 1 ORDER BY created_at, id",
            SELECT_ALERT
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(AlertRow::into_alert).collect())
    }

    async fn save(&self, alert: &Alert) -> Result<(), DbError> {
        let result = sqlx::query(
            r#"
            UPDATE alerts
            SET repeat_count = ?, last_triggered_at = ?, condition_met = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(i64::from(alert.repeat_count))
        .bind(alert.last_triggered_at.map(|t| t.timestamp_millis()))
        .bind(alert.condition_met)
        .bind(alert.updated_at.timestamp_millis())
        .bind(alert.id.as_str())
        .execute(&self.pool)
        .await?;
        expect_one(result.rows_affected(), &alert.id)
    }

    async fn claim(&self, alert: &Alert, expected_repeat_count: u32) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE alerts
            SET repeat_count = ?, last_triggered_at = ?, condition_met = ?, updated_at = ?
            WHERE id = ? AND repeat_count = ? AND is_active = 1
            "#,
        )
        .bind(i64::from(alert.repeat_count))
        .bind(alert.last_triggered_at.map(|t| t.timestamp_millis()))
        .bind(alert.condition_met)
        .bind(alert.updated_at.timestamp_millis())
        .bind(alert.id.as_str())
        .bind(i64::from(expected_repeat_count))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    async fn memory_db() -> Database {
        Database::connect("sqlite::memory:").await.unwrap()
    }

    fn btc_alert(id: &str) -> Alert {
        Alert::price("BTCUSDT", Condition::AtOrAbove, "30000.5".parse().unwrap(), "123456")
            .with_id(id)
            .with_frequency(Frequency::Throttled)
            .with_snooze(SnoozeCondition::Window(Duration::from_secs(300)))
            .with_max_repeat_count(3)
    }

    /// Millisecond precision is what the table keeps.
    fn truncate_millis(alert: &mut Alert) {
        let trunc = |t: DateTime<Utc>| DateTime::from_timestamp_millis(t.timestamp_millis()).unwrap();
        alert.created_at = trunc(alert.created_at);
        alert.updated_at = trunc(alert.updated_at);
        alert.last_triggered_at = alert.last_triggered_at.map(trunc);
    }

    #[tokio::test]
    async fn test_database_connect() {
        let db = memory_db().await;
        assert!(db.list_active().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let db = memory_db().await;
        let mut alert = btc_alert("a1");
        db.insert(&alert).await.unwrap();

        truncate_millis(&mut alert);
        assert_eq!(db.get(&"a1".into()).await.unwrap(), alert);

        let listing = Alert::new_listing(["NEWUSDT", "ALTUSDT"], "123456").with_id("l1");
        db.insert(&listing).await.unwrap();
        let stored = db.get(&"l1".into()).await.unwrap();
        assert_eq!(stored.trigger, listing.trigger);

        assert!(matches!(
            db.get(&"missing".into()).await,
            Err(DbError::AlertNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_active_skips_inactive_and_reports_malformed() {
        let db = memory_db().await;
        db.insert(&btc_alert("a1")).await.unwrap();
        db.insert(&btc_alert("a2")).await.unwrap();
        db.deactivate(&"a2".into()).await.unwrap();

        sqlx::query(
            "INSERT INTO alerts (id, kind, symbol, condition, threshold, created_at, updated_at)
             VALUES ('bad', 'price', 'ETHUSDT', '>', '1', 0, 0)",
        )
        .execute(&db.pool)
        .await
        .unwrap();

        let active = db.list_active().await.unwrap();
        assert_eq!(active.len(), 2);
        let ok: Vec<_> = active.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(ok.len(), 1);
        assert_eq!(ok[0].id, AlertId::from("a1"));

        let bad = active.iter().find_map(|r| r.as_ref().err()).unwrap();
        assert_eq!(bad.id, "bad");
        assert_eq!(bad.reason, AlertFieldError::UnknownCondition(">".to_string()));
    }

    #[tokio::test]
    async fn test_row_defaults_apply() {
        let db = memory_db().await;
        sqlx::query(
            "INSERT INTO alerts (id, symbol, condition, threshold, max_repeat_count, created_at, updated_at)
             VALUES ('d1', 'btcusdt', '<=', '25000', 0, 0, 0)",
        )
        .execute(&db.pool)
        .await
        .unwrap();

        let alert = db.get(&"d1".into()).await.unwrap();
        assert_eq!(alert.trigger.kind(), AlertKind::Price);
        assert_eq!(alert.trigger.price_symbol().map(|s| s.as_str()), Some("BTCUSDT"));
        assert_eq!(alert.max_repeat_count, DEFAULT_MAX_REPEAT_COUNT);
        assert_eq!(alert.frequency, Frequency::Immediate);
        assert_eq!(alert.snooze_condition, SnoozeCondition::None);
    }

    #[tokio::test]
    async fn test_lowered_cap_reads_as_exhausted() {
        let db = memory_db().await;
        sqlx::query(
            "INSERT INTO alerts (id, symbol, condition, threshold, max_repeat_count, repeat_count, created_at, updated_at)
             VALUES ('c1', 'BTCUSDT', '>=', '30000', 3, 7, 0, 0)",
        )
        .execute(&db.pool)
        .await
        .unwrap();

        let active = db.list_active().await.unwrap();
        assert_eq!(active.len(), 1);
        let alert = active[0].as_ref().unwrap();
        assert_eq!(alert.repeat_count, 3);
        assert!(alert.is_exhausted());
    }

    #[tokio::test]
    async fn test_claim_and_save() {
        let db = memory_db().await;
        let alert = btc_alert("a1");
        db.insert(&alert).await.unwrap();

        let mut fired = alert.clone();
        fired.repeat_count = 1;
        fired.condition_met = true;
        fired.last_triggered_at = Some(Utc::now());

        assert!(db.claim(&fired, 0).await.unwrap());
        assert!(!db.claim(&fired, 0).await.unwrap());

        let stored = db.get(&"a1".into()).await.unwrap();
        assert_eq!(stored.repeat_count, 1);
        assert!(stored.condition_met);
        assert!(stored.last_triggered_at.is_some());

        let mut dropped = stored.clone();
        dropped.condition_met = false;
        db.save(&dropped).await.unwrap();
        assert!(!db.get(&"a1".into()).await.unwrap().condition_met);
    }

    #[tokio::test]
    async fn test_claim_fails_after_deactivate() {
        let db = memory_db().await;
        let alert = btc_alert("a1");
        db.insert(&alert).await.unwrap();
        db.deactivate(&alert.id).await.unwrap();

        let mut fired = alert.clone();
        fired.repeat_count = 1;
        assert!(!db.claim(&fired, 0).await.unwrap());
    }

    #[tokio::test]
    async fn test_reset_and_delete() {
        let db = memory_db().await;
        let mut alert = btc_alert("a1");
        alert.repeat_count = 3;
        alert.condition_met = true;
        db.insert(&alert).await.unwrap();
        db.deactivate(&alert.id).await.unwrap();

        db.reset(&alert.id).await.unwrap();
        let stored = db.get(&alert.id).await.unwrap();
        assert!(stored.is_active);
        assert_eq!(stored.repeat_count, 0);
        assert!(!stored.condition_met);
        assert_eq!(stored.last_triggered_at, None);

        db.delete(&alert.id).await.unwrap();
        assert!(matches!(db.delete(&alert.id).await, Err(DbError::AlertNotFound(_))));
        assert!(matches!(db.save(&alert).await, Err(DbError::AlertNotFound(_))));
    }
}
