//! Alert persistence seam.

use crate::db::DbError;
use async_trait::async_trait;
use dashmap::DashMap;
use pricealert_core::{Alert, AlertId, InvalidAlertData};

/// Where alerts live between ticks.
///
/// `save` and `claim` write only the fields the engine owns:
/// `repeat_count`, `last_triggered_at`, `condition_met` and `updated_at`.
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// All active alerts. Malformed records come back as `Err` entries.
    async fn list_active(&self) -> Result<Vec<Result<Alert, InvalidAlertData>>, DbError>;

    /// Unconditional write of the engine-owned fields.
    async fn save(&self, alert: &Alert) -> Result<(), DbError>;

    /// Write `alert` only if the stored `repeat_count` still equals
    /// `expected_repeat_count` and the alert is still active.
    /// Returns `false` when another writer got there first.
    async fn claim(&self, alert: &Alert, expected_repeat_count: u32) -> Result<bool, DbError>;
}

/// In-process store backed by a concurrent map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    alerts: DashMap<AlertId, Alert>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, alert: Alert) {
        self.alerts.insert(alert.id.clone(), alert);
    }

    pub fn get(&self, id: &AlertId) -> Option<Alert> {
        self.alerts.get(id).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, id: &AlertId) -> Option<Alert> {
        self.alerts.remove(id).map(|(_, alert)| alert)
    }

    /// All stored alerts, active or not, ordered by id.
    pub fn snapshot(&self) -> Vec<Alert> {
        let mut alerts: Vec<Alert> = self.alerts.iter().map(|e| e.value().clone()).collect();
        alerts.sort_by(|a, b| a.id.cmp(&b.id));
        alerts
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }
}

fn apply_engine_fields(stored: &mut Alert, update: &Alert) {
    stored.repeat_count = update.repeat_count;
    stored.last_triggered_at = update.last_triggered_at;
    stored.condition_met = update.condition_met;
    stored.updated_at = update.updated_at;
}

#[async_trait]
impl AlertStore for MemoryStore {
    async fn list_active(&self) -> Result<Vec<Result<Alert, InvalidAlertData>>, DbError> {
        Ok(self
            .snapshot()
            .into_iter()
            .filter(|alert| alert.is_active)
            .map(Ok)
            .collect())
    }

    async fn save(&self, alert: &Alert) -> Result<(), DbError> {
        match self.alerts.get_mut(&alert.id) {
            Some(mut stored) => {
                apply_engine_fields(stored.value_mut(), alert);
                Ok(())
            }
            None => Err(DbError::AlertNotFound(alert.id.to_string())),
        }
    }

    async fn claim(&self, alert: &Alert, expected_repeat_count: u32) -> Result<bool, DbError> {
        // get_mut holds the shard lock across the compare and the write
        match self.alerts.get_mut(&alert.id) {
            Some(mut stored) => {
                if !stored.is_active || stored.repeat_count != expected_repeat_count {
                    return Ok(false);
                }
                apply_engine_fields(stored.value_mut(), alert);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
