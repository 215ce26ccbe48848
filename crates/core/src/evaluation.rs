//! Per-alert, per-tick outcome.

use crate::alert::AlertId;
use serde::{Deserialize, Serialize};

/// What happened to one alert during one tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub alert_id: AlertId,
    pub condition_met: bool,
    pub should_notify: bool,
}
