//! Repeat limiting and suppression.
//!
//! A pure transition over the fields of an [`Alert`]: no clock reads, no I/O.

use chrono::{DateTime, Utc};
use pricealert_core::Alert;

/// Suppression state derived from an alert record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnoozeState {
    /// Never fired, or re-armed.
    Idle,
    /// Fired and the condition still holds.
    Fired,
    /// Inside the suppression window after a firing.
    Snoozed,
    /// Notification cap reached. Terminal.
    Exhausted,
}

/// Result of applying the policy for one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub should_notify: bool,
    /// Alert with the tick applied.
    pub alert: Alert,
    /// Whether `alert` differs from the input and must be persisted.
    pub changed: bool,
    pub state: SnoozeState,
}

fn in_window(alert: &Alert, now: DateTime<Utc>) -> bool {
    let (Some(window), Some(last)) = (alert.snooze_condition.window(), alert.last_triggered_at) else {
        return false;
    };
    // A window past the representable range never expires
    chrono::Duration::from_std(window)
        .ok()
        .and_then(|window| last.checked_add_signed(window))
        .map_or(true, |until| now < until)
}

/// Current state of `alert` at `now`.
pub fn state_of(alert: &Alert, now: DateTime<Utc>) -> SnoozeState {
    if alert.is_exhausted() {
        SnoozeState::Exhausted
    } else if in_window(alert, now) {
        SnoozeState::Snoozed
    } else if alert.condition_met && alert.repeat_count > 0 {
        SnoozeState::Fired
    } else {
        SnoozeState::Idle
    }
}

/// Apply one evaluation result to `alert`.
pub fn decide(alert: &Alert, condition_met: bool, now: DateTime<Utc>) -> Decision {
    let was_met = alert.condition_met;
    let mut next = alert.clone();
    next.condition_met = condition_met;

    let should_notify = if !condition_met || alert.is_exhausted() {
        false
    } else if !alert.is_edge_triggered() {
        true
    } else {
        let window = alert.snooze_condition.window();
        // An expired window re-arms a condition that never went false
        !in_window(alert, now) && (!was_met || window.is_some())
    };

    if should_notify {
        next.repeat_count = alert.repeat_count.saturating_add(1);
        next.last_triggered_at = Some(now);
        next.updated_at = now;
    } else if was_met != condition_met {
        next.updated_at = now;
    }

    let changed = should_notify || was_met != condition_met;
    let state = state_of(&next, now);

    Decision {
        should_notify,
        alert: next,
        changed,
        state,
    }
}
