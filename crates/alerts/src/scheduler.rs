//! One evaluation pass over every active alert.
//!
//! Per tick: load active alerts, sample the market once, then evaluate,
//! decide, persist and notify each alert independently.

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::evaluator::{evaluate, matched_listing_symbols};
use crate::notifier::{render_message, NotificationSink, NotifyError};
use crate::snooze::decide;
use crate::store::AlertStore;
use chrono::Utc;
use compact_str::CompactString;
use futures_util::future::join_all;
use pricealert_core::{Alert, AlertId, EvaluationResult};
use pricealert_feeds::{MarketDataSource, MarketSampler, MarketSnapshot};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Counters accumulated across ticks.
#[derive(Debug, Default)]
pub struct EngineStats {
    pub ticks: AtomicU64,
    pub notifications_sent: AtomicU64,
    pub notifications_failed: AtomicU64,
    pub alerts_skipped: AtomicU64,
}

impl EngineStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            notifications_sent: self.notifications_sent.load(Ordering::Relaxed),
            notifications_failed: self.notifications_failed.load(Ordering::Relaxed),
            alerts_skipped: self.alerts_skipped.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct StatsSnapshot {
    pub ticks: u64,
    pub notifications_sent: u64,
    pub notifications_failed: u64,
    pub alerts_skipped: u64,
}

/// Summary of one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Alerts with data available this tick.
    pub evaluated: usize,
    /// Alerts whose decision notified and whose claim succeeded.
    pub notified: usize,
    /// Notifications the sink accepted.
    pub delivered: usize,
    /// Alerts not evaluated: malformed, or no data this tick.
    pub skipped: usize,
    /// Failed saves, lost claims, and failed sends.
    pub failures: usize,
    pub results: Vec<EvaluationResult>,
}

enum Outcome {
    Skipped,
    Evaluated {
        result: EvaluationResult,
        notified: bool,
        delivered: bool,
        failed: bool,
    },
}

/// Evaluates active alerts against sampled market data.
pub struct Engine {
    store: Arc<dyn AlertStore>,
    sampler: MarketSampler,
    sink: Arc<dyn NotificationSink>,
    config: EngineConfig,
    stats: EngineStats,
}

impl Engine {
    pub fn new(
        store: Arc<dyn AlertStore>,
        source: Arc<dyn MarketDataSource>,
        sink: Arc<dyn NotificationSink>,
        config: EngineConfig,
    ) -> Self {
        let sampler = MarketSampler::new(source, config.call_timeout());
        Self {
            store,
            sampler,
            sink,
            config,
            stats: EngineStats::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// Run a single tick. Only a failure to list alerts is returned as an error.
    pub async fn run_tick(&self) -> Result<TickReport, EngineError> {
        self.stats.ticks.fetch_add(1, Ordering::Relaxed);
        let timeout = self.config.call_timeout();

        let loaded = tokio::time::timeout(timeout, self.store.list_active())
            .await
            .map_err(|_| EngineError::Timeout(timeout))??;

        let mut report = TickReport::default();
        let mut alerts = Vec::with_capacity(loaded.len());
        for entry in loaded {
            match entry {
                Ok(alert) => alerts.push(alert),
                Err(e) => {
                    warn!(alert_id = %e.id, error = %e, "Skipping malformed alert");
                    report.skipped += 1;
                }
            }
        }

        if alerts.is_empty() {
            debug!("No active alerts this tick");
            self.sampler.clear_listing_baseline();
            self.stats
                .alerts_skipped
                .fetch_add(report.skipped as u64, Ordering::Relaxed);
            return Ok(report);
        }

        let symbols: BTreeSet<CompactString> = alerts
            .iter()
            .filter_map(|a| a.trigger.price_symbol().cloned())
            .collect();
        let with_listing = alerts.iter().any(|a| a.trigger.is_listing());

        let market = self.sampler.sample(&symbols, with_listing).await;

        let outcomes = join_all(alerts.iter().map(|alert| self.process(alert, &market))).await;

        for outcome in outcomes {
            match outcome {
                Outcome::Skipped => report.skipped += 1,
                Outcome::Evaluated {
                    result,
                    notified,
                    delivered,
                    failed,
                } => {
                    report.evaluated += 1;
                    report.notified += usize::from(notified);
                    report.delivered += usize::from(delivered);
                    report.failures += usize::from(failed);
                    report.results.push(result);
                }
            }
        }

        self.stats
            .alerts_skipped
            .fetch_add(report.skipped as u64, Ordering::Relaxed);

        debug!(
            evaluated = report.evaluated,
            notified = report.notified,
            skipped = report.skipped,
            failures = report.failures,
            "Tick complete"
        );
        Ok(report)
    }

    async fn process(&self, alert: &Alert, market: &MarketSnapshot) -> Outcome {
        let Some(condition_met) = evaluate(alert, market).condition_met() else {
            return Outcome::Skipped;
        };

        let now = Utc::now();
        let decision = decide(alert, condition_met, now);
        let mut result = EvaluationResult {
            alert_id: alert.id.clone(),
            condition_met,
            should_notify: decision.should_notify,
        };

        if !decision.changed {
            return Outcome::Evaluated {
                result,
                notified: false,
                delivered: false,
                failed: false,
            };
        }

        let timeout = self.config.call_timeout();

        if !decision.should_notify {
            let saved = tokio::time::timeout(timeout, self.store.save(&decision.alert)).await;
            let failed = match saved {
                Ok(Ok(())) => false,
                Ok(Err(e)) => {
                    error!(alert_id = %alert.id, error = %e, "Failed to save alert state");
                    true
                }
                Err(_) => {
                    error!(alert_id = %alert.id, "Saving alert state timed out");
                    true
                }
            };
            return Outcome::Evaluated {
                result,
                notified: false,
                delivered: false,
                failed,
            };
        }

        let claimed = tokio::time::timeout(
            timeout,
            self.store.claim(&decision.alert, alert.repeat_count),
        )
        .await;
        match claimed {
            Ok(Ok(true)) => {}
            Ok(Ok(false)) => {
                warn!(alert_id = %alert.id, "Alert changed concurrently, notification not sent");
                result.should_notify = false;
                return Outcome::Evaluated {
                    result,
                    notified: false,
                    delivered: false,
                    failed: true,
                };
            }
            Ok(Err(e)) => {
                error!(alert_id = %alert.id, error = %e, "Failed to claim alert, notification not sent");
                result.should_notify = false;
                return Outcome::Evaluated {
                    result,
                    notified: false,
                    delivered: false,
                    failed: true,
                };
            }
            Err(_) => {
                error!(alert_id = %alert.id, "Claiming alert timed out, notification not sent");
                result.should_notify = false;
                return Outcome::Evaluated {
                    result,
                    notified: false,
                    delivered: false,
                    failed: true,
                };
            }
        }

        let fired = &decision.alert;
        let price = fired
            .trigger
            .price_symbol()
            .and_then(|s| market.price(s))
            .map(|sample| sample.price);
        let matched = matched_listing_symbols(fired, market);
        let message = render_message(fired, price, &matched, now);

        let delivered = match self.send(&fired.id, &message, &fired.recipient).await {
            Ok(()) => {
                self.stats.notifications_sent.fetch_add(1, Ordering::Relaxed);
                info!(
                    alert_id = %fired.id,
                    sink = self.sink.name(),
                    repeat_count = fired.repeat_count,
                    max_repeat_count = fired.max_repeat_count,
                    "Alert notification sent"
                );
                true
            }
            Err(e) => {
                // repeat_count stays incremented
                self.stats.notifications_failed.fetch_add(1, Ordering::Relaxed);
                error!(alert_id = %fired.id, sink = self.sink.name(), error = %e, "Failed to send alert notification");
                false
            }
        };

        Outcome::Evaluated {
            result,
            notified: true,
            delivered,
            failed: !delivered,
        }
    }

    async fn send(&self, alert_id: &AlertId, message: &str, recipient: &str) -> Result<(), NotifyError> {
        let timeout = self.config.call_timeout();
        tokio::time::timeout(timeout, self.sink.send(alert_id, message, recipient))
            .await
            .map_err(|_| NotifyError::Timeout(timeout))?
    }
}
