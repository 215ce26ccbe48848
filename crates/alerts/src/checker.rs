//! Start/stop control for the periodic alert loop.

use crate::error::EngineError;
use crate::scheduler::Engine;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Result of a start or stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleOutcome {
    Started,
    AlreadyRunning,
    Stopped,
    AlreadyStopped,
}

impl LifecycleOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleOutcome::Started => "started",
            LifecycleOutcome::AlreadyRunning => "already_running",
            LifecycleOutcome::Stopped => "stopped",
            LifecycleOutcome::AlreadyStopped => "already_stopped",
        }
    }
}

struct RunningLoop {
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Clears the running flag when the loop task ends, however it ends.
struct RunningFlag(Arc<AtomicBool>);

impl Drop for RunningFlag {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Owns at most one running alert loop.
///
/// `slot` serializes start and stop. `running` mirrors it for status
/// reads, which must not wait behind a stop draining its last tick.
pub struct AlertChecker {
    engine: Arc<Engine>,
    slot: Mutex<Option<RunningLoop>>,
    running: Arc<AtomicBool>,
}

impl AlertChecker {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            slot: Mutex::new(None),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Spawn the loop on the current Tokio runtime.
    pub async fn start(&self) -> Result<LifecycleOutcome, EngineError> {
        let mut slot = self.slot.lock().await;
        if slot.as_ref().is_some_and(|running| !running.handle.is_finished()) {
            info!("Alert checker already running");
            return Ok(LifecycleOutcome::AlreadyRunning);
        }

        let runtime = Handle::try_current().map_err(|_| EngineError::NoRuntime)?;
        let (stop_tx, stop_rx) = oneshot::channel();
        self.running.store(true, Ordering::Release);
        let flag = RunningFlag(Arc::clone(&self.running));
        let handle = runtime.spawn(run_loop(Arc::clone(&self.engine), stop_rx, flag));
        *slot = Some(RunningLoop { stop_tx, handle });

        info!(
            tick_interval_ms = self.engine.config().tick_interval_ms,
            "Alert checker started"
        );
        Ok(LifecycleOutcome::Started)
    }

    /// Signal the loop and wait for the in-flight tick to finish.
    pub async fn stop(&self) -> LifecycleOutcome {
        let mut slot = self.slot.lock().await;
        let Some(running) = slot.take() else {
            info!("Alert checker already stopped");
            return LifecycleOutcome::AlreadyStopped;
        };

        self.running.store(false, Ordering::Release);

        // The loop may already have exited; a closed channel is fine
        let _ = running.stop_tx.send(());
        // Keep the lock until the loop is gone so a concurrent start cannot
        // overlap with the tick still draining
        if let Err(e) = running.handle.await {
            error!(error = %e, "Alert checker loop ended abnormally");
        }

        info!("Alert checker stopped");
        LifecycleOutcome::Stopped
    }

    /// Never waits on a start or stop in progress.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

async fn run_loop(engine: Arc<Engine>, mut stop_rx: oneshot::Receiver<()>, _flag: RunningFlag) {
    let mut interval = tokio::time::interval(engine.config().tick_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = &mut stop_rx => break,
            _ = interval.tick() => {
                // Stop is only observed between ticks
                match engine.run_tick().await {
                    Ok(report) => {
                        if report.notified > 0 || report.failures > 0 {
                            debug!(
                                notified = report.notified,
                                failures = report.failures,
                                "Tick produced notifications"
                            );
                        }
                    }
                    Err(e) => warn!(error = %e, "Tick aborted"),
                }
            }
        }
    }

    debug!("Alert checker loop exited");
}
