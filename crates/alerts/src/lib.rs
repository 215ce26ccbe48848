//! Price alert evaluation and notification engine.
//!
//! This crate provides:
//! - Condition evaluation and the snooze/repeat policy
//! - SQLite and in-memory alert stores
//! - Telegram and log notification sinks
//! - The periodic scheduler and its start/stop controller

pub mod checker;
pub mod config;
pub mod db;
pub mod error;
pub mod evaluator;
pub mod notifier;
pub mod scheduler;
pub mod snooze;
pub mod store;
pub mod telegram;

pub use checker::{AlertChecker, LifecycleOutcome};
pub use config::EngineConfig;
pub use db::{Database, DbError};
pub use error::EngineError;
pub use evaluator::{evaluate, Evaluation};
pub use notifier::{render_message, LogSink, NotificationSink, NotifyError};
pub use scheduler::{Engine, EngineStats, StatsSnapshot, TickReport};
pub use snooze::{decide, Decision, SnoozeState};
pub use store::{AlertStore, MemoryStore};
pub use telegram::TelegramSink;
