//! Price alert server.
//!
//! Runs the alert checker against Binance (or the simulator) and exposes
//! start/stop control over HTTP.

mod config;
mod http;

use clap::Parser;
use config::AppConfig;
use pricealert_alerts::{
    AlertChecker, Database, Engine, LogSink, NotificationSink, TelegramSink,
};
use pricealert_feeds::{BinanceRestSource, MarketDataSource, SimulatedSource};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Price Alert CLI
#[derive(Parser, Debug)]
#[command(name = "pricealert")]
#[command(about = "Price alert evaluation and notification engine", long_about = None)]
struct Args {
    /// Optional JSON configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Control API port
    #[arg(short, long)]
    port: Option<u16>,

    /// SQLite database URL
    #[arg(long)]
    database_url: Option<String>,

    /// Tick interval in milliseconds
    #[arg(long)]
    tick_ms: Option<u64>,

    /// Timeout for each market data, store, and sink call in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Log level: trace, debug, info, warn, error [default: info]
    #[arg(short, long)]
    log_level: Option<String>,

    /// Use the Binance REST API instead of the simulator
    #[arg(long, default_value_t = false)]
    live: bool,

    /// Start the alert checker immediately
    #[arg(long, default_value_t = false)]
    autostart: bool,
}

impl Args {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(url) = &self.database_url {
            config.database_url = url.clone();
        }
        if let Some(ms) = self.tick_ms {
            config.engine.tick_interval_ms = ms;
        }
        if let Some(ms) = self.timeout_ms {
            config.engine.call_timeout_ms = ms;
        }
        config.live |= self.live;
        config.autostart |= self.autostart;
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
    }
}

fn init_logging(level: &str) {
    let level = match level {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

fn build_sink() -> Arc<dyn NotificationSink> {
    match std::env::var("TELEGRAM_BOT_TOKEN") {
        Ok(token) if !token.trim().is_empty() => {
            info!("  Notifications: Telegram");
            Arc::new(TelegramSink::new(token.trim()))
        }
        _ => {
            warn!("TELEGRAM_BOT_TOKEN not set, notifications go to the log only");
            Arc::new(LogSink)
        }
    }
}

fn build_source(config: &AppConfig) -> Result<Arc<dyn MarketDataSource>, pricealert_feeds::FeedError> {
    if config.live {
        info!("  Market data: Binance REST ({})", config.binance_url);
        let source = BinanceRestSource::new(config.binance_url.clone(), config.engine.call_timeout())?;
        Ok(Arc::new(source))
    } else {
        info!("  Market data: simulator");
        Ok(Arc::new(SimulatedSource::default()))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::default(),
    };
    args.apply(&mut config);

    init_logging(&config.log_level);

    info!("Starting price alert server");
    info!("  Database: {}", config.database_url);
    info!(
        "  Tick: {}ms, call timeout: {}ms",
        config.engine.tick_interval_ms, config.engine.call_timeout_ms
    );

    let db = Database::connect(&config.database_url).await?;
    let source = build_source(&config)?;
    let sink = build_sink();

    let engine = Engine::new(Arc::new(db), source, sink, config.engine.clone());
    let checker = Arc::new(AlertChecker::new(Arc::new(engine)));

    if config.autostart {
        checker.start().await?;
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Control API listening on http://{}", addr);

    let app = http::create_router(checker.clone());
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Control API server error: {}", e);
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    checker.stop().await;
    server.abort();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_override_config() {
        let args = Args::parse_from([
            "pricealert",
            "--port",
            "9100",
            "--tick-ms",
            "250",
            "--timeout-ms",
            "1500",
            "--database-url",
            "sqlite::memory:",
            "--autostart",
        ]);
        let mut config = AppConfig::default();
        args.apply(&mut config);

        assert_eq!(config.port, 9100);
        assert_eq!(config.engine.tick_interval_ms, 250);
        assert_eq!(config.engine.call_timeout_ms, 1500);
        assert_eq!(config.database_url, "sqlite::memory:");
        assert!(config.autostart);
        assert!(!config.live);
    }

    #[test]
    fn test_args_defaults_keep_config() {
        let args = Args::parse_from(["pricealert"]);
        let mut config = AppConfig::default();
        args.apply(&mut config);
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_simulator_source_by_default() {
        let source = build_source(&AppConfig::default()).unwrap();
        assert_eq!(source.name(), "simulated");
    }
}
