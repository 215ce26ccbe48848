//! Market data collection for the alert engine.
//!
//! - `source` - the `MarketDataSource` trait
//! - `rest` - Binance REST implementation
//! - `simulator` - offline implementation
//! - `listing` - listing change tracking
//! - `sampler` - per-tick batched sampling with timeouts

pub mod error;
pub mod listing;
pub mod rest;
pub mod sampler;
pub mod simulator;
pub mod source;

pub use error::*;
pub use listing::*;
pub use rest::*;
pub use sampler::*;
pub use simulator::*;
pub use source::*;
