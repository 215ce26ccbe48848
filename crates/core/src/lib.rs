//! Core data types for the price alert engine.

pub mod alert;
pub mod error;
pub mod evaluation;
pub mod listing;
pub mod price;

pub use alert::*;
pub use error::*;
pub use evaluation::*;
pub use listing::*;
pub use price::*;
