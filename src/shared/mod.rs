/// Shared utilities and types used across all layers
///
/// This module contains:
/// - Scalar identifiers and enums (sids, prices, side)
/// - Error types
/// - Configuration
/// - Clocks, thread helpers, collections
/// - Metrics

pub mod affinity;
pub mod collections;
pub mod config;
pub mod error;
pub mod metrics;
pub mod timestamp;
pub mod types;

// Re-export commonly used types
pub use config::EngineConfig;
pub use error::{EngineError, MarketDataError};
pub use timestamp::{ManualTimer, SystemTimer, TimerService};
pub use types::{ClientKey, NanoOfDay, OrderSid, Owner, Price, Quantity, SecSid, Side, NULL_PRICE};
