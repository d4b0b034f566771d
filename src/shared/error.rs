//! Error types
//!
//! `EngineError` covers configuration, lifecycle and dispatch failures.
//! `MarketDataError` describes a malformed depth snapshot; it never leaves the
//! matching engine (the update is logged and dropped).

use crate::shared::types::{ClientKey, OrderSid, Price, SecSid, Side};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("invalid ring buffer size {0}: must be a power of two and at least 2")]
    InvalidRingBufferSize(usize),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to spawn thread '{name}': {reason}")]
    ThreadSpawn { name: String, reason: String },

    #[error("client key {0} is already in flight")]
    DuplicateClientKey(ClientKey),

    #[error("order sid already assigned ({existing}), refusing {attempted}")]
    OrderSidAlreadyAssigned { existing: OrderSid, attempted: OrderSid },

    #[error("unknown throttle tracker index {0}")]
    UnknownThrottleTracker(usize),

    #[error("request needs {required} throttle slots but tracker capacity is {capacity}")]
    ThrottleExceedsCapacity { required: u32, capacity: u32 },

    #[error("dispatch to line handler failed: {0}")]
    Dispatch(String),

    #[error("line handler disconnected")]
    Disconnected,

    #[error("unknown line handler engine '{0}'")]
    UnknownEngine(String),

    #[error("unexpected input: {0}")]
    Unexpected(String),

    #[error("persistence failed: {0}")]
    Persistence(String),

    #[error("update event codec error: {0}")]
    Codec(String),

    #[error("component has been shut down")]
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarketDataError {
    #[error("depth snapshot for security {expected} carries security {actual}")]
    SecurityMismatch { expected: SecSid, actual: SecSid },

    #[error("{side:?} level {index} has non-positive price {price}")]
    NonPositivePrice { side: Side, index: usize, price: Price },

    #[error("{side:?} level {index} has non-positive quantity")]
    NonPositiveQuantity { side: Side, index: usize },

    #[error("{side:?} levels are not strictly ordered at index {index}")]
    NotSorted { side: Side, index: usize },

    #[error("book is crossed: best bid {bid} >= best ask {ask}")]
    Crossed { bid: Price, ask: Price },

    #[error("depth exceeds {max} levels")]
    DepthExceeded { max: usize },
}

impl MarketDataError {
    /// Short label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            MarketDataError::SecurityMismatch { .. } => "security_mismatch",
            MarketDataError::NonPositivePrice { .. } => "non_positive_price",
            MarketDataError::NonPositiveQuantity { .. } => "non_positive_quantity",
            MarketDataError::NotSorted { .. } => "not_sorted",
            MarketDataError::Crossed { .. } => "crossed",
            MarketDataError::DepthExceeded { .. } => "depth_exceeded",
        }
    }
}
