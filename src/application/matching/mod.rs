/// Matching engines
///
/// Two interchangeable implementations of `MatchingEngine`:
/// - `SingleThreadedMatchingEngine`: applies events synchronously on the caller's thread
/// - `MultiThreadedMatchingEngine`: publishes events into a ring buffer drained by
///   one consumer thread that runs the single-threaded algorithm in publish order
///
/// Both report through a `MatchedHandler`.

pub mod multi;
pub mod single;

use crate::domain::market::MarketOrderBook;
use crate::domain::order::Order;
use crate::shared::types::{NanoOfDay, OrderSid, Price, Quantity, SecSid};

pub use multi::{MatchingEngineHandle, MatchingEvent, MultiThreadedMatchingEngine};
pub use single::SingleThreadedMatchingEngine;

/// Receives matching outcomes; `order` already reflects the fill / expiry
pub trait MatchedHandler {
    fn on_trade(&mut self, timestamp: NanoOfDay, order: &Order, price: Price, quantity: Quantity);

    fn on_order_expired(&mut self, timestamp: NanoOfDay, order: &Order);
}

pub trait MatchingEngine {
    /// New depth snapshot for `sec_sid`; malformed snapshots are logged and dropped
    fn handle_order(&mut self, timestamp: NanoOfDay, sec_sid: SecSid, book: &MarketOrderBook);

    /// Trade tick: advances the engine clock
    fn handle_trade(&mut self, timestamp: NanoOfDay);

    /// Own order submission
    fn add_order(&mut self, sec_sid: SecSid, order: Order);
}

/// One recorded matching outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    Trade {
        timestamp: NanoOfDay,
        order_sid: OrderSid,
        price: Price,
        quantity: Quantity,
        leaves_qty: Quantity,
    },
    Expired {
        timestamp: NanoOfDay,
        order_sid: OrderSid,
        cumulative_qty: Quantity,
    },
}

/// `MatchedHandler` that keeps every outcome in order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchRecorder {
    pub outcomes: Vec<MatchOutcome>,
}

impl MatchedHandler for MatchRecorder {
    fn on_trade(&mut self, timestamp: NanoOfDay, order: &Order, price: Price, quantity: Quantity) {
        self.outcomes.push(MatchOutcome::Trade {
            timestamp,
            order_sid: order.sid,
            price,
            quantity,
            leaves_qty: order.leaves_qty,
        });
    }

    fn on_order_expired(&mut self, timestamp: NanoOfDay, order: &Order) {
        self.outcomes.push(MatchOutcome::Expired {
            timestamp,
            order_sid: order.sid,
            cumulative_qty: order.cumulative_exec_qty,
        });
    }
}
