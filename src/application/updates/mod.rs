/// Order update events
///
/// Matching / exchange outcomes flow through `MatchingEngineOrderUpdateHandler`
/// implementations that can be stacked:
///
/// ```text
/// MatchedHandler ─▶ OrderUpdateEventProducerBridge ─▶ OrderStateTracker ─▶ (persistence) ─▶ OrderUpdateEventProducer ─▶ subscribers
/// ```
///
/// - `sequencer`: per-channel atomic sequence numbers
/// - `event`: the bincode-encoded `UpdateEvent`
/// - `producer`: sequences, encodes and fans out one event per callback
/// - `bridge`: turns matching callbacks into orders/trades
/// - `tracker`: keeps own books and exposure in sync with the stream

pub mod bridge;
pub mod event;
pub mod producer;
pub mod sequencer;
pub mod tracker;

use crate::domain::order::{Order, OrderRejectType, Trade};
use crate::shared::types::{NanoOfDay, OrderSid, SecSid};

pub use bridge::OrderUpdateEventProducerBridge;
pub use event::{EventHeader, UpdateEvent, UpdateEventBody, UPDATE_EVENT_MAX_LEN};
pub use producer::{ChannelSubscriber, OrderUpdateEventProducer, UpdateEventSubscriber};
pub use sequencer::{ChannelSequencer, ChannelSequencers};
pub use tracker::OrderStateTracker;

/// Order/trade state changes; every method defaults to a no-op
pub trait MatchingEngineOrderUpdateHandler: Send {
    fn on_order_accepted(&mut self, _order: &Order) {}

    fn on_order_amended(&mut self, _order: &Order) {}

    fn on_order_expired(&mut self, _order: &Order) {}

    fn on_trade_created(&mut self, _trade: &Trade) {}

    fn on_order_rejected(&mut self, _order: &Order) {}

    fn on_order_cancelled(&mut self, _order: &Order) {}

    fn on_cancel_rejected(
        &mut self,
        _sec_sid: SecSid,
        _order_sid: OrderSid,
        _reject_type: OrderRejectType,
        _timestamp: NanoOfDay,
    ) {
    }

    /// Replay has caught up with live state
    fn on_end_of_recovery(&mut self) {}
}

impl<T: MatchingEngineOrderUpdateHandler + ?Sized> MatchingEngineOrderUpdateHandler for Box<T> {
    fn on_order_accepted(&mut self, order: &Order) {
        (**self).on_order_accepted(order)
    }

    fn on_order_amended(&mut self, order: &Order) {
        (**self).on_order_amended(order)
    }

    fn on_order_expired(&mut self, order: &Order) {
        (**self).on_order_expired(order)
    }

    fn on_trade_created(&mut self, trade: &Trade) {
        (**self).on_trade_created(trade)
    }

    fn on_order_rejected(&mut self, order: &Order) {
        (**self).on_order_rejected(order)
    }

    fn on_order_cancelled(&mut self, order: &Order) {
        (**self).on_order_cancelled(order)
    }

    fn on_cancel_rejected(
        &mut self,
        sec_sid: SecSid,
        order_sid: OrderSid,
        reject_type: OrderRejectType,
        timestamp: NanoOfDay,
    ) {
        (**self).on_cancel_rejected(sec_sid, order_sid, reject_type, timestamp)
    }

    fn on_end_of_recovery(&mut self) {
        (**self).on_end_of_recovery()
    }
}
