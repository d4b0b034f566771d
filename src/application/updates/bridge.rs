/// Matching → update handler adapter
///
/// Each `on_trade` becomes a `Trade` with a fresh trade sid and an execution
/// id derived from it; each expiry is forwarded as-is.

use crate::application::matching::MatchedHandler;
use crate::application::updates::MatchingEngineOrderUpdateHandler;
use crate::domain::order::{ExecutionId, Order, Trade};
use crate::shared::types::{NanoOfDay, Price, Quantity, SidGenerator};

const EXECUTION_ID_PREFIX: u8 = b'E';

pub struct OrderUpdateEventProducerBridge<U: MatchingEngineOrderUpdateHandler> {
    updates: U,
    trade_sids: SidGenerator,
}

impl<U: MatchingEngineOrderUpdateHandler> OrderUpdateEventProducerBridge<U> {
    pub fn new(updates: U) -> Self {
        Self::with_trade_sids(updates, SidGenerator::default())
    }

    pub fn with_trade_sids(updates: U, trade_sids: SidGenerator) -> Self {
        Self { updates, trade_sids }
    }

    pub fn updates(&self) -> &U {
        &self.updates
    }

    pub fn updates_mut(&mut self) -> &mut U {
        &mut self.updates
    }

    pub fn into_inner(self) -> U {
        self.updates
    }
}

impl<U: MatchingEngineOrderUpdateHandler> MatchedHandler for OrderUpdateEventProducerBridge<U> {
    fn on_trade(&mut self, timestamp: NanoOfDay, order: &Order, price: Price, quantity: Quantity) {
        let sid = self.trade_sids.next_sid();
        let trade = Trade::from_fill(
            sid,
            order,
            ExecutionId::from_sequence(EXECUTION_ID_PREFIX, sid),
            price,
            quantity,
            timestamp,
        );
        self.updates.on_trade_created(&trade);
    }

    fn on_order_expired(&mut self, _timestamp: NanoOfDay, order: &Order) {
        self.updates.on_order_expired(order);
    }
}
