/// Order / trade persistence
///
/// `PersistingUpdateHandler` sits in the update chain and hands final order
/// states and trades to an `OrderTradePersister`:
///
/// - every trade, as it is created
/// - an order once it is filled, cancelled, expired or rejected
///
/// Failures are logged and counted; the event is still forwarded and nothing
/// is retried. Placed downstream of the event producer so trades are stored
/// with their channel id and sequence.

use crate::application::updates::MatchingEngineOrderUpdateHandler;
use crate::domain::order::{Order, OrderRejectType, Trade};
use crate::shared::error::EngineError;
use crate::shared::types::{NanoOfDay, OrderSid, SecSid};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

pub trait OrderTradePersister: Send {
    fn persist_order(&mut self, order: &Order) -> Result<(), EngineError>;

    fn persist_trade(&mut self, trade: &Trade) -> Result<(), EngineError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistedRecords {
    pub orders: Vec<Order>,
    pub trades: Vec<Trade>,
}

/// Keeps records in memory; clones share the same store
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderTradePersister {
    records: Arc<Mutex<PersistedRecords>>,
}

impl InMemoryOrderTradePersister {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> PersistedRecords {
        self.records.lock().clone()
    }
}

impl OrderTradePersister for InMemoryOrderTradePersister {
    fn persist_order(&mut self, order: &Order) -> Result<(), EngineError> {
        self.records.lock().orders.push(*order);
        Ok(())
    }

    fn persist_trade(&mut self, trade: &Trade) -> Result<(), EngineError> {
        self.records.lock().trades.push(*trade);
        Ok(())
    }
}

pub struct PersistingUpdateHandler<P: OrderTradePersister> {
    persister: P,
    downstream: Option<Box<dyn MatchingEngineOrderUpdateHandler>>,
    /// 用于在成交完成时还原完整订单
    working: HashMap<OrderSid, Order>,
    failures: u64,
}

impl<P: OrderTradePersister> PersistingUpdateHandler<P> {
    pub fn new(persister: P) -> Self {
        Self {
            persister,
            downstream: None,
            working: HashMap::new(),
            failures: 0,
        }
    }

    pub fn with_downstream(mut self, downstream: Box<dyn MatchingEngineOrderUpdateHandler>) -> Self {
        self.downstream = Some(downstream);
        self
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    pub fn persister(&self) -> &P {
        &self.persister
    }

    fn forward(&mut self, f: impl FnOnce(&mut dyn MatchingEngineOrderUpdateHandler)) {
        if let Some(downstream) = self.downstream.as_deref_mut() {
            f(downstream);
        }
    }

    fn order_closed(&mut self, order: &Order) {
        self.working.remove(&order.sid);
        if let Err(e) = self.persister.persist_order(order) {
            self.failures += 1;
            tracing::error!(sid = order.sid, status = ?order.status, error = %e, "failed to persist order");
        }
    }
}

impl<P: OrderTradePersister> MatchingEngineOrderUpdateHandler for PersistingUpdateHandler<P> {
    fn on_order_accepted(&mut self, order: &Order) {
        self.working.insert(order.sid, *order);
        self.forward(|d| d.on_order_accepted(order));
    }

    fn on_order_amended(&mut self, order: &Order) {
        self.working.insert(order.sid, *order);
        self.forward(|d| d.on_order_amended(order));
    }

    fn on_order_expired(&mut self, order: &Order) {
        self.order_closed(order);
        self.forward(|d| d.on_order_expired(order));
    }

    fn on_trade_created(&mut self, trade: &Trade) {
        if let Err(e) = self.persister.persist_trade(trade) {
            self.failures += 1;
            tracing::error!(trade_sid = trade.sid, order_sid = trade.order_sid, error = %e, "failed to persist trade");
        }

        if let Some(order) = self.working.get_mut(&trade.order_sid) {
            order.cumulative_exec_qty = trade.cumulative_qty;
            order.leaves_qty = trade.leaves_qty;
            order.status = trade.order_status;
            order.update_time = trade.update_time;
            if order.leaves_qty <= 0 {
                let filled = *order;
                self.order_closed(&filled);
            }
        }
        self.forward(|d| d.on_trade_created(trade));
    }

    fn on_order_rejected(&mut self, order: &Order) {
        self.order_closed(order);
        self.forward(|d| d.on_order_rejected(order));
    }

    fn on_order_cancelled(&mut self, order: &Order) {
        self.order_closed(order);
        self.forward(|d| d.on_order_cancelled(order));
    }

    fn on_cancel_rejected(
        &mut self,
        sec_sid: SecSid,
        order_sid: OrderSid,
        reject_type: OrderRejectType,
        timestamp: NanoOfDay,
    ) {
        self.forward(|d| d.on_cancel_rejected(sec_sid, order_sid, reject_type, timestamp));
    }

    fn on_end_of_recovery(&mut self) {
        self.forward(|d| d.on_end_of_recovery());
    }
}
