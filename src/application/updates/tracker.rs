/// Keeps own order books and exposure in step with the update stream
///
/// Sits in front of the event producer: every callback first updates local
/// state, then is forwarded unchanged. Pre-trade checks read the state this
/// tracker maintains.

use crate::application::updates::MatchingEngineOrderUpdateHandler;
use crate::domain::exposure::ExposureTracker;
use crate::domain::order::{Order, OrderRejectType, Trade};
use crate::domain::own_book::OwnOrderBooks;
use crate::shared::types::{NanoOfDay, OrderSid, SecSid};
use std::collections::HashMap;

pub struct OrderStateTracker {
    /// 仍在工作的订单（最新副本）
    orders: HashMap<OrderSid, Order>,
    own_books: OwnOrderBooks,
    exposure: ExposureTracker,
    downstream: Option<Box<dyn MatchingEngineOrderUpdateHandler>>,
}

impl OrderStateTracker {
    pub fn new(exposure: ExposureTracker) -> Self {
        Self {
            orders: HashMap::new(),
            own_books: OwnOrderBooks::new(),
            exposure,
            downstream: None,
        }
    }

    pub fn with_downstream(mut self, downstream: Box<dyn MatchingEngineOrderUpdateHandler>) -> Self {
        self.downstream = Some(downstream);
        self
    }

    pub fn own_books(&self) -> &OwnOrderBooks {
        &self.own_books
    }

    pub fn exposure(&self) -> &ExposureTracker {
        &self.exposure
    }

    pub fn exposure_mut(&mut self) -> &mut ExposureTracker {
        &mut self.exposure
    }

    /// Latest copy of a working order
    pub fn order(&self, sid: OrderSid) -> Option<&Order> {
        self.orders.get(&sid)
    }

    pub fn working_orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.values()
    }

    pub fn working_len(&self) -> usize {
        self.orders.len()
    }

    fn forward(&mut self, f: impl FnOnce(&mut dyn MatchingEngineOrderUpdateHandler)) {
        if let Some(downstream) = self.downstream.as_deref_mut() {
            f(downstream);
        }
    }

    fn close(&mut self, order: &Order) {
        let Some(before) = self.orders.remove(&order.sid) else {
            tracing::warn!(sid = order.sid, status = ?order.status, "closing an order that is not tracked");
            return;
        };
        self.exposure.on_closed(&before, before.outstanding());
        self.own_books.cancel(&before);
    }
}

impl MatchingEngineOrderUpdateHandler for OrderStateTracker {
    fn on_order_accepted(&mut self, order: &Order) {
        if self.orders.insert(order.sid, *order).is_some() {
            tracing::error!(sid = order.sid, "order accepted twice");
        } else {
            self.own_books.add(*order);
            self.exposure.on_accepted(order);
        }
        self.forward(|d| d.on_order_accepted(order));
    }

    fn on_order_amended(&mut self, order: &Order) {
        match self.orders.insert(order.sid, *order) {
            Some(before) => {
                self.own_books
                    .modified_order(order, before.quantity, before.outstanding());
                self.exposure.on_amended(&before, order);
            }
            None => {
                tracing::warn!(sid = order.sid, "amend for an order that is not tracked");
                self.orders.remove(&order.sid);
            }
        }
        self.forward(|d| d.on_order_amended(order));
    }

    fn on_order_expired(&mut self, order: &Order) {
        // order.leaves_qty 已被清零，用本地副本释放占用
        self.close(order);
        self.forward(|d| d.on_order_expired(order));
    }

    fn on_trade_created(&mut self, trade: &Trade) {
        if let Some(before) = self.orders.get(&trade.order_sid).copied() {
            self.exposure
                .on_fill(&before, trade.execution_price, trade.execution_qty);

            let mut after = before;
            after.cumulative_exec_qty = trade.cumulative_qty;
            after.leaves_qty = trade.leaves_qty;
            after.status = trade.order_status;
            after.update_time = trade.update_time;

            if after.leaves_qty <= 0 {
                self.orders.remove(&after.sid);
                self.own_books.cancel(&before);
            } else {
                self.orders.insert(after.sid, after);
                self.own_books
                    .modified_order(&after, before.quantity, before.outstanding());
            }
        } else {
            tracing::warn!(order_sid = trade.order_sid, trade_sid = trade.sid, "trade for an order that is not tracked");
        }
        self.forward(|d| d.on_trade_created(trade));
    }

    fn on_order_rejected(&mut self, order: &Order) {
        if self.orders.contains_key(&order.sid) {
            self.close(order);
        }
        self.forward(|d| d.on_order_rejected(order));
    }

    fn on_order_cancelled(&mut self, order: &Order) {
        self.close(order);
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
