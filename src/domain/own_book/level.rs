/// One price level of the participant's own orders
///
/// Orders are keyed by sid and unordered: this layer keeps aggregates, not
/// queue priority. `total_qty` and `total_outstanding` are maintained
/// incrementally on every add/remove/modify and always equal the sums over
/// the contained orders.

use crate::domain::order::Order;
use crate::shared::types::{OrderSid, Price, Quantity};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct OrderBookLevel {
    price: Price,
    orders: HashMap<OrderSid, Order>,
    total_qty: Quantity,
    total_outstanding: Quantity,
}

impl OrderBookLevel {
    pub fn new(price: Price) -> Self {
        Self {
            price,
            orders: HashMap::new(),
            total_qty: 0,
            total_outstanding: 0,
        }
    }

    /// Inserts an order; returns false if its sid is already present
    pub fn add(&mut self, order: Order) -> bool {
        if self.orders.contains_key(&order.sid) {
            return false;
        }
        self.total_qty += order.quantity;
        self.total_outstanding += order.outstanding();
        self.orders.insert(order.sid, order);
        true
    }

    pub fn remove(&mut self, sid: OrderSid) -> Option<Order> {
        let order = self.orders.remove(&sid)?;
        self.total_qty -= order.quantity;
        self.total_outstanding -= order.outstanding();
        Some(order)
    }

    /// Replaces a stored order with its modified version, applying only the delta
    ///
    /// `orig_qty` / `orig_outstanding` are what the caller believes the level
    /// holds; the stored copy wins if they disagree.
    pub fn modified_order(&mut self, order: &Order, orig_qty: Quantity, orig_outstanding: Quantity) -> bool {
        let Some(stored) = self.orders.get_mut(&order.sid) else {
            return false;
        };

        if stored.quantity != orig_qty || stored.outstanding() != orig_outstanding {
            tracing::warn!(
                sid = order.sid,
                stored_qty = stored.quantity,
                orig_qty,
                stored_outstanding = stored.outstanding(),
                orig_outstanding,
                "modified order baseline differs from level copy"
            );
        }

        self.total_qty += order.quantity - stored.quantity;
        self.total_outstanding += order.outstanding() - stored.outstanding();
        *stored = *order;
        true
    }

    pub fn price(&self) -> Price {
        self.price
    }

    pub fn total_qty(&self) -> Quantity {
        self.total_qty
    }

    pub fn total_outstanding(&self) -> Quantity {
        self.total_outstanding
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn get(&self, sid: OrderSid) -> Option<&Order> {
        self.orders.get(&sid)
    }

    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.values()
    }

    /// Full-scan check of the incremental aggregates
    pub fn aggregates_consistent(&self) -> bool {
        let (qty, outstanding) = self
            .orders
            .values()
            .fold((0, 0), |(q, o), order| (q + order.quantity, o + order.outstanding()));
        qty == self.total_qty && outstanding == self.total_outstanding
    }
}
