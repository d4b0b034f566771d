/// Exposure / position tracking
///
/// Purchasing power is reserved when a buy is accepted (limit × outstanding)
/// and converted to spend on fills; sell inventory is reserved the same way.
/// `ok_to_buy` / `ok_to_sell` only read the counters.

use crate::domain::order::Order;
use crate::shared::types::{Price, Quantity, SecSid, Side};
use std::collections::HashMap;

#[inline]
fn notional(price: Price, quantity: Quantity) -> i64 {
    price.saturating_mul(quantity)
}

/// Inventory in one security
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Position {
    pub quantity: Quantity,
    /// Outstanding quantity of working sells
    pub reserved_sell: Quantity,
    pub bought_qty: Quantity,
    pub sold_qty: Quantity,
}

impl Position {
    pub fn with_quantity(quantity: Quantity) -> Self {
        Self {
            quantity,
            ..Self::default()
        }
    }

    /// Inventory not already committed to working sells
    #[inline]
    pub fn available(&self) -> Quantity {
        self.quantity - self.reserved_sell
    }
}

#[derive(Debug, Clone)]
pub struct ExposureTracker {
    purchasing_power: i64,
    reserved_buy_notional: i64,
    positions: HashMap<SecSid, Position>,
}

impl ExposureTracker {
    pub fn new(purchasing_power: i64) -> Self {
        Self {
            purchasing_power,
            reserved_buy_notional: 0,
            positions: HashMap::new(),
        }
    }

    pub fn set_position(&mut self, sec_sid: SecSid, quantity: Quantity) {
        self.positions.entry(sec_sid).or_default().quantity = quantity;
    }

    pub fn position(&self, sec_sid: SecSid) -> Position {
        self.positions.get(&sec_sid).copied().unwrap_or_default()
    }

    pub fn purchasing_power(&self) -> i64 {
        self.purchasing_power
    }

    pub fn available_purchasing_power(&self) -> i64 {
        self.purchasing_power - self.reserved_buy_notional
    }

    pub fn ok_to_buy(&self, price: Price, quantity: Quantity) -> bool {
        quantity > 0 && notional(price, quantity) <= self.available_purchasing_power()
    }

    pub fn ok_to_sell(&self, sec_sid: SecSid, quantity: Quantity) -> bool {
        quantity > 0 && quantity <= self.position(sec_sid).available()
    }

    /// Reserves capacity for a newly working order
    pub fn on_accepted(&mut self, order: &Order) {
        self.reserve(order.side, order.sec_sid, order.limit_price, order.outstanding());
    }

    /// Books an execution; the reservation for `quantity` is released first
    pub fn on_fill(&mut self, order: &Order, price: Price, quantity: Quantity) {
        self.release(order.side, order.sec_sid, order.limit_price, quantity);
        let position = self.positions.entry(order.sec_sid).or_default();
        match order.side {
            Side::Buy => {
                self.purchasing_power -= notional(price, quantity);
                position.quantity += quantity;
                position.bought_qty += quantity;
            }
            Side::Sell => {
                self.purchasing_power += notional(price, quantity);
                position.quantity -= quantity;
                position.sold_qty += quantity;
            }
        }
    }

    /// Releases what a cancelled / expired order still had reserved
    pub fn on_closed(&mut self, order: &Order, released_qty: Quantity) {
        self.release(order.side, order.sec_sid, order.limit_price, released_qty);
    }

    /// Swaps the reservation of `before` for that of `after`
    pub fn on_amended(&mut self, before: &Order, after: &Order) {
        self.release(before.side, before.sec_sid, before.limit_price, before.outstanding());
        self.reserve(after.side, after.sec_sid, after.limit_price, after.outstanding());
    }

    fn reserve(&mut self, side: Side, sec_sid: SecSid, price: Price, quantity: Quantity) {
        match side {
            Side::Buy => self.reserved_buy_notional += notional(price, quantity),
            Side::Sell => self.positions.entry(sec_sid).or_default().reserved_sell += quantity,
        }
    }

    fn release(&mut self, side: Side, sec_sid: SecSid, price: Price, quantity: Quantity) {
        match side {
            Side::Buy => {
                self.reserved_buy_notional = (self.reserved_buy_notional - notional(price, quantity)).max(0);
            }
            Side::Sell => {
                let position = self.positions.entry(sec_sid).or_default();
                position.reserved_sell = (position.reserved_sell - quantity).max(0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(side: Side, price: Price, quantity: Quantity) -> Order {
        Order::new(1, 7, side, price, quantity, 0)
    }

    #[test]
    fn test_buy_reservation_and_fill() {
        let mut exposure = ExposureTracker::new(10_000);
        assert!(exposure.ok_to_buy(100, 100));
        assert!(!exposure.ok_to_buy(100, 101));

        let mut buy = order(Side::Buy, 100, 60);
        exposure.on_accepted(&buy);
        assert_eq!(exposure.available_purchasing_power(), 4_000);
        assert!(!exposure.ok_to_buy(100, 41));

        // 以优于限价的价格成交
        buy.fill(10, 1);
        exposure.on_fill(&buy, 95, 10);
        assert_eq!(exposure.purchasing_power(), 9_050);
        assert_eq!(exposure.available_purchasing_power(), 9_050 - 5_000);
        assert_eq!(exposure.position(7).quantity, 10);

        exposure.on_closed(&buy, buy.outstanding());
        assert_eq!(exposure.available_purchasing_power(), 9_050);
    }

    #[test]
    fn test_sell_needs_inventory() {
        let mut exposure = ExposureTracker::new(0);
        assert!(!exposure.ok_to_sell(7, 1));

        exposure.set_position(7, 50);
        let mut sell = order(Side::Sell, 200, 30);
        exposure.on_accepted(&sell);
        assert!(exposure.ok_to_sell(7, 20));
        assert!(!exposure.ok_to_sell(7, 21));

        sell.fill(30, 1);
        exposure.on_fill(&sell, 201, 30);
        let position = exposure.position(7);
        assert_eq!(position.quantity, 20);
        assert_eq!(position.reserved_sell, 0);
        assert_eq!(position.sold_qty, 30);
        assert_eq!(exposure.purchasing_power(), 6_030);
    }

    #[test]
    fn test_amend_swaps_reservation() {
        let mut exposure = ExposureTracker::new(10_000);
        let before = order(Side::Buy, 100, 50);
        exposure.on_accepted(&before);

        let mut after = before;
        after.amend(20, 110, 1).unwrap();
        exposure.on_amended(&before, &after);
        assert_eq!(exposure.available_purchasing_power(), 10_000 - 2_200);
    }

    #[test]
    fn test_predicates_reject_non_positive_quantity() {
        let exposure = ExposureTracker::new(10_000);
        assert!(!exposure.ok_to_buy(100, 0));
        assert!(!exposure.ok_to_sell(7, -1));
    }
}
