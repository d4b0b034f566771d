/// Both sides of one security's own orders, plus the per-security registry

use crate::domain::order::Order;
use crate::domain::own_book::side::{AskOwnOrderBook, BidOwnOrderBook};
use crate::shared::types::{OrderSid, Price, Quantity, SecSid, Side, NULL_PRICE};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct OwnOrderBook {
    sec_sid: SecSid,
    bids: BidOwnOrderBook,
    asks: AskOwnOrderBook,
}

impl OwnOrderBook {
    pub fn new(sec_sid: SecSid) -> Self {
        Self {
            sec_sid,
            bids: BidOwnOrderBook::new(),
            asks: AskOwnOrderBook::new(),
        }
    }

    pub fn sec_sid(&self) -> SecSid {
        self.sec_sid
    }

    /// Adds a working order at its limit price
    pub fn add(&mut self, order: Order) -> bool {
        if order.sec_sid != self.sec_sid {
            tracing::error!(sid = order.sid, expected = self.sec_sid, actual = order.sec_sid, "order for another security");
            return false;
        }
        match order.side {
            Side::Buy => self.bids.add(order.limit_price, order),
            Side::Sell => self.asks.add(order.limit_price, order),
        }
    }

    pub fn cancel(&mut self, order: &Order) -> bool {
        match order.side {
            Side::Buy => self.bids.cancel(order),
            Side::Sell => self.asks.cancel(order),
        }
    }

    pub fn modified_order(&mut self, order: &Order, orig_qty: Quantity, orig_outstanding: Quantity) -> bool {
        match order.side {
            Side::Buy => self.bids.modified_order(order, orig_qty, orig_outstanding),
            Side::Sell => self.asks.modified_order(order, orig_qty, orig_outstanding),
        }
    }

    pub fn bids(&self) -> &BidOwnOrderBook {
        &self.bids
    }

    pub fn asks(&self) -> &AskOwnOrderBook {
        &self.asks
    }

    pub fn best_bid(&self) -> Price {
        self.bids.best()
    }

    pub fn best_ask(&self) -> Price {
        self.asks.best()
    }

    /// True if an order on `side` at `price` would trade against one of our own
    pub fn would_cross(&self, side: Side, price: Price) -> bool {
        match side {
            Side::Buy => {
                let best_ask = self.asks.best();
                best_ask != NULL_PRICE && price >= best_ask
            }
            Side::Sell => {
                let best_bid = self.bids.best();
                best_bid != NULL_PRICE && price <= best_bid
            }
        }
    }

    pub fn get(&self, sid: OrderSid) -> Option<&Order> {
        self.bids.get(sid).or_else(|| self.asks.get(sid))
    }

    pub fn num_orders(&self) -> usize {
        self.bids.num_orders() + self.asks.num_orders()
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}

/// Own order books keyed by security
#[derive(Debug, Default)]
pub struct OwnOrderBooks {
    books: HashMap<SecSid, OwnOrderBook>,
}

impl OwnOrderBooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, sec_sid: SecSid) -> Option<&OwnOrderBook> {
        self.books.get(&sec_sid)
    }

    pub fn get_or_create(&mut self, sec_sid: SecSid) -> &mut OwnOrderBook {
        self.books
            .entry(sec_sid)
            .or_insert_with(|| OwnOrderBook::new(sec_sid))
    }

    pub fn add(&mut self, order: Order) -> bool {
        self.get_or_create(order.sec_sid).add(order)
    }

    pub fn cancel(&mut self, order: &Order) -> bool {
        match self.books.get_mut(&order.sec_sid) {
            Some(book) => book.cancel(order),
            None => {
                tracing::error!(sid = order.sid, sec_sid = order.sec_sid, "no own book for security");
                false
            }
        }
    }

    pub fn modified_order(&mut self, order: &Order, orig_qty: Quantity, orig_outstanding: Quantity) -> bool {
        match self.books.get_mut(&order.sec_sid) {
            Some(book) => book.modified_order(order, orig_qty, orig_outstanding),
            None => {
                tracing::error!(sid = order.sid, sec_sid = order.sec_sid, "no own book for security");
                false
            }
        }
    }

    pub fn would_cross(&self, sec_sid: SecSid, side: Side, price: Price) -> bool {
        self.books
            .get(&sec_sid)
            .is_some_and(|book| book.would_cross(side, price))
    }

    pub fn num_orders(&self) -> usize {
        self.books.values().map(OwnOrderBook::num_orders).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.books.values().all(OwnOrderBook::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(sid: OrderSid, side: Side, price: Price) -> Order {
        Order::new(sid, 5, side, price, 10, 0)
    }

    #[test]
    fn test_routes_by_side() {
        let mut book = OwnOrderBook::new(5);
        assert!(book.add(order(1, Side::Buy, 99)));
        assert!(book.add(order(2, Side::Sell, 101)));
        assert_eq!(book.best_bid(), 99);
        assert_eq!(book.best_ask(), 101);
        assert_eq!(book.get(2).map(|o| o.side), Some(Side::Sell));
        assert_eq!(book.num_orders(), 2);
    }

    #[test]
    fn test_rejects_other_security() {
        let mut book = OwnOrderBook::new(5);
        let mut other = order(1, Side::Buy, 99);
        other.sec_sid = 6;
        assert!(!book.add(other));
        assert!(book.is_empty());
    }

    #[test]
    fn test_would_cross() {
        let mut book = OwnOrderBook::new(5);
        assert!(!book.would_cross(Side::Buy, 1_000));

        book.add(order(1, Side::Sell, 101));
        book.add(order(2, Side::Buy, 98));
        assert!(book.would_cross(Side::Buy, 101));
        assert!(book.would_cross(Side::Buy, 102));
        assert!(!book.would_cross(Side::Buy, 100));
        assert!(book.would_cross(Side::Sell, 98));
        assert!(!book.would_cross(Side::Sell, 99));
    }

    #[test]
    fn test_registry_creates_books_lazily() {
        let mut books = OwnOrderBooks::new();
        assert!(books.is_empty());
        let a = order(1, Side::Buy, 100);
        assert!(books.add(a));
        assert!(books.would_cross(5, Side::Sell, 100));
        assert!(!books.would_cross(6, Side::Sell, 100));

        assert!(books.cancel(&a));
        assert!(books.is_empty());

        let mut unknown = a;
        unknown.sec_sid = 42;
        assert!(!books.cancel(&unknown));
    }
}
