/// One side of the own order book
///
/// A `BTreeMap` keyed by price holds the levels, so insert/remove are
/// O(log n) and the best price is recomputed from the key set only when the
/// best level empties. Buy and sell are the same structure mirrored through
/// `SideOrdering`: bids keep the highest key as best, asks the lowest.

use crate::domain::order::Order;
use crate::domain::own_book::level::OrderBookLevel;
use crate::shared::types::{OrderSid, Price, Quantity, Side, NULL_PRICE};
use std::collections::{BTreeMap, HashMap};
use std::marker::PhantomData;

pub trait SideOrdering {
    const SIDE: Side;

    /// True if `candidate` is strictly better than `current`
    fn is_better(candidate: Price, current: Price) -> bool;

    fn best_of(levels: &BTreeMap<Price, OrderBookLevel>) -> Option<Price>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BidOrdering;

impl SideOrdering for BidOrdering {
    const SIDE: Side = Side::Buy;

    #[inline]
    fn is_better(candidate: Price, current: Price) -> bool {
        candidate > current
    }

    fn best_of(levels: &BTreeMap<Price, OrderBookLevel>) -> Option<Price> {
        levels.keys().next_back().copied()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AskOrdering;

impl SideOrdering for AskOrdering {
    const SIDE: Side = Side::Sell;

    #[inline]
    fn is_better(candidate: Price, current: Price) -> bool {
        candidate < current
    }

    fn best_of(levels: &BTreeMap<Price, OrderBookLevel>) -> Option<Price> {
        levels.keys().next().copied()
    }
}

#[derive(Debug, Clone)]
pub struct SingleSidedOwnOrderBook<S: SideOrdering> {
    levels: BTreeMap<Price, OrderBookLevel>,
    /// 订单sid到价格的映射（用于快速撤单）
    locations: HashMap<OrderSid, Price>,
    best: Price,
    _ordering: PhantomData<S>,
}

pub type BidOwnOrderBook = SingleSidedOwnOrderBook<BidOrdering>;
pub type AskOwnOrderBook = SingleSidedOwnOrderBook<AskOrdering>;

impl<S: SideOrdering> SingleSidedOwnOrderBook<S> {
    pub fn new() -> Self {
        Self {
            levels: BTreeMap::new(),
            locations: HashMap::new(),
            best: NULL_PRICE,
            _ordering: PhantomData,
        }
    }

    /// Inserts `order` at `price`, creating the level if needed
    pub fn add(&mut self, price: Price, order: Order) -> bool {
        if order.side != S::SIDE {
            tracing::error!(sid = order.sid, side = ?order.side, book = ?S::SIDE, "order added to wrong side");
            return false;
        }
        if price == NULL_PRICE {
            tracing::error!(sid = order.sid, "order added without a price");
            return false;
        }
        if self.locations.contains_key(&order.sid) {
            tracing::error!(sid = order.sid, "order already in own book");
            return false;
        }

        let sid = order.sid;
        self.levels
            .entry(price)
            .or_insert_with(|| OrderBookLevel::new(price))
            .add(order);
        self.locations.insert(sid, price);

        if self.best == NULL_PRICE || S::is_better(price, self.best) {
            self.best = price;
        }
        true
    }

    /// Removes `order`; logs and returns false if it is not in the book
    pub fn cancel(&mut self, order: &Order) -> bool {
        self.remove(order.sid).is_some()
    }

    pub fn remove(&mut self, sid: OrderSid) -> Option<Order> {
        let Some(price) = self.locations.remove(&sid) else {
            tracing::error!(sid, side = ?S::SIDE, "own order not found");
            return None;
        };

        let Some(level) = self.levels.get_mut(&price) else {
            tracing::error!(sid, price, side = ?S::SIDE, "own order level missing");
            return None;
        };

        let removed = level.remove(sid);
        if level.is_empty() {
            self.levels.remove(&price);
            if price == self.best {
                self.best = S::best_of(&self.levels).unwrap_or(NULL_PRICE);
            }
        }
        removed
    }

    /// Applies a quantity/outstanding change (or a price move) of a held order
    pub fn modified_order(&mut self, order: &Order, orig_qty: Quantity, orig_outstanding: Quantity) -> bool {
        let Some(&price) = self.locations.get(&order.sid) else {
            tracing::error!(sid = order.sid, side = ?S::SIDE, "modified own order not found");
            return false;
        };

        if price != order.limit_price {
            return self.remove(order.sid).is_some() && self.add(order.limit_price, *order);
        }

        match self.levels.get_mut(&price) {
            Some(level) => level.modified_order(order, orig_qty, orig_outstanding),
            None => {
                tracing::error!(sid = order.sid, price, "own order level missing");
                false
            }
        }
    }

    /// Best price, or `NULL_PRICE` when the side is empty
    #[inline]
    pub fn best(&self) -> Price {
        self.best
    }

    pub fn best_level(&self) -> Option<&OrderBookLevel> {
        self.levels.get(&self.best)
    }

    pub fn level(&self, price: Price) -> Option<&OrderBookLevel> {
        self.levels.get(&price)
    }

    pub fn get(&self, sid: OrderSid) -> Option<&Order> {
        let price = self.locations.get(&sid)?;
        self.levels.get(price)?.get(sid)
    }

    pub fn contains(&self, sid: OrderSid) -> bool {
        self.locations.contains_key(&sid)
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn num_orders(&self) -> usize {
        self.locations.len()
    }

    /// Levels from best to worst
    pub fn levels(&self) -> Box<dyn Iterator<Item = &OrderBookLevel> + '_> {
        match S::SIDE {
            Side::Buy => Box::new(self.levels.values().rev()),
            Side::Sell => Box::new(self.levels.values()),
        }
    }

    pub fn total_outstanding(&self) -> Quantity {
        self.levels.values().map(OrderBookLevel::total_outstanding).sum()
    }
}

impl<S: SideOrdering> Default for SingleSidedOwnOrderBook<S> {
    fn default() -> Self {
        Self::new()
    }
}
