/// Single-threaded matching engine
///
/// Matches the participant's own orders against the latest market depth
/// snapshot of each security:
///
/// - an order becomes matchable `order_delay` after its `create_time`
///   (models exchange processing latency)
/// - a matchable order walks the opposite side from the best level while its
///   limit is marketable, filling min(leaves, level quantity) at the level price
/// - quantity taken is debited from the local snapshot copy, so two own
///   orders never consume the same market liquidity before the next snapshot
/// - whatever is left either rests (and is retried on every later event) or,
///   in fill-or-kill mode, expires immediately
///
/// The engine clock only moves forward: it is the max of every event
/// timestamp and order `create_time` seen so far.
///
/// Securities are kept in a `BTreeMap` so that an event touching several of
/// them always produces callbacks in the same order.

use crate::application::matching::{MatchedHandler, MatchingEngine};
use crate::domain::market::MarketOrderBook;
use crate::domain::order::{Order, OrderRejectType};
use crate::shared::config::MatchingConfig;
use crate::shared::error::{EngineError, MarketDataError};
use crate::shared::metrics::METRICS;
use crate::shared::types::{NanoOfDay, OrderSid, Price, Quantity, SecSid, Side};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy)]
struct RestingOrder {
    order: Order,
    matchable_at: NanoOfDay,
}

pub struct SingleThreadedMatchingEngine<H: MatchedHandler> {
    order_delay_ns: i64,
    fill_or_kill: bool,
    books: BTreeMap<SecSid, MarketOrderBook>,
    /// 每个证券上等待撮合的自有订单（按提交顺序）
    resting: BTreeMap<SecSid, Vec<RestingOrder>>,
    now: NanoOfDay,
    handler: H,
}

impl<H: MatchedHandler> SingleThreadedMatchingEngine<H> {
    pub fn new(order_delay_ns: i64, fill_or_kill: bool, handler: H) -> Self {
        Self {
            order_delay_ns: order_delay_ns.max(0),
            fill_or_kill,
            books: BTreeMap::new(),
            resting: BTreeMap::new(),
            now: NanoOfDay::MIN,
            handler,
        }
    }

    pub fn from_config(config: &MatchingConfig, handler: H) -> Result<Self, EngineError> {
        if config.order_delay_ns < 0 {
            return Err(EngineError::Config("matching.order_delay_ns must be >= 0".into()));
        }
        Ok(Self::new(config.order_delay_ns, config.fill_or_kill, handler))
    }

    pub fn fill_or_kill(&self) -> bool {
        self.fill_or_kill
    }

    pub fn now(&self) -> NanoOfDay {
        self.now
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn into_handler(self) -> H {
        self.handler
    }

    /// Latest snapshot for `sec_sid`, minus liquidity already taken by own orders
    pub fn book(&self, sec_sid: SecSid) -> Option<&MarketOrderBook> {
        self.books.get(&sec_sid)
    }

    pub fn resting_orders(&self, sec_sid: SecSid) -> impl Iterator<Item = &Order> {
        self.resting
            .get(&sec_sid)
            .into_iter()
            .flat_map(|orders| orders.iter().map(|r| &r.order))
    }

    pub fn resting_len(&self) -> usize {
        self.resting.values().map(Vec::len).sum()
    }

    /// Removes a resting order and marks it cancelled
    pub fn cancel_order(&mut self, sec_sid: SecSid, order_sid: OrderSid, now: NanoOfDay) -> Option<Order> {
        self.advance(now);
        let orders = self.resting.get_mut(&sec_sid)?;
        let index = orders.iter().position(|r| r.order.sid == order_sid)?;
        let mut order = orders.remove(index).order;
        order.cancel(self.now);
        Some(order)
    }

    /// Amends a resting order in place; it is not re-matched until `match_pending`
    pub fn amend_order(
        &mut self,
        sec_sid: SecSid,
        order_sid: OrderSid,
        quantity: Quantity,
        limit_price: Price,
        now: NanoOfDay,
    ) -> Result<Order, OrderRejectType> {
        self.advance(now);
        let entry = self
            .resting
            .get_mut(&sec_sid)
            .and_then(|orders| orders.iter_mut().find(|r| r.order.sid == order_sid))
            .ok_or(OrderRejectType::UnknownOrder)?;
        entry.order.amend(quantity, limit_price, self.now)?;
        Ok(entry.order)
    }

    /// Cancels every resting order matching the optional filters
    pub fn cancel_all(&mut self, sec_sid: Option<SecSid>, side: Option<Side>, now: NanoOfDay) -> Vec<Order> {
        self.advance(now);
        let now = self.now;
        let mut cancelled = Vec::new();

        for (sec, orders) in self.resting.iter_mut() {
            if sec_sid.is_some_and(|s| s != *sec) {
                continue;
            }
            orders.retain(|r| {
                if side.is_some_and(|s| s != r.order.side) {
                    return true;
                }
                let mut order = r.order;
                order.cancel(now);
                cancelled.push(order);
                false
            });
        }
        cancelled
    }

    /// Re-runs matching for `sec_sid` at `now`
    pub fn match_pending(&mut self, sec_sid: SecSid, now: NanoOfDay) {
        self.advance(now);
        self.match_security(sec_sid);
    }

    #[inline]
    fn advance(&mut self, timestamp: NanoOfDay) {
        if timestamp > self.now {
            self.now = timestamp;
        }
    }

    fn validate(sec_sid: SecSid, book: &MarketOrderBook) -> Result<(), MarketDataError> {
        if book.sec_sid() != sec_sid {
            return Err(MarketDataError::SecurityMismatch {
                expected: sec_sid,
                actual: book.sec_sid(),
            });
        }
        book.validate()
    }

    fn match_security(&mut self, sec_sid: SecSid) {
        let Some(orders) = self.resting.get_mut(&sec_sid) else {
            return;
        };
        if orders.is_empty() {
            return;
        }

        let now = self.now;
        let fill_or_kill = self.fill_or_kill;
        let handler = &mut self.handler;
        let mut book = self.books.get(&sec_sid).copied();

        orders.retain_mut(|entry| {
            if entry.matchable_at > now {
                return true;
            }
            let order = &mut entry.order;

            if let Some(book) = book.as_mut() {
                let opposite = order.side.opposite();
                while order.leaves_qty > 0 {
                    let Some(level) = book.best(opposite) else {
                        break;
                    };
                    let marketable = match order.side {
                        Side::Buy => order.limit_price >= level.price,
                        Side::Sell => order.limit_price <= level.price,
                    };
                    if !marketable {
                        break;
                    }

                    let quantity = order.leaves_qty.min(level.quantity);
                    order.fill(quantity, now);
                    book.consume_best(opposite, quantity);
                    METRICS.fills_total.with_label_values(&[order.side.as_str()]).inc();
                    handler.on_trade(now, order, level.price, quantity);
                }
            }

            if order.leaves_qty == 0 {
                return false;
            }
            if fill_or_kill {
                order.expire(now);
                METRICS.expiries_total.with_label_values(&[order.side.as_str()]).inc();
                handler.on_order_expired(now, order);
                return false;
            }
            true
        });

        if let Some(book) = book {
            self.books.insert(sec_sid, book);
        }
    }

    fn match_all(&mut self) {
        let securities: Vec<SecSid> = self
            .resting
            .iter()
            .filter(|(_, orders)| !orders.is_empty())
            .map(|(sec, _)| *sec)
            .collect();
        for sec_sid in securities {
            self.match_security(sec_sid);
        }
    }
}

impl<H: MatchedHandler> MatchingEngine for SingleThreadedMatchingEngine<H> {
    fn handle_order(&mut self, timestamp: NanoOfDay, sec_sid: SecSid, book: &MarketOrderBook) {
        if let Err(e) = Self::validate(sec_sid, book) {
            tracing::warn!(sec_sid, error = %e, "dropping malformed depth snapshot");
            METRICS
                .market_data_dropped_total
                .with_label_values(&[e.kind()])
                .inc();
            return;
        }

        self.advance(timestamp);
        self.books.insert(sec_sid, *book);
        self.match_security(sec_sid);
    }

    fn handle_trade(&mut self, timestamp: NanoOfDay) {
        self.advance(timestamp);
        self.match_all();
    }

    fn add_order(&mut self, sec_sid: SecSid, order: Order) {
        if order.sec_sid != sec_sid {
            tracing::error!(sid = order.sid, sec_sid, order_sec_sid = order.sec_sid, "order submitted for another security");
            return;
        }
        if order.is_terminal() || order.leaves_qty <= 0 {
            tracing::warn!(sid = order.sid, status = ?order.status, "ignoring order with nothing to match");
            return;
        }

        self.advance(order.create_time);
        self.resting.entry(sec_sid).or_default().push(RestingOrder {
            order,
            matchable_at: order.create_time.saturating_add(self.order_delay_ns),
        });
        self.match_security(sec_sid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::matching::{MatchOutcome, MatchRecorder};
    use crate::domain::order::OrderStatus;

    const SEC: SecSid = 7;

    fn asks(levels: &[(Price, Quantity)]) -> MarketOrderBook {
        MarketOrderBook::from_levels(SEC, &[(90, 100)], levels).unwrap()
    }

    fn buy(sid: OrderSid, price: Price, quantity: Quantity, create_time: NanoOfDay) -> Order {
        let mut order = Order::new(sid, SEC, Side::Buy, price, quantity, create_time);
        order.accept(sid * 10, create_time);
        order
    }

    fn engine(delay: i64, fok: bool) -> SingleThreadedMatchingEngine<MatchRecorder> {
        SingleThreadedMatchingEngine::new(delay, fok, MatchRecorder::default())
    }

    #[test]
    fn test_partial_fill_rests_without_fok() {
        let mut engine = engine(0, false);
        engine.handle_order(1, SEC, &asks(&[(99, 5)]));
        engine.add_order(SEC, buy(1, 100, 10, 2));

        assert_eq!(
            engine.handler().outcomes,
            vec![MatchOutcome::Trade {
                timestamp: 2,
                order_sid: 1,
                price: 99,
                quantity: 5,
                leaves_qty: 5
            }]
        );
        let resting: Vec<_> = engine.resting_orders(SEC).collect();
        assert_eq!(resting.len(), 1);
        assert_eq!(resting[0].status, OrderStatus::PartiallyFilled);
        assert!(engine.book(SEC).unwrap().best(Side::Sell).is_none());
    }

    #[test]
    fn test_partial_fill_expires_with_fok() {
        let mut engine = engine(0, true);
        engine.handle_order(1, SEC, &asks(&[(99, 5)]));
        engine.add_order(SEC, buy(1, 100, 10, 2));

        assert_eq!(
            engine.handler().outcomes,
            vec![
                MatchOutcome::Trade {
                    timestamp: 2,
                    order_sid: 1,
                    price: 99,
                    quantity: 5,
                    leaves_qty: 5
                },
                MatchOutcome::Expired {
                    timestamp: 2,
                    order_sid: 1,
                    cumulative_qty: 5
                },
            ]
        );
        assert_eq!(engine.resting_len(), 0);
    }

    #[test]
    fn test_walks_levels_while_marketable() {
        let mut engine = engine(0, false);
        engine.handle_order(1, SEC, &asks(&[(98, 3), (99, 4), (101, 50)]));
        engine.add_order(SEC, buy(1, 100, 10, 2));

        let fills: Vec<_> = engine
            .handler()
            .outcomes
            .iter()
            .filter_map(|o| match o {
                MatchOutcome::Trade { price, quantity, .. } => Some((*price, *quantity)),
                _ => None,
            })
            .collect();
        assert_eq!(fills, vec![(98, 3), (99, 4)]);
        assert_eq!(engine.resting_orders(SEC).next().map(|o| o.leaves_qty), Some(3));
    }

    #[test]
    fn test_order_delay_defers_matching() {
        let mut engine = engine(100, false);
        engine.handle_order(1, SEC, &asks(&[(99, 5)]));
        engine.add_order(SEC, buy(1, 100, 5, 10));
        assert!(engine.handler().outcomes.is_empty());

        engine.handle_trade(109);
        assert!(engine.handler().outcomes.is_empty());

        engine.handle_trade(110);
        assert_eq!(engine.handler().outcomes.len(), 1);
        assert_eq!(engine.resting_len(), 0);
    }

    #[test]
    fn test_resting_order_fills_on_later_snapshot() {
        let mut engine = engine(0, false);
        engine.handle_order(1, SEC, &asks(&[(105, 5)]));
        engine.add_order(SEC, buy(1, 100, 5, 2));
        assert!(engine.handler().outcomes.is_empty());

        engine.handle_order(3, SEC, &asks(&[(100, 2)]));
        engine.handle_order(4, SEC, &asks(&[(100, 10)]));
        let quantities: Vec<_> = engine
            .handler()
            .outcomes
            .iter()
            .map(|o| match o {
                MatchOutcome::Trade { quantity, .. } => *quantity,
                MatchOutcome::Expired { .. } => -1,
            })
            .collect();
        assert_eq!(quantities, vec![2, 3]);
    }

    #[test]
    fn test_liquidity_not_double_counted() {
        let mut engine = engine(0, false);
        engine.handle_order(1, SEC, &asks(&[(99, 5)]));
        engine.add_order(SEC, buy(1, 100, 4, 2));
        engine.add_order(SEC, buy(2, 100, 4, 3));

        let outcomes = &engine.handler().outcomes;
        assert_eq!(outcomes.len(), 2);
        assert!(matches!(outcomes[1], MatchOutcome::Trade { order_sid: 2, quantity: 1, .. }));
    }

    #[test]
    fn test_malformed_snapshot_keeps_previous_book() {
        let mut engine = engine(0, false);
        engine.handle_order(1, SEC, &asks(&[(99, 5)]));

        let mut crossed = MarketOrderBook::new(SEC);
        crossed.push(Side::Buy, 100, 1).unwrap();
        crossed.push(Side::Sell, 99, 1).unwrap();
        engine.handle_order(2, SEC, &crossed);
        engine.handle_order(3, SEC, &MarketOrderBook::new(SEC + 1));

        assert_eq!(engine.book(SEC).and_then(|b| b.best(Side::Sell)).map(|l| l.price), Some(99));
        assert_eq!(engine.now(), 1);
    }

    #[test]
    fn test_sell_side_matching() {
        let mut engine = engine(0, true);
        let bids = MarketOrderBook::from_levels(SEC, &[(101, 2), (100, 2)], &[(103, 1)]).unwrap();
        engine.handle_order(1, SEC, &bids);

        let mut sell = Order::new(1, SEC, Side::Sell, 100, 3, 2);
        sell.accept(1, 2);
        engine.add_order(SEC, sell);

        assert_eq!(engine.handler().outcomes.len(), 2);
        assert!(matches!(engine.handler().outcomes[0], MatchOutcome::Trade { price: 101, quantity: 2, .. }));
        assert!(matches!(engine.handler().outcomes[1], MatchOutcome::Trade { price: 100, quantity: 1, leaves_qty: 0, .. }));
    }

    #[test]
    fn test_cancel_amend_and_cancel_all() {
        let mut engine = engine(0, false);
        engine.handle_order(1, SEC, &asks(&[(110, 5)]));
        engine.add_order(SEC, buy(1, 100, 5, 2));
        engine.add_order(SEC, buy(2, 101, 5, 2));
        engine.add_order(SEC, buy(3, 102, 5, 2));

        let cancelled = engine.cancel_order(SEC, 1, 3).unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert!(engine.cancel_order(SEC, 1, 3).is_none());

        let amended = engine.amend_order(SEC, 2, 8, 110, 4).unwrap();
        assert_eq!((amended.quantity, amended.limit_price), (8, 110));
        assert_eq!(engine.amend_order(SEC, 99, 1, 1, 4), Err(OrderRejectType::UnknownOrder));

        engine.match_pending(SEC, 5);
        assert!(matches!(engine.handler().outcomes[0], MatchOutcome::Trade { order_sid: 2, quantity: 5, .. }));

        let rest = engine.cancel_all(Some(SEC), Some(Side::Buy), 6);
        let sids: Vec<_> = rest.iter().map(|o| o.sid).collect();
        assert_eq!(sids, vec![2, 3]);
        assert_eq!(engine.resting_len(), 0);
    }

    #[test]
    fn test_order_for_other_security_is_ignored() {
        let mut engine = engine(0, false);
        engine.add_order(SEC + 1, buy(1, 100, 5, 2));
        assert_eq!(engine.resting_len(), 0);
    }
}
