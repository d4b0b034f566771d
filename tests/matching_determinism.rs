use order_engine::application::matching::{
    MatchOutcome, MatchRecorder, MatchingEngine, MultiThreadedMatchingEngine, SingleThreadedMatchingEngine,
};
use order_engine::domain::market::MarketOrderBook;
use order_engine::domain::order::Order;
use order_engine::shared::config::MatchingConfig;
use order_engine::shared::types::{NanoOfDay, Price, Quantity, SecSid, Side};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Event {
    Depth { sec_sid: SecSid, mid: Price, bids: Vec<Quantity>, asks: Vec<Quantity> },
    Tick,
    Add { sec_sid: SecSid, side: Side, price: Price, quantity: Quantity },
}

fn event() -> impl Strategy<Value = Event> {
    let qty = prop::collection::vec(1i64..40, 0..4);
    prop_oneof![
        2 => (1u64..3, 95i64..105, qty.clone(), qty)
            .prop_map(|(sec_sid, mid, bids, asks)| Event::Depth { sec_sid, mid, bids, asks }),
        1 => Just(Event::Tick),
        3 => (1u64..3, prop::bool::ANY, 93i64..107, 1i64..60).prop_map(|(sec_sid, buy, price, quantity)| {
            Event::Add {
                sec_sid,
                side: if buy { Side::Buy } else { Side::Sell },
                price,
                quantity,
            }
        }),
    ]
}

/// Replays `events` with strictly increasing timestamps
fn replay<E: MatchingEngine>(engine: &mut E, events: &[Event]) {
    let mut sid = 0;
    for (index, event) in events.iter().enumerate() {
        let timestamp = (index as NanoOfDay + 1) * 10;
        match event {
            Event::Depth { sec_sid, mid, bids, asks } => {
                let bids: Vec<(Price, Quantity)> =
                    bids.iter().enumerate().map(|(i, q)| (mid - 1 - i as Price, *q)).collect();
                let asks: Vec<(Price, Quantity)> =
                    asks.iter().enumerate().map(|(i, q)| (mid + 1 + i as Price, *q)).collect();
                let book = MarketOrderBook::from_levels(*sec_sid, &bids, &asks).expect("well-formed depth");
                engine.handle_order(timestamp, *sec_sid, &book);
            }
            Event::Tick => engine.handle_trade(timestamp),
            Event::Add { sec_sid, side, price, quantity } => {
                sid += 1;
                let mut order = Order::new(sid, *sec_sid, *side, *price, *quantity, timestamp);
                order.accept(sid, timestamp);
                engine.add_order(*sec_sid, order);
            }
        }
    }
}

fn fok_config(order_delay_ns: i64) -> MatchingConfig {
    MatchingConfig {
        order_delay_ns,
        fill_or_kill: true,
        multi_threaded: true,
        ring_buffer_size: 16,
        ..MatchingConfig::default()
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_multi_threaded_matches_single_threaded(
        events in prop::collection::vec(event(), 1..60),
        // 事件间隔 10ns，延迟跨越多个事件
        order_delay_ns in prop_oneof![Just(0i64), 1i64..35],
    ) {
        let mut single = SingleThreadedMatchingEngine::new(order_delay_ns, true, MatchRecorder::default());
        replay(&mut single, &events);

        let mut multi = MultiThreadedMatchingEngine::start(&fok_config(order_delay_ns), MatchRecorder::default()).unwrap();
        replay(&mut multi, &events);
        let recorded = multi.shutdown().unwrap();

        prop_assert_eq!(&single.handler().outcomes, &recorded.outcomes);
    }
}

fn buy_against_thin_offer(fill_or_kill: bool) -> SingleThreadedMatchingEngine<MatchRecorder> {
    let mut engine = SingleThreadedMatchingEngine::new(0, fill_or_kill, MatchRecorder::default());
    let book = MarketOrderBook::from_levels(7, &[(98, 3)], &[(99, 5)]).unwrap();
    engine.handle_order(1, 7, &book);

    let mut order = Order::new(1, 7, Side::Buy, 100, 10, 2);
    order.accept(1, 2);
    engine.add_order(7, order);
    engine
}

#[test]
fn test_partial_fill_rests_without_fill_or_kill() {
    let engine = buy_against_thin_offer(false);

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
    assert_eq!(engine.resting_len(), 1);
}

#[test]
fn test_partial_fill_expires_with_fill_or_kill() {
    let engine = buy_against_thin_offer(true);

    assert_eq!(engine.handler().outcomes.len(), 2);
    assert_eq!(
        engine.handler().outcomes[1],
        MatchOutcome::Expired {
            timestamp: 2,
            order_sid: 1,
            cumulative_qty: 5
        }
    );
    assert_eq!(engine.resting_len(), 0);
}

#[test]
fn test_resting_order_fills_on_next_snapshot() {
    let mut engine = buy_against_thin_offer(false);
    let refreshed = MarketOrderBook::from_levels(7, &[(98, 3)], &[(100, 8)]).unwrap();
    engine.handle_order(3, 7, &refreshed);

    assert_eq!(
        engine.handler().outcomes.last(),
        Some(&MatchOutcome::Trade {
            timestamp: 3,
            order_sid: 1,
            price: 100,
            quantity: 5,
            leaves_qty: 0
        })
    );
    assert_eq!(engine.resting_len(), 0);
}
