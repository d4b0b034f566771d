use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use order_engine::application::matching::{MatchRecorder, MatchingEngine, SingleThreadedMatchingEngine};
use order_engine::application::throttle::{SlidingWindowThrottleTracker, ThrottleTracker};
use order_engine::domain::market::MarketOrderBook;
use order_engine::domain::order::Order;
use order_engine::domain::own_book::OwnOrderBook;
use order_engine::shared::collections::ring_buffer;
use order_engine::shared::types::{Price, Side};
use rand::{rngs::StdRng, Rng, SeedableRng};

const SEC: u64 = 1;

fn working(sid: u64, side: Side, price: Price, quantity: i64) -> Order {
    let mut order = Order::new(sid, SEC, side, price, quantity, 0);
    order.accept(sid, 0);
    order
}

fn deep_book() -> MarketOrderBook {
    let bids: Vec<(Price, i64)> = (0..10).map(|i| (999 - i, 50)).collect();
    let asks: Vec<(Price, i64)> = (0..10).map(|i| (1_001 + i, 50)).collect();
    MarketOrderBook::from_levels(SEC, &bids, &asks).unwrap()
}

// 单线程撮合：一笔市价穿透多个价位
fn matching_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("Single-threaded matching");
    let book = deep_book();

    group.bench_function("sweep 4 levels then expire (FOK)", |b| {
        b.iter_batched(
            || {
                let mut engine = SingleThreadedMatchingEngine::new(0, true, MatchRecorder::default());
                engine.handle_order(1, SEC, &book);
                engine
            },
            |mut engine| {
                engine.add_order(SEC, working(1, Side::Buy, 1_004, 230));
                black_box(engine.handler().outcomes.len())
            },
            BatchSize::SmallInput,
        );
    });

    group.bench_function("snapshot refresh with 64 resting orders", |b| {
        b.iter_batched(
            || {
                let mut engine = SingleThreadedMatchingEngine::new(0, false, MatchRecorder::default());
                for sid in 0..64 {
                    engine.add_order(SEC, working(sid + 1, Side::Buy, 990 - (sid as Price % 5), 10));
                }
                engine
            },
            |mut engine| {
                engine.handle_order(2, SEC, &book);
                black_box(engine.resting_len())
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

fn own_book_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("Own order book");
    let mut rng = StdRng::seed_from_u64(7);
    let orders: Vec<Order> = (0..1_000)
        .map(|sid| {
            let side = if sid % 2 == 0 { Side::Buy } else { Side::Sell };
            let price = match side {
                Side::Buy => rng.gen_range(900..1_000),
                Side::Sell => rng.gen_range(1_001..1_100),
            };
            working(sid + 1, side, price, rng.gen_range(1..100))
        })
        .collect();
    group.throughput(Throughput::Elements(orders.len() as u64));

    group.bench_function("add then cancel 1000 orders", |b| {
        b.iter(|| {
            let mut book = OwnOrderBook::new(SEC);
            for order in &orders {
                book.add(*order);
            }
            for order in &orders {
                book.cancel(order);
            }
            black_box(book.is_empty())
        });
    });

    group.bench_function("self-cross check", |b| {
        let mut book = OwnOrderBook::new(SEC);
        for order in &orders {
            book.add(*order);
        }
        b.iter(|| black_box(book.would_cross(Side::Buy, black_box(1_050))));
    });

    group.finish();
}

fn throttle_benchmark(c: &mut Criterion) {
    c.bench_function("sliding window acquire (capacity 100)", |b| {
        let mut tracker = SlidingWindowThrottleTracker::new(1_000, 100);
        let mut now = 0;
        b.iter(|| {
            now += 7;
            black_box(tracker.try_acquire(1, now))
        });
    });
}

fn ring_buffer_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("Ring buffer");
    group.throughput(Throughput::Elements(1));

    group.bench_function("publish + consume", |b| {
        let (publisher, mut consumer) = ring_buffer::<u64>(1_024).unwrap();
        b.iter(|| {
            publisher.publish_with(|slot| *slot = black_box(42));
            black_box(consumer.try_consume_with(|slot| *slot))
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    matching_benchmark,
    own_book_benchmark,
    throttle_benchmark,
    ring_buffer_benchmark
);
criterion_main!(benches);
