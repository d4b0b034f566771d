/// 多线程撮合引擎 - ring-buffer front end for the matching algorithm
///
/// Any number of caller threads publish depth snapshots, trade ticks and own
/// orders into one bounded ring of pre-allocated `MatchingEvent` slots. A single
/// consumer thread ("matching-consumer") replays them in publish order against
/// a `SingleThreadedMatchingEngine`, so the algorithm itself never sees
/// concurrency and the total order across all three event kinds is kept.
///
/// Only fill-or-kill semantics are supported here: whatever an order cannot
/// fill when it becomes matchable expires, nothing rests between events.
/// `start` refuses a configuration without `fill_or_kill`.

use crate::application::matching::single::SingleThreadedMatchingEngine;
use crate::application::matching::{MatchedHandler, MatchingEngine};
use crate::domain::market::MarketOrderBook;
use crate::domain::order::Order;
use crate::shared::affinity::spawn_pinned;
use crate::shared::collections::{ring_buffer, Consumer, Publisher};
use crate::shared::config::MatchingConfig;
use crate::shared::error::EngineError;
use crate::shared::types::{NanoOfDay, SecSid};
use crossbeam::utils::Backoff;
use std::thread::{self, JoinHandle};

/// Ring slot payload
#[derive(Debug, Clone, Copy, Default)]
pub enum MatchingEvent {
    /// Unused slot
    #[default]
    Empty,
    Depth {
        timestamp: NanoOfDay,
        sec_sid: SecSid,
        book: MarketOrderBook,
    },
    Trade {
        timestamp: NanoOfDay,
    },
    Order {
        sec_sid: SecSid,
        order: Order,
    },
    Shutdown,
}

/// Cloneable publishing side; one per producer thread
#[derive(Clone)]
pub struct MatchingEngineHandle {
    publisher: Publisher<MatchingEvent>,
}

impl MatchingEngineHandle {
    fn publish(&self, event: MatchingEvent) -> u64 {
        self.publisher.publish_with(|slot| *slot = event)
    }
}

impl MatchingEngine for MatchingEngineHandle {
    fn handle_order(&mut self, timestamp: NanoOfDay, sec_sid: SecSid, book: &MarketOrderBook) {
        self.publish(MatchingEvent::Depth {
            timestamp,
            sec_sid,
            book: *book,
        });
    }

    fn handle_trade(&mut self, timestamp: NanoOfDay) {
        self.publish(MatchingEvent::Trade { timestamp });
    }

    fn add_order(&mut self, sec_sid: SecSid, order: Order) {
        self.publish(MatchingEvent::Order { sec_sid, order });
    }
}

pub struct MultiThreadedMatchingEngine<H: MatchedHandler + Send + 'static> {
    handle: MatchingEngineHandle,
    consumer: Option<JoinHandle<H>>,
}

impl<H: MatchedHandler + Send + 'static> MultiThreadedMatchingEngine<H> {
    /// Validates the configuration and starts the consumer thread
    pub fn start(config: &MatchingConfig, handler: H) -> Result<Self, EngineError> {
        if !config.fill_or_kill {
            return Err(EngineError::Config(
                "multi-threaded matching supports fill-or-kill orders only".into(),
            ));
        }
        let engine = SingleThreadedMatchingEngine::from_config(config, handler)?;
        let (publisher, consumer) = ring_buffer::<MatchingEvent>(config.ring_buffer_size)?;

        let join = spawn_pinned("matching-consumer", config.consumer_cpu_core, move || {
            run_consumer(consumer, engine)
        })?;

        tracing::info!(ring_buffer_size = config.ring_buffer_size, "multi-threaded matching engine started");
        Ok(Self {
            handle: MatchingEngineHandle { publisher },
            consumer: Some(join),
        })
    }

    /// Publishing handle for another producer thread
    pub fn handle(&self) -> MatchingEngineHandle {
        self.handle.clone()
    }

    /// Drains every event published so far, stops the consumer and returns the handler
    pub fn shutdown(mut self) -> Result<H, EngineError> {
        self.stop().ok_or(EngineError::Shutdown)?
    }

    fn stop(&mut self) -> Option<Result<H, EngineError>> {
        let join = self.consumer.take()?;
        self.handle.publish(MatchingEvent::Shutdown);
        Some(
            join.join()
                .map_err(|_| EngineError::Unexpected("matching consumer thread panicked".into())),
        )
    }
}

impl<H: MatchedHandler + Send + 'static> MatchingEngine for MultiThreadedMatchingEngine<H> {
    fn handle_order(&mut self, timestamp: NanoOfDay, sec_sid: SecSid, book: &MarketOrderBook) {
        self.handle.handle_order(timestamp, sec_sid, book);
    }

    fn handle_trade(&mut self, timestamp: NanoOfDay) {
        self.handle.handle_trade(timestamp);
    }

    fn add_order(&mut self, sec_sid: SecSid, order: Order) {
        self.handle.add_order(sec_sid, order);
    }
}

impl<H: MatchedHandler + Send + 'static> Drop for MultiThreadedMatchingEngine<H> {
    fn drop(&mut self) {
        if let Some(Err(e)) = self.stop() {
            tracing::error!(error = %e, "matching consumer did not stop cleanly");
        }
    }
}

fn run_consumer<H: MatchedHandler>(
    mut consumer: Consumer<MatchingEvent>,
    mut engine: SingleThreadedMatchingEngine<H>,
) -> H {
    tracing::info!("matching consumer started");
    let backoff = Backoff::new();
    let mut processed: u64 = 0;

    loop {
        // 取出事件后立即归还slot
        let Some(event) = consumer.try_consume_with(std::mem::take) else {
            if backoff.is_completed() {
                thread::yield_now();
            } else {
                backoff.snooze();
            }
            continue;
        };
        backoff.reset();

        match event {
            MatchingEvent::Depth {
                timestamp,
                sec_sid,
                book,
            } => engine.handle_order(timestamp, sec_sid, &book),
            MatchingEvent::Trade { timestamp } => engine.handle_trade(timestamp),
            MatchingEvent::Order { sec_sid, order } => engine.add_order(sec_sid, order),
            MatchingEvent::Shutdown => break,
            MatchingEvent::Empty => {
                tracing::warn!("consumed an empty matching slot");
                continue;
            }
        }
        processed += 1;
    }

    tracing::info!(processed, "matching consumer stopped");
    engine.into_handler()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::matching::{MatchOutcome, MatchRecorder};
    use crate::shared::types::Side;

    fn config(ring_buffer_size: usize) -> MatchingConfig {
        MatchingConfig {
            fill_or_kill: true,
            multi_threaded: true,
            ring_buffer_size,
            ..MatchingConfig::default()
        }
    }

    #[test]
    fn test_requires_fill_or_kill() {
        let mut config = config(8);
        config.fill_or_kill = false;
        assert!(matches!(
            MultiThreadedMatchingEngine::start(&config, MatchRecorder::default()),
            Err(EngineError::Config(_))
        ));
    }

    #[test]
    fn test_bad_ring_size_fails_at_start() {
        assert!(matches!(
            MultiThreadedMatchingEngine::start(&config(6), MatchRecorder::default()),
            Err(EngineError::InvalidRingBufferSize(6))
        ));
    }

    #[test]
    fn test_fill_then_expire() {
        let mut engine = MultiThreadedMatchingEngine::start(&config(4), MatchRecorder::default()).unwrap();
        let book = MarketOrderBook::from_levels(1, &[(98, 1)], &[(99, 5)]).unwrap();
        engine.handle_order(1, 1, &book);

        let mut order = Order::new(10, 1, Side::Buy, 100, 10, 2);
        order.accept(10, 2);
        engine.add_order(1, order);

        let recorder = engine.shutdown().unwrap();
        assert_eq!(
            recorder.outcomes,
            vec![
                MatchOutcome::Trade {
                    timestamp: 2,
                    order_sid: 10,
                    price: 99,
                    quantity: 5,
                    leaves_qty: 5
                },
                MatchOutcome::Expired {
                    timestamp: 2,
                    order_sid: 10,
                    cumulative_qty: 5
                },
            ]
        );
    }

    #[test]
    fn test_many_events_through_small_ring() {
        let mut engine = MultiThreadedMatchingEngine::start(&config(2), MatchRecorder::default()).unwrap();
        let book = MarketOrderBook::from_levels(1, &[], &[(100, 1_000)]).unwrap();
        engine.handle_order(0, 1, &book);

        let mut producer = engine.handle();
        let worker = thread::spawn(move || {
            for sid in 1..=100 {
                let mut order = Order::new(sid, 1, Side::Buy, 100, 1, sid as i64);
                order.accept(sid, sid as i64);
                producer.add_order(1, order);
            }
        });
        worker.join().unwrap();

        let recorder = engine.shutdown().unwrap();
        assert_eq!(recorder.outcomes.len(), 100);
    }

    #[test]
    fn test_drop_stops_consumer() {
        let engine = MultiThreadedMatchingEngine::start(&config(4), MatchRecorder::default()).unwrap();
        drop(engine);
    }
}
