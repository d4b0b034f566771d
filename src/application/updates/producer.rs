/// Order Update Event Producer
///
/// Turns each handler callback into exactly one `UpdateEvent`: claims the next
/// sequence on its channel, encodes into the producer's scratch buffer and
/// hands the bytes to every subscriber. The buffer is overwritten by the next
/// publish, so subscribers must copy what they want to keep.
///
/// One producer per thread; producers on the same channel share the
/// `ChannelSequencer`. An optional downstream handler sees every callback
/// after it is published, with trades carrying their channel fields.

use crate::application::updates::event::{EventHeader, UpdateEvent, UpdateEventBody, UPDATE_EVENT_MAX_LEN};
use crate::application::updates::sequencer::ChannelSequencer;
use crate::application::updates::MatchingEngineOrderUpdateHandler;
use crate::domain::order::{Order, OrderRejectType, Trade};
use crate::shared::error::EngineError;
use crate::shared::metrics::METRICS;
use crate::shared::timestamp::TimerService;
use crate::shared::types::{NanoOfDay, OrderSid, SecSid};
use crossbeam::channel::{unbounded, Receiver, Sender};
use std::sync::Arc;

pub trait UpdateEventSubscriber: Send {
    /// `encoded` borrows the producer's scratch buffer and is only valid for this call
    fn on_update(&mut self, event: &UpdateEvent, encoded: &[u8]);
}

/// Decodes each event from its bytes and forwards it over a channel
pub struct ChannelSubscriber {
    tx: Sender<UpdateEvent>,
}

impl ChannelSubscriber {
    pub fn new() -> (Self, Receiver<UpdateEvent>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }
}

impl UpdateEventSubscriber for ChannelSubscriber {
    fn on_update(&mut self, _event: &UpdateEvent, encoded: &[u8]) {
        match UpdateEvent::decode(encoded) {
            Ok(decoded) => {
                if self.tx.send(decoded).is_err() {
                    tracing::debug!("update subscriber receiver dropped");
                }
            }
            Err(e) => tracing::error!(error = %e, "failed to decode update event"),
        }
    }
}

pub struct OrderUpdateEventProducer {
    sequencer: Arc<ChannelSequencer>,
    timer: Arc<dyn TimerService>,
    scratch: Box<[u8; UPDATE_EVENT_MAX_LEN]>,
    subscribers: Vec<Box<dyn UpdateEventSubscriber>>,
    downstream: Option<Box<dyn MatchingEngineOrderUpdateHandler>>,
    published: u64,
}

impl OrderUpdateEventProducer {
    pub fn new(sequencer: Arc<ChannelSequencer>, timer: Arc<dyn TimerService>) -> Self {
        Self {
            sequencer,
            timer,
            scratch: Box::new([0u8; UPDATE_EVENT_MAX_LEN]),
            subscribers: Vec::new(),
            downstream: None,
            published: 0,
        }
    }

    pub fn with_downstream(mut self, downstream: Box<dyn MatchingEngineOrderUpdateHandler>) -> Self {
        self.downstream = Some(downstream);
        self
    }

    pub fn subscribe(&mut self, subscriber: Box<dyn UpdateEventSubscriber>) {
        self.subscribers.push(subscriber);
    }

    pub fn channel_id(&self) -> u32 {
        self.sequencer.channel_id()
    }

    /// Events published by this producer (not the channel)
    pub fn published(&self) -> u64 {
        self.published
    }

    /// Sequences, encodes and fans out one event; returns its sequence number
    pub fn publish(&mut self, body: UpdateEventBody) -> Result<u64, EngineError> {
        let timestamp = self.now();
        self.publish_at(body, timestamp)
    }

    fn publish_at(&mut self, mut body: UpdateEventBody, timestamp: NanoOfDay) -> Result<u64, EngineError> {
        let channel_id = self.sequencer.channel_id();
        let channel_seq = self.sequencer.next();
        if let UpdateEventBody::TradeCreated(trade) = &mut body {
            trade.assign_channel(channel_id, channel_seq);
        }

        let event = UpdateEvent {
            header: EventHeader {
                channel_id,
                channel_seq,
                timestamp,
            },
            body,
        };

        let len = event.encode_into(&mut self.scratch[..])?;
        let encoded = &self.scratch[..len];
        for subscriber in self.subscribers.iter_mut() {
            subscriber.on_update(&event, encoded);
        }

        self.published += 1;
        METRICS
            .update_events_total
            .with_label_values(&[event.body.name()])
            .inc();
        tracing::trace!(channel_id, channel_seq, event = event.body.name(), len, "update event published");
        Ok(channel_seq)
    }

    fn now(&self) -> NanoOfDay {
        self.timer.nano_of_day()
    }

    fn publish_logged(&mut self, body: UpdateEventBody) -> Option<u64> {
        let timestamp = self.now();
        self.publish_logged_at(body, timestamp)
    }

    fn publish_logged_at(&mut self, body: UpdateEventBody, timestamp: NanoOfDay) -> Option<u64> {
        let name = body.name();
        match self.publish_at(body, timestamp) {
            Ok(channel_seq) => Some(channel_seq),
            Err(e) => {
                tracing::error!(event = name, error = %e, "failed to publish update event");
                None
            }
        }
    }

    fn forward(&mut self, f: impl FnOnce(&mut dyn MatchingEngineOrderUpdateHandler)) {
        if let Some(downstream) = self.downstream.as_deref_mut() {
            f(downstream);
        }
    }
}

impl MatchingEngineOrderUpdateHandler for OrderUpdateEventProducer {
    fn on_order_accepted(&mut self, order: &Order) {
        self.publish_logged(UpdateEventBody::OrderAccepted(*order));
        self.forward(|d| d.on_order_accepted(order));
    }

    fn on_order_amended(&mut self, order: &Order) {
        self.publish_logged(UpdateEventBody::OrderAmended(*order));
        self.forward(|d| d.on_order_amended(order));
    }

    fn on_order_expired(&mut self, order: &Order) {
        self.publish_logged(UpdateEventBody::OrderExpired(*order));
        self.forward(|d| d.on_order_expired(order));
    }

    fn on_trade_created(&mut self, trade: &Trade) {
        // 下游拿到带通道号的成交
        let mut stamped = *trade;
        if let Some(channel_seq) = self.publish_logged(UpdateEventBody::TradeCreated(*trade)) {
            stamped.assign_channel(self.channel_id(), channel_seq);
        }
        self.forward(|d| d.on_trade_created(&stamped));
    }

    fn on_order_rejected(&mut self, order: &Order) {
        self.publish_logged(UpdateEventBody::OrderRejected(*order));
        self.forward(|d| d.on_order_rejected(order));
    }

    fn on_order_cancelled(&mut self, order: &Order) {
        self.publish_logged(UpdateEventBody::OrderCancelled(*order));
        self.forward(|d| d.on_order_cancelled(order));
    }

    fn on_cancel_rejected(
        &mut self,
        sec_sid: SecSid,
        order_sid: OrderSid,
        reject_type: OrderRejectType,
        timestamp: NanoOfDay,
    ) {
        self.publish_logged_at(
            UpdateEventBody::CancelRejected {
                sec_sid,
                order_sid,
                reject_type,
            },
            timestamp,
        );
        self.forward(|d| d.on_cancel_rejected(sec_sid, order_sid, reject_type, timestamp));
    }

    fn on_end_of_recovery(&mut self) {
        self.publish_logged(UpdateEventBody::EndOfRecovery);
        self.forward(|d| d.on_end_of_recovery());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::updates::sequencer::ChannelSequencers;
    use crate::domain::order::ExecutionId;
    use crate::shared::timestamp::ManualTimer;
    use crate::shared::types::Side;
    use std::thread;

    fn producer(sequencers: &ChannelSequencers, channel_id: u32) -> (OrderUpdateEventProducer, Receiver<UpdateEvent>) {
        let timer = Arc::new(ManualTimer::starting_at(500));
        let mut producer = OrderUpdateEventProducer::new(sequencers.get_or_create(channel_id), timer);
        let (subscriber, rx) = ChannelSubscriber::new();
        producer.subscribe(Box::new(subscriber));
        (producer, rx)
    }

    #[test]
    fn test_each_callback_is_one_sequenced_event() {
        let sequencers = ChannelSequencers::new();
        let (mut producer, rx) = producer(&sequencers, 4);

        let mut order = Order::new(1, 7, Side::Sell, 100, 10, 0);
        order.accept(11, 1);
        producer.on_order_accepted(&order);
        order.fill(10, 2);
        let trade = Trade::from_fill(1, &order, ExecutionId::new("T1"), 100, 10, 2);
        producer.on_trade_created(&trade);
        producer.on_cancel_rejected(7, 99, OrderRejectType::UnknownOrder, 3);
        producer.on_end_of_recovery();

        let events: Vec<UpdateEvent> = rx.try_iter().collect();
        assert_eq!(events.len(), 4);
        let seqs: Vec<u64> = events.iter().map(|e| e.header.channel_seq).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4]);
        assert!(events.iter().all(|e| e.header.channel_id == 4));
        let timestamps: Vec<NanoOfDay> = events.iter().map(|e| e.header.timestamp).collect();
        // 撤单拒绝沿用回调给出的时间
        assert_eq!(timestamps, vec![500, 500, 3, 500]);

        match events[1].body {
            UpdateEventBody::TradeCreated(published) => {
                assert_eq!((published.channel_id, published.channel_seq), (4, 2));
                assert_eq!(published.execution_id.as_str(), "T1");
            }
            other => panic!("unexpected body {:?}", other),
        }
        assert_eq!(events[3].body, UpdateEventBody::EndOfRecovery);
        assert_eq!(producer.published(), 4);
    }

    #[test]
    fn test_producers_on_one_channel_share_sequence() {
        let sequencers = Arc::new(ChannelSequencers::new());
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let sequencers = Arc::clone(&sequencers);
                thread::spawn(move || {
                    let (mut producer, rx) = producer(&sequencers, 1);
                    for _ in 0..200 {
                        producer.on_end_of_recovery();
                    }
                    rx.try_iter().map(|e| e.header.channel_seq).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut all: Vec<u64> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        all.sort_unstable();
        assert_eq!(all, (1..=600).collect::<Vec<u64>>());
    }
}
