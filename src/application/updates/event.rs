/// Update event wire form
///
/// Self-describing: a header with channel identity, sequence and timestamp,
/// then a tagged body. Encoded with bincode's standard config into a caller
/// supplied buffer.

use crate::domain::order::{Order, OrderRejectType, Trade};
use crate::shared::error::EngineError;
use crate::shared::types::{NanoOfDay, OrderSid, SecSid};
use bincode::{config, Decode, Encode};

/// Size of a producer's scratch buffer; every event fits
pub const UPDATE_EVENT_MAX_LEN: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct EventHeader {
    pub channel_id: u32,
    pub channel_seq: u64,
    pub timestamp: NanoOfDay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum UpdateEventBody {
    OrderAccepted(Order),
    OrderAmended(Order),
    OrderExpired(Order),
    OrderRejected(Order),
    OrderCancelled(Order),
    CancelRejected {
        sec_sid: SecSid,
        order_sid: OrderSid,
        reject_type: OrderRejectType,
    },
    TradeCreated(Trade),
    /// Control signal; carries nothing beyond the header
    EndOfRecovery,
}

impl UpdateEventBody {
    pub fn name(&self) -> &'static str {
        match self {
            UpdateEventBody::OrderAccepted(_) => "order_accepted",
            UpdateEventBody::OrderAmended(_) => "order_amended",
            UpdateEventBody::OrderExpired(_) => "order_expired",
            UpdateEventBody::OrderRejected(_) => "order_rejected",
            UpdateEventBody::OrderCancelled(_) => "order_cancelled",
            UpdateEventBody::CancelRejected { .. } => "cancel_rejected",
            UpdateEventBody::TradeCreated(_) => "trade_created",
            UpdateEventBody::EndOfRecovery => "end_of_recovery",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct UpdateEvent {
    pub header: EventHeader,
    pub body: UpdateEventBody,
}

impl UpdateEvent {
    /// Encodes into `buf`, returning the number of bytes written
    pub fn encode_into(&self, buf: &mut [u8]) -> Result<usize, EngineError> {
        bincode::encode_into_slice(self, buf, config::standard()).map_err(|e| EngineError::Codec(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, EngineError> {
        let (event, _) =
            bincode::decode_from_slice(bytes, config::standard()).map_err(|e| EngineError::Codec(e.to_string()))?;
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::ExecutionId;
    use crate::shared::types::Side;

    fn header(seq: u64) -> EventHeader {
        EventHeader {
            channel_id: 2,
            channel_seq: seq,
            timestamp: 1_000,
        }
    }

    #[test]
    fn test_trade_event_fits_and_decodes() {
        let mut order = Order::new(1, 7, Side::Buy, 100, 10, 5);
        order.accept(u64::MAX, 6);
        order.fill(4, 7);
        let mut trade = Trade::from_fill(u64::MAX, &order, ExecutionId::new("EXEC-1"), 99, 4, i64::MAX);
        trade.assign_channel(u32::MAX, u64::MAX);

        let event = UpdateEvent {
            header: header(u64::MAX),
            body: UpdateEventBody::TradeCreated(trade),
        };
        let mut buf = [0u8; UPDATE_EVENT_MAX_LEN];
        let len = event.encode_into(&mut buf).unwrap();
        assert!(len < UPDATE_EVENT_MAX_LEN);
        assert_eq!(UpdateEvent::decode(&buf[..len]).unwrap(), event);
    }

    #[test]
    fn test_end_of_recovery_is_header_only() {
        let event = UpdateEvent {
            header: header(9),
            body: UpdateEventBody::EndOfRecovery,
        };
        let mut buf = [0u8; UPDATE_EVENT_MAX_LEN];
        let len = event.encode_into(&mut buf).unwrap();
        assert!(len <= 1 + 5 + 10 + 10);
        assert_eq!(UpdateEvent::decode(&buf[..len]).unwrap().body.name(), "end_of_recovery");
    }

    #[test]
    fn test_small_buffer_is_codec_error() {
        let event = UpdateEvent {
            header: header(1),
            body: UpdateEventBody::EndOfRecovery,
        };
        let mut buf = [0u8; 2];
        assert!(matches!(event.encode_into(&mut buf), Err(EngineError::Codec(_))));
    }

    #[test]
    fn test_truncated_bytes_fail_to_decode() {
        assert!(matches!(UpdateEvent::decode(&[]), Err(EngineError::Codec(_))));
    }
}
