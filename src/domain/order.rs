/// Order and Trade entities
///
/// An `Order` is created when the exchange-facing layer accepts a new order
/// request, mutated on amend / partial fill / cancel, and terminal once filled,
/// cancelled, rejected or expired. Mutators run on the single thread that owns
/// the order at that stage of the pipeline.
///
/// A `Trade` is immutable once built except for its channel fields, which the
/// update producer stamps at publish time.

use crate::shared::types::{NanoOfDay, OrderSid, Price, Quantity, SecSid, Side, TradeSid};
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
pub enum OrderStatus {
    PendingNew,
    New,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
    Expired,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected | OrderStatus::Expired
        )
    }
}

/// Typed reason attached to a rejected order or request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
pub enum OrderRejectType {
    None,
    InsufficientPurchasingPower,
    InsufficientPosition,
    CrossOwnOrder,
    InvalidPrice,
    InvalidQuantity,
    UnknownOrder,
    ExchangeReject,
    Throttled,
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct Order {
    pub sid: OrderSid,
    /// Exchange-assigned id, 0 until the exchange acknowledges the order
    pub order_id: u64,
    pub sec_sid: SecSid,
    pub side: Side,
    pub limit_price: Price,
    pub quantity: Quantity,
    pub cumulative_exec_qty: Quantity,
    pub leaves_qty: Quantity,
    pub status: OrderStatus,
    pub create_time: NanoOfDay,
    pub update_time: NanoOfDay,
    pub order_reject_type: OrderRejectType,
}

impl Order {
    pub fn new(
        sid: OrderSid,
        sec_sid: SecSid,
        side: Side,
        limit_price: Price,
        quantity: Quantity,
        create_time: NanoOfDay,
    ) -> Self {
        Self {
            sid,
            order_id: 0,
            sec_sid,
            side,
            limit_price,
            quantity,
            cumulative_exec_qty: 0,
            leaves_qty: quantity,
            status: OrderStatus::PendingNew,
            create_time,
            update_time: create_time,
            order_reject_type: OrderRejectType::None,
        }
    }

    /// Quantity still working at the exchange
    #[inline]
    pub fn outstanding(&self) -> Quantity {
        self.leaves_qty
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn accept(&mut self, order_id: u64, now: NanoOfDay) {
        self.order_id = order_id;
        self.status = OrderStatus::New;
        self.update_time = now;
    }

    /// Applies an execution and returns the quantity actually filled
    ///
    /// The fill is capped at the leaves quantity.
    pub fn fill(&mut self, quantity: Quantity, now: NanoOfDay) -> Quantity {
        let filled = quantity.min(self.leaves_qty).max(0);
        self.cumulative_exec_qty += filled;
        self.leaves_qty -= filled;
        self.status = if self.leaves_qty == 0 {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        self.update_time = now;
        filled
    }

    /// Changes total quantity and price of a working order
    ///
    /// The new total must stay above what has already executed.
    pub fn amend(&mut self, quantity: Quantity, limit_price: Price, now: NanoOfDay) -> Result<(), OrderRejectType> {
        if self.is_terminal() {
            return Err(OrderRejectType::UnknownOrder);
        }
        if limit_price <= 0 {
            return Err(OrderRejectType::InvalidPrice);
        }
        if quantity <= self.cumulative_exec_qty {
            return Err(OrderRejectType::InvalidQuantity);
        }
        self.quantity = quantity;
        self.leaves_qty = quantity - self.cumulative_exec_qty;
        self.limit_price = limit_price;
        self.update_time = now;
        Ok(())
    }

    pub fn cancel(&mut self, now: NanoOfDay) {
        self.close(OrderStatus::Cancelled, now);
    }

    pub fn expire(&mut self, now: NanoOfDay) {
        self.close(OrderStatus::Expired, now);
    }

    pub fn reject(&mut self, reject_type: OrderRejectType, now: NanoOfDay) {
        self.order_reject_type = reject_type;
        self.close(OrderStatus::Rejected, now);
    }

    fn close(&mut self, status: OrderStatus, now: NanoOfDay) {
        self.leaves_qty = 0;
        self.status = status;
        self.update_time = now;
    }
}

/// Width of the fixed execution id field
pub const EXECUTION_ID_LEN: usize = 16;

/// Fixed-width execution id, space padded or truncated to `EXECUTION_ID_LEN`
#[derive(Clone, Copy, PartialEq, Eq, Hash, Encode, Decode)]
pub struct ExecutionId([u8; EXECUTION_ID_LEN]);

impl ExecutionId {
    pub fn new(raw: &str) -> Self {
        let mut bytes = [b' '; EXECUTION_ID_LEN];
        let mut len = 0;
        for ch in raw.chars() {
            let width = ch.len_utf8();
            if len + width > EXECUTION_ID_LEN {
                break;
            }
            ch.encode_utf8(&mut bytes[len..len + width]);
            len += width;
        }
        Self(bytes)
    }

    /// `prefix` followed by the decimal digits of `seq`, without allocating
    pub fn from_sequence(prefix: u8, seq: u64) -> Self {
        let mut digits = [0u8; 20];
        let mut n = seq;
        let mut len = 0;
        loop {
            digits[len] = b'0' + (n % 10) as u8;
            len += 1;
            n /= 10;
            if n == 0 {
                break;
            }
        }

        let mut bytes = [b' '; EXECUTION_ID_LEN];
        bytes[0] = prefix;
        for (i, digit) in digits[..len].iter().rev().take(EXECUTION_ID_LEN - 1).enumerate() {
            bytes[i + 1] = *digit;
        }
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; EXECUTION_ID_LEN] {
        &self.0
    }

    /// The id without its padding
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or_default().trim_end_matches(' ')
    }
}

impl fmt::Debug for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExecutionId({:?})", self.as_str())
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
pub enum TradeStatus {
    New,
    Cancelled,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct Trade {
    pub sid: TradeSid,
    pub order_sid: OrderSid,
    pub order_id: u64,
    pub sec_sid: SecSid,
    pub side: Side,
    pub execution_id: ExecutionId,
    pub execution_price: Price,
    pub execution_qty: Quantity,
    pub cumulative_qty: Quantity,
    pub leaves_qty: Quantity,
    pub order_status: OrderStatus,
    pub trade_status: TradeStatus,
    pub create_time: NanoOfDay,
    pub update_time: NanoOfDay,
    pub channel_id: u32,
    pub channel_seq: u64,
}

impl Trade {
    /// Builds a trade from an order that already reflects the fill
    pub fn from_fill(
        sid: TradeSid,
        order: &Order,
        execution_id: ExecutionId,
        execution_price: Price,
        execution_qty: Quantity,
        now: NanoOfDay,
    ) -> Self {
        Self {
            sid,
            order_sid: order.sid,
            order_id: order.order_id,
            sec_sid: order.sec_sid,
            side: order.side,
            execution_id,
            execution_price,
            execution_qty,
            cumulative_qty: order.cumulative_exec_qty,
            leaves_qty: order.leaves_qty,
            order_status: order.status,
            trade_status: TradeStatus::New,
            create_time: now,
            update_time: now,
            channel_id: 0,
            channel_seq: 0,
        }
    }

    pub fn assign_channel(&mut self, channel_id: u32, channel_seq: u64) {
        self.channel_id = channel_id;
        self.channel_seq = channel_seq;
    }
}
