/// Scalar identifiers and enums shared by every layer
///
/// Prices are integer ticks (123.45 is carried as 12345) so that matching and
/// aggregation never touch floating point.

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// Internal security identifier
pub type SecSid = u64;

/// Internally assigned order sequence id (distinct from the exchange order id)
pub type OrderSid = u64;

/// Internally assigned trade sequence id
pub type TradeSid = u64;

/// Client-assigned correlation id, unique per caller
pub type ClientKey = u64;

/// Price in ticks
pub type Price = i64;

/// Quantity in units; signed so that deltas can be applied directly
pub type Quantity = i64;

/// Nanoseconds since local midnight
pub type NanoOfDay = i64;

/// Sentinel for "no price", e.g. the best price of an empty book
pub const NULL_PRICE: Price = Price::MIN;

/// Number of nanoseconds in a day
pub const NANOS_PER_DAY: i64 = 86_400_000_000_000;

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    #[inline]
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

/// Opaque handle identifying where completions for a request must be routed
///
/// The core never looks behind it; the message-sink layer maps it to a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Encode, Decode)]
pub struct Owner(pub u32);

/// Monotonic id source for sids
///
/// Owned by a single thread; no atomics needed.
#[derive(Debug, Clone)]
pub struct SidGenerator {
    next: u64,
}

impl SidGenerator {
    pub fn starting_at(first: u64) -> Self {
        Self { next: first }
    }

    #[inline]
    pub fn next_sid(&mut self) -> u64 {
        let sid = self.next;
        self.next += 1;
        sid
    }
}

impl Default for SidGenerator {
    fn default() -> Self {
        Self::starting_at(1)
    }
}
