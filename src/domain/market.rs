/// Market depth snapshot
///
/// Fixed-capacity, `Copy` array of levels per side so a snapshot can be
/// copied into a pre-allocated ring slot without touching the heap. Bids are
/// stored best (highest) first, asks best (lowest) first.

use crate::shared::error::MarketDataError;
use crate::shared::types::{Price, Quantity, SecSid, Side};

/// Levels kept per side
pub const MAX_DEPTH: usize = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DepthLevel {
    pub price: Price,
    pub quantity: Quantity,
}

impl DepthLevel {
    pub fn new(price: Price, quantity: Quantity) -> Self {
        Self { price, quantity }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketOrderBook {
    sec_sid: SecSid,
    bids: [DepthLevel; MAX_DEPTH],
    bid_count: usize,
    asks: [DepthLevel; MAX_DEPTH],
    ask_count: usize,
}

impl Default for MarketOrderBook {
    fn default() -> Self {
        Self::new(0)
    }
}

impl MarketOrderBook {
    pub fn new(sec_sid: SecSid) -> Self {
        Self {
            sec_sid,
            bids: [DepthLevel::default(); MAX_DEPTH],
            bid_count: 0,
            asks: [DepthLevel::default(); MAX_DEPTH],
            ask_count: 0,
        }
    }

    /// Builds a snapshot from `(price, quantity)` pairs, best level first
    pub fn from_levels(
        sec_sid: SecSid,
        bids: &[(Price, Quantity)],
        asks: &[(Price, Quantity)],
    ) -> Result<Self, MarketDataError> {
        let mut book = Self::new(sec_sid);
        for &(price, quantity) in bids {
            book.push(Side::Buy, price, quantity)?;
        }
        for &(price, quantity) in asks {
            book.push(Side::Sell, price, quantity)?;
        }
        book.validate()?;
        Ok(book)
    }

    pub fn sec_sid(&self) -> SecSid {
        self.sec_sid
    }

    /// Appends a level behind the current worst one on `side`
    pub fn push(&mut self, side: Side, price: Price, quantity: Quantity) -> Result<(), MarketDataError> {
        let (levels, count) = self.side_mut(side);
        if *count == MAX_DEPTH {
            return Err(MarketDataError::DepthExceeded { max: MAX_DEPTH });
        }
        levels[*count] = DepthLevel::new(price, quantity);
        *count += 1;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.bid_count = 0;
        self.ask_count = 0;
    }

    pub fn levels(&self, side: Side) -> &[DepthLevel] {
        match side {
            Side::Buy => &self.bids[..self.bid_count],
            Side::Sell => &self.asks[..self.ask_count],
        }
    }

    pub fn bids(&self) -> &[DepthLevel] {
        self.levels(Side::Buy)
    }

    pub fn asks(&self) -> &[DepthLevel] {
        self.levels(Side::Sell)
    }

    pub fn best(&self, side: Side) -> Option<DepthLevel> {
        self.levels(side).first().copied()
    }

    /// Takes `quantity` off the best level of `side`, dropping the level once empty
    pub fn consume_best(&mut self, side: Side, quantity: Quantity) {
        let (levels, count) = self.side_mut(side);
        if *count == 0 {
            return;
        }
        levels[0].quantity -= quantity;
        if levels[0].quantity <= 0 {
            levels.copy_within(1..*count, 0);
            *count -= 1;
        }
    }

    /// Checks prices/quantities are positive, each side strictly ordered and the book uncrossed
    pub fn validate(&self) -> Result<(), MarketDataError> {
        for side in [Side::Buy, Side::Sell] {
            let levels = self.levels(side);
            for (index, level) in levels.iter().enumerate() {
                if level.price <= 0 {
                    return Err(MarketDataError::NonPositivePrice {
                        side,
                        index,
                        price: level.price,
                    });
                }
                if level.quantity <= 0 {
                    return Err(MarketDataError::NonPositiveQuantity { side, index });
                }
                if index > 0 {
                    let previous = levels[index - 1].price;
                    let ordered = match side {
                        Side::Buy => level.price < previous,
                        Side::Sell => level.price > previous,
                    };
                    if !ordered {
                        return Err(MarketDataError::NotSorted { side, index });
                    }
                }
            }
        }

        if let (Some(bid), Some(ask)) = (self.best(Side::Buy), self.best(Side::Sell)) {
            if bid.price >= ask.price {
                return Err(MarketDataError::Crossed {
                    bid: bid.price,
                    ask: ask.price,
                });
            }
        }
        Ok(())
    }

    fn side_mut(&mut self, side: Side) -> (&mut [DepthLevel; MAX_DEPTH], &mut usize) {
        match side {
            Side::Buy => (&mut self.bids, &mut self.bid_count),
            Side::Sell => (&mut self.asks, &mut self.ask_count),
        }
    }
}
