/// Own order book
///
/// Tracks only the participant's own working orders, aggregated by price:
/// `OrderBookLevel` → `SingleSidedOwnOrderBook` (bid/ask) → `OwnOrderBook`
/// (one security) → `OwnOrderBooks` (all securities). Used for pre-trade
/// checks such as self-cross detection without scanning every order.

pub mod book;
pub mod level;
pub mod side;

pub use book::{OwnOrderBook, OwnOrderBooks};
pub use level::OrderBookLevel;
pub use side::{AskOrdering, AskOwnOrderBook, BidOrdering, BidOwnOrderBook, SideOrdering, SingleSidedOwnOrderBook};
