/// Domain Layer - Core Business Logic
///
/// Pure state with no threads and no I/O: the request lifecycle, orders and
/// trades, the own order book, exposure, and market depth snapshots. Every
/// type here is owned by one pipeline stage at a time and can be tested in
/// isolation.
///
/// ## Modules
/// - `request` / `lifecycle`: order requests and their state machine
/// - `order`: Order / Trade entities
/// - `own_book`: own orders aggregated by price
/// - `exposure`: purchasing power and positions
/// - `market`: fixed-depth market snapshots

pub mod exposure;
pub mod lifecycle;
pub mod market;
pub mod order;
pub mod own_book;
pub mod request;

// Re-export key types
pub use exposure::{ExposureTracker, Position};
pub use lifecycle::{Completion, RequestEvent, RequestState};
pub use market::{DepthLevel, MarketOrderBook, MAX_DEPTH};
pub use order::{ExecutionId, Order, OrderRejectType, OrderStatus, Trade, TradeStatus};
pub use own_book::{OrderBookLevel, OwnOrderBook, OwnOrderBooks};
pub use request::{CompletionType, OrderRequest, OrderRequestKind, OrderRequestType};
