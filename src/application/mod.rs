/// Application Layer - 订单处理流水线
///
/// Orchestrates the domain types into the running pipeline. Each stage owns
/// its state on one thread; stages talk over channels or ring buffers.
///
/// ## Modules
/// - `throttle`: sliding-window admission slots
/// - `completion`: request completion callbacks and routing
/// - `executor`: throttle-aware order executor
/// - `matching`: single- and multi-threaded matching engines
/// - `updates`: order update handlers, sequencing and event production
/// - `line_handler`: exchange-facing engines and the session composition root

pub mod completion;
pub mod executor;
pub mod line_handler;
pub mod matching;
pub mod throttle;
pub mod updates;

// Re-export key services
pub use completion::{CompletionRouter, OrderRequestCompletionHandler};
pub use executor::{ExchangeResponse, ExecutorHandle, OrderExecutor, RequestDispatcher};
pub use line_handler::{LineHandler, LineHandlerCommand, LineHandlerEngine, LineHandlerEngineRegistry};
pub use matching::{MatchedHandler, MatchingEngine, MultiThreadedMatchingEngine, SingleThreadedMatchingEngine};
pub use throttle::{SlidingWindowThrottleTracker, ThrottleTracker, ThrottleTrackers};
pub use updates::{MatchingEngineOrderUpdateHandler, OrderStateTracker, OrderUpdateEventProducer};
