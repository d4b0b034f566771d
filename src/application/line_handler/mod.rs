/// Line handler - 交易所接入层
///
/// The line handler is the only stage allowed to block on exchange I/O. It
/// drains the executor's dispatch queue on its own thread, forwards each
/// request to a `LineHandlerEngine`, and feeds the engine's responses back to
/// the executor.
///
/// - `simulated`: in-process exchange built on the single-threaded matching engine
/// - `registry`: configuration tag → engine constructor
/// - `session`: the `LineHandler` composition root

pub mod registry;
pub mod session;
pub mod simulated;

use crate::application::executor::ExchangeResponse;
use crate::application::updates::MatchingEngineOrderUpdateHandler;
use crate::domain::market::MarketOrderBook;
use crate::domain::request::OrderRequest;
use crate::shared::error::EngineError;
use crate::shared::types::NanoOfDay;
use crossbeam::channel::Sender;
use futures::channel::oneshot;

pub use registry::{LineHandlerEngineFactory, LineHandlerEngineRegistry};
pub use session::{LineHandler, SessionSummary};
pub use simulated::SimulatedLineHandlerEngine;

/// Market-side input applied to an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineHandlerCommand {
    MarketDepth { timestamp: NanoOfDay, book: MarketOrderBook },
    TradeTick { timestamp: NanoOfDay },
}

pub trait LineHandlerEngine: Send {
    /// Registry tag
    fn name(&self) -> &'static str;

    /// Connects the engine to its update chain and response channel; must run before any traffic
    fn init(
        &mut self,
        updates: Box<dyn MatchingEngineOrderUpdateHandler>,
        responses: Sender<ExchangeResponse>,
    ) -> Result<(), EngineError>;

    fn send_order_request(&mut self, request: &OrderRequest) -> Result<(), EngineError>;

    fn apply(&mut self, command: LineHandlerCommand) -> Result<(), EngineError>;

    /// Resolved once replay has caught up (after `on_end_of_recovery` was emitted)
    fn start_recovery(&mut self) -> oneshot::Receiver<Result<(), EngineError>>;

    /// No working orders and nothing pending
    fn is_clear(&self) -> bool;
}

/// Connection-level failures reported by the line-handler thread
pub trait LineHandlerExceptionHandler: Send {
    fn on_disconnected(&mut self) {}

    fn on_error(&mut self, _cause: &EngineError) {}
}

/// Logs and carries on
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingExceptionHandler;

impl LineHandlerExceptionHandler for LoggingExceptionHandler {
    fn on_disconnected(&mut self) {
        tracing::error!("line handler disconnected");
    }

    fn on_error(&mut self, cause: &EngineError) {
        tracing::warn!(error = %cause, "line handler error");
    }
}
