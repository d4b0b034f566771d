/// Completion callbacks for order requests
///
/// Every method has a no-op default so a component only implements what it
/// listens to. `deliver` maps a lifecycle `Completion` onto exactly one
/// terminal callback.

use crate::domain::lifecycle::Completion;
use crate::domain::request::OrderRequest;
use crate::shared::error::EngineError;
use crate::shared::metrics::METRICS;
use crate::shared::types::{NanoOfDay, Owner};
use std::collections::HashMap;

pub trait OrderRequestCompletionHandler: Send {
    /// Request handed to the line handler at `sent_at`
    fn send_to_exchange(&mut self, _request: &OrderRequest, _sent_at: NanoOfDay) {}

    /// First exchange response for the request arrived at `received_at`
    fn received_from_exchange(&mut self, _request: &OrderRequest, _received_at: NanoOfDay) {}

    /// Request refused admission this cycle; it stays queued
    fn throttled(&mut self, _request: &OrderRequest) {}

    fn complete(&mut self, _request: &OrderRequest) {}

    fn complete_with_ord_sid_only(&mut self, _request: &OrderRequest) {}

    fn reject_with_ord_sid_only(&mut self, _request: &OrderRequest) {}

    fn timeout(&mut self, _request: &OrderRequest) {}

    fn timeout_after_throttled(&mut self, _request: &OrderRequest) {}

    fn fail(&mut self, _request: &OrderRequest, _cause: &EngineError) {}
}

/// Invokes the single callback named by `completion`
pub fn deliver(
    handler: &mut dyn OrderRequestCompletionHandler,
    request: &OrderRequest,
    completion: Completion,
    cause: Option<&EngineError>,
) {
    METRICS
        .completions_total
        .with_label_values(&[completion.as_str()])
        .inc();

    match completion {
        Completion::Complete => handler.complete(request),
        Completion::CompleteWithOrdSidOnly => handler.complete_with_ord_sid_only(request),
        Completion::RejectWithOrdSidOnly => handler.reject_with_ord_sid_only(request),
        Completion::Timeout { after_throttled: false } => handler.timeout(request),
        Completion::Timeout { after_throttled: true } => handler.timeout_after_throttled(request),
        Completion::Fail => {
            let fallback;
            let cause = match cause {
                Some(cause) => cause,
                None => {
                    fallback = EngineError::Unexpected(request.reason().unwrap_or("failed").to_string());
                    &fallback
                }
            };
            handler.fail(request, cause);
        }
    }
}

/// Routes callbacks to the handler registered for the request's owner
///
/// Requests whose owner has no handler go to the fallback, or are logged and
/// dropped when there is none.
#[derive(Default)]
pub struct CompletionRouter {
    routes: HashMap<Owner, Box<dyn OrderRequestCompletionHandler>>,
    fallback: Option<Box<dyn OrderRequestCompletionHandler>>,
}

impl CompletionRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, owner: Owner, handler: Box<dyn OrderRequestCompletionHandler>) {
        self.routes.insert(owner, handler);
    }

    pub fn with_fallback(mut self, handler: Box<dyn OrderRequestCompletionHandler>) -> Self {
        self.fallback = Some(handler);
        self
    }

    fn route(&mut self, request: &OrderRequest) -> Option<&mut Box<dyn OrderRequestCompletionHandler>> {
        match self.routes.get_mut(&request.owner()) {
            Some(handler) => Some(handler),
            None => {
                if self.fallback.is_none() {
                    tracing::warn!(owner = ?request.owner(), client_key = request.client_key(), "no completion route");
                }
                self.fallback.as_mut()
            }
        }
    }
}

impl OrderRequestCompletionHandler for CompletionRouter {
    fn send_to_exchange(&mut self, request: &OrderRequest, sent_at: NanoOfDay) {
        if let Some(handler) = self.route(request) {
            handler.send_to_exchange(request, sent_at);
        }
    }

    fn received_from_exchange(&mut self, request: &OrderRequest, received_at: NanoOfDay) {
        if let Some(handler) = self.route(request) {
            handler.received_from_exchange(request, received_at);
        }
    }

    fn throttled(&mut self, request: &OrderRequest) {
        if let Some(handler) = self.route(request) {
            handler.throttled(request);
        }
    }

    fn complete(&mut self, request: &OrderRequest) {
        if let Some(handler) = self.route(request) {
            handler.complete(request);
        }
    }

    fn complete_with_ord_sid_only(&mut self, request: &OrderRequest) {
        if let Some(handler) = self.route(request) {
            handler.complete_with_ord_sid_only(request);
        }
    }

    fn reject_with_ord_sid_only(&mut self, request: &OrderRequest) {
        if let Some(handler) = self.route(request) {
            handler.reject_with_ord_sid_only(request);
        }
    }

    fn timeout(&mut self, request: &OrderRequest) {
        if let Some(handler) = self.route(request) {
            handler.timeout(request);
        }
    }

    fn timeout_after_throttled(&mut self, request: &OrderRequest) {
        if let Some(handler) = self.route(request) {
            handler.timeout_after_throttled(request);
        }
    }

    fn fail(&mut self, request: &OrderRequest, cause: &EngineError) {
        if let Some(handler) = self.route(request) {
            handler.fail(request, cause);
        }
    }
}

/// Records every callback; used by tests and the CLI demo summary
#[derive(Debug, Default, Clone)]
pub struct RecordingCompletionHandler {
    pub events: Vec<(u64, &'static str)>,
}

impl RecordingCompletionHandler {
    pub fn count(&self, callback: &str) -> usize {
        self.events.iter().filter(|(_, name)| *name == callback).count()
    }

    /// Terminal callbacks received by `client_key`
    pub fn terminal_for(&self, client_key: u64) -> Vec<&'static str> {
        self.events
            .iter()
            .filter(|(key, name)| *key == client_key && !matches!(*name, "send_to_exchange" | "received_from_exchange" | "throttled"))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl OrderRequestCompletionHandler for RecordingCompletionHandler {
    fn send_to_exchange(&mut self, request: &OrderRequest, _sent_at: NanoOfDay) {
        self.events.push((request.client_key(), "send_to_exchange"));
    }

    fn received_from_exchange(&mut self, request: &OrderRequest, _received_at: NanoOfDay) {
        self.events.push((request.client_key(), "received_from_exchange"));
    }

    fn throttled(&mut self, request: &OrderRequest) {
        self.events.push((request.client_key(), "throttled"));
    }

    fn complete(&mut self, request: &OrderRequest) {
        self.events.push((request.client_key(), "complete"));
    }

    fn complete_with_ord_sid_only(&mut self, request: &OrderRequest) {
        self.events.push((request.client_key(), "complete_with_ord_sid_only"));
    }

    fn reject_with_ord_sid_only(&mut self, request: &OrderRequest) {
        self.events.push((request.client_key(), "reject_with_ord_sid_only"));
    }

    fn timeout(&mut self, request: &OrderRequest) {
        self.events.push((request.client_key(), "timeout"));
    }

    fn timeout_after_throttled(&mut self, request: &OrderRequest) {
        self.events.push((request.client_key(), "timeout_after_throttled"));
    }

    fn fail(&mut self, request: &OrderRequest, _cause: &EngineError) {
        self.events.push((request.client_key(), "fail"));
    }
}
