/// Line handler session - 组合根
///
/// Wires the running pieces together:
///
/// ```text
///  submit ─▶ [order-executor] ─dispatch queue─▶ [line-handler] ─▶ LineHandlerEngine
///               ▲                                  │    ▲
///               └──────── ExchangeResponse ────────┘    └── apply / start_recovery
/// ```
///
/// The engine's update callbacks run on the line-handler thread and go to the
/// `updates` handler given at start.

use crate::application::completion::OrderRequestCompletionHandler;
use crate::application::executor::{ChannelDispatcher, ExchangeResponse, ExecutorHandle, OrderExecutor};
use crate::application::line_handler::{
    LineHandlerCommand, LineHandlerEngine, LineHandlerEngineRegistry, LineHandlerExceptionHandler,
};
use crate::application::throttle::ThrottleTrackers;
use crate::application::updates::MatchingEngineOrderUpdateHandler;
use crate::domain::lifecycle::RequestEvent;
use crate::domain::order::OrderRejectType;
use crate::domain::request::OrderRequest;
use crate::shared::affinity::spawn_pinned;
use crate::shared::config::EngineConfig;
use crate::shared::error::EngineError;
use crate::shared::timestamp::TimerService;
use crossbeam::channel::{bounded, unbounded, Receiver, Sender};
use crossbeam::utils::Backoff;
use futures::channel::oneshot;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

type RecoveryResult = Result<(), EngineError>;

enum Control {
    Command(LineHandlerCommand),
    Recover(oneshot::Sender<RecoveryResult>),
}

struct PendingRecovery {
    engine: oneshot::Receiver<RecoveryResult>,
    caller: oneshot::Sender<RecoveryResult>,
}

/// What is left once a session has shut down
pub struct SessionSummary<C> {
    pub completions: C,
    pub engine: Box<dyn LineHandlerEngine>,
    /// Requests still waiting or in flight at shutdown, failed with `EngineError::Shutdown`
    pub failed_at_shutdown: usize,
}

pub struct LineHandler<C: OrderRequestCompletionHandler + 'static> {
    executor: ExecutorHandle<ChannelDispatcher, C>,
    controls: Sender<Control>,
    responses: Receiver<ExchangeResponse>,
    stop: Arc<AtomicBool>,
    join: JoinHandle<Box<dyn LineHandlerEngine>>,
    timer: Arc<dyn TimerService>,
}

impl<C: OrderRequestCompletionHandler + 'static> LineHandler<C> {
    /// Validates `config`, builds the configured engine and starts both threads
    pub fn start(
        config: &EngineConfig,
        registry: &LineHandlerEngineRegistry,
        timer: Arc<dyn TimerService>,
        completions: C,
        updates: Box<dyn MatchingEngineOrderUpdateHandler>,
        exceptions: Box<dyn LineHandlerExceptionHandler>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let settings = &config.line_handler;

        let mut engine = registry.create(&settings.engine, config, Arc::clone(&timer))?;
        let (responses_tx, responses) = unbounded();
        engine.init(updates, responses_tx.clone())?;

        let (dispatch_tx, dispatch_rx) = bounded(settings.dispatch_queue_capacity);
        let (controls, controls_rx) = bounded(settings.dispatch_queue_capacity);
        let stop = Arc::new(AtomicBool::new(false));

        let join = {
            let stop = Arc::clone(&stop);
            spawn_pinned("line-handler", settings.cpu_core, move || {
                run_line_handler(engine, dispatch_rx, controls_rx, responses_tx, exceptions, stop)
            })?
        };

        let executor = OrderExecutor::new(
            &config.executor,
            ThrottleTrackers::from_config(&config.throttles),
            ChannelDispatcher::new(dispatch_tx),
            completions,
        );
        let executor = match ExecutorHandle::spawn(executor, &config.executor, Arc::clone(&timer), responses.clone()) {
            Ok(executor) => executor,
            Err(e) => {
                stop.store(true, Ordering::Release);
                if join.join().is_err() {
                    tracing::error!("line handler thread panicked");
                }
                return Err(e);
            }
        };

        tracing::info!(engine = %settings.engine, channel_id = settings.channel_id, "line handler session started");
        Ok(Self {
            executor,
            controls,
            responses,
            stop,
            join,
            timer,
        })
    }

    /// Blocks while the executor's request queue is full
    pub fn submit(&self, request: OrderRequest) -> Result<(), EngineError> {
        self.executor.submit(request)
    }

    pub fn submitter(&self) -> Sender<OrderRequest> {
        self.executor.submitter()
    }

    /// Market-side input, applied in call order and ahead of requests submitted after it
    pub fn apply(&self, command: LineHandlerCommand) -> Result<(), EngineError> {
        self.controls
            .send(Control::Command(command))
            .map_err(|_| EngineError::Shutdown)
    }

    /// Resolves once the engine reports the end of recovery; cancelled if the session stops first
    pub fn start_recovery(&self) -> oneshot::Receiver<RecoveryResult> {
        let (caller, done) = oneshot::channel();
        if self.controls.send(Control::Recover(caller)).is_err() {
            tracing::warn!("recovery requested after line handler stopped");
        }
        done
    }

    /// Stops both threads, settles late responses and fails whatever is still outstanding
    pub fn shutdown(self) -> Result<SessionSummary<C>, EngineError> {
        let executor = self.executor.shutdown();
        self.stop.store(true, Ordering::Release);
        let engine = self
            .join
            .join()
            .map_err(|_| EngineError::Unexpected("line handler thread panicked".into()))?;
        let mut executor = executor?;

        let now = self.timer.nano_of_day();
        for response in self.responses.try_iter() {
            executor.on_response(response, now);
        }
        let failed_at_shutdown = executor.fail_outstanding();
        let (_, completions) = executor.into_parts();

        tracing::info!(failed_at_shutdown, clear = engine.is_clear(), "line handler session stopped");
        Ok(SessionSummary {
            completions,
            engine,
            failed_at_shutdown,
        })
    }
}

fn report(exceptions: &mut dyn LineHandlerExceptionHandler, cause: &EngineError) {
    match cause {
        EngineError::Disconnected => exceptions.on_disconnected(),
        other => exceptions.on_error(other),
    }
}

fn poll_recoveries(pending: &mut Vec<PendingRecovery>) -> bool {
    if pending.is_empty() {
        return false;
    }

    let mut progressed = false;
    for mut recovery in std::mem::take(pending) {
        let result = match recovery.engine.try_recv() {
            Ok(None) => {
                pending.push(recovery);
                continue;
            }
            Ok(Some(result)) => result,
            Err(_) => Err(EngineError::Shutdown),
        };
        progressed = true;
        if recovery.caller.send(result).is_err() {
            tracing::debug!("recovery caller went away");
        }
    }
    progressed
}

fn run_line_handler(
    mut engine: Box<dyn LineHandlerEngine>,
    dispatch: Receiver<OrderRequest>,
    controls: Receiver<Control>,
    responses: Sender<ExchangeResponse>,
    mut exceptions: Box<dyn LineHandlerExceptionHandler>,
    stop: Arc<AtomicBool>,
) -> Box<dyn LineHandlerEngine> {
    tracing::info!(engine = engine.name(), "line handler started");
    let backoff = Backoff::new();
    let mut recoveries = Vec::new();

    loop {
        let mut busy = false;

        // 行情先于订单处理
        for control in controls.try_iter() {
            busy = true;
            match control {
                Control::Command(command) => {
                    if let Err(cause) = engine.apply(command) {
                        report(exceptions.as_mut(), &cause);
                    }
                }
                Control::Recover(caller) => recoveries.push(PendingRecovery {
                    engine: engine.start_recovery(),
                    caller,
                }),
            }
        }

        for request in dispatch.try_iter() {
            busy = true;
            if let Err(cause) = engine.send_order_request(&request) {
                report(exceptions.as_mut(), &cause);
                let failed = ExchangeResponse::new(request.client_key(), RequestEvent::Fail)
                    .rejected(OrderRejectType::ExchangeReject, cause.to_string());
                if responses.send(failed).is_err() {
                    tracing::warn!(client_key = request.client_key(), "response channel closed");
                }
            }
        }

        busy |= poll_recoveries(&mut recoveries);

        if stop.load(Ordering::Acquire) && !busy {
            break;
        }

        if busy {
            backoff.reset();
        } else if backoff.is_completed() {
            thread::yield_now();
        } else {
            backoff.snooze();
        }
    }

    tracing::info!(engine = engine.name(), clear = engine.is_clear(), "line handler stopped");
    engine
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::completion::RecordingCompletionHandler;
    use crate::application::line_handler::LoggingExceptionHandler;
    use crate::application::updates::{
        ChannelSequencers, ChannelSubscriber, OrderUpdateEventProducer, UpdateEvent, UpdateEventBody,
    };
    use crate::domain::market::MarketOrderBook;
    use crate::shared::timestamp::ManualTimer;
    use crate::shared::types::{Owner, Side};

    fn start(config: &EngineConfig) -> (LineHandler<RecordingCompletionHandler>, Receiver<UpdateEvent>) {
        let timer: Arc<dyn TimerService> = Arc::new(ManualTimer::starting_at(1_000));
        let sequencers = ChannelSequencers::new();
        let mut producer = OrderUpdateEventProducer::new(sequencers.get_or_create(config.line_handler.channel_id), Arc::clone(&timer));
        let (subscriber, events) = ChannelSubscriber::new();
        producer.subscribe(Box::new(subscriber));

        let session = LineHandler::start(
            config,
            &LineHandlerEngineRegistry::default(),
            timer,
            RecordingCompletionHandler::default(),
            Box::new(producer),
            Box::new(LoggingExceptionHandler),
        )
        .unwrap();
        (session, events)
    }

    #[test]
    fn test_order_flows_through_session() {
        let (session, events) = start(&EngineConfig::default());
        let book = MarketOrderBook::from_levels(7, &[(90, 10)], &[(99, 5)]).unwrap();
        session
            .apply(LineHandlerCommand::MarketDepth { timestamp: 1_000, book })
            .unwrap();
        session
            .submit(OrderRequest::new_order(1, Owner(1), 7, Side::Buy, 100, 10))
            .unwrap();

        let summary = session.shutdown().unwrap();
        assert_eq!(summary.completions.terminal_for(1), vec!["complete_with_ord_sid_only"]);
        assert_eq!(summary.failed_at_shutdown, 0);
        assert!(!summary.engine.is_clear());

        let names: Vec<&str> = events.try_iter().map(|e| e.body.name()).collect();
        assert_eq!(names, vec!["order_accepted", "trade_created"]);
    }

    #[test]
    fn test_recovery_round_trip() {
        let (session, events) = start(&EngineConfig::default());
        let mut done = session.start_recovery();

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        let result = loop {
            if let Ok(Some(result)) = done.try_recv() {
                break result;
            }
            assert!(std::time::Instant::now() < deadline, "recovery never completed");
            thread::yield_now();
        };
        assert_eq!(result, Ok(()));

        session.shutdown().unwrap();
        let last = events.try_iter().last().map(|e| e.body);
        assert_eq!(last, Some(UpdateEventBody::EndOfRecovery));
    }

    #[test]
    fn test_unknown_engine_fails_before_spawning() {
        let mut config = EngineConfig::default();
        config.line_handler.engine = "fix".into();
        let result = LineHandler::start(
            &config,
            &LineHandlerEngineRegistry::default(),
            Arc::new(ManualTimer::starting_at(0)),
            RecordingCompletionHandler::default(),
            Box::new(RecordingUpdates),
            Box::new(LoggingExceptionHandler),
        );
        assert!(matches!(result, Err(EngineError::UnknownEngine(tag)) if tag == "fix"));
    }

    struct RecordingUpdates;

    impl MatchingEngineOrderUpdateHandler for RecordingUpdates {}
}
