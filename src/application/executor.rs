/// Order Executor - 订单请求准入与派发
///
/// Owns every in-flight `OrderRequest` from submission to completion:
///
/// 1. `submit`: registers the request (duplicate keys and requests that no
///    throttle pool could ever admit fail immediately)
/// 2. `run_cycle`: admits waiting requests in FIFO order, at most
///    `max_batch_size` per cycle, and hands them to the `RequestDispatcher`
/// 3. `on_response`: feeds exchange responses into the lifecycle
/// 4. `sweep_timeouts`: periodic local timeout of expired requests
///
/// Within one cycle, once a pool refuses a request every later request for
/// that pool is throttled too, so a small request cannot overtake a larger
/// one queued before it.
///
/// The executor never performs I/O itself: the dispatcher only enqueues for
/// the line-handler thread.

use crate::application::completion::{deliver, OrderRequestCompletionHandler};
use crate::application::throttle::ThrottleTrackers;
use crate::domain::lifecycle::{Completion, RequestEvent, RequestState};
use crate::domain::order::OrderRejectType;
use crate::domain::request::OrderRequest;
use crate::shared::affinity::spawn_pinned;
use crate::shared::config::ExecutorConfig;
use crate::shared::error::EngineError;
use crate::shared::metrics::METRICS;
use crate::shared::timestamp::TimerService;
use crate::shared::types::{ClientKey, NanoOfDay, OrderSid};
use crossbeam::channel::{bounded, Receiver, Sender};
use crossbeam::utils::Backoff;
use smallvec::SmallVec;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Hand-off from the executor to the line handler
pub trait RequestDispatcher: Send {
    /// Enqueues `request` for transmission; must not block on exchange I/O
    fn dispatch(&mut self, request: &OrderRequest) -> Result<(), EngineError>;

    /// Called once after a cycle that dispatched at least one request
    fn flush(&mut self) -> Result<(), EngineError> {
        Ok(())
    }
}

/// Dispatches into a bounded channel drained by the line-handler thread
pub struct ChannelDispatcher {
    tx: Sender<OrderRequest>,
}

impl ChannelDispatcher {
    pub fn new(tx: Sender<OrderRequest>) -> Self {
        Self { tx }
    }
}

impl RequestDispatcher for ChannelDispatcher {
    fn dispatch(&mut self, request: &OrderRequest) -> Result<(), EngineError> {
        self.tx.try_send(request.clone()).map_err(|e| {
            if e.is_full() {
                EngineError::Dispatch("line handler queue full".into())
            } else {
                EngineError::Disconnected
            }
        })
    }
}

/// Exchange (or simulated exchange) outcome for one request
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeResponse {
    pub client_key: ClientKey,
    pub event: RequestEvent,
    pub order_sid: Option<OrderSid>,
    pub reject_type: OrderRejectType,
    pub reason: Option<String>,
}

impl ExchangeResponse {
    pub fn new(client_key: ClientKey, event: RequestEvent) -> Self {
        Self {
            client_key,
            event,
            order_sid: None,
            reject_type: OrderRejectType::None,
            reason: None,
        }
    }

    pub fn with_order_sid(mut self, order_sid: OrderSid) -> Self {
        self.order_sid = Some(order_sid);
        self
    }

    pub fn rejected(mut self, reject_type: OrderRejectType, reason: impl Into<String>) -> Self {
        self.reject_type = reject_type;
        self.reason = Some(reason.into());
        self
    }
}

/// What one `run_cycle` did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub dispatched: usize,
    pub throttled: usize,
    pub timed_out: usize,
    pub failed: usize,
}

impl CycleReport {
    pub fn is_idle(&self) -> bool {
        *self == CycleReport::default()
    }
}

pub struct OrderExecutor<D: RequestDispatcher, C: OrderRequestCompletionHandler> {
    throttles: ThrottleTrackers,
    dispatcher: D,
    completions: C,
    /// 等待准入的请求（FIFO）
    waiting: VecDeque<OrderRequest>,
    /// 已派发、等待交易所回报的请求
    in_flight: HashMap<ClientKey, OrderRequest>,
    active_keys: HashSet<ClientKey>,
    max_batch_size: usize,
    sweep_interval_ns: i64,
    /// 未指定期限的请求使用 now + default_timeout_ns
    default_timeout_ns: i64,
    last_sweep: NanoOfDay,
}

impl<D: RequestDispatcher, C: OrderRequestCompletionHandler> OrderExecutor<D, C> {
    pub fn new(config: &ExecutorConfig, throttles: ThrottleTrackers, dispatcher: D, completions: C) -> Self {
        Self {
            throttles,
            dispatcher,
            completions,
            waiting: VecDeque::new(),
            in_flight: HashMap::new(),
            active_keys: HashSet::new(),
            max_batch_size: config.max_batch_size.max(1),
            sweep_interval_ns: config.sweep_interval_ns,
            default_timeout_ns: config.default_timeout_ns,
            last_sweep: NanoOfDay::MIN,
        }
    }

    /// Registers a request for admission in the next cycle
    ///
    /// A request without a deadline gets `now + default_timeout_ns`.
    pub fn submit(&mut self, mut request: OrderRequest, now: NanoOfDay) {
        let request_type = request.request_type();
        METRICS
            .requests_total
            .with_label_values(&[request_type.as_str()])
            .inc();

        if self.active_keys.contains(&request.client_key()) {
            let cause = EngineError::DuplicateClientKey(request.client_key());
            tracing::warn!(client_key = request.client_key(), "duplicate client key");
            self.fail_unregistered(request, cause);
            return;
        }

        if request.throttle_check_required() {
            if let Err(cause) = self.throttles.check_admissible(
                request.assigned_throttle_tracker_index(),
                request.num_throttle_required_to_proceed(),
            ) {
                tracing::warn!(client_key = request.client_key(), error = %cause, "request can never be admitted");
                self.fail_unregistered(request, cause);
                return;
            }
        }

        if request.timeout_at_nano_of_day() == NanoOfDay::MAX {
            request = request.with_timeout_at(now.saturating_add(self.default_timeout_ns));
        }

        request.on_event(RequestEvent::creation_for(request_type));
        tracing::debug!(client_key = request.client_key(), request_type = request_type.as_str(), "request submitted");
        self.active_keys.insert(request.client_key());
        self.waiting.push_back(request);
    }

    /// Admits and dispatches waiting requests; runs the timeout sweep when due
    pub fn run_cycle(&mut self, now: NanoOfDay) -> CycleReport {
        let mut report = CycleReport::default();

        if now.saturating_sub(self.last_sweep) >= self.sweep_interval_ns {
            report.timed_out += self.sweep_timeouts(now);
        }

        let mut pending = std::mem::take(&mut self.waiting);
        let mut blocked_pools: SmallVec<[usize; 4]> = SmallVec::new();

        while let Some(mut request) = pending.pop_front() {
            if report.dispatched >= self.max_batch_size {
                self.waiting.push_back(request);
                self.waiting.append(&mut pending);
                break;
            }

            if request.is_expired_at(now) {
                self.complete_with_event(request, RequestEvent::Timeout, None);
                report.timed_out += 1;
                continue;
            }

            if request.throttle_check_required() {
                let pool = request.assigned_throttle_tracker_index();
                let admitted = !blocked_pools.contains(&pool)
                    && match self.throttles.get_mut(pool) {
                        Ok(tracker) => tracker.try_acquire(request.num_throttle_required_to_proceed(), now),
                        Err(cause) => {
                            self.complete_with_event(request, RequestEvent::Fail, Some(&cause));
                            report.failed += 1;
                            continue;
                        }
                    };

                if !admitted {
                    if !blocked_pools.contains(&pool) {
                        blocked_pools.push(pool);
                    }
                    self.throttle(&mut request, pool);
                    report.throttled += 1;
                    self.waiting.push_back(request);
                    continue;
                }
            }

            match self.dispatcher.dispatch(&request) {
                Ok(()) => {
                    request.on_event(RequestEvent::Send);
                    self.completions.send_to_exchange(&request, now);
                    self.in_flight.insert(request.client_key(), request);
                    report.dispatched += 1;
                }
                Err(cause) if request.retry() => {
                    tracing::warn!(client_key = request.client_key(), error = %cause, "dispatch failed, will retry");
                    self.waiting.push_back(request);
                }
                Err(cause) => {
                    tracing::warn!(client_key = request.client_key(), error = %cause, "dispatch failed");
                    self.complete_with_event(request, RequestEvent::Fail, Some(&cause));
                    report.failed += 1;
                }
            }
        }

        if report.dispatched > 0 {
            METRICS.dispatch_batch_size.observe(report.dispatched as f64);
            if let Err(e) = self.dispatcher.flush() {
                tracing::warn!(error = %e, "dispatcher flush failed");
            }
        }
        report
    }

    /// Applies an exchange response to its in-flight request
    pub fn on_response(&mut self, response: ExchangeResponse, now: NanoOfDay) {
        let Some(request) = self.in_flight.get_mut(&response.client_key) else {
            tracing::debug!(client_key = response.client_key, event = ?response.event, "response for unknown or completed request");
            return;
        };

        self.completions.received_from_exchange(request, now);

        if let Some(order_sid) = response.order_sid {
            if let Err(cause) = request.assign_order_sid(order_sid) {
                tracing::error!(client_key = response.client_key, error = %cause, "order sid conflict");
                if let Some(request) = self.in_flight.remove(&response.client_key) {
                    self.complete_with_event(request, RequestEvent::Fail, Some(&cause));
                }
                return;
            }
        }

        if response.reject_type != OrderRejectType::None || response.reason.is_some() {
            request.set_reject(response.reject_type, response.reason);
        }

        if let Some(completion) = request.on_event(response.event) {
            if let Some(request) = self.in_flight.remove(&response.client_key) {
                self.finish(request, completion, None);
            }
        }
    }

    /// Times out every request whose deadline has passed; returns how many
    pub fn sweep_timeouts(&mut self, now: NanoOfDay) -> usize {
        self.last_sweep = now;
        let mut timed_out = 0;

        let waiting = std::mem::take(&mut self.waiting);
        for request in waiting {
            if request.is_expired_at(now) {
                self.complete_with_event(request, RequestEvent::Timeout, None);
                timed_out += 1;
            } else {
                self.waiting.push_back(request);
            }
        }

        let expired: Vec<ClientKey> = self
            .in_flight
            .values()
            .filter(|r| r.is_expired_at(now))
            .map(OrderRequest::client_key)
            .collect();
        for client_key in expired {
            if let Some(request) = self.in_flight.remove(&client_key) {
                self.complete_with_event(request, RequestEvent::Timeout, None);
                timed_out += 1;
            }
        }

        if timed_out > 0 {
            tracing::warn!(timed_out, "requests timed out");
        }
        timed_out
    }

    /// Fails every waiting and in-flight request with `EngineError::Shutdown`
    pub fn fail_outstanding(&mut self) -> usize {
        let mut requests: Vec<OrderRequest> = self.waiting.drain(..).collect();
        requests.extend(self.in_flight.drain().map(|(_, request)| request));
        let failed = requests.len();
        for request in requests {
            self.complete_with_event(request, RequestEvent::Fail, Some(&EngineError::Shutdown));
        }
        if failed > 0 {
            tracing::warn!(failed, "outstanding requests failed at shutdown");
        }
        failed
    }

    pub fn waiting_len(&self) -> usize {
        self.waiting.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_idle(&self) -> bool {
        self.active_keys.is_empty()
    }

    pub fn completions(&self) -> &C {
        &self.completions
    }

    pub fn completions_mut(&mut self) -> &mut C {
        &mut self.completions
    }

    pub fn dispatcher_mut(&mut self) -> &mut D {
        &mut self.dispatcher
    }

    pub fn into_parts(self) -> (D, C) {
        (self.dispatcher, self.completions)
    }

    fn throttle(&mut self, request: &mut OrderRequest, pool: usize) {
        METRICS
            .throttled_total
            .with_label_values(&[&pool.to_string()])
            .inc();
        let first = request.state() != RequestState::Throttled;
        request.on_event(RequestEvent::throttled_for(request.request_type()));
        if first {
            tracing::debug!(client_key = request.client_key(), pool, "request throttled");
            self.completions.throttled(request);
        }
    }

    /// Terminal path for requests that were never registered
    fn fail_unregistered(&mut self, mut request: OrderRequest, cause: EngineError) {
        if let Some(completion) = request.on_event(RequestEvent::Fail) {
            deliver(&mut self.completions, &request, completion, Some(&cause));
        }
    }

    fn complete_with_event(&mut self, mut request: OrderRequest, event: RequestEvent, cause: Option<&EngineError>) {
        match request.on_event(event) {
            Some(completion) => self.finish(request, completion, cause),
            None => {
                tracing::error!(client_key = request.client_key(), ?event, state = ?request.state(), "event produced no completion");
                self.active_keys.remove(&request.client_key());
            }
        }
    }

    fn finish(&mut self, request: OrderRequest, completion: Completion, cause: Option<&EngineError>) {
        self.active_keys.remove(&request.client_key());
        tracing::debug!(client_key = request.client_key(), completion = completion.as_str(), "request completed");
        deliver(&mut self.completions, &request, completion, cause);
    }
}

/// Executor running on its own thread
///
/// Requests and exchange responses reach it over bounded channels; the loop
/// spins with `Backoff` while idle and yields once the backoff saturates.
pub struct ExecutorHandle<D: RequestDispatcher + 'static, C: OrderRequestCompletionHandler + 'static> {
    requests: Sender<OrderRequest>,
    shutdown: Arc<AtomicBool>,
    join: JoinHandle<OrderExecutor<D, C>>,
}

impl<D: RequestDispatcher + 'static, C: OrderRequestCompletionHandler + 'static> ExecutorHandle<D, C> {
    pub fn spawn(
        mut executor: OrderExecutor<D, C>,
        config: &ExecutorConfig,
        timer: Arc<dyn TimerService>,
        responses: Receiver<ExchangeResponse>,
    ) -> Result<Self, EngineError> {
        let (requests, requests_rx) = bounded::<OrderRequest>(config.request_queue_capacity);
        let shutdown = Arc::new(AtomicBool::new(false));
        let stop = shutdown.clone();
        let intake = config.request_queue_capacity;

        let join = spawn_pinned("order-executor", config.cpu_core, move || {
            tracing::info!("order executor started");
            let backoff = Backoff::new();

            loop {
                let now = timer.nano_of_day();
                let mut busy = false;

                for request in requests_rx.try_iter().take(intake) {
                    executor.submit(request, now);
                    busy = true;
                }
                for response in responses.try_iter() {
                    executor.on_response(response, now);
                    busy = true;
                }
                // 仅被限流的请求不算忙碌，关闭时不等待它们
                busy |= executor.run_cycle(now).dispatched > 0;

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

            tracing::info!(waiting = executor.waiting_len(), in_flight = executor.in_flight_len(), "order executor stopped");
            executor
        })?;

        Ok(Self { requests, shutdown, join })
    }

    /// Sender for submitting requests from other threads
    pub fn submitter(&self) -> Sender<OrderRequest> {
        self.requests.clone()
    }

    /// Blocks while the request queue is full
    pub fn submit(&self, request: OrderRequest) -> Result<(), EngineError> {
        self.requests.send(request).map_err(|_| EngineError::Shutdown)
    }

    /// Stops the loop once queued input is drained and returns the executor
    pub fn shutdown(self) -> Result<OrderExecutor<D, C>, EngineError> {
        self.shutdown.store(true, Ordering::Release);
        self.join
            .join()
            .map_err(|_| EngineError::Unexpected("order executor thread panicked".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::completion::RecordingCompletionHandler;
    use crate::shared::config::ThrottleConfig;
    use crate::shared::types::{Owner, Side};

    #[derive(Default)]
    struct VecDispatcher {
        sent: Vec<ClientKey>,
        fail_next: usize,
        flushes: usize,
    }

    impl RequestDispatcher for VecDispatcher {
        fn dispatch(&mut self, request: &OrderRequest) -> Result<(), EngineError> {
            if self.fail_next > 0 {
                self.fail_next -= 1;
                return Err(EngineError::Dispatch("link down".into()));
            }
            self.sent.push(request.client_key());
            Ok(())
        }

        fn flush(&mut self) -> Result<(), EngineError> {
            self.flushes += 1;
            Ok(())
        }
    }

    fn executor(capacity: u32, window_ns: i64) -> OrderExecutor<VecDispatcher, RecordingCompletionHandler> {
        let config = ExecutorConfig {
            max_batch_size: 4,
            sweep_interval_ns: 0,
            ..ExecutorConfig::default()
        };
        OrderExecutor::new(
            &config,
            ThrottleTrackers::from_config(&[ThrottleConfig { window_ns, capacity }]),
            VecDispatcher::default(),
            RecordingCompletionHandler::default(),
        )
    }

    fn buy(client_key: ClientKey) -> OrderRequest {
        OrderRequest::new_order(client_key, Owner(1), 7, Side::Buy, 100, 10)
    }

    #[test]
    fn test_throttled_then_timeout_after_throttled() {
        let mut executor = executor(1, 1_000);
        executor.submit(buy(1).with_timeout_at(500), 0);
        executor.submit(buy(2).with_timeout_at(500), 0);

        let report = executor.run_cycle(0);
        assert_eq!(report.dispatched, 1);
        assert_eq!(report.throttled, 1);
        assert_eq!(executor.dispatcher_mut().sent, vec![1]);

        let report = executor.run_cycle(499);
        assert_eq!(report.throttled, 1);

        let report = executor.run_cycle(500);
        assert_eq!(report.timed_out, 2);

        let recorder = executor.completions();
        assert_eq!(recorder.count("throttled"), 1);
        assert_eq!(recorder.terminal_for(2), vec!["timeout_after_throttled"]);
        assert_eq!(recorder.terminal_for(1), vec!["timeout"]);
        assert!(executor.is_idle());
    }

    #[test]
    fn test_requests_without_deadline_use_default_timeout() {
        let mut executor = executor(1, 1_000_000_000_000);
        let default_timeout_ns = ExecutorConfig::default().default_timeout_ns;
        executor.submit(buy(1), 100);
        executor.submit(buy(2), 100);

        let report = executor.run_cycle(100);
        assert_eq!((report.dispatched, report.throttled), (1, 1));

        let report = executor.run_cycle(100 + default_timeout_ns - 1);
        assert_eq!(report.timed_out, 0);

        let report = executor.run_cycle(100 + default_timeout_ns);
        assert_eq!(report.timed_out, 2);

        let recorder = executor.completions();
        assert_eq!(recorder.terminal_for(1), vec!["timeout"]);
        assert_eq!(recorder.terminal_for(2), vec!["timeout_after_throttled"]);
        assert!(executor.is_idle());
    }

    #[test]
    fn test_explicit_deadline_is_kept() {
        let mut executor = executor(10, 1_000);
        executor.submit(buy(1).with_timeout_at(50), 0);
        executor.run_cycle(0);

        assert_eq!(executor.run_cycle(50).timed_out, 1);
        assert_eq!(executor.completions().terminal_for(1), vec!["timeout"]);
    }

    #[test]
    fn test_throttled_request_dispatched_after_window() {
        let mut executor = executor(1, 100);
        executor.submit(buy(1), 0);
        executor.submit(buy(2), 0);
        executor.run_cycle(0);
        assert_eq!(executor.waiting_len(), 1);

        let report = executor.run_cycle(100);
        assert_eq!(report.dispatched, 1);
        assert_eq!(executor.dispatcher_mut().sent, vec![1, 2]);
        assert_eq!(executor.in_flight_len(), 2);
    }

    #[test]
    fn test_response_completes_request_once() {
        let mut executor = executor(10, 100);
        executor.submit(buy(1), 0);
        executor.run_cycle(0);

        executor.on_response(ExchangeResponse::new(1, RequestEvent::New).with_order_sid(55), 10);
        executor.on_response(ExchangeResponse::new(1, RequestEvent::Filled), 20);

        let recorder = executor.completions();
        assert_eq!(recorder.terminal_for(1), vec!["complete_with_ord_sid_only"]);
        assert_eq!(recorder.count("received_from_exchange"), 1);
        assert!(executor.is_idle());
    }

    #[test]
    fn test_reject_carries_reason() {
        let mut executor = executor(10, 100);
        executor.submit(buy(1), 0);
        executor.run_cycle(0);
        executor.on_response(
            ExchangeResponse::new(1, RequestEvent::Rejected).rejected(OrderRejectType::InsufficientPurchasingPower, "no cash"),
            5,
        );
        assert_eq!(executor.completions().terminal_for(1), vec!["reject_with_ord_sid_only"]);
    }

    #[test]
    fn test_duplicate_key_fails_new_request_only() {
        let mut executor = executor(10, 100);
        executor.submit(buy(1), 0);
        executor.submit(buy(1), 0);
        assert_eq!(executor.completions().terminal_for(1), vec!["fail"]);

        executor.run_cycle(0);
        assert_eq!(executor.dispatcher_mut().sent, vec![1]);
    }

    #[test]
    fn test_impossible_requests_fail_fast() {
        let mut executor = executor(2, 100);
        executor.submit(buy(1).with_throttle(0, 3), 0);
        executor.submit(buy(2).with_throttle(5, 1), 0);
        let recorder = executor.completions();
        assert_eq!(recorder.terminal_for(1), vec!["fail"]);
        assert_eq!(recorder.terminal_for(2), vec!["fail"]);
        assert!(executor.is_idle());
    }

    #[test]
    fn test_bypass_throttle_check() {
        let mut executor = executor(1, 1_000);
        executor.submit(buy(1), 0);
        executor.submit(buy(2).without_throttle_check(), 0);
        executor.submit(buy(3).as_part_of_composite_order().without_throttle_check(), 0);
        let report = executor.run_cycle(0);
        assert_eq!(report.dispatched, 3);
    }

    #[test]
    fn test_pool_stays_blocked_for_rest_of_cycle() {
        let mut executor = executor(3, 1_000);
        executor.submit(buy(1).with_throttle(0, 2), 0);
        executor.submit(buy(2).with_throttle(0, 2), 0);
        executor.submit(buy(3).with_throttle(0, 1), 0);
        let report = executor.run_cycle(0);
        assert_eq!(report.dispatched, 1);
        assert_eq!(report.throttled, 2);
        assert_eq!(executor.dispatcher_mut().sent, vec![1]);
    }

    #[test]
    fn test_batch_limit() {
        let mut executor = executor(100, 1_000);
        for key in 1..=6 {
            executor.submit(buy(key), 0);
        }
        assert_eq!(executor.run_cycle(0).dispatched, 4);
        assert_eq!(executor.run_cycle(1).dispatched, 2);
        assert_eq!(executor.dispatcher_mut().flushes, 2);
    }

    #[test]
    fn test_dispatch_failure_without_and_with_retry() {
        let mut executor = executor(100, 1_000);
        executor.dispatcher_mut().fail_next = 2;
        executor.submit(buy(1), 0);
        executor.submit(buy(2).with_retry(true), 0);

        let report = executor.run_cycle(0);
        assert_eq!(report.failed, 1);
        assert_eq!(executor.completions().terminal_for(1), vec!["fail"]);
        assert_eq!(executor.waiting_len(), 1);

        assert_eq!(executor.run_cycle(1).dispatched, 1);
        assert_eq!(executor.dispatcher_mut().sent, vec![2]);
    }

    #[test]
    fn test_fail_outstanding_at_shutdown() {
        let mut executor = executor(1, 1_000);
        executor.submit(buy(1), 0);
        executor.submit(buy(2), 0);
        executor.run_cycle(0);
        assert_eq!((executor.in_flight_len(), executor.waiting_len()), (1, 1));

        assert_eq!(executor.fail_outstanding(), 2);
        let recorder = executor.completions();
        assert_eq!(recorder.terminal_for(1), vec!["fail"]);
        assert_eq!(recorder.terminal_for(2), vec!["fail"]);
        assert!(executor.is_idle());
    }

    #[test]
    fn test_unknown_response_is_ignored() {
        let mut executor = executor(1, 100);
        executor.on_response(ExchangeResponse::new(9, RequestEvent::New), 0);
        assert!(executor.completions().events.is_empty());
    }
}
