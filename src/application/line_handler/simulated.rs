/// Simulated exchange
///
/// An in-process `LineHandlerEngine`: new orders pass pre-trade checks
/// (price / quantity, exposure, self-cross against own working orders) and
/// are then matched by a `SingleThreadedMatchingEngine` against the market
/// depth applied through `apply`. Every outcome goes out twice: as an
/// `ExchangeResponse` for the executor and as update callbacks through the
/// chain `bridge → OrderStateTracker → downstream`.
///
/// Everything runs on the line-handler thread, which owns the engine.

use crate::application::executor::ExchangeResponse;
use crate::application::line_handler::{LineHandlerCommand, LineHandlerEngine};
use crate::application::matching::{MatchingEngine, SingleThreadedMatchingEngine};
use crate::application::updates::{MatchingEngineOrderUpdateHandler, OrderStateTracker, OrderUpdateEventProducerBridge};
use crate::domain::exposure::ExposureTracker;
use crate::domain::lifecycle::RequestEvent;
use crate::domain::order::{Order, OrderRejectType};
use crate::domain::request::{OrderRequest, OrderRequestKind};
use crate::shared::config::{EngineConfig, MatchingConfig, SimulatedExchangeConfig};
use crate::shared::error::EngineError;
use crate::shared::timestamp::TimerService;
use crate::shared::types::{ClientKey, NanoOfDay, OrderSid, Price, Quantity, SecSid, Side, SidGenerator};
use crossbeam::channel::Sender;
use futures::channel::oneshot;
use std::sync::Arc;

pub const SIMULATED_ENGINE: &str = "simulated";

/// First exchange order id handed out
const EXCHANGE_ORDER_ID_BASE: u64 = 1_000_000;

type SimulatedMatching = SingleThreadedMatchingEngine<OrderUpdateEventProducerBridge<OrderStateTracker>>;

type Rejection = (OrderRejectType, &'static str);

struct Session {
    engine: SimulatedMatching,
    responses: Sender<ExchangeResponse>,
}

impl Session {
    fn tracker(&self) -> &OrderStateTracker {
        self.engine.handler().updates()
    }

    fn updates(&mut self) -> &mut OrderStateTracker {
        self.engine.handler_mut().updates_mut()
    }

    fn respond(&self, response: ExchangeResponse) -> Result<(), EngineError> {
        self.responses.send(response).map_err(|_| EngineError::Disconnected)
    }

    fn pre_trade_check(&self, sec_sid: SecSid, side: Side, limit_price: Price, quantity: Quantity) -> Result<(), Rejection> {
        if limit_price <= 0 {
            return Err((OrderRejectType::InvalidPrice, "limit price must be positive"));
        }
        if quantity <= 0 {
            return Err((OrderRejectType::InvalidQuantity, "quantity must be positive"));
        }

        let tracker = self.tracker();
        match side {
            Side::Buy if !tracker.exposure().ok_to_buy(limit_price, quantity) => {
                return Err((OrderRejectType::InsufficientPurchasingPower, "insufficient purchasing power"));
            }
            Side::Sell if !tracker.exposure().ok_to_sell(sec_sid, quantity) => {
                return Err((OrderRejectType::InsufficientPosition, "insufficient position"));
            }
            _ => {}
        }

        if tracker.own_books().would_cross(sec_sid, side, limit_price) {
            return Err((OrderRejectType::CrossOwnOrder, "would cross own order"));
        }
        Ok(())
    }

    /// Exposure needed on top of what `working` already reserves
    fn amend_check(&self, working: &Order, quantity: Quantity, limit_price: Price) -> Result<(), Rejection> {
        if limit_price <= 0 {
            return Err((OrderRejectType::InvalidPrice, "limit price must be positive"));
        }
        let new_leaves = quantity - working.cumulative_exec_qty;
        if new_leaves <= 0 {
            return Err((OrderRejectType::InvalidQuantity, "quantity not above executed quantity"));
        }

        let tracker = self.tracker();
        match working.side {
            Side::Buy => {
                let extra = limit_price.saturating_mul(new_leaves)
                    - working.limit_price.saturating_mul(working.outstanding());
                if extra > tracker.exposure().available_purchasing_power() {
                    return Err((OrderRejectType::InsufficientPurchasingPower, "insufficient purchasing power"));
                }
            }
            Side::Sell => {
                let extra = new_leaves - working.outstanding();
                if extra > tracker.exposure().position(working.sec_sid).available() {
                    return Err((OrderRejectType::InsufficientPosition, "insufficient position"));
                }
            }
        }

        if tracker.own_books().would_cross(working.sec_sid, working.side, limit_price) {
            return Err((OrderRejectType::CrossOwnOrder, "would cross own order"));
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn new_order(
        &mut self,
        client_key: ClientKey,
        order_sid: OrderSid,
        exchange_order_id: u64,
        sec_sid: SecSid,
        side: Side,
        limit_price: Price,
        quantity: Quantity,
        now: NanoOfDay,
    ) -> Result<(), EngineError> {
        let mut order = Order::new(order_sid, sec_sid, side, limit_price, quantity, now);

        if let Err((reject_type, reason)) = self.pre_trade_check(sec_sid, side, limit_price, quantity) {
            tracing::debug!(client_key, order_sid, ?reject_type, "new order rejected");
            order.reject(reject_type, now);
            self.updates().on_order_rejected(&order);
            return self.respond(
                ExchangeResponse::new(client_key, RequestEvent::Rejected)
                    .with_order_sid(order_sid)
                    .rejected(reject_type, reason),
            );
        }

        order.accept(exchange_order_id, now);
        self.updates().on_order_accepted(&order);
        self.respond(ExchangeResponse::new(client_key, RequestEvent::New).with_order_sid(order_sid))?;
        self.engine.add_order(sec_sid, order);
        Ok(())
    }

    fn amend(
        &mut self,
        client_key: ClientKey,
        sec_sid: SecSid,
        order_sid: OrderSid,
        quantity: Quantity,
        limit_price: Price,
        now: NanoOfDay,
    ) -> Result<(), EngineError> {
        let checked = match self.tracker().order(order_sid).copied() {
            Some(working) => self.amend_check(&working, quantity, limit_price),
            None => Err((OrderRejectType::UnknownOrder, "order not working")),
        };
        let amended = checked.and_then(|()| {
            self.engine
                .amend_order(sec_sid, order_sid, quantity, limit_price, now)
                .map_err(|reject_type| (reject_type, "amend refused"))
        });

        match amended {
            Ok(order) => {
                self.updates().on_order_amended(&order);
                self.respond(ExchangeResponse::new(client_key, RequestEvent::Amended).with_order_sid(order_sid))?;
                self.engine.match_pending(sec_sid, now);
                Ok(())
            }
            Err((reject_type, reason)) => self.respond(
                ExchangeResponse::new(client_key, RequestEvent::AmendReject)
                    .with_order_sid(order_sid)
                    .rejected(reject_type, reason),
            ),
        }
    }

    fn cancel(&mut self, client_key: ClientKey, sec_sid: SecSid, order_sid: OrderSid, now: NanoOfDay) -> Result<(), EngineError> {
        match self.engine.cancel_order(sec_sid, order_sid, now) {
            Some(order) => {
                self.updates().on_order_cancelled(&order);
                self.respond(ExchangeResponse::new(client_key, RequestEvent::Cancelled).with_order_sid(order_sid))
            }
            None => {
                self.updates()
                    .on_cancel_rejected(sec_sid, order_sid, OrderRejectType::UnknownOrder, now);
                self.respond(
                    ExchangeResponse::new(client_key, RequestEvent::CancelReject)
                        .with_order_sid(order_sid)
                        .rejected(OrderRejectType::UnknownOrder, "order not working"),
                )
            }
        }
    }

    fn mass_cancel(&mut self, client_key: ClientKey, sec_sid: Option<SecSid>, side: Option<Side>, now: NanoOfDay) -> Result<(), EngineError> {
        let cancelled = self.engine.cancel_all(sec_sid, side, now);
        tracing::debug!(client_key, cancelled = cancelled.len(), "mass cancel");
        for order in &cancelled {
            self.updates().on_order_cancelled(order);
        }
        self.respond(ExchangeResponse::new(client_key, RequestEvent::Cancelled))
    }
}

pub struct SimulatedLineHandlerEngine {
    matching: MatchingConfig,
    exchange: SimulatedExchangeConfig,
    timer: Arc<dyn TimerService>,
    order_sids: SidGenerator,
    exchange_order_ids: SidGenerator,
    session: Option<Session>,
}

impl SimulatedLineHandlerEngine {
    pub fn new(
        matching: &MatchingConfig,
        exchange: &SimulatedExchangeConfig,
        timer: Arc<dyn TimerService>,
    ) -> Result<Self, EngineError> {
        if matching.order_delay_ns < 0 {
            return Err(EngineError::Config("matching.order_delay_ns must be >= 0".into()));
        }
        // 模拟交易所在 line-handler 线程内同步撮合，预检查依赖同线程的状态
        if matching.multi_threaded {
            return Err(EngineError::Config(
                "the simulated exchange matches in-line; disable matching.multi_threaded".into(),
            ));
        }
        Ok(Self {
            matching: matching.clone(),
            exchange: exchange.clone(),
            timer,
            order_sids: SidGenerator::default(),
            exchange_order_ids: SidGenerator::starting_at(EXCHANGE_ORDER_ID_BASE),
            session: None,
        })
    }

    /// Registry constructor
    pub fn from_config(config: &EngineConfig, timer: Arc<dyn TimerService>) -> Result<Box<dyn LineHandlerEngine>, EngineError> {
        Ok(Box::new(Self::new(&config.matching, &config.line_handler.simulated, timer)?))
    }

    /// Own-order and exposure state, once initialised
    pub fn tracker(&self) -> Option<&OrderStateTracker> {
        self.session.as_ref().map(Session::tracker)
    }

    fn exposure(&self) -> ExposureTracker {
        let mut exposure = ExposureTracker::new(self.exchange.purchasing_power);
        for position in &self.exchange.positions {
            exposure.set_position(position.sec_sid, position.quantity);
        }
        exposure
    }
}

impl LineHandlerEngine for SimulatedLineHandlerEngine {
    fn name(&self) -> &'static str {
        SIMULATED_ENGINE
    }

    fn init(
        &mut self,
        updates: Box<dyn MatchingEngineOrderUpdateHandler>,
        responses: Sender<ExchangeResponse>,
    ) -> Result<(), EngineError> {
        if self.session.is_some() {
            return Err(EngineError::Unexpected("simulated exchange already initialised".into()));
        }

        let tracker = OrderStateTracker::new(self.exposure()).with_downstream(updates);
        let engine = SingleThreadedMatchingEngine::from_config(&self.matching, OrderUpdateEventProducerBridge::new(tracker))?;
        self.session = Some(Session { engine, responses });
        tracing::info!(
            purchasing_power = self.exchange.purchasing_power,
            positions = self.exchange.positions.len(),
            fill_or_kill = self.matching.fill_or_kill,
            "simulated exchange initialised"
        );
        Ok(())
    }

    fn send_order_request(&mut self, request: &OrderRequest) -> Result<(), EngineError> {
        let now = self.timer.nano_of_day();
        let session = self.session.as_mut().ok_or(EngineError::Disconnected)?;
        let client_key = request.client_key();

        match *request.kind() {
            OrderRequestKind::New {
                sec_sid,
                side,
                limit_price,
                quantity,
            } => {
                let order_sid = request.order_sid().unwrap_or_else(|| self.order_sids.next_sid());
                let exchange_order_id = self.exchange_order_ids.next_sid();
                session.new_order(client_key, order_sid, exchange_order_id, sec_sid, side, limit_price, quantity, now)
            }
            OrderRequestKind::Amend {
                sec_sid,
                order_sid_to_amend,
                quantity,
                limit_price,
            } => session.amend(client_key, sec_sid, order_sid_to_amend, quantity, limit_price, now),
            OrderRequestKind::Cancel {
                sec_sid,
                order_sid_to_cancel,
            } => session.cancel(client_key, sec_sid, order_sid_to_cancel, now),
            OrderRequestKind::MassCancel { sec_sid, side } => session.mass_cancel(client_key, sec_sid, side, now),
        }
    }

    fn apply(&mut self, command: LineHandlerCommand) -> Result<(), EngineError> {
        let session = self.session.as_mut().ok_or(EngineError::Disconnected)?;
        match command {
            LineHandlerCommand::MarketDepth { timestamp, book } => {
                session.engine.handle_order(timestamp, book.sec_sid(), &book);
            }
            LineHandlerCommand::TradeTick { timestamp } => session.engine.handle_trade(timestamp),
        }
        Ok(())
    }

    fn start_recovery(&mut self) -> oneshot::Receiver<Result<(), EngineError>> {
        let (tx, rx) = oneshot::channel();
        // 无外部状态需要回放，立即结束恢复
        let result = match self.session.as_mut() {
            Some(session) => {
                session.updates().on_end_of_recovery();
                Ok(())
            }
            None => Err(EngineError::Disconnected),
        };
        if tx.send(result).is_err() {
            tracing::debug!("recovery receiver dropped");
        }
        rx
    }

    fn is_clear(&self) -> bool {
        self.session
            .as_ref()
            .map_or(true, |s| s.engine.resting_len() == 0 && s.tracker().working_len() == 0)
    }
}
