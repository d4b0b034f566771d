/// Order requests
///
/// One struct carries the fields every request shares (correlation, routing,
/// throttle and deadline bookkeeping, outcome) and an `OrderRequestKind` sum
/// type carries the variant payload. Callers construct a request once with the
/// `new_order` / `amend` / `cancel` / `mass_cancel` constructors and the
/// by-value `with_*` modifiers; afterwards only the executor (its single
/// owner) moves it through the lifecycle.

use crate::domain::lifecycle::{self, Completion, RequestEvent, RequestState};
use crate::domain::order::OrderRejectType;
use crate::shared::error::EngineError;
use crate::shared::types::{ClientKey, NanoOfDay, OrderSid, Owner, Price, Quantity, SecSid, Side};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderRequestType {
    New,
    Amend,
    Cancel,
    MassCancel,
}

impl OrderRequestType {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderRequestType::New => "new",
            OrderRequestType::Amend => "amend",
            OrderRequestType::Cancel => "cancel",
            OrderRequestType::MassCancel => "mass_cancel",
        }
    }
}

/// Variant payload of a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderRequestKind {
    New {
        sec_sid: SecSid,
        side: Side,
        limit_price: Price,
        quantity: Quantity,
    },
    Amend {
        sec_sid: SecSid,
        order_sid_to_amend: OrderSid,
        quantity: Quantity,
        limit_price: Price,
    },
    Cancel {
        sec_sid: SecSid,
        order_sid_to_cancel: OrderSid,
    },
    /// `None` filters match everything
    MassCancel {
        sec_sid: Option<SecSid>,
        side: Option<Side>,
    },
}

/// Outcome recorded on the request when it completes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompletionType {
    Pending,
    Ok,
    Rejected,
    Timeout,
    TimeoutAfterThrottled,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRequest {
    client_key: ClientKey,
    owner: Owner,
    order_sid: Option<OrderSid>,
    num_throttle_required_to_proceed: u32,
    throttle_check_required: bool,
    assigned_throttle_tracker_index: usize,
    timeout_at_nano_of_day: NanoOfDay,
    retry: bool,
    is_part_of_composite_order: bool,
    kind: OrderRequestKind,
    state: RequestState,
    completion_type: CompletionType,
    reject_type: OrderRejectType,
    reason: Option<String>,
}

impl OrderRequest {
    fn with_kind(client_key: ClientKey, owner: Owner, kind: OrderRequestKind) -> Self {
        Self {
            client_key,
            owner,
            order_sid: None,
            num_throttle_required_to_proceed: 1,
            throttle_check_required: true,
            assigned_throttle_tracker_index: 0,
            timeout_at_nano_of_day: NanoOfDay::MAX,
            retry: false,
            is_part_of_composite_order: false,
            kind,
            state: RequestState::Created,
            completion_type: CompletionType::Pending,
            reject_type: OrderRejectType::None,
            reason: None,
        }
    }

    pub fn new_order(
        client_key: ClientKey,
        owner: Owner,
        sec_sid: SecSid,
        side: Side,
        limit_price: Price,
        quantity: Quantity,
    ) -> Self {
        Self::with_kind(
            client_key,
            owner,
            OrderRequestKind::New {
                sec_sid,
                side,
                limit_price,
                quantity,
            },
        )
    }

    pub fn amend(
        client_key: ClientKey,
        owner: Owner,
        sec_sid: SecSid,
        order_sid_to_amend: OrderSid,
        quantity: Quantity,
        limit_price: Price,
    ) -> Self {
        Self::with_kind(
            client_key,
            owner,
            OrderRequestKind::Amend {
                sec_sid,
                order_sid_to_amend,
                quantity,
                limit_price,
            },
        )
    }

    pub fn cancel(client_key: ClientKey, owner: Owner, sec_sid: SecSid, order_sid_to_cancel: OrderSid) -> Self {
        Self::with_kind(
            client_key,
            owner,
            OrderRequestKind::Cancel {
                sec_sid,
                order_sid_to_cancel,
            },
        )
    }

    pub fn mass_cancel(client_key: ClientKey, owner: Owner, sec_sid: Option<SecSid>, side: Option<Side>) -> Self {
        Self::with_kind(client_key, owner, OrderRequestKind::MassCancel { sec_sid, side })
    }

    /// Draws `slots` permits from throttle pool `tracker_index`
    pub fn with_throttle(mut self, tracker_index: usize, slots: u32) -> Self {
        self.assigned_throttle_tracker_index = tracker_index;
        self.num_throttle_required_to_proceed = slots;
        self.throttle_check_required = true;
        self
    }

    /// Skips admission control (system-internal and composite sub-orders)
    pub fn without_throttle_check(mut self) -> Self {
        self.throttle_check_required = false;
        self
    }

    pub fn with_timeout_at(mut self, timeout_at_nano_of_day: NanoOfDay) -> Self {
        self.timeout_at_nano_of_day = timeout_at_nano_of_day;
        self
    }

    pub fn with_retry(mut self, retry: bool) -> Self {
        self.retry = retry;
        self
    }

    pub fn as_part_of_composite_order(mut self) -> Self {
        self.is_part_of_composite_order = true;
        self
    }

    pub fn request_type(&self) -> OrderRequestType {
        match self.kind {
            OrderRequestKind::New { .. } => OrderRequestType::New,
            OrderRequestKind::Amend { .. } => OrderRequestType::Amend,
            OrderRequestKind::Cancel { .. } => OrderRequestType::Cancel,
            OrderRequestKind::MassCancel { .. } => OrderRequestType::MassCancel,
        }
    }

    pub fn kind(&self) -> &OrderRequestKind {
        &self.kind
    }

    pub fn client_key(&self) -> ClientKey {
        self.client_key
    }

    pub fn owner(&self) -> Owner {
        self.owner
    }

    pub fn order_sid(&self) -> Option<OrderSid> {
        self.order_sid
    }

    pub fn num_throttle_required_to_proceed(&self) -> u32 {
        self.num_throttle_required_to_proceed
    }

    pub fn throttle_check_required(&self) -> bool {
        self.throttle_check_required
    }

    pub fn assigned_throttle_tracker_index(&self) -> usize {
        self.assigned_throttle_tracker_index
    }

    pub fn timeout_at_nano_of_day(&self) -> NanoOfDay {
        self.timeout_at_nano_of_day
    }

    pub fn retry(&self) -> bool {
        self.retry
    }

    pub fn is_part_of_composite_order(&self) -> bool {
        self.is_part_of_composite_order
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn completion_type(&self) -> CompletionType {
        self.completion_type
    }

    pub fn reject_type(&self) -> OrderRejectType {
        self.reject_type
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Sets the internal order id; immutable once assigned
    pub fn assign_order_sid(&mut self, order_sid: OrderSid) -> Result<(), EngineError> {
        match self.order_sid {
            None => {
                self.order_sid = Some(order_sid);
                Ok(())
            }
            Some(existing) if existing == order_sid => Ok(()),
            Some(existing) => Err(EngineError::OrderSidAlreadyAssigned {
                existing,
                attempted: order_sid,
            }),
        }
    }

    pub fn set_reject(&mut self, reject_type: OrderRejectType, reason: Option<String>) {
        self.reject_type = reject_type;
        if reason.is_some() {
            self.reason = reason;
        }
    }

    pub fn is_expired_at(&self, now: NanoOfDay) -> bool {
        now >= self.timeout_at_nano_of_day
    }

    /// Feeds a lifecycle event and returns the completion to deliver, if any
    ///
    /// At most one completion is ever returned for a request: once the state is
    /// terminal every later event is ignored.
    pub fn on_event(&mut self, event: RequestEvent) -> Option<Completion> {
        let transition = lifecycle::transition(self.state, self.request_type(), event);
        if transition.next != self.state {
            tracing::debug!(
                client_key = self.client_key,
                from = ?self.state,
                to = ?transition.next,
                ?event,
                "request transition"
            );
        }
        self.state = transition.next;

        if let Some(completion) = transition.completion {
            self.completion_type = completion.completion_type();
            match completion {
                Completion::Timeout { .. } if self.reject_type == OrderRejectType::None => {
                    self.reject_type = OrderRejectType::Timeout;
                }
                Completion::Fail if self.reason.is_none() => {
                    self.reason = Some(format!("{:?} in state {:?}", event, transition.from));
                }
                _ => {}
            }
        }
        transition.completion
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buy() -> OrderRequest {
        OrderRequest::new_order(1, Owner(3), 700, Side::Buy, 100, 10)
    }

    #[test]
    fn test_defaults() {
        let request = buy();
        assert_eq!(request.request_type(), OrderRequestType::New);
        assert_eq!(request.order_sid(), None);
        assert_eq!(request.num_throttle_required_to_proceed(), 1);
        assert!(request.throttle_check_required());
        assert_eq!(request.assigned_throttle_tracker_index(), 0);
        assert_eq!(request.state(), RequestState::Created);
        assert_eq!(request.completion_type(), CompletionType::Pending);
        assert!(!request.retry());
        assert!(!request.is_part_of_composite_order());
    }

    #[test]
    fn test_modifiers() {
        let request = buy()
            .with_throttle(2, 3)
            .with_timeout_at(5_000)
            .with_retry(true)
            .as_part_of_composite_order()
            .without_throttle_check();

        assert_eq!(request.assigned_throttle_tracker_index(), 2);
        assert_eq!(request.num_throttle_required_to_proceed(), 3);
        assert_eq!(request.timeout_at_nano_of_day(), 5_000);
        assert!(request.retry());
        assert!(request.is_part_of_composite_order());
        assert!(!request.throttle_check_required());
        assert!(request.is_expired_at(5_000));
        assert!(!request.is_expired_at(4_999));
    }

    #[test]
    fn test_request_types() {
        let owner = Owner(1);
        assert_eq!(OrderRequest::amend(1, owner, 7, 5, 10, 100).request_type(), OrderRequestType::Amend);
        assert_eq!(OrderRequest::cancel(2, owner, 7, 5).request_type(), OrderRequestType::Cancel);
        assert_eq!(
            OrderRequest::mass_cancel(3, owner, None, Some(Side::Sell)).request_type(),
            OrderRequestType::MassCancel
        );
    }

    #[test]
    fn test_order_sid_is_immutable_once_assigned() {
        let mut request = buy();
        assert!(request.assign_order_sid(42).is_ok());
        assert!(request.assign_order_sid(42).is_ok());
        assert_eq!(
            request.assign_order_sid(43),
            Err(EngineError::OrderSidAlreadyAssigned { existing: 42, attempted: 43 })
        );
        assert_eq!(request.order_sid(), Some(42));
    }

    #[test]
    fn test_on_event_records_single_completion() {
        let mut request = buy();
        assert_eq!(request.on_event(RequestEvent::Send), None);
        assert_eq!(request.on_event(RequestEvent::New), Some(Completion::CompleteWithOrdSidOnly));
        assert_eq!(request.completion_type(), CompletionType::Ok);

        // 终态之后的事件全部忽略
        assert_eq!(request.on_event(RequestEvent::Rejected), None);
        assert_eq!(request.on_event(RequestEvent::Timeout), None);
        assert_eq!(request.completion_type(), CompletionType::Ok);
    }

    #[test]
    fn test_timeout_sets_reject_type() {
        let mut request = buy();
        request.on_event(RequestEvent::NewThrottled);
        assert_eq!(
            request.on_event(RequestEvent::Timeout),
            Some(Completion::Timeout { after_throttled: true })
        );
        assert_eq!(request.completion_type(), CompletionType::TimeoutAfterThrottled);
        assert_eq!(request.reject_type(), OrderRejectType::Timeout);
    }

    #[test]
    fn test_unexpected_event_fails_with_reason() {
        let mut request = buy();
        request.on_event(RequestEvent::Send);
        assert_eq!(request.on_event(RequestEvent::AmendReject), Some(Completion::Fail));
        assert_eq!(request.completion_type(), CompletionType::Failed);
        assert!(request.reason().is_some());
    }
}
