/// Order request lifecycle state machine
///
/// ```text
/// CREATED ──(*_THROTTLED)──▶ THROTTLED ──┐
///    │                                    │
///    └──────────────SEND─────────────────┴─▶ SENT ──▶ ACCEPTED | REJECTED
///                                                     CANCELLED | CANCEL_REJECTED
///                                                     AMENDED | AMEND_REJECTED
///  any non-terminal ──TIMEOUT──▶ TIMED_OUT      any non-terminal ──FAIL──▶ FAILED
/// ```
///
/// The table is a pure function. Every transition into a terminal state names
/// exactly one `Completion`; every other transition names none. Terminal
/// states absorb all further events. Input that has no meaning in the current
/// state (including `Unexpected`) fails the request rather than leaving it
/// without a completion.

use crate::domain::request::{CompletionType, OrderRequestType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestState {
    Created,
    Throttled,
    Sent,
    Accepted,
    Rejected,
    TimedOut,
    Failed,
    Cancelled,
    Amended,
    CancelRejected,
    AmendRejected,
}

impl RequestState {
    pub const ALL: [RequestState; 11] = [
        RequestState::Created,
        RequestState::Throttled,
        RequestState::Sent,
        RequestState::Accepted,
        RequestState::Rejected,
        RequestState::TimedOut,
        RequestState::Failed,
        RequestState::Cancelled,
        RequestState::Amended,
        RequestState::CancelRejected,
        RequestState::AmendRejected,
    ];

    pub fn is_terminal(self) -> bool {
        !matches!(self, RequestState::Created | RequestState::Throttled | RequestState::Sent)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestEvent {
    Create,
    Amend,
    Cancel,
    NewThrottled,
    AmendThrottled,
    CancelThrottled,
    /// Line handler took the request for transmission
    Send,
    Timeout,
    Expire,
    New,
    Rejected,
    Filled,
    Cancelled,
    CancelReject,
    Amended,
    AmendReject,
    TradeCancel,
    TradeReject,
    Fail,
    /// Wildcard match; never changes state
    Any,
    Unexpected,
}

impl RequestEvent {
    pub const ALL: [RequestEvent; 21] = [
        RequestEvent::Create,
        RequestEvent::Amend,
        RequestEvent::Cancel,
        RequestEvent::NewThrottled,
        RequestEvent::AmendThrottled,
        RequestEvent::CancelThrottled,
        RequestEvent::Send,
        RequestEvent::Timeout,
        RequestEvent::Expire,
        RequestEvent::New,
        RequestEvent::Rejected,
        RequestEvent::Filled,
        RequestEvent::Cancelled,
        RequestEvent::CancelReject,
        RequestEvent::Amended,
        RequestEvent::AmendReject,
        RequestEvent::TradeCancel,
        RequestEvent::TradeReject,
        RequestEvent::Fail,
        RequestEvent::Any,
        RequestEvent::Unexpected,
    ];

    /// Event that registers a freshly created request of this type
    pub fn creation_for(request_type: OrderRequestType) -> RequestEvent {
        match request_type {
            OrderRequestType::New => RequestEvent::Create,
            OrderRequestType::Amend => RequestEvent::Amend,
            OrderRequestType::Cancel | OrderRequestType::MassCancel => RequestEvent::Cancel,
        }
    }

    /// Event raised when a request of this type is refused admission
    pub fn throttled_for(request_type: OrderRequestType) -> RequestEvent {
        match request_type {
            OrderRequestType::New => RequestEvent::NewThrottled,
            OrderRequestType::Amend => RequestEvent::AmendThrottled,
            OrderRequestType::Cancel | OrderRequestType::MassCancel => RequestEvent::CancelThrottled,
        }
    }
}

/// The single callback a terminal transition must produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Completion {
    Complete,
    CompleteWithOrdSidOnly,
    RejectWithOrdSidOnly,
    /// `after_throttled` attributes the timeout to missing capacity
    /// rather than exchange latency
    Timeout { after_throttled: bool },
    Fail,
}

impl Completion {
    pub fn completion_type(self) -> CompletionType {
        match self {
            Completion::Complete | Completion::CompleteWithOrdSidOnly => CompletionType::Ok,
            Completion::RejectWithOrdSidOnly => CompletionType::Rejected,
            Completion::Timeout { after_throttled: false } => CompletionType::Timeout,
            Completion::Timeout { after_throttled: true } => CompletionType::TimeoutAfterThrottled,
            Completion::Fail => CompletionType::Failed,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Completion::Complete => "complete",
            Completion::CompleteWithOrdSidOnly => "complete_with_ord_sid_only",
            Completion::RejectWithOrdSidOnly => "reject_with_ord_sid_only",
            Completion::Timeout { after_throttled: false } => "timeout",
            Completion::Timeout { after_throttled: true } => "timeout_after_throttled",
            Completion::Fail => "fail",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: RequestState,
    pub next: RequestState,
    pub completion: Option<Completion>,
}

pub fn transition(state: RequestState, request_type: OrderRequestType, event: RequestEvent) -> Transition {
    use RequestState::*;

    let (next, completion) = match (state, event) {
        (s, _) if s.is_terminal() => (s, None),
        (s, RequestEvent::Any) => (s, None),
        (Created, e) if e == RequestEvent::creation_for(request_type) => (Created, None),
        (Created | Throttled, e) if e == RequestEvent::throttled_for(request_type) => (Throttled, None),
        (Created | Throttled, RequestEvent::Send) => (Sent, None),
        (Throttled, RequestEvent::Timeout) => (TimedOut, Some(Completion::Timeout { after_throttled: true })),
        (Created | Sent, RequestEvent::Timeout) => (TimedOut, Some(Completion::Timeout { after_throttled: false })),
        // 成交撤销/拒绝针对的是成交而非请求
        (Sent, RequestEvent::TradeCancel | RequestEvent::TradeReject) => (Sent, None),
        (Sent, e) if e != RequestEvent::Fail => exchange_outcome(request_type, e),
        _ => (Failed, Some(Completion::Fail)),
    };

    Transition {
        from: state,
        next,
        completion,
    }
}

fn exchange_outcome(request_type: OrderRequestType, event: RequestEvent) -> (RequestState, Option<Completion>) {
    use OrderRequestType as T;
    use RequestEvent as E;

    match (request_type, event) {
        (T::New, E::New) => (RequestState::Accepted, Some(Completion::CompleteWithOrdSidOnly)),
        (T::New, E::Filled | E::Expire) => (RequestState::Accepted, Some(Completion::Complete)),
        (T::New, E::Rejected) => (RequestState::Rejected, Some(Completion::RejectWithOrdSidOnly)),
        (T::Amend, E::Amended) => (RequestState::Amended, Some(Completion::Complete)),
        (T::Amend, E::AmendReject) => (RequestState::AmendRejected, Some(Completion::RejectWithOrdSidOnly)),
        (T::Cancel | T::MassCancel, E::Cancelled) => (RequestState::Cancelled, Some(Completion::Complete)),
        (T::Cancel | T::MassCancel, E::CancelReject) => {
            (RequestState::CancelRejected, Some(Completion::RejectWithOrdSidOnly))
        }
        _ => (RequestState::Failed, Some(Completion::Fail)),
    }
}
