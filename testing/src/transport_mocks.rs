//! Scripted in-memory HTTP transport.
//!
//! Replies are queued per request URL and consumed in order. A reply can be
//! immediate, pending (only ever ends through cancellation), or gated (held
//! until the test opens its [`Gate`]). Every call is recorded, and the mock
//! honours cancel handles the way a real transport does.

use fetchstate_core::transport::{
    CancelHandle, HttpRequest, HttpResponse, HttpTransport, TransportError,
};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

type Outcome = Result<HttpResponse, TransportError>;

enum MockReply {
    Immediate(Outcome),
    Pending,
    Gated { gate: Arc<Notify>, outcome: Outcome },
}

#[derive(Default)]
struct MockState {
    replies: HashMap<String, VecDeque<MockReply>>,
    calls: Vec<HttpRequest>,
    cancelled: usize,
}

/// Releases a gated reply.
#[derive(Debug, Clone)]
pub struct Gate(Arc<Notify>);

impl Gate {
    /// Let the gated call complete.
    ///
    /// Opening before the call reaches the gate is fine; the permit is kept.
    pub fn open(&self) {
        self.0.notify_one();
    }
}

/// Mock transport.
///
/// Clones share the same script and call log.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Create a new mock with no scripted replies.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, url: &str, reply: MockReply) {
        self.lock()
            .replies
            .entry(url.to_string())
            .or_default()
            .push_back(reply);
    }

    /// Queue a `200 OK` reply with `data` as body.
    pub fn push_ok(&self, url: &str, data: Value) {
        self.push(url, MockReply::Immediate(Ok(HttpResponse::ok(data))));
    }

    /// Queue an arbitrary outcome.
    pub fn push_outcome(&self, url: &str, outcome: Result<HttpResponse, TransportError>) {
        self.push(url, MockReply::Immediate(outcome));
    }

    /// Queue a failure.
    pub fn push_error(&self, url: &str, error: TransportError) {
        self.push(url, MockReply::Immediate(Err(error)));
    }

    /// Queue a reply that never completes unless cancelled.
    pub fn push_pending(&self, url: &str) {
        self.push(url, MockReply::Pending);
    }

    /// Queue an outcome that is held until the returned gate opens.
    #[must_use]
    pub fn push_gated(&self, url: &str, outcome: Result<HttpResponse, TransportError>) -> Gate {
        let gate = Arc::new(Notify::new());
        self.push(
            url,
            MockReply::Gated {
                gate: Arc::clone(&gate),
                outcome,
            },
        );
        Gate(gate)
    }

    /// Every request received so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<HttpRequest> {
        self.lock().calls.clone()
    }

    /// Number of requests received so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    /// Number of calls that ended through their cancel handle.
    #[must_use]
    pub fn cancelled_count(&self) -> usize {
        self.lock().cancelled
    }

    fn finish(&self, request: HttpRequest, outcome: Outcome) -> Outcome {
        match outcome {
            // Echo the request like a real transport so redaction is observable
            Ok(response) if response.config.is_none() => Ok(response.with_config(request)),
            Err(TransportError::Cancelled) => {
                self.lock().cancelled += 1;
                Err(TransportError::Cancelled)
            },
            other => other,
        }
    }
}

impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest, cancel: CancelHandle) -> Outcome {
        let reply = {
            let mut state = self.lock();
            state.calls.push(request.clone());
            state
                .replies
                .get_mut(&request.url)
                .and_then(VecDeque::pop_front)
        };

        let outcome = match reply {
            None => Err(TransportError::network(format!(
                "no mock reply scripted for {}",
                request.url
            ))),
            Some(MockReply::Immediate(outcome)) => {
                if cancel.is_cancelled() {
                    Err(TransportError::Cancelled)
                } else {
                    outcome
                }
            },
            Some(MockReply::Pending) => {
                cancel.cancelled().await;
                Err(TransportError::Cancelled)
            },
            Some(MockReply::Gated { gate, outcome }) => {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => Err(TransportError::Cancelled),
                    () = gate.notified() => outcome,
                }
            },
        };

        self.finish(request, outcome)
    }
}
