//! Mock transport for testing.
//!
//! [`MockTransport`] answers requests from scripted replies instead of the
//! network, enabling deterministic tests of ordering and cancellation.
//!
//! # Basic Usage
//!
//! ```
//! use serde_json::json;
//! use snap_query::transport::mock::MockTransport;
//!
//! let mock = MockTransport::new();
//! mock.respond("/todos/1", Ok(json!({ "id": 1 })));
//! assert_eq!(mock.call_count(), 0);
//! ```
//!
//! # Controlling resolution order
//!
//! [`MockTransport::hold`] queues a reply that stays pending until the test
//! resolves it, so a test can settle an older attempt after a newer one:
//!
//! ```no_run
//! # use serde_json::json;
//! # use snap_query::transport::mock::MockTransport;
//! let mock = MockTransport::new();
//! let first = mock.hold("/todos/1");
//! let second = mock.hold("/todos/1");
//! // ... start two attempts ...
//! second.resolve(Ok(json!({ "id": 1, "title": "new" })));
//! first.resolve(Ok(json!({ "id": 1, "title": "old" })));
//! ```
//!
//! The mock is cheaply cloneable; clones share replies and the call log, so
//! the test keeps one clone while the consumer under test owns another.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;

use super::{Request, Transport};

type Reply = Result<Value, TransportError>;

enum Scripted {
    Ready(Reply),
    Held(oneshot::Receiver<Reply>),
}

#[derive(Default)]
struct MockState {
    queued: HashMap<String, VecDeque<Scripted>>,
    fallback: HashMap<String, Reply>,
    calls: Vec<Request>,
    cancellations: usize,
}

/// A transport that replays scripted replies.
///
/// Queued replies for a URL are consumed in order; once the queue is empty
/// the sticky reply set by [`respond_always`](Self::respond_always) is used.
/// A request with neither fails with [`TransportError::Network`].
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

/// Resolves a reply queued with [`MockTransport::hold`].
#[derive(Debug)]
pub struct Responder {
    tx: oneshot::Sender<Reply>,
}

impl Responder {
    /// Completes the held request.
    ///
    /// Returns `false` if the request was already abandoned (cancelled or
    /// never issued and the transport dropped).
    pub fn resolve(self, reply: Reply) -> bool {
        self.tx.send(reply).is_ok()
    }
}

impl MockTransport {
    /// Creates a mock with no scripted replies.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a single reply for `url`.
    pub fn respond(&self, url: impl Into<String>, reply: Reply) {
        self.state
            .lock()
            .queued
            .entry(url.into())
            .or_default()
            .push_back(Scripted::Ready(reply));
    }

    /// Sets the reply used for `url` whenever its queue is empty.
    pub fn respond_always(&self, url: impl Into<String>, reply: Reply) {
        self.state.lock().fallback.insert(url.into(), reply);
    }

    /// Queues a reply for `url` that stays pending until resolved.
    #[must_use]
    pub fn hold(&self, url: impl Into<String>) -> Responder {
        let (tx, rx) = oneshot::channel();
        self.state
            .lock()
            .queued
            .entry(url.into())
            .or_default()
            .push_back(Scripted::Held(rx));
        Responder { tx }
    }

    /// Returns every request received so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<Request> {
        self.state.lock().calls.clone()
    }

    /// Returns the number of requests received.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.state.lock().calls.len()
    }

    /// Returns the number of requests received for `url`.
    #[must_use]
    pub fn calls_to(&self, url: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|request| request.url == url)
            .count()
    }

    /// Returns how many in-flight requests observed their token being cancelled.
    #[must_use]
    pub fn cancellations(&self) -> usize {
        self.state.lock().cancellations
    }

    fn take_reply(&self, request: &Request) -> Scripted {
        let mut state = self.state.lock();
        state.calls.push(request.clone());
        if let Some(next) = state
            .queued
            .get_mut(&request.url)
            .and_then(VecDeque::pop_front)
        {
            return next;
        }
        let reply = state.fallback.get(&request.url).cloned().unwrap_or_else(|| {
            Err(TransportError::Network(format!(
                "no mock reply for {}",
                request.url
            )))
        });
        Scripted::Ready(reply)
    }
}

impl Transport for MockTransport {
    fn execute(
        &self,
        request: Request,
        token: CancellationToken,
    ) -> BoxFuture<'static, Result<Value, TransportError>> {
        let scripted = self.take_reply(&request);
        let state = Arc::clone(&self.state);

        async move {
            let pending = async move {
                match scripted {
                    Scripted::Ready(reply) => reply,
                    Scripted::Held(rx) => rx.await.unwrap_or_else(|_| {
                        Err(TransportError::Network("held reply dropped".to_string()))
                    }),
                }
            };
            tokio::select! {
                biased;
                () = token.cancelled() => {
                    state.lock().cancellations += 1;
                    Err(TransportError::Cancelled)
                }
                reply = pending => reply,
            }
        }
        .boxed()
    }
}
