//! Request lifecycle: the fetch state machine and its ordering discipline.
//!
//! # Newest wins
//!
//! Every [`RequestLifecycle::start`] allocates a fresh attempt id and a fresh
//! [`CancellationToken`], cancelling the previous one. An attempt may only
//! write state through [`RequestLifecycle::settle`], which silently ignores
//! any id that is not the most recently started one. Whatever order the
//! transport resolves in, the last-started attempt owns the state:
//!
//! ```text
//! start(A) ── start(B) ── settle(B, ok) ── settle(A, ok)
//!   Loading     Loading     Success(B)      (ignored)
//! ```
//!
//! # Cancellation
//!
//! [`RequestLifecycle::cancel`] cancels the live token, so the transport can
//! abort the exchange, and retires the attempt id, so its eventual outcome is
//! dropped. Cancellation never shows up as an error state.
//!
//! # Locking
//!
//! Consumers share a lifecycle between the UI side and the spawned attempt as
//! an `Arc<parking_lot::Mutex<RequestLifecycle<T>>>`. The lock is only taken
//! for the synchronous transitions, never across an `.await`.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::config::RequestOptions;
use crate::deferred::Aborted;
use crate::error::{FetchError, TransportError};
use crate::state::FetchState;
use crate::transport::{Request, Transport};
use crate::url::{PathParams, compile_url, compile_url_strict};
use crate::validate::ValidatorRef;

/// Identifier of one attempt, unique within its lifecycle.
pub type AttemptId = u64;

/// A started attempt.
#[derive(Debug, Clone)]
pub struct Attempt {
    id: AttemptId,
    token: CancellationToken,
}

impl Attempt {
    #[must_use]
    pub const fn id(&self) -> AttemptId {
        self.id
    }

    /// The token the transport must honour for this attempt.
    #[must_use]
    pub const fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// Which attempt [`RequestLifecycle::cancel`] applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelTarget {
    /// Whatever attempt is live.
    Current,
    /// A specific attempt; a no-op unless it is the live one.
    Attempt(AttemptId),
}

/// What [`RequestLifecycle::settle`] did with an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// The attempt was current and the state is now `Success`.
    Succeeded,
    /// The attempt was current and the state is now `Error`.
    Failed,
    /// The attempt was stale or cancelled; nothing changed.
    Ignored,
}

impl Settlement {
    #[must_use]
    pub const fn is_applied(self) -> bool {
        !matches!(self, Self::Ignored)
    }
}

/// The state machine behind every consumer.
pub struct RequestLifecycle<T> {
    label: Arc<str>,
    seq: AttemptId,
    live: Option<(AttemptId, CancellationToken)>,
    retained: Option<T>,
    /// The settled state an abandoned attempt falls back to.
    restore: FetchState<T>,
    skipped: bool,
    state: watch::Sender<FetchState<T>>,
}

impl<T> RequestLifecycle<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates an idle lifecycle. `label` names it in log events, typically
    /// the resource template.
    #[must_use]
    pub fn new(label: impl Into<Arc<str>>) -> Self {
        let (state, _) = watch::channel(FetchState::Idle);
        Self {
            label: label.into(),
            seq: 0,
            live: None,
            retained: None,
            restore: FetchState::Idle,
            skipped: false,
            state,
        }
    }

    /// Wraps the lifecycle for sharing with spawned attempts.
    #[must_use]
    pub fn shared(self) -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(self))
    }

    /// Starts a new attempt, superseding any live one.
    ///
    /// The state becomes `Loading`, carrying the last known data.
    pub fn start(&mut self) -> Attempt {
        if let Some((superseded, previous)) = self.live.take() {
            previous.cancel();
            debug!(resource = %self.label, superseded, "cancelling superseded attempt");
        }
        self.seq += 1;
        self.skipped = false;

        let token = CancellationToken::new();
        self.live = Some((self.seq, token.clone()));
        {
            let current = self.state.borrow();
            if !current.is_loading() {
                self.restore = current.clone();
            }
            self.retained = current.retained();
        }
        let previous_data = self.retained.clone();
        self.state.send_replace(FetchState::Loading { previous_data });

        debug!(resource = %self.label, attempt = self.seq, "attempt started");
        Attempt {
            id: self.seq,
            token,
        }
    }

    /// Records the outcome of attempt `id`.
    ///
    /// Stale attempts, cancelled attempts, and cancellation errors leave the
    /// state untouched.
    pub fn settle(&mut self, id: AttemptId, outcome: Result<T, FetchError>) -> Settlement {
        if self.current_attempt() != Some(id) {
            trace!(resource = %self.label, attempt = id, "ignoring stale attempt");
            return Settlement::Ignored;
        }
        if matches!(&outcome, Err(err) if err.is_cancelled()) {
            trace!(resource = %self.label, attempt = id, "attempt reported cancellation");
            self.cancel(CancelTarget::Attempt(id));
            return Settlement::Ignored;
        }

        self.live = None;
        let previous_data = self.retained.take();
        match outcome {
            Ok(data) => {
                debug!(resource = %self.label, attempt = id, "attempt succeeded");
                self.state.send_replace(FetchState::Success { data });
                Settlement::Succeeded
            }
            Err(error) => {
                warn!(resource = %self.label, attempt = id, %error, "attempt failed");
                self.state.send_replace(FetchState::Error {
                    error,
                    previous_data,
                });
                Settlement::Failed
            }
        }
    }

    /// Cancels the live attempt if it matches `target`.
    ///
    /// The state goes back to exactly what it was before the attempt
    /// started. Cancelling twice, or after the attempt settled, does nothing
    /// and returns `false`.
    pub fn cancel(&mut self, target: CancelTarget) -> bool {
        let targeted = match (target, self.current_attempt()) {
            (_, None) => false,
            (CancelTarget::Current, Some(_)) => true,
            (CancelTarget::Attempt(id), Some(live)) => id == live,
        };
        if !targeted {
            return false;
        }
        let Some((id, token)) = self.live.take() else {
            return false;
        };
        token.cancel();
        debug!(resource = %self.label, attempt = id, "attempt cancelled");

        self.seq += 1;
        self.retained = None;
        self.state.send_replace(self.restore.clone());
        true
    }

    /// Cancels any live attempt and marks the lifecycle skipped.
    ///
    /// The transport is not contacted until the next [`start`](Self::start).
    pub fn skip(&mut self) {
        self.cancel(CancelTarget::Current);
        self.skipped = true;
    }

    /// Forces the state back to `Idle`.
    ///
    /// A live attempt keeps running, but its outcome will be ignored.
    pub fn reset(&mut self) {
        self.live = None;
        self.seq += 1;
        self.retained = None;
        self.restore = FetchState::Idle;
        self.state.send_replace(FetchState::Idle);
    }

    /// Returns a snapshot of the current state.
    #[must_use]
    pub fn state(&self) -> FetchState<T> {
        self.state.borrow().clone()
    }

    /// Returns a receiver that observes every state transition.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<FetchState<T>> {
        self.state.subscribe()
    }

    /// The id of the live attempt, if one is in flight.
    #[must_use]
    pub fn current_attempt(&self) -> Option<AttemptId> {
        self.live.as_ref().map(|(id, _)| *id)
    }

    #[must_use]
    pub const fn is_skipped(&self) -> bool {
        self.skipped
    }
}

impl<T> Drop for RequestLifecycle<T> {
    fn drop(&mut self) {
        if let Some((_, token)) = self.live.take() {
            token.cancel();
        }
    }
}

/// Everything one attempt needs to fetch and validate a resource.
pub struct AttemptPlan<T> {
    pub transport: Arc<dyn Transport>,
    pub template: Arc<str>,
    pub path_params: PathParams,
    /// Options already merged across every configuration layer.
    pub options: RequestOptions,
    pub validator: ValidatorRef<T>,
    /// Wait this long before sending the request.
    pub delay: Option<Duration>,
}

impl<T> AttemptPlan<T> {
    /// Compiles the URL, performs the exchange, and validates the body.
    ///
    /// # Errors
    ///
    /// Returns the first failure among URL compilation (strict mode only),
    /// the transport, and the validator. Cancelling `token` yields
    /// [`TransportError::Cancelled`].
    pub async fn execute(self, token: CancellationToken) -> Result<T, FetchError> {
        let url = if self.options.is_strict() {
            compile_url_strict(&self.template, &self.path_params)?
        } else {
            compile_url(&self.template, &self.path_params)
        };

        if let Some(delay) = self.delay {
            tokio::select! {
                biased;
                () = token.cancelled() => return Err(TransportError::Cancelled.into()),
                () = tokio::time::sleep(delay) => {}
            }
        }

        let raw = self
            .transport
            .execute(Request::new(url, self.options), token)
            .await?;
        Ok(self.validator.parse(raw)?)
    }
}

/// Starts an attempt on `lifecycle` and runs `plan` on the Tokio runtime.
///
/// The state is `Loading` by the time this returns. The join handle yields
/// what [`RequestLifecycle::settle`] did with the outcome.
///
/// A panic inside the plan (a validator, say) settles the attempt as
/// [`FetchError::Aborted`].
///
/// # Panics
///
/// Panics if called outside of a Tokio runtime.
pub fn spawn_attempt<T>(
    lifecycle: &Arc<Mutex<RequestLifecycle<T>>>,
    plan: AttemptPlan<T>,
) -> JoinHandle<Settlement>
where
    T: Clone + Send + Sync + 'static,
{
    spawn_attempt_then(lifecycle, plan, |_| {})
}

/// Like [`spawn_attempt`], and runs `then` with the settlement once the
/// lifecycle lock is released.
///
/// `then` runs inside the spawned task, so it fires even if nobody awaits
/// the join handle.
///
/// # Panics
///
/// Panics if called outside of a Tokio runtime.
pub fn spawn_attempt_then<T, F>(
    lifecycle: &Arc<Mutex<RequestLifecycle<T>>>,
    plan: AttemptPlan<T>,
    then: F,
) -> JoinHandle<Settlement>
where
    T: Clone + Send + Sync + 'static,
    F: FnOnce(Settlement) + Send + 'static,
{
    let attempt = lifecycle.lock().start();
    let lifecycle = Arc::clone(lifecycle);

    tokio::spawn(async move {
        let outcome = AssertUnwindSafe(plan.execute(attempt.token.clone()))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(FetchError::from(Aborted)));
        let settlement = lifecycle.lock().settle(attempt.id, outcome);
        then(settlement);
        settlement
    })
}
