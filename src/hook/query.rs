//! Read consumers: eagerly fetching, invalidation-aware queries.
//!
//! A [`QueryHook`] is registered once per resource template. Every consumer
//! calls [`QueryHook::mount`] to get its own [`QueryHandle`], which:
//!
//! 1. starts an attempt immediately (unless `skip` is set),
//! 2. re-runs whenever [`QueryHandle::update`] receives different parameters,
//! 3. re-runs whenever the template is invalidated on the client's bus,
//! 4. cancels its attempt and unsubscribes when dropped.
//!
//! # Example
//!
//! ```rust,ignore
//! let hook = QueryHook::<Todo>::new(client.clone(), "/todos/:id", QueryHookOptions::default());
//!
//! let handle = hook.mount(QueryParams::new().path("id", 1));
//! let mut states = handle.watch();
//! while states.changed().await.is_ok() {
//!     render(&*states.borrow());
//! }
//! ```

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use tokio::runtime::Handle as RuntimeHandle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::QueryClient;
use crate::bus::Subscription;
use crate::config::{Method, RequestOptions};
use crate::lifecycle::{CancelTarget, RequestLifecycle, Settlement, spawn_attempt};
use crate::state::FetchState;
use crate::url::{ParamValue, PathParams};
use crate::validate::ValidatorRef;

use super::{Resource, same_validator};

/// Factory-level configuration of a [`QueryHook`].
pub struct QueryHookOptions<T> {
    /// Options applied to every request of this template.
    pub base: RequestOptions,
    /// Validator used when a consumer does not bring its own.
    pub default_validator: Option<ValidatorRef<T>>,
}

impl<T> Default for QueryHookOptions<T> {
    fn default() -> Self {
        Self {
            base: RequestOptions::default(),
            default_validator: None,
        }
    }
}

/// Per-consumer parameters of a query.
///
/// Two parameter sets are equal when their path parameters, `skip` flag and
/// options are equal and they use the same validator instance.
pub struct QueryParams<T> {
    pub path_params: PathParams,
    /// Do not contact the transport while set.
    pub skip: bool,
    pub validator: Option<ValidatorRef<T>>,
    pub options: RequestOptions,
}

impl<T> QueryParams<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn path(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.path_params.insert(name, value);
        self
    }

    #[must_use]
    pub fn path_params(mut self, path_params: PathParams) -> Self {
        self.path_params = path_params;
        self
    }

    #[must_use]
    pub fn skip(mut self, skip: bool) -> Self {
        self.skip = skip;
        self
    }

    #[must_use]
    pub fn validator(mut self, validator: ValidatorRef<T>) -> Self {
        self.validator = Some(validator);
        self
    }

    #[must_use]
    pub fn options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }
}

impl<T> Default for QueryParams<T> {
    fn default() -> Self {
        Self {
            path_params: PathParams::default(),
            skip: false,
            validator: None,
            options: RequestOptions::default(),
        }
    }
}

impl<T> Clone for QueryParams<T> {
    fn clone(&self) -> Self {
        Self {
            path_params: self.path_params.clone(),
            skip: self.skip,
            validator: self.validator.clone(),
            options: self.options.clone(),
        }
    }
}

impl<T> PartialEq for QueryParams<T> {
    fn eq(&self, other: &Self) -> bool {
        self.path_params == other.path_params
            && self.skip == other.skip
            && self.options == other.options
            && same_validator(self.validator.as_ref(), other.validator.as_ref())
    }
}

impl<T> fmt::Debug for QueryParams<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryParams")
            .field("path_params", &self.path_params)
            .field("skip", &self.skip)
            .field("validator", &self.validator.is_some())
            .field("options", &self.options)
            .finish()
    }
}

/// Read-consumer factory for one resource template.
pub struct QueryHook<T> {
    resource: Arc<Resource<T>>,
}

impl<T> Clone for QueryHook<T> {
    fn clone(&self) -> Self {
        Self {
            resource: Arc::clone(&self.resource),
        }
    }
}

impl<T> QueryHook<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Registers `template` with `client`.
    #[must_use]
    pub fn new(client: Arc<QueryClient>, template: &str, options: QueryHookOptions<T>) -> Self {
        Self {
            resource: Arc::new(Resource::new(
                client,
                template,
                options.base,
                options.default_validator,
                Method::Get,
            )),
        }
    }

    #[must_use]
    pub fn template(&self) -> &str {
        self.resource.template()
    }

    /// Mounts a consumer: binds a lifecycle, fetches unless skipped, and
    /// subscribes to invalidations of the template.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    #[must_use]
    pub fn mount(&self, params: QueryParams<T>) -> QueryHandle<T> {
        let lifecycle = RequestLifecycle::new(Arc::clone(self.resource.template())).shared();
        let state = lifecycle.lock().subscribe();

        let inner = Arc::new(QueryInner {
            resource: Arc::clone(&self.resource),
            lifecycle,
            params: Mutex::new(params),
            runtime: RuntimeHandle::current(),
        });

        let weak: Weak<QueryInner<T>> = Arc::downgrade(&inner);
        let subscription = self
            .resource
            .client()
            .subscribe(self.resource.template(), move || {
                if let Some(inner) = weak.upgrade() {
                    debug!(resource = %inner.resource.template(), "invalidated, refetching");
                    inner.trigger();
                }
            });

        inner.trigger();
        QueryHandle {
            inner,
            state,
            _subscription: subscription,
        }
    }
}

struct QueryInner<T> {
    resource: Arc<Resource<T>>,
    lifecycle: Arc<Mutex<RequestLifecycle<T>>>,
    params: Mutex<QueryParams<T>>,
    runtime: RuntimeHandle,
}

impl<T> QueryInner<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Runs the current parameters: skips, or starts a superseding attempt.
    fn trigger(&self) -> Option<JoinHandle<Settlement>> {
        let params = self.params.lock();
        self.run(&params)
    }

    /// Must be called with the params lock held, so that the newest attempt
    /// is always built from the newest parameters.
    fn run(&self, params: &QueryParams<T>) -> Option<JoinHandle<Settlement>> {
        if params.skip {
            self.lifecycle.lock().skip();
            return None;
        }

        let options = self.resource.options(&[&params.options]);
        let plan = self.resource.plan(
            params.path_params.clone(),
            options,
            params.validator.as_ref(),
            None,
        );
        // Invalidations may be published from outside the runtime.
        let _guard = self.runtime.enter();
        Some(spawn_attempt(&self.lifecycle, plan))
    }
}

/// One mounted read consumer.
///
/// Dropping the handle cancels its live attempt and unsubscribes it from
/// invalidations.
pub struct QueryHandle<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<QueryInner<T>>,
    state: watch::Receiver<FetchState<T>>,
    _subscription: Subscription,
}

impl<T> QueryHandle<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Returns a snapshot of the current state.
    #[must_use]
    pub fn state(&self) -> FetchState<T> {
        self.state.borrow().clone()
    }

    /// Returns a receiver notified on every state transition.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<FetchState<T>> {
        self.state.clone()
    }

    /// Starts a new attempt with the current parameters.
    ///
    /// The state is `Loading` when this returns; the future resolves to the
    /// state after the attempt settled (or was superseded). A skipped query
    /// resolves immediately without fetching.
    pub fn refresh(&self) -> impl Future<Output = FetchState<T>> + Send + use<T> {
        let join = self.inner.trigger();
        let lifecycle = Arc::clone(&self.inner.lifecycle);
        async move {
            if let Some(join) = join {
                let _ = join.await;
            }
            lifecycle.lock().state()
        }
    }

    /// Cancels the live attempt, if any. Its outcome will be ignored.
    pub fn cancel(&self) -> bool {
        self.inner.lifecycle.lock().cancel(CancelTarget::Current)
    }

    /// Replaces the parameters, re-running only if they changed by value.
    ///
    /// Returns `true` if the new parameters were applied.
    pub fn update(&self, params: QueryParams<T>) -> bool {
        let mut current = self.inner.params.lock();
        if *current == params {
            return false;
        }
        *current = params;
        self.inner.run(&current);
        true
    }

    /// Returns a copy of the current parameters.
    #[must_use]
    pub fn params(&self) -> QueryParams<T> {
        self.inner.params.lock().clone()
    }

    /// Returns `true` while the `skip` flag holds the query back.
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        self.inner.lifecycle.lock().is_skipped()
    }
}

impl<T> Drop for QueryHandle<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.inner.lifecycle.lock().cancel(CancelTarget::Current);
    }
}
