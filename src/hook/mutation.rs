//! Write consumers: explicitly triggered requests that invalidate on success.
//!
//! A [`MutationHandle`] never fetches on its own. Each call to
//! [`MutationHandle::mutate`] supersedes the previous one, and a mutation
//! that is still current when it succeeds invalidates the template (plus any
//! extra templates listed in [`MutationHookOptions::invalidates`]) so every
//! mounted query of it refetches.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::watch;
use tracing::debug;

use crate::QueryClient;
use crate::config::{Method, RequestOptions};
use crate::lifecycle::{CancelTarget, RequestLifecycle, Settlement, spawn_attempt_then};
use crate::state::FetchState;
use crate::url::{ParamValue, PathParams};
use crate::validate::ValidatorRef;

use super::Resource;

/// Rewrites the request body of a mutation before it is sent.
pub type RequestInterceptor = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Factory-level configuration of a [`MutationHook`].
pub struct MutationHookOptions<T> {
    /// Options applied to every mutation of this template.
    pub base: RequestOptions,
    pub default_validator: Option<ValidatorRef<T>>,
    /// Applied to the request body, when there is one.
    pub request_interceptor: Option<RequestInterceptor>,
    /// Templates invalidated on success in addition to the hook's own.
    pub invalidates: Vec<String>,
}

impl<T> Default for MutationHookOptions<T> {
    fn default() -> Self {
        Self {
            base: RequestOptions::default(),
            default_validator: None,
            request_interceptor: None,
            invalidates: Vec::new(),
        }
    }
}

/// Options fixed when a consumer binds a [`MutationHandle`].
pub struct MutateOptions<T> {
    pub validator: Option<ValidatorRef<T>>,
    pub options: RequestOptions,
    /// Used by `mutate` calls that bring no path parameters of their own.
    pub path_params: Option<PathParams>,
}

impl<T> Default for MutateOptions<T> {
    fn default() -> Self {
        Self {
            validator: None,
            options: RequestOptions::default(),
            path_params: None,
        }
    }
}

impl<T> fmt::Debug for MutateOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutateOptions")
            .field("validator", &self.validator.is_some())
            .field("options", &self.options)
            .field("path_params", &self.path_params)
            .finish()
    }
}

/// Arguments of a single [`MutationHandle::mutate`] call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutateParams {
    pub path_params: Option<PathParams>,
    pub options: RequestOptions,
}

impl MutateParams {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn path(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.path_params
            .get_or_insert_with(PathParams::new)
            .insert(name, value);
        self
    }

    #[must_use]
    pub fn path_params(mut self, path_params: PathParams) -> Self {
        self.path_params = Some(path_params);
        self
    }

    #[must_use]
    pub fn options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }
}

struct MutationShared<T> {
    resource: Resource<T>,
    interceptor: Option<RequestInterceptor>,
    invalidates: Vec<String>,
}

/// Write-consumer factory for one resource template.
pub struct MutationHook<T> {
    shared: Arc<MutationShared<T>>,
}

impl<T> Clone for MutationHook<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> MutationHook<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Registers `template` with `client`. Mutations default to `POST`.
    #[must_use]
    pub fn new(client: Arc<QueryClient>, template: &str, options: MutationHookOptions<T>) -> Self {
        Self {
            shared: Arc::new(MutationShared {
                resource: Resource::new(
                    client,
                    template,
                    options.base,
                    options.default_validator,
                    Method::Post,
                ),
                interceptor: options.request_interceptor,
                invalidates: options.invalidates,
            }),
        }
    }

    #[must_use]
    pub fn template(&self) -> &str {
        self.shared.resource.template()
    }

    /// Creates an idle mutation handle for one consumer.
    #[must_use]
    pub fn bind(&self, options: MutateOptions<T>) -> MutationHandle<T> {
        let lifecycle =
            RequestLifecycle::new(Arc::clone(self.shared.resource.template())).shared();
        let state = lifecycle.lock().subscribe();
        MutationHandle {
            shared: Arc::clone(&self.shared),
            options,
            lifecycle,
            state,
        }
    }
}

/// One bound write consumer.
///
/// Dropping the handle cancels its in-flight mutation.
pub struct MutationHandle<T>
where
    T: Clone + Send + Sync + 'static,
{
    shared: Arc<MutationShared<T>>,
    options: MutateOptions<T>,
    lifecycle: Arc<Mutex<RequestLifecycle<T>>>,
    state: watch::Receiver<FetchState<T>>,
}

impl<T> MutationHandle<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Sends the mutation, superseding any one still in flight.
    ///
    /// The state is `Loading` when this returns. The future resolves to the
    /// state after the mutation settled; if it was superseded or cancelled
    /// meanwhile, that is whatever state the newer call left behind.
    pub fn mutate(
        &self,
        params: MutateParams,
    ) -> impl Future<Output = FetchState<T>> + Send + use<T> {
        let resource = &self.shared.resource;
        let path_params = params
            .path_params
            .or_else(|| self.options.path_params.clone())
            .unwrap_or_default();

        let mut options = resource.options(&[&self.options.options, &params.options]);
        if let Some(intercept) = &self.shared.interceptor {
            options.body = options.body.take().map(|body| intercept(body));
        }

        let plan = resource.plan(path_params, options, self.options.validator.as_ref(), None);
        let shared = Arc::clone(&self.shared);
        let join = spawn_attempt_then(&self.lifecycle, plan, move |settlement| {
            if settlement != Settlement::Succeeded {
                return;
            }
            let client = shared.resource.client();
            let template = shared.resource.template();
            let notified = client.invalidate(template);
            debug!(resource = %template, notified, "mutation succeeded, invalidating");
            for extra in &shared.invalidates {
                client.invalidate(extra);
            }
        });

        let lifecycle = Arc::clone(&self.lifecycle);
        async move {
            let _ = join.await;
            lifecycle.lock().state()
        }
    }

    /// Cancels the in-flight mutation. Its outcome will be ignored.
    pub fn cancel(&self) -> bool {
        self.lifecycle.lock().cancel(CancelTarget::Current)
    }

    /// Returns to `Idle`. An in-flight mutation keeps running but its
    /// outcome is ignored and nothing is invalidated.
    pub fn reset(&self) {
        self.lifecycle.lock().reset();
    }

    #[must_use]
    pub fn state(&self) -> FetchState<T> {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn watch(&self) -> watch::Receiver<FetchState<T>> {
        self.state.clone()
    }
}

impl<T> Drop for MutationHandle<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.lifecycle.lock().cancel(CancelTarget::Current);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FetchError, TransportError};
    use crate::transport::mock::MockTransport;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn setup(options: MutationHookOptions<Value>) -> (MockTransport, Arc<QueryClient>, MutationHook<Value>) {
        let mock = MockTransport::new();
        let client = Arc::new(QueryClient::new(mock.clone()));
        let hook = MutationHook::new(Arc::clone(&client), "/todos/:id", options);
        (mock, client, hook)
    }

    fn counter(client: &QueryClient, topic: &str) -> (Arc<AtomicUsize>, crate::bus::Subscription) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let sub = client.subscribe(topic, move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        (count, sub)
    }

    #[tokio::test]
    async fn test_bind_does_not_fetch() {
        let (mock, _client, hook) = setup(MutationHookOptions::default());
        let handle = hook.bind(MutateOptions::default());
        tokio::task::yield_now().await;
        assert_eq!(handle.state(), FetchState::Idle);
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_mutate_succeeds_and_invalidates() {
        let (mock, client, hook) = setup(MutationHookOptions::default());
        mock.respond("/todos/1", Ok(json!({ "id": 1 })));
        let (count, _sub) = counter(&client, "/todos/:id");

        let handle = hook.bind(MutateOptions::default());
        let state = handle
            .mutate(MutateParams::new().path("id", 1).options(
                RequestOptions::new().body(json!({ "title": "x" })),
            ))
            .await;

        assert_eq!(state, FetchState::Success { data: json!({ "id": 1 }) });
        assert_eq!(count.load(Ordering::SeqCst), 1);

        let calls = mock.calls();
        assert_eq!(calls[0].method(), Method::Post);
        assert_eq!(calls[0].options.body, Some(json!({ "title": "x" })));
    }

    #[tokio::test]
    async fn test_failed_mutation_does_not_invalidate() {
        let (mock, client, hook) = setup(MutationHookOptions::default());
        mock.respond(
            "/todos/1",
            Err(TransportError::Status {
                status: 500,
                body: String::new(),
            }),
        );
        let (count, _sub) = counter(&client, "/todos/:id");

        let handle = hook.bind(MutateOptions::default());
        let state = handle.mutate(MutateParams::new().path("id", 1)).await;

        assert_eq!(state.error().and_then(FetchError::status), Some(500));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_bound_path_params_are_the_fallback() {
        let (mock, _client, hook) = setup(MutationHookOptions::default());
        mock.respond_always("/todos/7", Ok(json!(null)));
        mock.respond_always("/todos/8", Ok(json!(null)));

        let handle = hook.bind(MutateOptions {
            path_params: Some(PathParams::new().with("id", 7)),
            ..MutateOptions::default()
        });
        handle.mutate(MutateParams::new()).await;
        handle.mutate(MutateParams::new().path("id", 8)).await;

        assert_eq!(mock.calls_to("/todos/7"), 1);
        assert_eq!(mock.calls_to("/todos/8"), 1);
    }

    #[tokio::test]
    async fn test_interceptor_rewrites_body() {
        let options = MutationHookOptions {
            request_interceptor: Some(Arc::new(|body: Value| json!({ "wrapped": body }))),
            ..MutationHookOptions::default()
        };
        let (mock, _client, hook) = setup(options);
        mock.respond_always("/todos/1", Ok(json!({})));

        let handle = hook.bind(MutateOptions::default());
        handle
            .mutate(MutateParams::new().path("id", 1).options(
                RequestOptions::new().body(json!({ "title": "x" })),
            ))
            .await;
        handle.mutate(MutateParams::new().path("id", 1)).await;

        let calls = mock.calls();
        assert_eq!(
            calls[0].options.body,
            Some(json!({ "wrapped": { "title": "x" } }))
        );
        assert_eq!(calls[1].options.body, None);
    }

    #[tokio::test]
    async fn test_extra_templates_are_invalidated() {
        let options = MutationHookOptions {
            invalidates: vec!["/todos".to_string()],
            ..MutationHookOptions::default()
        };
        let (mock, client, hook) = setup(options);
        mock.respond("/todos/1", Ok(json!({})));
        let (list, _sub) = counter(&client, "/todos");

        let handle = hook.bind(MutateOptions::default());
        handle.mutate(MutateParams::new().path("id", 1)).await;
        assert_eq!(list.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_newer_mutation_wins() {
        let (mock, client, hook) = setup(MutationHookOptions::default());
        let first = mock.hold("/todos/1");
        mock.respond("/todos/1", Ok(json!({ "n": 2 })));
        let (count, _sub) = counter(&client, "/todos/:id");

        let handle = hook.bind(MutateOptions::default());
        let older = handle.mutate(MutateParams::new().path("id", 1));
        tokio::task::yield_now().await;
        let newer = handle.mutate(MutateParams::new().path("id", 1));

        assert_eq!(newer.await, FetchState::Success { data: json!({ "n": 2 }) });
        let _ = first.resolve(Ok(json!({ "n": 1 })));
        assert_eq!(older.await, FetchState::Success { data: json!({ "n": 2 }) });
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reset_ignores_in_flight_outcome() {
        let (mock, client, hook) = setup(MutationHookOptions::default());
        let responder = mock.hold("/todos/1");
        let (count, _sub) = counter(&client, "/todos/:id");

        let handle = hook.bind(MutateOptions::default());
        let pending = handle.mutate(MutateParams::new().path("id", 1));
        handle.reset();
        assert_eq!(handle.state(), FetchState::Idle);

        responder.resolve(Ok(json!({})));
        assert_eq!(pending.await, FetchState::Idle);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_reverts_to_idle() {
        let (mock, _client, hook) = setup(MutationHookOptions::default());
        let _responder = mock.hold("/todos/1");

        let handle = hook.bind(MutateOptions::default());
        let pending = handle.mutate(MutateParams::new().path("id", 1));
        assert!(handle.cancel());
        assert!(!handle.cancel());
        assert_eq!(pending.await, FetchState::Idle);
    }
}
