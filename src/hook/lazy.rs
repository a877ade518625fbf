//! Suspending reads: eagerly started fetches exposed as deferred cells.
//!
//! [`LazyQuery::resource`] starts the request as soon as it is called and
//! returns a [`DeferredCell`] a renderer can poll with
//! [`try_read`](DeferredCell::try_read). Calling it again with equal
//! parameters returns the same cell, so polling never refetches; new
//! parameters create a new cell and leave the previous one to settle on its
//! own.
//!
//! ```rust,ignore
//! let todos = LazyQueryHook::<Todo>::new(client, "/todos/:id", LazyQueryOptions::default());
//! let mut query = todos.query();
//!
//! match query.resource(LazyParams::new().path("id", 1)).try_read() {
//!     Ok(todo) => render(todo),
//!     Err(ReadInterrupt::NotReady(pending)) => pending.await,
//!     Err(ReadInterrupt::Rejected(error)) => render_error(error),
//! }
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::QueryClient;
use crate::config::{Method, RequestOptions};
use crate::deferred::{Aborted, DeferredCell};
use crate::error::FetchError;
use crate::lifecycle::RequestLifecycle;
use crate::state::FetchState;
use crate::url::{ParamValue, PathParams};
use crate::validate::ValidatorRef;

use super::{Resource, same_validator};

/// The cell handed out by [`LazyQuery::resource`].
///
/// Fulfilled with `Some(data)` after a successful fetch, or with the
/// parameters' `default_value` when the query is skipped.
pub type LazyCell<T> = DeferredCell<Option<T>, FetchError>;

/// Factory-level configuration of a [`LazyQueryHook`].
pub struct LazyQueryOptions<T> {
    pub base: RequestOptions,
    pub default_validator: Option<ValidatorRef<T>>,
}

impl<T> Default for LazyQueryOptions<T> {
    fn default() -> Self {
        Self {
            base: RequestOptions::default(),
            default_validator: None,
        }
    }
}

/// Parameters of one suspending read.
pub struct LazyParams<T> {
    pub path_params: PathParams,
    pub skip: bool,
    pub validator: Option<ValidatorRef<T>>,
    /// The value a skipped read is fulfilled with.
    pub default_value: Option<T>,
    /// Wait this long before sending the request.
    pub delay: Option<Duration>,
    pub options: RequestOptions,
}

impl<T> LazyParams<T> {
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
    pub fn default_value(mut self, value: T) -> Self {
        self.default_value = Some(value);
        self
    }

    #[must_use]
    pub const fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    #[must_use]
    pub fn options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }
}

impl<T> Default for LazyParams<T> {
    fn default() -> Self {
        Self {
            path_params: PathParams::default(),
            skip: false,
            validator: None,
            default_value: None,
            delay: None,
            options: RequestOptions::default(),
        }
    }
}

impl<T: Clone> Clone for LazyParams<T> {
    fn clone(&self) -> Self {
        Self {
            path_params: self.path_params.clone(),
            skip: self.skip,
            validator: self.validator.clone(),
            default_value: self.default_value.clone(),
            delay: self.delay,
            options: self.options.clone(),
        }
    }
}

impl<T: PartialEq> PartialEq for LazyParams<T> {
    fn eq(&self, other: &Self) -> bool {
        self.path_params == other.path_params
            && self.skip == other.skip
            && self.default_value == other.default_value
            && self.delay == other.delay
            && self.options == other.options
            && same_validator(self.validator.as_ref(), other.validator.as_ref())
    }
}

impl<T: fmt::Debug> fmt::Debug for LazyParams<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyParams")
            .field("path_params", &self.path_params)
            .field("skip", &self.skip)
            .field("validator", &self.validator.is_some())
            .field("default_value", &self.default_value)
            .field("delay", &self.delay)
            .field("options", &self.options)
            .finish()
    }
}

/// Suspending-read factory for one resource template.
pub struct LazyQueryHook<T> {
    resource: Arc<Resource<T>>,
}

impl<T> Clone for LazyQueryHook<T> {
    fn clone(&self) -> Self {
        Self {
            resource: Arc::clone(&self.resource),
        }
    }
}

impl<T> LazyQueryHook<T>
where
    T: DeserializeOwned + Clone + PartialEq + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(client: Arc<QueryClient>, template: &str, options: LazyQueryOptions<T>) -> Self {
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

    /// Creates the per-consumer memo of cells.
    #[must_use]
    pub fn query(&self) -> LazyQuery<T> {
        LazyQuery {
            resource: Arc::clone(&self.resource),
            memo: None,
        }
    }
}

/// One consumer's suspending read, remembering the cell of its last
/// parameters.
pub struct LazyQuery<T> {
    resource: Arc<Resource<T>>,
    memo: Option<(LazyParams<T>, LazyCell<T>)>,
}

impl<T> LazyQuery<T>
where
    T: DeserializeOwned + Clone + PartialEq + Send + Sync + 'static,
{
    /// Returns the cell for `params`, starting the fetch if they differ from
    /// the previous call's.
    ///
    /// # Panics
    ///
    /// Panics if a fetch must be started outside of a Tokio runtime.
    pub fn resource(&mut self, params: LazyParams<T>) -> LazyCell<T> {
        if let Some((memo_params, cell)) = &self.memo {
            if *memo_params == params {
                return cell.clone();
            }
        }

        let cell = self.start(&params);
        self.memo = Some((params, cell.clone()));
        cell
    }

    fn start(&self, params: &LazyParams<T>) -> LazyCell<T> {
        if params.skip {
            debug!(resource = %self.resource.template(), "lazy query skipped");
            return DeferredCell::ready(params.default_value.clone());
        }

        let options = self.resource.options(&[&params.options]);
        let plan = self.resource.plan(
            params.path_params.clone(),
            options,
            params.validator.as_ref(),
            params.delay,
        );
        let mut lifecycle = RequestLifecycle::new(Arc::clone(self.resource.template()));

        DeferredCell::wrap(async move {
            let attempt = lifecycle.start();
            let outcome = plan.execute(attempt.token().clone()).await;
            lifecycle.settle(attempt.id(), outcome);
            match lifecycle.state() {
                FetchState::Success { data } => Ok(Some(data)),
                FetchState::Error { error, .. } => Err(error),
                FetchState::Idle | FetchState::Loading { .. } => Err(Aborted.into()),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deferred::{CellState, ReadInterrupt};
    use crate::error::TransportError;
    use crate::transport::mock::MockTransport;
    use serde_json::json;
    use tokio::time::timeout;

    fn setup() -> (MockTransport, LazyQueryHook<u32>) {
        let mock = MockTransport::new();
        let client = Arc::new(QueryClient::new(mock.clone()));
        (mock, LazyQueryHook::new(client, "/counts/:id", LazyQueryOptions::default()))
    }

    #[tokio::test]
    async fn test_resource_starts_eagerly_and_fulfils() {
        let (mock, hook) = setup();
        let responder = mock.hold("/counts/1");
        let mut query = hook.query();

        let cell = query.resource(LazyParams::new().path("id", 1));
        let Err(ReadInterrupt::NotReady(pending)) = cell.try_read() else {
            panic!("expected a pending cell");
        };

        tokio::task::yield_now().await;
        assert_eq!(mock.call_count(), 1);
        responder.resolve(Ok(json!(5)));
        timeout(Duration::from_secs(1), pending)
            .await
            .expect("cell should settle");
        assert_eq!(cell.try_read().ok(), Some(Some(5)));
    }

    #[tokio::test]
    async fn test_equal_params_reuse_cell() {
        let (mock, hook) = setup();
        mock.respond_always("/counts/1", Ok(json!(5)));
        let mut query = hook.query();

        let first = query.resource(LazyParams::new().path("id", 1));
        assert_eq!(first.settled().await, Ok(Some(5)));
        for _ in 0..3 {
            let again = query.resource(LazyParams::new().path("id", 1));
            assert_eq!(again.try_read().ok(), Some(Some(5)));
        }
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_changed_params_create_new_cell() {
        let (mock, hook) = setup();
        mock.respond("/counts/1", Ok(json!(1)));
        mock.respond("/counts/2", Ok(json!(2)));
        let mut query = hook.query();

        let first = query.resource(LazyParams::new().path("id", 1));
        let second = query.resource(LazyParams::new().path("id", 2));
        assert_eq!(second.settled().await, Ok(Some(2)));
        assert_eq!(first.settled().await, Ok(Some(1)));
    }

    #[tokio::test]
    async fn test_skip_is_ready_with_default_value() {
        let (mock, hook) = setup();
        let mut query = hook.query();

        let cell = query.resource(LazyParams::new().skip(true).default_value(9));
        assert_eq!(cell.try_read().ok(), Some(Some(9)));

        let cell = query.resource(LazyParams::new().skip(true));
        assert_eq!(cell.try_read().ok(), Some(None));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_failure_rejects_cell() {
        let (mock, hook) = setup();
        mock.respond("/counts/1", Err(TransportError::Timeout));
        let mut query = hook.query();

        let cell = query.resource(LazyParams::new().path("id", 1));
        assert_eq!(
            cell.settled().await,
            Err(FetchError::Transport(TransportError::Timeout))
        );
        assert!(matches!(cell.state(), CellState::Rejected(_)));
        assert!(matches!(cell.try_read(), Err(ReadInterrupt::Rejected(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_postpones_request() {
        let (mock, hook) = setup();
        mock.respond("/counts/1", Ok(json!(3)));
        let mut query = hook.query();

        let cell = query.resource(
            LazyParams::new()
                .path("id", 1)
                .delay(Duration::from_millis(500)),
        );
        tokio::task::yield_now().await;
        assert_eq!(mock.call_count(), 0);

        assert_eq!(cell.settled().await, Ok(Some(3)));
        assert_eq!(mock.call_count(), 1);
    }
}
