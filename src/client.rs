//! The shared context of every consumer factory.

use std::fmt;
use std::sync::Arc;

use crate::bus::{InvalidationBus, Subscription};
use crate::config::RequestOptions;
use crate::transport::Transport;

/// Holds the transport, the invalidation bus, and the client-wide default
/// request options.
///
/// Factories registered with the same client share its bus, which is what
/// lets a [`MutationHook`](crate::hook::mutation::MutationHook) refresh the
/// [`QueryHook`](crate::hook::query::QueryHook)s of the same template. Two
/// clients never see each other's invalidations.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::time::Duration;
/// use snap_query::{QueryClient, config::RequestOptions, transport::mock::MockTransport};
///
/// let defaults = RequestOptions::new()
///     .header("accept", "application/json")
///     .timeout(Duration::from_secs(10));
///
/// let client = Arc::new(QueryClient::with_defaults(MockTransport::new(), defaults));
/// assert_eq!(client.invalidate("/todos/:id"), 0);
/// ```
#[derive(Clone)]
pub struct QueryClient {
    transport: Arc<dyn Transport>,
    bus: InvalidationBus,
    defaults: RequestOptions,
}

impl fmt::Debug for QueryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryClient")
            .field("bus", &self.bus)
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

impl QueryClient {
    /// Creates a client with empty default options.
    #[must_use]
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self::with_defaults(transport, RequestOptions::default())
    }

    /// Creates a client whose requests start from `defaults`.
    #[must_use]
    pub fn with_defaults(transport: impl Transport + 'static, defaults: RequestOptions) -> Self {
        Self {
            transport: Arc::new(transport),
            bus: InvalidationBus::new(),
            defaults,
        }
    }

    /// Creates a client using the `reqwest` transport.
    #[cfg(feature = "http")]
    #[must_use]
    pub fn http() -> Self {
        Self::new(crate::transport::http::HttpTransport::new())
    }

    /// Makes every mounted query of `template` refetch.
    ///
    /// Returns the number of queries notified.
    pub fn invalidate(&self, template: &str) -> usize {
        self.bus.publish(template)
    }

    pub(crate) fn subscribe<F>(&self, template: &str, handler: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.bus.subscribe(template, handler)
    }

    #[must_use]
    pub const fn bus(&self) -> &InvalidationBus {
        &self.bus
    }

    #[must_use]
    pub const fn defaults(&self) -> &RequestOptions {
        &self.defaults
    }

    pub(crate) fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }
}
