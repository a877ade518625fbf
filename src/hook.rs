//! Consumer factories: queries, mutations, and lazy (suspending) queries.
//!
//! Each factory is registered once per resource template and hands out
//! per-consumer handles, the same way a hook factory is called once per
//! component instance:
//!
//! - [`QueryHook`](query::QueryHook): fetches on mount and on parameter
//!   change, refetches when its template is invalidated.
//! - [`MutationHook`](mutation::MutationHook): fetches on explicit `mutate`
//!   and invalidates its template on success.
//! - [`LazyQueryHook`](lazy::LazyQueryHook): starts eagerly and exposes the
//!   result through a [`DeferredCell`](crate::deferred::DeferredCell).
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use serde::Deserialize;
//! use snap_query::prelude::*;
//!
//! #[derive(Debug, Clone, Deserialize)]
//! struct Todo {
//!     id: u32,
//!     title: String,
//! }
//!
//! # async fn demo() {
//! let client = Arc::new(QueryClient::http());
//! let template = "https://jsonplaceholder.typicode.com/todos/:id";
//!
//! let todos = QueryHook::<Todo>::new(client.clone(), template, QueryHookOptions::default());
//! let update = MutationHook::<Todo>::new(client, template, MutationHookOptions::default());
//!
//! let todo = todos.mount(QueryParams::new().path("id", 1));
//! let writer = update.bind(MutateOptions::default());
//!
//! // Refreshes `todo` once the server accepts the change.
//! writer
//!     .mutate(MutateParams::new().path("id", 1).options(
//!         RequestOptions::new()
//!             .method(Method::Patch)
//!             .body(serde_json::json!({ "title": "renamed" })),
//!     ))
//!     .await;
//! println!("{:?}", todo.state());
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::QueryClient;
use crate::config::{Method, RequestOptions};
use crate::lifecycle::AttemptPlan;
use crate::url::PathParams;
use crate::validate::{self, ValidatorRef};

pub mod lazy;
pub mod mutation;
pub mod query;

/// A template registered with a client, shared by every handle of a factory.
pub(crate) struct Resource<T> {
    client: Arc<QueryClient>,
    template: Arc<str>,
    base: RequestOptions,
    default_validator: Option<ValidatorRef<T>>,
    default_method: Method,
}

impl<T> Resource<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        client: Arc<QueryClient>,
        template: &str,
        base: RequestOptions,
        default_validator: Option<ValidatorRef<T>>,
        default_method: Method,
    ) -> Self {
        Self {
            client,
            template: Arc::from(template),
            base,
            default_validator,
            default_method,
        }
    }

    pub(crate) const fn client(&self) -> &Arc<QueryClient> {
        &self.client
    }

    pub(crate) const fn template(&self) -> &Arc<str> {
        &self.template
    }

    /// Merges every option layer, lowest precedence first.
    pub(crate) fn options(&self, layers: &[&RequestOptions]) -> RequestOptions {
        let mut merged = self.client.defaults().merge(&self.base);
        for layer in layers {
            merged = merged.merge(layer);
        }
        if merged.method.is_none() {
            merged.method = Some(self.default_method);
        }
        merged
    }

    pub(crate) fn plan(
        &self,
        path_params: PathParams,
        options: RequestOptions,
        validator: Option<&ValidatorRef<T>>,
        delay: Option<Duration>,
    ) -> AttemptPlan<T> {
        AttemptPlan {
            transport: self.client.transport(),
            template: Arc::clone(&self.template),
            path_params,
            options,
            validator: validate::select(validator, self.default_validator.as_ref()),
            delay,
        }
    }
}

/// Compares optional validators by identity.
pub(crate) fn same_validator<T>(a: Option<&ValidatorRef<T>>, b: Option<&ValidatorRef<T>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        _ => false,
    }
}
