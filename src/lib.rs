//! # snap-query - typed, lifecycle-tracked remote resources
//!
//! snap-query lets UI code declare a dependency on an HTTP resource (a URL
//! template plus parameters) and observe it as a validated
//! [`FetchState<T>`](state::FetchState). Requests are ordered newest-wins:
//! a superseded or cancelled request can never overwrite the state of a
//! newer one.
//!
//! ## Consumers
//!
//! - [`QueryHook`](hook::query::QueryHook): fetches on mount and on parameter
//!   change, refetches when its template is invalidated
//! - [`MutationHook`](hook::mutation::MutationHook): fetches on demand and
//!   invalidates its template on success
//! - [`LazyQueryHook`](hook::lazy::LazyQueryHook): starts eagerly, exposes the
//!   result as a pollable [`DeferredCell`](deferred::DeferredCell)
//!
//! ## Building blocks
//!
//! - [`RequestLifecycle`](lifecycle::RequestLifecycle): the state machine
//!   every consumer runs on
//! - [`InvalidationBus`](bus::InvalidationBus): per-template fan-out between
//!   consumers
//! - [`compile_url`](url::compile_url): `:name` placeholder substitution
//! - [`Transport`](transport::Transport) and
//!   [`Validator`](validate::Validator): the network and schema seams
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use serde_json::json;
//! use snap_query::prelude::*;
//! use snap_query::transport::mock::MockTransport;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let mock = MockTransport::new();
//! mock.respond_always("/todos/1", Ok(json!({ "id": 1, "title": "write docs" })));
//!
//! let client = Arc::new(QueryClient::new(mock));
//! let todos = QueryHook::<serde_json::Value>::new(client, "/todos/:id", QueryHookOptions::default());
//!
//! let todo = todos.mount(QueryParams::new().path("id", 1));
//! let state = todo.refresh().await;
//! assert_eq!(state.data(), Some(&json!({ "id": 1, "title": "write docs" })));
//! # }
//! ```
//!
//! Logging goes through [`tracing`]; install a subscriber to see attempt
//! starts, settlements, and failures.

pub mod bus;
mod client;
pub mod config;
pub mod deferred;
pub mod error;
pub mod hook;
pub mod lifecycle;
pub mod prelude;
pub mod state;
pub mod transport;
pub mod url;
pub mod validate;

pub use client::QueryClient;
pub use error::{FetchError, TransportError, ValidationError};
pub use state::FetchState;
