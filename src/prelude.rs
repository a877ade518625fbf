//! Prelude module for convenient imports.
//!
//! ```
//! use snap_query::prelude::*;
//! ```
//!
//! # What's included
//!
//! - [`QueryClient`] - The shared transport, bus, and defaults
//! - [`FetchState`] and [`FetchError`] - What consumers observe
//! - The query, mutation, and lazy-query factories with their parameters
//! - [`RequestOptions`] and [`Method`] - Request configuration
//! - [`DeferredCell`] and [`ReadInterrupt`] - Suspending reads

pub use crate::QueryClient;
pub use crate::config::{Method, RequestOptions};
pub use crate::deferred::{CellState, DeferredCell, ReadInterrupt};
pub use crate::error::{FetchError, TransportError, ValidationError};
pub use crate::hook::lazy::{LazyParams, LazyQuery, LazyQueryHook, LazyQueryOptions};
pub use crate::hook::mutation::{
    MutateOptions, MutateParams, MutationHandle, MutationHook, MutationHookOptions,
};
pub use crate::hook::query::{QueryHandle, QueryHook, QueryHookOptions, QueryParams};
pub use crate::state::FetchState;
pub use crate::url::PathParams;
pub use crate::validate::{Validator, ValidatorRef};
