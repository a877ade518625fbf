//! The HTTP exchange collaborator.
//!
//! Consumers never talk to the network directly: every attempt hands a
//! compiled [`Request`] and a [`CancellationToken`] to a [`Transport`].
//! A transport must stop waiting and return [`TransportError::Cancelled`] once
//! the token is cancelled, so that a superseded exchange is abandoned promptly.
//!
//! - [`HttpTransport`](http::HttpTransport): `reqwest`-based implementation (feature `http`)
//! - [`MockTransport`](mock::MockTransport): scripted transport for tests

use futures::future::BoxFuture;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::{Method, RequestOptions};
use crate::error::TransportError;

#[cfg(feature = "http")]
pub mod http;
pub mod mock;

/// A fully resolved request.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// The compiled URL, placeholders already substituted.
    pub url: String,
    /// The merged options of every configuration layer.
    pub options: RequestOptions,
}

impl Request {
    #[must_use]
    pub const fn new(url: String, options: RequestOptions) -> Self {
        Self { url, options }
    }

    /// The effective method, `GET` unless a layer set one.
    #[must_use]
    pub fn method(&self) -> Method {
        self.options.method.unwrap_or_default()
    }
}

/// Performs HTTP exchanges.
pub trait Transport: Send + Sync {
    /// Executes `request` and returns the decoded JSON body.
    ///
    /// The returned future must resolve to `Err(TransportError::Cancelled)`
    /// soon after `token` is cancelled.
    fn execute(
        &self,
        request: Request,
        token: CancellationToken,
    ) -> BoxFuture<'static, Result<Value, TransportError>>;
}
