//! `reqwest`-backed transport.

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::Method;
use crate::error::TransportError;

use super::{Request, Transport};

/// A [`Transport`] that performs real HTTP exchanges with `reqwest`.
///
/// Response bodies are decoded as JSON; an empty body decodes to
/// [`Value::Null`]. Non-2xx responses become [`TransportError::Status`].
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a preconfigured client (proxies, TLS roots, default headers).
    #[must_use]
    pub const fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn to_reqwest(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

fn map_error(err: &reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_decode() {
        TransportError::Decode(err.to_string())
    } else {
        TransportError::Network(err.to_string())
    }
}

async fn exchange(client: reqwest::Client, request: Request) -> Result<Value, TransportError> {
    let method = to_reqwest(request.method());
    let Request { url, options } = request;

    let mut builder = client.request(method, &url);
    for (name, value) in &options.headers {
        builder = builder.header(name, value);
    }
    if !options.query.is_empty() {
        builder = builder.query(&options.query);
    }
    if let Some(body) = &options.body {
        builder = builder.json(body);
    }
    if let Some(timeout) = options.timeout {
        builder = builder.timeout(timeout);
    }

    let response = builder.send().await.map_err(|e| map_error(&e))?;
    let status = response.status();
    let bytes = response.bytes().await.map_err(|e| map_error(&e))?;

    if !status.is_success() {
        return Err(TransportError::Status {
            status: status.as_u16(),
            body: String::from_utf8_lossy(&bytes).into_owned(),
        });
    }
    if bytes.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_slice(&bytes).map_err(|e| TransportError::Decode(e.to_string()))
}

impl Transport for HttpTransport {
    fn execute(
        &self,
        request: Request,
        token: CancellationToken,
    ) -> BoxFuture<'static, Result<Value, TransportError>> {
        let client = self.client.clone();
        async move {
            tokio::select! {
                biased;
                () = token.cancelled() => Err(TransportError::Cancelled),
                result = exchange(client, request) => result,
            }
        }
        .boxed()
    }
}
