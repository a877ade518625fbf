use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::Value;

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

/// Request configuration, applied in layers.
///
/// Every field is optional so that a layer only overrides what it sets.
/// Layers are combined with [`RequestOptions::merge`]; the layer passed as
/// `overlay` wins field by field, and `headers` / `query` are merged entry by
/// entry. Consumers apply, from lowest to highest precedence:
///
/// 1. the client defaults ([`QueryClient::with_defaults`](crate::QueryClient::with_defaults))
/// 2. the factory's base options
/// 3. the per-invocation options (mount / bind / resource)
/// 4. the per-call options of [`MutationHandle::mutate`](crate::hook::mutation::MutationHandle::mutate)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    /// HTTP method. Queries default to `GET`, mutations to `POST`.
    pub method: Option<Method>,
    /// Extra request headers.
    pub headers: BTreeMap<String, String>,
    /// Query string parameters.
    pub query: BTreeMap<String, String>,
    /// JSON request body.
    pub body: Option<Value>,
    /// Per-request timeout.
    pub timeout: Option<Duration>,
    /// Fail the attempt instead of sending a URL with unresolved placeholders.
    pub strict_path_params: Option<bool>,
}

impl RequestOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub const fn strict_path_params(mut self, strict: bool) -> Self {
        self.strict_path_params = Some(strict);
        self
    }

    /// Returns a new layer where every field set in `overlay` replaces the one in `self`.
    #[must_use]
    pub fn merge(&self, overlay: &Self) -> Self {
        let mut headers = self.headers.clone();
        headers.extend(overlay.headers.iter().map(|(k, v)| (k.clone(), v.clone())));
        let mut query = self.query.clone();
        query.extend(overlay.query.iter().map(|(k, v)| (k.clone(), v.clone())));

        Self {
            method: overlay.method.or(self.method),
            headers,
            query,
            body: overlay.body.clone().or_else(|| self.body.clone()),
            timeout: overlay.timeout.or(self.timeout),
            strict_path_params: overlay.strict_path_params.or(self.strict_path_params),
        }
    }

    pub(crate) fn is_strict(&self) -> bool {
        self.strict_path_params.unwrap_or(false)
    }
}
