//! HTTP transport seam.
//!
//! The reducer never talks to the network directly. It builds an
//! [`HttpRequest`], pairs it with a [`CancelHandle`], and hands both to an
//! [`HttpTransport`] inside an effect. Production code plugs in a reqwest
//! backed transport; tests plug in a scripted mock.

use crate::params::Params;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// HTTP method
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    /// GET (the default)
    #[default]
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
    /// HEAD
    Head,
    /// OPTIONS
    Options,
}

impl Method {
    /// Upper-case method name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A partial transport configuration layer.
///
/// Layers are combined with [`RequestConfig::merge`]; fields set on the
/// overriding layer win, headers are unioned with the override taking
/// precedence per header name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestConfig {
    /// Base URL that relative request URLs are resolved against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Request headers
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// Per-request timeout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
    /// JSON request body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl RequestConfig {
    /// Empty layer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the base URL
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Add a header
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Set the timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the JSON body
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Layer `overrides` on top of `self`.
    #[must_use]
    pub fn merge(mut self, overrides: Self) -> Self {
        if overrides.base_url.is_some() {
            self.base_url = overrides.base_url;
        }
        self.headers.extend(overrides.headers);
        if overrides.timeout.is_some() {
            self.timeout = overrides.timeout;
        }
        if overrides.body.is_some() {
            self.body = overrides.body;
        }
        self
    }
}

/// A fully resolved request, ready for a transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpRequest {
    /// HTTP method
    pub method: Method,
    /// Target URL, absolute or relative to `base_url`
    pub url: String,
    /// Base URL for relative targets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Query parameters
    #[serde(default)]
    pub params: Params,
    /// Request headers
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// JSON body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// Timeout for the whole exchange
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    /// Resolve a request from a merged config layer and the call-specific fields.
    ///
    /// The call-specific `method`, `url` and `params` always win over the layer.
    #[must_use]
    pub fn resolve(config: RequestConfig, method: Method, url: impl Into<String>, params: Params) -> Self {
        Self {
            method,
            url: url.into(),
            base_url: config.base_url,
            params,
            headers: config.headers,
            body: config.body,
            timeout: config.timeout,
        }
    }

    /// The URL the request will actually hit.
    ///
    /// Absolute URLs pass through; relative ones are appended to `base_url`
    /// with exactly one `/` between the two.
    #[must_use]
    pub fn full_url(&self) -> String {
        let is_absolute = self.url.contains("://");
        match (&self.base_url, is_absolute) {
            (Some(base), false) => format!(
                "{}/{}",
                base.trim_end_matches('/'),
                self.url.trim_start_matches('/')
            ),
            _ => self.url.clone(),
        }
    }
}

/// A transport response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Body, parsed as JSON when possible, otherwise a JSON string
    pub data: Value,
    /// Echo of the request that produced this response.
    ///
    /// Transport-internal; stripped before a response is stored or returned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<HttpRequest>,
}

impl HttpResponse {
    /// A `200 OK` response carrying `data`
    #[must_use]
    pub fn ok(data: Value) -> Self {
        Self::with_status(200, data)
    }

    /// A response with the given status and body
    #[must_use]
    pub fn with_status(status: u16, data: Value) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            data,
            config: None,
        }
    }

    /// Attach the request echo
    #[must_use]
    pub fn with_config(mut self, request: HttpRequest) -> Self {
        self.config = Some(request);
        self
    }

    /// Whether the status is 2xx
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// The response without its transport-internal request echo
    #[must_use]
    pub fn redacted(mut self) -> Self {
        self.config = None;
        self
    }
}

/// Transport failures.
///
/// Only one distinction matters to the coordinator: whether the failure is a
/// cancellation it raised itself ([`TransportError::is_cancelled`]).
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportError {
    /// The call was aborted through its cancel handle
    #[error("Request cancelled")]
    Cancelled,

    /// Connection-level failure
    #[error("Network error: {message}")]
    Network {
        /// Underlying error text
        message: String,
    },

    /// The configured timeout elapsed
    #[error("Request timed out")]
    Timeout,

    /// The server answered with a non-2xx status
    #[error("HTTP status {status}")]
    Status {
        /// Status code
        status: u16,
        /// The full error response
        response: Box<HttpResponse>,
    },

    /// The response body could not be read
    #[error("Failed to read response: {message}")]
    Decode {
        /// Underlying error text
        message: String,
    },

    /// The request could not be built
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// What was wrong
        message: String,
    },
}

impl TransportError {
    /// Network failure from any displayable error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Non-2xx status failure
    #[must_use]
    pub fn status(response: HttpResponse) -> Self {
        Self::Status {
            status: response.status,
            response: Box::new(response),
        }
    }

    /// Whether this failure was raised by a cancel handle
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// The error response, when the server sent one
    #[must_use]
    pub fn response(&self) -> Option<&HttpResponse> {
        match self {
            Self::Status { response, .. } => Some(response),
            _ => None,
        }
    }

    /// The same error with any carried response redacted
    #[must_use]
    pub fn redacted(self) -> Self {
        match self {
            Self::Status { status, response } => Self::Status {
                status,
                response: Box::new(response.redacted()),
            },
            other => other,
        }
    }
}

/// Cancel handle bound to a single transport call.
///
/// Clones share the same signal. Cancelling is idempotent and never waits
/// for the call to observe it.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    /// Fresh, un-cancelled handle
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether cancellation has been signalled
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once cancellation has been signalled
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }
}

/// HTTP transport.
///
/// Implementations must resolve with [`TransportError::Cancelled`] once
/// `cancel` fires before the exchange completes.
pub trait HttpTransport: Send + Sync + 'static {
    /// Perform one HTTP exchange.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] for cancellation, network failures,
    /// timeouts, non-2xx statuses and unreadable bodies.
    fn send(
        &self,
        request: HttpRequest,
        cancel: CancelHandle,
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send;
}
