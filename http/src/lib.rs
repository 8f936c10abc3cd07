//! reqwest-backed [`HttpTransport`].
//!
//! Resolves the request URL, encodes parameters into the query string,
//! applies headers, body and timeout, and races the exchange against the
//! call's [`CancelHandle`].
//!
//! ```no_run
//! use fetchstate_core::params::Params;
//! use fetchstate_core::transport::{CancelHandle, HttpRequest, HttpTransport, Method, RequestConfig};
//! use fetchstate_http::ReqwestTransport;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = ReqwestTransport::new();
//! let request = HttpRequest::resolve(
//!     RequestConfig::new().with_base_url("https://api.example.com"),
//!     Method::Get,
//!     "/users",
//!     Params::new().with("page", 1),
//! );
//! let response = transport.send(request, CancelHandle::new()).await?;
//! println!("{}", response.data);
//! # Ok(())
//! # }
//! ```

use fetchstate_core::transport::{
    CancelHandle, HttpRequest, HttpResponse, HttpTransport, Method, TransportError,
};
use futures::StreamExt;
use std::collections::BTreeMap;

/// Maximum response size (50MB)
pub const MAX_RESPONSE_SIZE: usize = 50 * 1024 * 1024;

/// HTTP transport over a shared `reqwest::Client`.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    max_response_size: usize,
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::with_client(reqwest::Client::new())
    }
}

impl ReqwestTransport {
    /// Transport with a default client
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport over an existing client (connection pool, proxies, TLS settings)
    #[must_use]
    pub const fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            max_response_size: MAX_RESPONSE_SIZE,
        }
    }

    /// Reject response bodies larger than `bytes`
    #[must_use]
    pub const fn with_max_response_size(mut self, bytes: usize) -> Self {
        self.max_response_size = bytes;
        self
    }

    fn build(&self, request: &HttpRequest) -> Result<reqwest::RequestBuilder, TransportError> {
        let url = request.full_url();

        // Only allow http:// and https://
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(TransportError::InvalidRequest {
                message: format!("URL must start with http:// or https://: {url}"),
            });
        }

        let mut builder = self.client.request(to_reqwest_method(request.method), &url);

        if !request.params.is_empty() {
            builder = builder.query(&request.params.to_query_pairs());
        }

        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        Ok(builder)
    }

    async fn exchange(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let response = self.build(&request)?.send().await.map_err(map_reqwest_error)?;

        let status = response.status().as_u16();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_string(),
                    v.to_str().unwrap_or("<invalid>").to_string(),
                )
            })
            .collect();

        let limit = self.max_response_size;
        if response
            .content_length()
            .is_some_and(|length| length > limit as u64)
        {
            return Err(too_large(limit));
        }

        // Stream response with size limit
        let mut body = Vec::new();
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;

            if body.len() + chunk.len() > limit {
                return Err(too_large(limit));
            }

            body.extend_from_slice(&chunk);
        }

        let data = if body.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&body).unwrap_or_else(|_| {
                serde_json::Value::String(String::from_utf8_lossy(&body).into_owned())
            })
        };

        let response = HttpResponse {
            status,
            headers,
            data,
            config: Some(request),
        };

        if response.is_success() {
            Ok(response)
        } else {
            Err(TransportError::status(response))
        }
    }
}

impl HttpTransport for ReqwestTransport {
    async fn send(
        &self,
        request: HttpRequest,
        cancel: CancelHandle,
    ) -> Result<HttpResponse, TransportError> {
        let method = request.method;
        let url = request.full_url();
        tracing::debug!(%method, %url, "Sending HTTP request");

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(TransportError::Cancelled),
            result = self.exchange(request) => result,
        };

        match &result {
            Ok(response) => tracing::debug!(%method, %url, status = response.status, "HTTP request completed"),
            Err(error) => tracing::debug!(%method, %url, error = %error, "HTTP request failed"),
        }

        result
    }
}

const fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
        Method::Head => reqwest::Method::HEAD,
        Method::Options => reqwest::Method::OPTIONS,
    }
}

fn too_large(limit: usize) -> TransportError {
    TransportError::Decode {
        message: format!("Response too large (>{limit} bytes)"),
    }
}

fn map_reqwest_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout
    } else if error.is_builder() {
        TransportError::InvalidRequest {
            message: error.to_string(),
        }
    } else if error.is_body() || error.is_decode() {
        TransportError::Decode {
            message: error.to_string(),
        }
    } else {
        TransportError::network(error.to_string())
    }
}
