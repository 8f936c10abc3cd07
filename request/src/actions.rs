//! Actions accepted by the request reducer, and the options callers build them from.

use crate::types::{KeyPath, Mutation, RequestId};
use fetchstate_core::params::{ParamValue, Params};
use fetchstate_core::transport::{HttpResponse, Method, RequestConfig, TransportError};
use std::sync::Arc;

/// Callback invoked with a successful response
#[derive(Clone)]
pub struct ResponseCallback(Arc<dyn Fn(&HttpResponse) + Send + Sync>);

impl ResponseCallback {
    /// Wraps a closure
    pub fn new(f: impl Fn(&HttpResponse) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Invokes the callback
    pub fn call(&self, response: &HttpResponse) {
        (self.0)(response);
    }
}

impl std::fmt::Debug for ResponseCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ResponseCallback(<fn>)")
    }
}

/// Follow-up effects of a successful request.
///
/// Each one is optional and they run independently of each other.
#[derive(Clone, Debug, Default)]
pub struct OnSuccess {
    /// Action re-dispatched through the store
    pub dispatch_action: Option<Box<RequestAction>>,
    /// Mutation applied directly to the records
    pub commit_action: Option<Mutation>,
    /// Callback invoked with the response
    pub execute_function: Option<ResponseCallback>,
}

impl OnSuccess {
    /// No follow-ups
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-dispatch `action` after success
    #[must_use]
    pub fn dispatch(mut self, action: RequestAction) -> Self {
        self.dispatch_action = Some(Box::new(action));
        self
    }

    /// Apply `mutation` after success
    #[must_use]
    pub fn commit(mut self, mutation: Mutation) -> Self {
        self.commit_action = Some(mutation);
        self
    }

    /// Call `f` with the response after success
    #[must_use]
    pub fn execute(mut self, f: impl Fn(&HttpResponse) + Send + Sync + 'static) -> Self {
        self.execute_function = Some(ResponseCallback::new(f));
        self
    }

    /// Whether there is nothing to do
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.dispatch_action.is_none()
            && self.commit_action.is_none()
            && self.execute_function.is_none()
    }
}

/// Everything needed to issue one keyed request
///
/// # Example
///
/// ```
/// use fetchstate::{OnSuccess, RequestOptions};
/// use fetchstate_core::transport::Method;
///
/// let options = RequestOptions::get("users", "/users")
///     .with_param("page", 2)
///     .with_method(Method::Get)
///     .with_on_success(OnSuccess::new().execute(|resp| println!("{}", resp.status)));
/// assert_eq!(options.params.len(), 1);
/// ```
#[derive(Clone, Debug)]
pub struct RequestOptions {
    /// Key the lifecycle is recorded under
    pub key: KeyPath,
    /// Target URL
    pub url: String,
    /// HTTP method, `GET` when unset
    pub method: Option<Method>,
    /// Query parameters, also used for duplicate detection
    pub params: Params,
    /// Per-call transport configuration layered over the client defaults
    pub request_config: RequestConfig,
    /// Follow-ups run after a success
    pub on_success: Option<OnSuccess>,
}

impl RequestOptions {
    /// A request for `url` recorded under `key`
    pub fn new(key: impl Into<KeyPath>, url: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            url: url.into(),
            method: None,
            params: Params::new(),
            request_config: RequestConfig::new(),
            on_success: None,
        }
    }

    /// A `GET` request for `url` recorded under `key`
    pub fn get(key: impl Into<KeyPath>, url: impl Into<String>) -> Self {
        Self::new(key, url).with_method(Method::Get)
    }

    /// A `POST` request for `url` recorded under `key`
    pub fn post(key: impl Into<KeyPath>, url: impl Into<String>) -> Self {
        Self::new(key, url).with_method(Method::Post)
    }

    /// Set the method
    #[must_use]
    pub const fn with_method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Replace all parameters
    #[must_use]
    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    /// Add one parameter
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.insert(name, value);
        self
    }

    /// Set the per-call transport configuration
    #[must_use]
    pub fn with_config(mut self, config: RequestConfig) -> Self {
        self.request_config = config;
        self
    }

    /// Set the follow-ups
    #[must_use]
    pub fn with_on_success(mut self, on_success: OnSuccess) -> Self {
        self.on_success = Some(on_success);
        self
    }
}

/// Actions for the request reducer
#[derive(Clone, Debug)]
pub enum RequestAction {
    /// Issue a request
    Request {
        /// Correlates the outcome with this call
        request_id: RequestId,
        /// What to request
        options: RequestOptions,
    },

    /// Reset the record at `key`
    Clear {
        /// Target key
        key: KeyPath,
    },

    /// Apply a mutation directly
    Commit(Mutation),

    /// A request completed successfully
    Succeeded {
        /// The request this answers
        request_id: RequestId,
        /// Key the request was recorded under
        key: KeyPath,
        /// Response as returned by the transport
        response: HttpResponse,
        /// Follow-ups carried over from the request
        on_success: Option<OnSuccess>,
    },

    /// A request failed or was cancelled
    Failed {
        /// The request this answers
        request_id: RequestId,
        /// Key the request was recorded under
        key: KeyPath,
        /// The failure
        error: TransportError,
    },
}

impl RequestAction {
    /// Issue `options` under a fresh request id
    #[must_use]
    pub fn request(options: RequestOptions) -> Self {
        Self::Request {
            request_id: RequestId::new(),
            options,
        }
    }

    /// Reset the record at `key`
    pub fn clear(key: impl Into<KeyPath>) -> Self {
        Self::Clear { key: key.into() }
    }

    /// The correlation id, for request and outcome actions
    #[must_use]
    pub const fn request_id(&self) -> Option<&RequestId> {
        match self {
            Self::Request { request_id, .. }
            | Self::Succeeded { request_id, .. }
            | Self::Failed { request_id, .. } => Some(request_id),
            Self::Clear { .. } | Self::Commit(_) => None,
        }
    }

    /// Whether this is the terminal action of request `id`
    #[must_use]
    pub fn is_outcome_of(&self, id: &RequestId) -> bool {
        match self {
            Self::Succeeded { request_id, .. } | Self::Failed { request_id, .. } => request_id == id,
            Self::Request { .. } | Self::Clear { .. } | Self::Commit(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_options_default_to_no_method() {
        let options = RequestOptions::new("users", "/users");
        assert_eq!(options.method, None);
        assert!(options.params.is_empty());
        assert!(options.on_success.is_none());

        assert_eq!(RequestOptions::post("users", "/users").method, Some(Method::Post));
    }

    #[test]
    fn test_on_success_builder() {
        assert!(OnSuccess::new().is_empty());

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let on_success = OnSuccess::new()
            .commit(Mutation::Clear { key: "stale".into() })
            .execute(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });

        assert!(!on_success.is_empty());
        assert!(on_success.dispatch_action.is_none());

        let callback = on_success.execute_function.unwrap();
        callback.call(&HttpResponse::ok(json!(null)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(format!("{callback:?}"), "ResponseCallback(<fn>)");
    }

    #[test]
    fn test_outcome_correlation() {
        let action = RequestAction::request(RequestOptions::get("a", "/a"));
        let id = action.request_id().cloned().unwrap();
        assert!(!action.is_outcome_of(&id));

        let failed = RequestAction::Failed {
            request_id: id.clone(),
            key: "a".into(),
            error: TransportError::Cancelled,
        };
        assert!(failed.is_outcome_of(&id));
        assert!(!failed.is_outcome_of(&RequestId::new()));
        assert!(RequestAction::clear("a").request_id().is_none());
    }
}
