//! Caller-facing facade over the request store.
//!
//! Each call to [`RequestClient::request`] sends a correlated
//! [`RequestAction::Request`] and waits for the outcome action carrying the
//! same [`RequestId`], so concurrent callers each get their own result.

use crate::actions::{RequestAction, RequestOptions};
use crate::config::ClientConfig;
use crate::error::RequestError;
use crate::reducer::{RequestEnvironment, RequestReducer};
use crate::types::{KeyPath, KeyedRecord, Mutation, RequestId, RequestState};
use fetchstate_core::environment::{Clock, SystemClock};
use fetchstate_core::transport::{HttpResponse, HttpTransport};
use fetchstate_runtime::{Store, StoreConfig};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

type RequestStore<T> =
    Store<RequestState, RequestAction, RequestEnvironment<T>, RequestReducer<T>>;

/// Issues keyed requests and exposes their recorded state
///
/// Clones share the same store.
pub struct RequestClient<T: HttpTransport> {
    store: RequestStore<T>,
    wait_timeout: Duration,
}

impl<T: HttpTransport> RequestClient<T> {
    /// Creates a client on the system clock
    #[must_use]
    pub fn new(transport: T, config: ClientConfig) -> Self {
        Self::with_clock(transport, SystemClock, config)
    }

    /// Creates a client with an explicit clock
    #[must_use]
    pub fn with_clock(transport: T, clock: impl Clock + 'static, config: ClientConfig) -> Self {
        let environment = RequestEnvironment::new(Arc::new(transport), Arc::new(clock))
            .with_defaults(config.defaults)
            .with_dedup_scope(config.dedup_scope);

        let store = Store::with_config(
            RequestState::new(),
            RequestReducer::new(),
            environment,
            StoreConfig::default().with_broadcast_capacity(config.broadcast_capacity),
        );

        Self {
            store,
            wait_timeout: config.wait_timeout,
        }
    }

    /// Issue a request and wait for its outcome.
    ///
    /// The key's record is `Loading` as soon as this is called and reflects
    /// the outcome by the time it returns. The response is returned without
    /// its request echo.
    ///
    /// # Errors
    ///
    /// - [`RequestError::Transport`]: the call failed, or a duplicate issued
    ///   later cancelled it
    /// - [`RequestError::Store`]: the store is shutting down or the outcome
    ///   did not arrive within the wait timeout
    #[tracing::instrument(skip(self, options), fields(key = %options.key, url = %options.url))]
    pub async fn request(&self, options: RequestOptions) -> Result<HttpResponse, RequestError> {
        let request_id = RequestId::new();
        let action = RequestAction::Request {
            request_id: request_id.clone(),
            options,
        };

        let outcome = self
            .store
            .send_and_wait_for(
                action,
                move |a| a.is_outcome_of(&request_id),
                self.wait_timeout,
            )
            .await?;

        match outcome {
            RequestAction::Succeeded { response, .. } => Ok(response.redacted()),
            RequestAction::Failed { error, .. } => Err(RequestError::Transport(error)),
            other => Err(RequestError::UnexpectedAction(format!("{other:?}"))),
        }
    }

    /// Reset the record at `key` to the empty record
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Store`] if the store is shutting down.
    pub async fn clear(&self, key: impl Into<KeyPath>) -> Result<(), RequestError> {
        self.store.send(RequestAction::clear(key)).await?;
        Ok(())
    }

    /// Apply a mutation directly
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Store`] if the store is shutting down.
    pub async fn commit(&self, mutation: Mutation) -> Result<(), RequestError> {
        self.store.send(RequestAction::Commit(mutation)).await?;
        Ok(())
    }

    /// Send any action without waiting for its effects
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Store`] if the store is shutting down.
    pub async fn dispatch(&self, action: RequestAction) -> Result<(), RequestError> {
        self.store.send(action).await?;
        Ok(())
    }

    /// The record at `key`, or the empty record
    pub async fn record(&self, key: impl Into<KeyPath>) -> KeyedRecord {
        let key = key.into();
        self.store.state(|s| s.record(&key)).await
    }

    /// Every record, ordered by key
    pub async fn snapshot(&self) -> BTreeMap<KeyPath, KeyedRecord> {
        self.store.state(|s| s.records().clone()).await
    }

    /// Watch the actions produced by requests: outcomes and re-dispatched actions.
    ///
    /// Each is delivered after its state change is visible through
    /// [`RequestClient::record`].
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RequestAction> {
        self.store.subscribe_actions()
    }

    /// Stop accepting actions and wait for in-flight requests to settle
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Store`] if requests are still running when
    /// the store's shutdown timeout expires.
    pub async fn shutdown(&self) -> Result<(), RequestError> {
        self.store.shutdown_default().await?;
        Ok(())
    }
}

impl<T: HttpTransport> Clone for RequestClient<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            wait_timeout: self.wait_timeout,
        }
    }
}
