//! Reducer for keyed requests.
//!
//! Issuing a request is one reduction: the key is marked loading, a
//! duplicate in-flight request is cancelled, the descriptor is overwritten,
//! and the transport call is emitted as an effect. The `Cancel` effect comes
//! first, so the runtime signals it before the new call is spawned.

use crate::actions::{OnSuccess, RequestAction, RequestOptions};
use crate::config::DedupScope;
use crate::types::{DedupSlot, KeyPath, Mutation, RequestId, RequestState};
use chrono::{DateTime, Utc};
use fetchstate_core::async_effect;
use fetchstate_core::transport::{
    CancelHandle, HttpRequest, HttpResponse, HttpTransport, RequestConfig, TransportError,
};
use fetchstate_core::{SmallVec, effect::Effect, environment::Clock, reducer::Reducer};
use fetchstate_runtime::metrics::RequestMetrics;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

/// Environment dependencies for the request reducer
pub struct RequestEnvironment<T: HttpTransport> {
    /// Performs the HTTP exchanges
    pub transport: Arc<T>,
    /// Timestamps for latency tracking
    pub clock: Arc<dyn Clock>,
    /// Configuration every request starts from
    pub defaults: RequestConfig,
    /// Duplicate detection scope
    pub dedup_scope: DedupScope,
}

impl<T: HttpTransport> RequestEnvironment<T> {
    /// Creates an environment with empty defaults and per-key dedup
    #[must_use]
    pub fn new(transport: Arc<T>, clock: Arc<dyn Clock>) -> Self {
        Self {
            transport,
            clock,
            defaults: RequestConfig::new(),
            dedup_scope: DedupScope::default(),
        }
    }

    /// Set the default request configuration
    #[must_use]
    pub fn with_defaults(mut self, defaults: RequestConfig) -> Self {
        self.defaults = defaults;
        self
    }

    /// Set the dedup scope
    #[must_use]
    pub const fn with_dedup_scope(mut self, scope: DedupScope) -> Self {
        self.dedup_scope = scope;
        self
    }

    fn slot(&self, key: &KeyPath) -> DedupSlot {
        DedupSlot::for_key(self.dedup_scope, key)
    }

    fn elapsed_since(&self, started_at: Option<DateTime<Utc>>) -> Option<Duration> {
        started_at.and_then(|start| (self.clock.now() - start).to_std().ok())
    }
}

impl<T: HttpTransport> Clone for RequestEnvironment<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            clock: Arc::clone(&self.clock),
            defaults: self.defaults.clone(),
            dedup_scope: self.dedup_scope,
        }
    }
}

/// Reducer for keyed requests
pub struct RequestReducer<T> {
    transport: PhantomData<fn() -> T>,
}

impl<T> RequestReducer<T> {
    /// Creates a new `RequestReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self {
            transport: PhantomData,
        }
    }
}

impl<T> Default for RequestReducer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for RequestReducer<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for RequestReducer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RequestReducer")
    }
}

impl<T: HttpTransport> RequestReducer<T> {
    fn issue(
        state: &mut RequestState,
        request_id: RequestId,
        options: RequestOptions,
        env: &RequestEnvironment<T>,
    ) -> SmallVec<[Effect<RequestAction>; 4]> {
        let RequestOptions {
            key,
            url,
            method,
            params,
            request_config,
            on_success,
        } = options;

        state.apply(Mutation::Begin { key: key.clone() });

        let mut effects: SmallVec<[Effect<RequestAction>; 4]> = SmallVec::new();
        let cancel = CancelHandle::new();

        let descriptor = state.descriptor_mut(env.slot(&key));
        let duplicate = descriptor.is_duplicate(&url, &params);
        let previous = descriptor.start(
            url.clone(),
            params.clone(),
            cancel.clone(),
            request_id.clone(),
            env.clock.now(),
        );

        if let Some(previous) = previous.filter(|_| duplicate) {
            tracing::debug!(%key, url = %url, "Cancelling in-flight duplicate");
            RequestMetrics::record_cancelled();
            effects.push(Effect::Cancel(previous));
        }

        let request = HttpRequest::resolve(
            env.defaults.clone().merge(request_config),
            method.unwrap_or_default(),
            url,
            params,
        );

        tracing::debug!(
            %key,
            %request_id,
            method = %request.method,
            url = %request.url,
            "Issuing request"
        );
        RequestMetrics::record_issued();

        let transport = Arc::clone(&env.transport);
        effects.push(async_effect! {
            Some(match transport.send(request, cancel).await {
                Ok(response) => RequestAction::Succeeded {
                    request_id,
                    key,
                    response,
                    on_success,
                },
                Err(error) => RequestAction::Failed {
                    request_id,
                    key,
                    error,
                },
            })
        });

        effects
    }

    fn succeeded(
        state: &mut RequestState,
        request_id: &RequestId,
        key: KeyPath,
        response: HttpResponse,
        on_success: Option<OnSuccess>,
        env: &RequestEnvironment<T>,
    ) -> SmallVec<[Effect<RequestAction>; 4]> {
        let started_at = state.finish(&env.slot(&key), request_id);
        RequestMetrics::record_succeeded(env.elapsed_since(started_at));
        tracing::debug!(%key, %request_id, status = response.status, "Request succeeded");

        let response = response.redacted();
        state.apply(Mutation::Succeed {
            key,
            resp: response.clone(),
        });

        let Some(on_success) = on_success else {
            return SmallVec::new();
        };

        let OnSuccess {
            dispatch_action,
            commit_action,
            execute_function,
        } = on_success;

        if let Some(mutation) = commit_action {
            state.apply(mutation);
        }

        let mut follow_ups = Vec::new();
        if let Some(action) = dispatch_action {
            follow_ups.push(async_effect! { Some(*action) });
        }
        if let Some(callback) = execute_function {
            follow_ups.push(async_effect! {
                callback.call(&response);
                None
            });
        }

        if follow_ups.is_empty() {
            SmallVec::new()
        } else {
            let mut effects = SmallVec::new();
            effects.push(Effect::merge(follow_ups));
            effects
        }
    }

    fn failed(
        state: &mut RequestState,
        request_id: &RequestId,
        key: KeyPath,
        error: TransportError,
        env: &RequestEnvironment<T>,
    ) {
        let slot = env.slot(&key);
        let cancelled = error.is_cancelled();

        let started_at = if cancelled {
            // The descriptor already tracks the request that replaced this one
            tracing::warn!(%key, %request_id, "duplicate in-flight request cancelled");
            None
        } else {
            tracing::debug!(%key, %request_id, error = %error, "Request failed");
            state.finish(&slot, request_id)
        };
        RequestMetrics::record_failed(cancelled, env.elapsed_since(started_at));

        state.apply(Mutation::Fail {
            key,
            err: error.redacted(),
        });
    }
}

impl<T: HttpTransport> Reducer for RequestReducer<T> {
    type State = RequestState;
    type Action = RequestAction;
    type Environment = RequestEnvironment<T>;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            RequestAction::Request {
                request_id,
                options,
            } => Self::issue(state, request_id, options, env),

            RequestAction::Clear { key } => {
                tracing::debug!(%key, "Clearing record");
                state.apply(Mutation::Clear { key });
                SmallVec::new()
            },

            RequestAction::Commit(mutation) => {
                state.apply(mutation);
                SmallVec::new()
            },

            RequestAction::Succeeded {
                request_id,
                key,
                response,
                on_success,
            } => Self::succeeded(state, &request_id, key, response, on_success, env),

            RequestAction::Failed {
                request_id,
                key,
                error,
            } => {
                Self::failed(state, &request_id, key, error, env);
                SmallVec::new()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Lifecycle, RecordStatus};
    use fetchstate_core::params::Params;
    use fetchstate_testing::{MockTransport, ReducerTest, assertions, test_clock};
    use serde_json::json;

    fn env() -> RequestEnvironment<MockTransport> {
        RequestEnvironment::new(Arc::new(MockTransport::new()), Arc::new(test_clock()))
    }

    fn request(id: &RequestId, key: &str, url: &str, params: Params) -> RequestAction {
        RequestAction::Request {
            request_id: id.clone(),
            options: RequestOptions::get(key, url).with_params(params),
        }
    }

    fn x(value: i64) -> Params {
        Params::new().with("x", value)
    }

    #[test]
    fn test_request_begins_and_dispatches() {
        let id = RequestId::new();
        ReducerTest::new(RequestReducer::new())
            .with_env(env())
            .given_state(RequestState::new())
            .when_action(request(&id, "p", "/a", x(1)))
            .then_state(move |state| {
                assert_eq!(state.record(&"p".into()).status, RecordStatus::Loading);

                let descriptor = state.descriptor(&DedupSlot::Key("p".into())).unwrap();
                assert_eq!(descriptor.lifecycle, Lifecycle::Started);
                assert_eq!(descriptor.target_url.as_deref(), Some("/a"));
                assert!(descriptor.tracks(&id));
            })
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 1);
                assertions::assert_has_future_effect(effects);
                assertions::assert_no_cancel(effects);
            })
            .run();
    }

    #[test]
    fn test_duplicate_cancels_before_dispatch() {
        ReducerTest::new(RequestReducer::new())
            .with_env(env())
            .given_state(RequestState::new())
            .given_actions([request(&RequestId::new(), "p", "/a", x(1))])
            .when_action(request(&RequestId::new(), "p", "/a", x(1)))
            .then_state(|state| {
                assert!(state.record(&"p".into()).is_loading());
            })
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 2);
                assertions::assert_cancels_before_dispatch(effects);
            })
            .run();
    }

    #[test]
    fn test_duplicate_cancel_signals_previous_handle() {
        let env = env();
        let reducer = RequestReducer::new();
        let mut state = RequestState::new();

        let _ = reducer.reduce(&mut state, request(&RequestId::new(), "p", "/a", x(1)), &env);
        let first_handle = state
            .descriptor(&DedupSlot::Key("p".into()))
            .and_then(|d| d.cancel.clone())
            .unwrap();

        let effects = reducer.reduce(&mut state, request(&RequestId::new(), "p", "/a", x(1)), &env);
        let Some(Effect::Cancel(handle)) = effects.first() else {
            panic!("expected a cancel effect first");
        };
        handle.cancel();
        assert!(first_handle.is_cancelled());
        assert!(state.record(&"p".into()).is_loading());

        let second_handle = state
            .descriptor(&DedupSlot::Key("p".into()))
            .and_then(|d| d.cancel.clone())
            .unwrap();
        assert!(!second_handle.is_cancelled());
    }

    #[test]
    fn test_different_url_or_params_never_cancel() {
        ReducerTest::new(RequestReducer::new())
            .with_env(env())
            .given_state(RequestState::new())
            .given_actions([
                request(&RequestId::new(), "p", "/a", x(1)),
                request(&RequestId::new(), "p", "/b", x(1)),
            ])
            .when_action(request(&RequestId::new(), "p", "/b", x(2)))
            .then_effects(assertions::assert_no_cancel)
            .run();
    }

    #[test]
    fn test_compound_params_compare_by_identity() {
        let shared = Params::new().with("filter", json!({"tag": "x"}));
        let rebuilt = Params::new().with("filter", json!({"tag": "x"}));

        ReducerTest::new(RequestReducer::new())
            .with_env(env())
            .given_state(RequestState::new())
            .given_actions([request(&RequestId::new(), "p", "/a", shared.clone())])
            .when_action(request(&RequestId::new(), "p", "/a", rebuilt))
            .then_effects(assertions::assert_no_cancel)
            .run();

        ReducerTest::new(RequestReducer::new())
            .with_env(env())
            .given_state(RequestState::new())
            .given_actions([request(&RequestId::new(), "p", "/a", shared.clone())])
            .when_action(request(&RequestId::new(), "p", "/a", shared))
            .then_effects(|effects| assert_eq!(assertions::cancel_count(effects), 1))
            .run();
    }

    #[test]
    fn test_finished_request_is_not_cancelled() {
        let id = RequestId::new();
        ReducerTest::new(RequestReducer::new())
            .with_env(env())
            .given_state(RequestState::new())
            .given_actions([
                request(&id, "p", "/a", x(1)),
                RequestAction::Succeeded {
                    request_id: id.clone(),
                    key: "p".into(),
                    response: HttpResponse::ok(json!({"data": "ok"})),
                    on_success: None,
                },
            ])
            .when_action(request(&RequestId::new(), "p", "/a", x(1)))
            .then_effects(assertions::assert_no_cancel)
            .run();
    }

    #[test]
    fn test_global_scope_cancels_across_keys() {
        ReducerTest::new(RequestReducer::new())
            .with_env(env().with_dedup_scope(DedupScope::Global))
            .given_state(RequestState::new())
            .given_actions([request(&RequestId::new(), "a", "/x", x(1))])
            .when_action(request(&RequestId::new(), "b", "/x", x(1)))
            .then_effects(|effects| assert_eq!(assertions::cancel_count(effects), 1))
            .run();

        ReducerTest::new(RequestReducer::new())
            .with_env(env())
            .given_state(RequestState::new())
            .given_actions([request(&RequestId::new(), "a", "/x", x(1))])
            .when_action(request(&RequestId::new(), "b", "/x", x(1)))
            .then_effects(assertions::assert_no_cancel)
            .run();
    }

    #[test]
    fn test_success_records_response_without_echo() {
        let id = RequestId::new();
        let echo = HttpRequest::resolve(RequestConfig::new(), Default::default(), "/a", Params::new());
        ReducerTest::new(RequestReducer::new())
            .with_env(env())
            .given_state(RequestState::new())
            .given_actions([request(&id, "p", "/a", Params::new())])
            .when_action(RequestAction::Succeeded {
                request_id: id.clone(),
                key: "p".into(),
                response: HttpResponse::ok(json!({"data": "ok"})).with_config(echo),
                on_success: None,
            })
            .then_state(|state| {
                let record = state.record(&"p".into());
                assert_eq!(record.status, RecordStatus::Success);
                assert!(record.first_call_done);
                assert_eq!(record.resp, Some(HttpResponse::ok(json!({"data": "ok"}))));

                let descriptor = state.descriptor(&DedupSlot::Key("p".into())).unwrap();
                assert_eq!(descriptor.lifecycle, Lifecycle::Finished);
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_failure_records_error_and_keeps_first_call_done() {
        let first = RequestId::new();
        let second = RequestId::new();
        ReducerTest::new(RequestReducer::new())
            .with_env(env())
            .given_state(RequestState::new())
            .given_actions([
                request(&first, "p", "/a", Params::new()),
                RequestAction::Succeeded {
                    request_id: first.clone(),
                    key: "p".into(),
                    response: HttpResponse::ok(json!(1)),
                    on_success: None,
                },
                request(&second, "p", "/a", Params::new()),
            ])
            .when_action(RequestAction::Failed {
                request_id: second.clone(),
                key: "p".into(),
                error: TransportError::network("connection reset"),
            })
            .then_state(|state| {
                let record = state.record(&"p".into());
                assert_eq!(record.status, RecordStatus::Error);
                assert!(record.first_call_done);
                assert_eq!(record.err, Some(TransportError::network("connection reset")));

                let descriptor = state.descriptor(&DedupSlot::Key("p".into())).unwrap();
                assert_eq!(descriptor.lifecycle, Lifecycle::Finished);
            })
            .run();
    }

    #[test]
    fn test_cancelled_failure_leaves_replacement_in_flight() {
        let first = RequestId::new();
        let second = RequestId::new();
        ReducerTest::new(RequestReducer::new())
            .with_env(env())
            .given_state(RequestState::new())
            .given_actions([
                request(&first, "p", "/a", x(1)),
                request(&second, "p", "/a", x(1)),
            ])
            .when_action(RequestAction::Failed {
                request_id: first.clone(),
                key: "p".into(),
                error: TransportError::Cancelled,
            })
            .then_state(move |state| {
                assert_eq!(state.record(&"p".into()).err, Some(TransportError::Cancelled));

                let descriptor = state.descriptor(&DedupSlot::Key("p".into())).unwrap();
                assert_eq!(descriptor.lifecycle, Lifecycle::Started);
                assert!(descriptor.tracks(&second));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_clear_resets_record_only() {
        ReducerTest::new(RequestReducer::new())
            .with_env(env())
            .given_state(RequestState::new())
            .given_actions([request(&RequestId::new(), "p", "/a", x(1))])
            .when_action(RequestAction::clear("p"))
            .then_state(|state| {
                assert!(state.record(&"p".into()).is_empty());
                let descriptor = state.descriptor(&DedupSlot::Key("p".into())).unwrap();
                assert_eq!(descriptor.lifecycle, Lifecycle::Started);
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_on_success_commits_and_schedules_follow_ups() {
        let id = RequestId::new();
        let on_success = OnSuccess::new()
            .commit(Mutation::Clear { key: "stale".into() })
            .dispatch(RequestAction::clear("other"))
            .execute(|_| {});

        ReducerTest::new(RequestReducer::new())
            .with_env(env())
            .given_state(RequestState::new())
            .given_actions([
                RequestAction::Commit(Mutation::Begin { key: "stale".into() }),
                request(&id, "p", "/a", Params::new()),
            ])
            .when_action(RequestAction::Succeeded {
                request_id: id.clone(),
                key: "p".into(),
                response: HttpResponse::ok(json!(null)),
                on_success: Some(on_success),
            })
            .then_state(|state| {
                assert!(state.record(&"stale".into()).is_empty());
                assert!(state.record(&"p".into()).is_success());
            })
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 1);
                let Some(Effect::Parallel(children)) = effects.first() else {
                    panic!("expected follow-ups to run in parallel");
                };
                assert_eq!(children.len(), 2);
            })
            .run();
    }

    proptest::proptest! {
        #[test]
        fn prop_duplicate_cancels_iff_url_and_params_match(
            first_url in "/[a-c]",
            second_url in "/[a-c]",
            first_x in 0i64..3,
            second_x in 0i64..3,
        ) {
            let env = env();
            let reducer = RequestReducer::new();
            let mut state = RequestState::new();

            let _ = reducer.reduce(&mut state, request(&RequestId::new(), "p", &first_url, x(first_x)), &env);
            let effects = reducer.reduce(&mut state, request(&RequestId::new(), "p", &second_url, x(second_x)), &env);

            let expected = usize::from(first_url == second_url && first_x == second_x);
            proptest::prop_assert_eq!(assertions::cancel_count(&effects), expected);
        }
    }
}
