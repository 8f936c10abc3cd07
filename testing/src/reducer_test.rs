//! Ergonomic testing utilities for reducers
//!
//! This module provides a fluent API for testing reducers with readable Given-When-Then syntax.

#![allow(clippy::module_name_repetitions)] // ReducerTest is the natural name

use fetchstate_core::{effect::Effect, reducer::Reducer};

/// Type alias for state assertion functions
type StateAssertion<S> = Box<dyn FnOnce(&S)>;

/// Type alias for effect assertion functions
type EffectAssertion<A> = Box<dyn FnOnce(&[Effect<A>])>;

/// Fluent API for testing reducers with Given-When-Then syntax
///
/// Actions given with [`ReducerTest::given_actions`] are reduced first and
/// their effects discarded; only the effects of the `when` action are
/// handed to effect assertions.
///
/// # Example
///
/// ```ignore
/// use fetchstate_testing::ReducerTest;
///
/// ReducerTest::new(RequestReducer::new())
///     .with_env(test_environment())
///     .given_state(RequestState::default())
///     .when_action(RequestAction::clear("users"))
///     .then_state(|state| {
///         assert!(state.record(&"users".into()).is_empty());
///     })
///     .then_effects(assertions::assert_no_effects)
///     .run();
/// ```
pub struct ReducerTest<R, S, A, E>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    reducer: R,
    environment: Option<E>,
    initial_state: Option<S>,
    given_actions: Vec<A>,
    action: Option<A>,
    state_assertions: Vec<StateAssertion<S>>,
    effect_assertions: Vec<EffectAssertion<A>>,
}

impl<R, S, A, E> ReducerTest<R, S, A, E>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    /// Create a new reducer test with the given reducer
    #[must_use]
    pub const fn new(reducer: R) -> Self {
        Self {
            reducer,
            environment: None,
            initial_state: None,
            given_actions: Vec::new(),
            action: None,
            state_assertions: Vec::new(),
            effect_assertions: Vec::new(),
        }
    }

    /// Set the environment for the test
    #[must_use]
    pub fn with_env(mut self, env: E) -> Self {
        self.environment = Some(env);
        self
    }

    /// Set the initial state (Given)
    #[must_use]
    pub fn given_state(mut self, state: S) -> Self {
        self.initial_state = Some(state);
        self
    }

    /// Reduce these actions before the action under test (Given)
    #[must_use]
    pub fn given_actions(mut self, actions: impl IntoIterator<Item = A>) -> Self {
        self.given_actions.extend(actions);
        self
    }

    /// Set the action to test (When)
    #[must_use]
    pub fn when_action(mut self, action: A) -> Self {
        self.action = Some(action);
        self
    }

    /// Add an assertion about the resulting state (Then)
    #[must_use]
    pub fn then_state<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&S) + 'static,
    {
        self.state_assertions.push(Box::new(assertion));
        self
    }

    /// Add an assertion about the resulting effects (Then)
    #[must_use]
    pub fn then_effects<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&[Effect<A>]) + 'static,
    {
        self.effect_assertions.push(Box::new(assertion));
        self
    }

    /// Run the test and execute all assertions
    ///
    /// # Panics
    ///
    /// Panics if initial state, action, or environment is not set,
    /// or if any assertions fail.
    #[allow(clippy::panic)] // Test code can panic
    #[allow(clippy::expect_used)] // Test code can use expect
    pub fn run(self) {
        let mut state = self
            .initial_state
            .expect("Initial state must be set with given_state()");

        let action = self.action.expect("Action must be set with when_action()");

        let env = self
            .environment
            .expect("Environment must be set with with_env()");

        for given in self.given_actions {
            let _ = self.reducer.reduce(&mut state, given, &env);
        }

        let effects = self.reducer.reduce(&mut state, action, &env);

        for assertion in self.state_assertions {
            assertion(&state);
        }

        for assertion in self.effect_assertions {
            assertion(&effects);
        }
    }
}

/// Helper assertions for effects
pub mod assertions {
    use fetchstate_core::effect::Effect;

    /// Count `Cancel` effects, looking inside `Parallel`
    #[must_use]
    pub fn cancel_count<A>(effects: &[Effect<A>]) -> usize {
        effects
            .iter()
            .map(|effect| match effect {
                Effect::Cancel(_) => 1,
                Effect::Parallel(children) => cancel_count(children),
                Effect::None | Effect::Future(_) => 0,
            })
            .sum()
    }

    /// Assert that there are no effects
    ///
    /// # Panics
    ///
    /// Panics if any effect would do something.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_no_effects<A: std::fmt::Debug>(effects: &[Effect<A>]) {
        assert!(
            effects.iter().all(Effect::is_none),
            "Expected no effects, but found {}: {:?}",
            effects.len(),
            effects
        );
    }

    /// Assert the number of effects
    ///
    /// # Panics
    ///
    /// Panics if the number of effects doesn't match expected.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_effects_count<A>(effects: &[Effect<A>], expected: usize) {
        assert_eq!(
            effects.len(),
            expected,
            "Expected {} effects, but found {}",
            expected,
            effects.len()
        );
    }

    /// Assert that effects contain at least one Future effect
    ///
    /// # Panics
    ///
    /// Panics if no Future effect is found.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_has_future_effect<A>(effects: &[Effect<A>]) {
        assert!(
            effects.iter().any(|e| matches!(e, Effect::Future(_))),
            "Expected at least one Future effect, but none found"
        );
    }

    /// Assert that effects contain exactly one `Cancel` effect, ahead of every Future
    ///
    /// # Panics
    ///
    /// Panics if there is no single cancel, or a Future precedes it.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_cancels_before_dispatch<A>(effects: &[Effect<A>]) {
        assert_eq!(cancel_count(effects), 1, "Expected exactly one Cancel effect");
        let cancel_at = effects.iter().position(|e| matches!(e, Effect::Cancel(_)));
        let future_at = effects.iter().position(|e| matches!(e, Effect::Future(_)));
        assert!(
            matches!((cancel_at, future_at), (Some(c), Some(f)) if c < f),
            "Expected the Cancel effect to come before the Future effect"
        );
    }

    /// Assert that effects contain no `Cancel` effect
    ///
    /// # Panics
    ///
    /// Panics if a Cancel effect is found.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_no_cancel<A>(effects: &[Effect<A>]) {
        assert_eq!(cancel_count(effects), 0, "Expected no Cancel effect");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fetchstate_core::effect::Effect;
    use fetchstate_core::reducer::Reducer;
    use fetchstate_core::transport::CancelHandle;
    use fetchstate_core::{SmallVec, smallvec};

    #[derive(Clone, Debug)]
    struct TestState {
        count: i32,
    }

    #[derive(Clone, Debug)]
    enum TestAction {
        Increment,
        Replace,
    }

    struct TestReducer;

    struct TestEnv;

    impl Reducer for TestReducer {
        type State = TestState;
        type Action = TestAction;
        type Environment = TestEnv;

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            _env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]> {
            match action {
                TestAction::Increment => {
                    state.count += 1;
                    smallvec![Effect::None]
                },
                TestAction::Replace => smallvec![
                    Effect::Cancel(CancelHandle::new()),
                    Effect::Future(Box::pin(async { None })),
                ],
            }
        }
    }

    #[test]
    fn test_reducer_test_increment() {
        ReducerTest::new(TestReducer)
            .with_env(TestEnv)
            .given_state(TestState { count: 0 })
            .given_actions([TestAction::Increment])
            .when_action(TestAction::Increment)
            .then_state(|state| {
                assert_eq!(state.count, 2);
            })
            .then_effects(|effects| {
                assertions::assert_no_effects(effects);
            })
            .run();
    }

    #[test]
    fn test_cancel_assertions() {
        ReducerTest::new(TestReducer)
            .with_env(TestEnv)
            .given_state(TestState { count: 0 })
            .when_action(TestAction::Replace)
            .then_effects(|effects| {
                assertions::assert_cancels_before_dispatch(effects);
                assertions::assert_has_future_effect(effects);
                assertions::assert_effects_count(effects, 2);
            })
            .run();
    }

    #[test]
    fn test_cancel_count_sees_parallel() {
        let effects: Vec<Effect<TestAction>> = vec![Effect::merge(vec![
            Effect::Cancel(CancelHandle::new()),
            Effect::Cancel(CancelHandle::new()),
        ])];
        assert_eq!(assertions::cancel_count(&effects), 2);
        assertions::assert_no_cancel::<TestAction>(&[Effect::None]);
    }
}
