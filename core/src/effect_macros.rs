//! Declarative macros for ergonomic effect construction

/// Create an `Effect::Future` from an async block
///
/// # Example
///
/// ```rust,ignore
/// use fetchstate_core::async_effect;
///
/// async_effect! {
///     let response = transport.send(request, cancel).await;
///     Some(RequestAction::from_outcome(request_id, key, response))
/// }
/// ```
#[macro_export]
macro_rules! async_effect {
    ($($body:tt)*) => {
        $crate::effect::Effect::Future(
            ::std::boxed::Box::pin(async move { $($body)* })
        )
    };
}
