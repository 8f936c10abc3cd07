//! # Fetchstate Testing
//!
//! Testing utilities and helpers for fetchstate.
//!
//! This crate provides:
//! - Mock implementations of Environment traits (clock, HTTP transport)
//! - A Given-When-Then harness for reducers
//! - Assertion helpers for effects
//!
//! ## Example
//!
//! ```ignore
//! use fetchstate_testing::{MockTransport, test_clock};
//!
//! #[tokio::test]
//! async fn test_request_flow() {
//!     let transport = MockTransport::new();
//!     transport.push_ok("/users", json!({"users": []}));
//!
//!     let client = RequestClient::with_clock(transport, test_clock(), ClientConfig::default());
//!     client.request(RequestOptions::get("users", "/users")).await?;
//! }
//! ```

use chrono::{DateTime, Utc};
use fetchstate_core::environment::Clock;

/// Ergonomic testing utilities for reducers
pub mod reducer_test;

/// Scripted HTTP transport
pub mod transport_mocks;

/// Mock implementations for testing.
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use fetchstate_testing::mocks::FixedClock;
    /// use fetchstate_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(DateTime::<Utc>::from(
            std::time::UNIX_EPOCH + std::time::Duration::from_secs(1_735_689_600),
        ))
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, test_clock};
pub use reducer_test::{ReducerTest, assertions};
pub use transport_mocks::{Gate, MockTransport};
