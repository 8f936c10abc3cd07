//! # Fetchstate
//!
//! Keyed HTTP request state for a reducer-driven store.
//!
//! Every request is issued under a caller-chosen key. The store records the
//! lifecycle of the latest request per key (`loading`, `success`, `error`)
//! and cancels an in-flight request when an identical one (same URL,
//! shallow-equal parameters) is issued before it finishes.
//!
//! # Quick Start
//!
//! ```no_run
//! use fetchstate::{ClientConfig, RequestClient, RequestOptions};
//! use fetchstate_http::ReqwestTransport;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::default().with_base_url("https://api.example.com");
//! let client = RequestClient::new(ReqwestTransport::new(), config);
//!
//! let response = client
//!     .request(RequestOptions::get("users", "/users").with_param("page", 1))
//!     .await?;
//! println!("{}", response.data);
//!
//! let record = client.record("users").await;
//! assert!(record.first_call_done);
//!
//! client.clear("users").await?;
//! # Ok(())
//! # }
//! ```

pub mod actions;
pub mod client;
pub mod config;
pub mod error;
pub mod reducer;
pub mod types;

// Re-export commonly used types
pub use actions::{OnSuccess, RequestAction, RequestOptions, ResponseCallback};
pub use client::RequestClient;
pub use config::{ClientConfig, ConfigError, DedupScope};
pub use error::RequestError;
pub use reducer::{RequestEnvironment, RequestReducer};
pub use types::{
    DedupSlot, KeyPath, KeyedRecord, Lifecycle, Mutation, RecordStatus, RequestDescriptor,
    RequestId, RequestState,
};
