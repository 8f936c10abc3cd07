//! Errors returned by [`crate::RequestClient`].

use fetchstate_core::transport::TransportError;
use fetchstate_runtime::StoreError;
use thiserror::Error;

/// Errors surfaced to callers of the request client
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RequestError {
    /// The transport call failed, including cancellation by a duplicate
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The store rejected the action or no outcome arrived in time
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The store answered with an action that is not an outcome
    #[error("Unexpected outcome action: {0}")]
    UnexpectedAction(String),
}

impl RequestError {
    /// Whether the call was cancelled by a newer duplicate
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Transport(TransportError::Cancelled))
    }

    /// The transport failure, if that is what this is
    #[must_use]
    pub const fn transport_error(&self) -> Option<&TransportError> {
        match self {
            Self::Transport(error) => Some(error),
            Self::Store(_) | Self::UnexpectedAction(_) => None,
        }
    }
}
