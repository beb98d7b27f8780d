//! Error types for the scanner discovery library.
//!
//! Malformed advertisements and channel payloads are not errors: decoders
//! return `None` and the value is dropped.

use thiserror::Error;

/// The main error type for scanner discovery operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The radio adapter reported a failure.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// The session controller has shut down.
    #[error("session closed")]
    SessionClosed,

    /// Adapter event could not be delivered to the controller.
    #[error("channel send error")]
    ChannelSend,
}

impl Error {
    /// Creates a transport error from any message.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }
}

/// Result type alias for scanner discovery operations.
pub type Result<T> = std::result::Result<T, Error>;
