//! Error types for request dispatch failures.
//!
//! Every variant is an internal failure from the caller's point of view: it
//! is reported as one exception record followed by
//! [`ExitStatus::InternalError`](kiln_protocol::ExitStatus::InternalError).

use std::io;

use thiserror::Error;

use kiln_protocol::framing::FrameError;

/// Errors surfaced during request parsing and dispatch.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Request line could not be parsed.
    #[error("malformed request: {message}")]
    MalformedRequest { message: String },

    /// Request exceeds the maximum allowed size.
    #[error("request too large: {size} bytes exceeds {max_size} byte limit")]
    RequestTooLarge { size: usize, max_size: usize },

    /// Invalid or missing compiler arguments.
    #[error("invalid arguments: {message}")]
    InvalidArguments { message: String },

    /// The service was shut down before the call started.
    #[error("compile service is shutting down")]
    ShuttingDown,

    /// IO error while reading the request.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Internal error (e.g., lock poisoned).
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl DispatchError {
    /// Creates a malformed request error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedRequest {
            message: message.into(),
        }
    }

    /// Creates an invalid arguments error.
    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            message: message.into(),
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<FrameError> for DispatchError {
    fn from(error: FrameError) -> Self {
        match error {
            FrameError::Io(source) => Self::Io(source),
            FrameError::TooLarge { size, max_size } => Self::RequestTooLarge { size, max_size },
            FrameError::Empty => Self::malformed("empty request line"),
            FrameError::Decode(source) => Self::malformed(source.to_string()),
            FrameError::Encode(source) => Self::internal(source.to_string()),
        }
    }
}
