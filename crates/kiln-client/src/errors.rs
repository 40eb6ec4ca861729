//! Error types for the client.

use std::io;
use std::sync::Arc;

use thiserror::Error;

use kiln_protocol::ExitStatus;
use kiln_protocol::framing::FrameError;

/// Failures surfaced by [`crate::CompileClient`] and the `kiln` binary.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<ortho_config::OrthoError>),
    #[error("{0}")]
    CliUsage(clap::Error),
    #[error("failed to resolve daemon address {endpoint}: {source}")]
    Resolve { endpoint: String, source: io::Error },
    #[error("failed to connect to daemon at {endpoint}: {source}")]
    Connect { endpoint: String, source: io::Error },
    #[cfg(not(unix))]
    #[error("platform does not support Unix sockets: {0}")]
    UnsupportedUnixTransport(String),
    #[error("failed to send to daemon: {0}")]
    Send(FrameError),
    #[error("failed to read from daemon: {0}")]
    Receive(FrameError),
    #[error("failed to forward daemon output: {0}")]
    ForwardOutput(io::Error),
    #[error("daemon aborted the call: {reason}")]
    Aborted { reason: String },
    #[error("daemon closed the stream without sending an exit status")]
    MissingExit,
    #[error("daemon sent unknown exit status {0}")]
    UnknownStatus(i32),
    #[error("daemon did not identify its compiler (status {0})")]
    MissingCompilerId(ExitStatus),
}

impl ClientError {
    /// Returns `true` when the outcome of the call is unknown: the daemon
    /// could not be reached, the connection broke, or the daemon aborted.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        match self {
            Self::Resolve { .. }
            | Self::Connect { .. }
            | Self::Send(_)
            | Self::Receive(_)
            | Self::Aborted { .. }
            | Self::MissingExit
            | Self::UnknownStatus(_) => true,
            #[cfg(not(unix))]
            Self::UnsupportedUnixTransport(_) => true,
            Self::LoadConfiguration(_)
            | Self::CliUsage(_)
            | Self::ForwardOutput(_)
            | Self::MissingCompilerId(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aborts_and_disconnects_are_transport_failures() {
        assert!(
            ClientError::Aborted {
                reason: "writer stalled".to_owned()
            }
            .is_transport()
        );
        assert!(ClientError::MissingExit.is_transport());
        assert!(!ClientError::MissingCompilerId(ExitStatus::InternalError).is_transport());
        assert!(
            !ClientError::ForwardOutput(io::Error::from(io::ErrorKind::BrokenPipe))
                .is_transport()
        );
    }
}
