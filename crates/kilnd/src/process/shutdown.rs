use std::fmt;
use std::io;
use std::sync::mpsc::Sender;
use std::thread;

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;
use thiserror::Error;
use tracing::info;

use super::PROCESS_TARGET;

/// Why the daemon is stopping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownCause {
    /// A termination signal arrived.
    Signal(i32),
    /// A caller sent a `shutdown` request.
    Request,
}

impl fmt::Display for ShutdownCause {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signal(signal) => write!(formatter, "signal {signal}"),
            Self::Request => formatter.write_str("shutdown request"),
        }
    }
}

/// Abstraction over shutdown notification mechanisms.
pub trait ShutdownSignal: Send + Sync {
    /// Arranges for a [`ShutdownCause`] to be sent to `notifier` when
    /// shutdown should proceed. Must not block.
    fn install(&self, notifier: Sender<ShutdownCause>) -> Result<(), ShutdownError>;
}

/// Errors reported by shutdown signal listeners.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Installing signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Shutdown listener that waits for termination signals on a helper thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemShutdownSignal;

impl SystemShutdownSignal {
    /// Builds a signal listener.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ShutdownSignal for SystemShutdownSignal {
    fn install(&self, notifier: Sender<ShutdownCause>) -> Result<(), ShutdownError> {
        let mut signals = Signals::new([SIGTERM, SIGINT, SIGQUIT, SIGHUP])
            .map_err(|source| ShutdownError::Install { source })?;
        thread::Builder::new()
            .name("kilnd-signals".to_owned())
            .spawn(move || {
                if let Some(signal) = signals.forever().next() {
                    info!(target: PROCESS_TARGET, signal, "shutdown signal received");
                    let _ = notifier.send(ShutdownCause::Signal(signal));
                }
            })
            .map_err(|source| ShutdownError::Install { source })?;
        Ok(())
    }
}
