//! The incremental cache handle contract.

use std::collections::BTreeSet;

use thiserror::Error;

/// Per-module build state a caller lends to one incremental compile.
///
/// The same contract is implemented on both sides of the connection: the
/// caller holds the real handle, and the daemon hands the front-end a proxy
/// that forwards each query over the wire. Reads must be idempotent and may be
/// repeated any number of times while the call runs.
pub trait IncrementalCache: Send + Sync {
    /// Fully-qualified names whose cached artefacts must not be reused.
    ///
    /// An empty set means every cached unit of the module is still valid.
    fn obsolete_package_parts(&self) -> Result<BTreeSet<String>, CacheError>;

    /// Serialised package data recorded by the last successful build.
    ///
    /// Requesting a name the handle does not know is a
    /// [`CacheError::Handle`] failure, never stale data.
    fn package_data(&self, fq_name: &str) -> Result<Vec<u8>, CacheError>;

    /// Releases resources held for the call. No queries follow a close.
    fn close(&self) -> Result<(), CacheError>;
}

/// Failures reported by a cache handle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The handle was queried after it had been closed.
    #[error("cache for module '{module}' is closed")]
    Closed {
        /// Module whose handle was closed.
        module: String,
    },
    /// Package data was requested for a name listed as obsolete.
    #[error("package part '{fq_name}' is obsolete")]
    Obsolete {
        /// Obsolete fully-qualified name.
        fq_name: String,
    },
    /// The handle answered with a failure (unknown name, caller-side fault).
    #[error("cache handle failure: {message}")]
    Handle {
        /// Description supplied by the handle.
        message: String,
    },
    /// The round trip to the handle did not complete.
    #[error("cache transport failure: {message}")]
    Transport {
        /// Description of the transport fault.
        message: String,
    },
}

impl CacheError {
    /// Builds a handle-side failure.
    pub fn handle(message: impl Into<String>) -> Self {
        Self::Handle {
            message: message.into(),
        }
    }

    /// Builds a transport failure.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Returns `true` when the failure means the call cannot continue.
    ///
    /// Every other variant degrades to "no cached data for this unit".
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}
