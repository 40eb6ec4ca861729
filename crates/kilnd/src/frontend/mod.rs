//! Compiler front-end seam.
//!
//! The dispatch service knows nothing about any particular language. It
//! hands the forwarded arguments to a [`CompilerFrontend`] together with a
//! fresh [`CompileContext`] that carries the diagnostic sink and, for
//! incremental calls, the caller's cache handles.

mod diagnostic;
mod source_check;

use kiln_protocol::{CacheError, ExitStatus, IncrementalCache, OutputFormat};
use thiserror::Error;

use crate::cache::IncrementalComponents;
use crate::dispatch::{DiagnosticSink, SinkError};

pub use diagnostic::{Diagnostic, Location, Severity};
pub use source_check::SourceCheckFrontend;

/// A compiler the daemon can drive.
///
/// Implementations must not keep mutable state between calls: several
/// connections may execute concurrently.
pub trait CompilerFrontend: Send + Sync {
    /// Front-end name reported by `compiler_id`.
    fn name(&self) -> &str;

    /// Front-end version reported by `compiler_id`.
    fn version(&self) -> &str;

    /// Runs one compilation.
    ///
    /// Diagnostics go through [`CompileContext::report`]. Returning
    /// [`FrontendError::Transport`] tells the service the caller is gone and
    /// the call must be aborted.
    fn execute(
        &self,
        arguments: &[String],
        context: &mut CompileContext<'_>,
    ) -> Result<CompileReport, FrontendError>;
}

/// Outcome of a front-end run that reached the end of compilation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileReport {
    /// Units compiled from source.
    pub recompiled: Vec<String>,
    /// Units taken from the caller's cache.
    pub reused: Vec<String>,
    /// Whether compilation errors were reported.
    pub failed: bool,
}

impl CompileReport {
    /// Status the call ends with.
    #[must_use]
    pub const fn exit_status(&self) -> ExitStatus {
        if self.failed {
            ExitStatus::CompilationError
        } else {
            ExitStatus::Ok
        }
    }
}

/// Failures that stop a front-end before it finished compiling.
#[derive(Debug, Error)]
pub enum FrontendError {
    /// The forwarded arguments were not understood.
    #[error("invalid compiler arguments: {message}")]
    InvalidArguments {
        /// Description of the problem.
        message: String,
    },
    /// The front-end could not prepare the compilation.
    #[error("compiler setup failed: {message}")]
    Setup {
        /// Description of the problem.
        message: String,
    },
    /// The caller's connection was lost while reporting or querying caches.
    #[error("lost connection to the caller: {message}")]
    Transport {
        /// Description of the transport fault.
        message: String,
    },
}

impl FrontendError {
    /// Builds an invalid arguments error.
    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            message: message.into(),
        }
    }

    /// Builds a setup error.
    pub fn setup(message: impl Into<String>) -> Self {
        Self::Setup {
            message: message.into(),
        }
    }

    /// Builds a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }
}

impl From<SinkError> for FrontendError {
    fn from(error: SinkError) -> Self {
        Self::transport(error.to_string())
    }
}

/// Per-call view of the daemon a front-end works against.
pub struct CompileContext<'a> {
    sink: &'a dyn DiagnosticSink,
    format: OutputFormat,
    caches: Option<&'a dyn IncrementalComponents>,
    errors: usize,
    warnings: usize,
}

impl<'a> CompileContext<'a> {
    /// Builds a context. `caches` is `None` for full compilations.
    pub fn new(
        sink: &'a dyn DiagnosticSink,
        format: OutputFormat,
        caches: Option<&'a dyn IncrementalComponents>,
    ) -> Self {
        Self {
            sink,
            format,
            caches,
            errors: 0,
            warnings: 0,
        }
    }

    /// Renders `diagnostic` in the requested format and writes it as one record.
    pub fn report(&mut self, diagnostic: &Diagnostic) -> Result<(), FrontendError> {
        self.sink.write_record(diagnostic.render(self.format))?;
        if diagnostic.severity.is_error() {
            self.errors += 1;
        } else if diagnostic.severity == Severity::Warning {
            self.warnings += 1;
        }
        Ok(())
    }

    /// Cache handle registered for `module`, if this is an incremental call
    /// and the caller supplied one.
    #[must_use]
    pub fn incremental_cache(&self, module: &str) -> Option<&'a dyn IncrementalCache> {
        self.caches
            .and_then(|caches| caches.incremental_cache(module))
    }

    /// Number of error and exception records reported so far.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors
    }

    /// Number of warning records reported so far.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings
    }
}

/// Converts a cache failure seen by a front-end. Transport failures abort
/// the call; anything else is returned so the unit can be recompiled.
pub(crate) fn classify_cache_error(error: CacheError) -> Result<CacheError, FrontendError> {
    if error.is_transport() {
        Err(FrontendError::transport(error.to_string()))
    } else {
        Ok(error)
    }
}
