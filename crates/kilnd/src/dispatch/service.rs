//! The compilation dispatch service.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use tracing::{debug, info, warn};

use kiln_protocol::{ExitStatus, OutputFormat};

use super::errors::DispatchError;
use super::session::{Call, CallState};
use super::sink::DiagnosticSink;
use super::DISPATCH_TARGET;
use crate::cache::IncrementalComponents;
use crate::frontend::{CompileContext, CompilerFrontend, Diagnostic, FrontendError};
use crate::health::HealthReporter;
use crate::process::ShutdownCause;

/// How a call ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    /// The call produced a status for the caller.
    Completed(ExitStatus),
    /// The call could not complete; the caller gets no status.
    Failed {
        /// Description of the transport fault.
        reason: String,
    },
}

impl CallOutcome {
    /// Builds a failed outcome.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    /// Status of a completed call.
    #[must_use]
    pub const fn status(&self) -> Option<ExitStatus> {
        match self {
            Self::Completed(status) => Some(*status),
            Self::Failed { .. } => None,
        }
    }
}

/// Which kind of compilation a call performs.
#[derive(Clone, Copy)]
pub enum CompileMode<'r> {
    /// Every unit is compiled from source.
    Full,
    /// Units may be reused through the caller's cache handles.
    Incremental(&'r dyn IncrementalComponents),
}

impl<'r> CompileMode<'r> {
    const fn kind(self) -> &'static str {
        match self {
            Self::Full => "compile",
            Self::Incremental(_) => "incremental_compile",
        }
    }

    const fn components(self) -> Option<&'r dyn IncrementalComponents> {
        match self {
            Self::Full => None,
            Self::Incremental(components) => Some(components),
        }
    }
}

/// Runs compilations against a single compiler front-end.
///
/// Calls run under the read half of the *alive* lock, so any number may run
/// concurrently. [`CompileService::shutdown`] takes the write half: it waits
/// for running calls, then rejects every later one.
pub struct CompileService {
    frontend: Arc<dyn CompilerFrontend>,
    reporter: Arc<dyn HealthReporter>,
    alive: RwLock<bool>,
    next_call: AtomicU64,
    shutdown: Option<Sender<ShutdownCause>>,
}

impl CompileService {
    /// Builds a live service.
    pub fn new(frontend: Arc<dyn CompilerFrontend>, reporter: Arc<dyn HealthReporter>) -> Self {
        Self {
            frontend,
            reporter,
            alive: RwLock::new(true),
            next_call: AtomicU64::new(1),
            shutdown: None,
        }
    }

    /// Notifies `notifier` when a caller requests shutdown.
    #[must_use]
    pub fn with_shutdown_notifier(mut self, notifier: Sender<ShutdownCause>) -> Self {
        self.shutdown = Some(notifier);
        self
    }

    /// Returns `false` once the service has been shut down.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive.read().map(|alive| *alive).unwrap_or(false)
    }

    /// Name and version of the compiler front-end.
    pub fn compiler_id(&self) -> Result<(String, String), DispatchError> {
        let alive = self
            .alive
            .read()
            .map_err(|_| DispatchError::internal("service state lock poisoned"))?;
        if !*alive {
            return Err(DispatchError::ShuttingDown);
        }
        Ok((
            self.frontend.name().to_owned(),
            self.frontend.version().to_owned(),
        ))
    }

    /// Stops accepting calls after the running ones finished. Repeated
    /// requests succeed without notifying again.
    pub fn shutdown(&self) -> Result<(), DispatchError> {
        if !self.stop()? {
            return Ok(());
        }
        self.reporter.shutdown_requested(ShutdownCause::Request);
        if let Some(notifier) = &self.shutdown
            && notifier.send(ShutdownCause::Request).is_err()
        {
            warn!(target: DISPATCH_TARGET, "shutdown listener is gone");
        }
        Ok(())
    }

    /// Waits for running calls to deliver their outcome, then rejects every
    /// later one. Used when the process itself is stopping, so nobody is
    /// notified.
    pub fn drain(&self) -> Result<(), DispatchError> {
        self.stop().map(|_| ())
    }

    /// Flips the alive flag under the write lock. Returns `false` when the
    /// service was already stopped.
    fn stop(&self) -> Result<bool, DispatchError> {
        let mut alive = self
            .alive
            .write()
            .map_err(|_| DispatchError::internal("service state lock poisoned"))?;
        Ok(std::mem::replace(&mut *alive, false))
    }

    /// Full compilation.
    pub fn compile(
        &self,
        arguments: &[String],
        sink: &dyn DiagnosticSink,
        format: OutputFormat,
    ) -> CallOutcome {
        self.run(arguments, CompileMode::Full, sink, format)
    }

    /// Incremental compilation. Every handle in `components` is closed before
    /// this returns, whatever the outcome.
    pub fn incremental_compile(
        &self,
        arguments: &[String],
        components: &dyn IncrementalComponents,
        sink: &dyn DiagnosticSink,
        format: OutputFormat,
    ) -> CallOutcome {
        self.run(arguments, CompileMode::Incremental(components), sink, format)
    }

    /// Single entry point behind [`Self::compile`] and
    /// [`Self::incremental_compile`].
    ///
    /// The read lock is held until the outcome reached the caller and was
    /// reported, so a draining service never cuts a call short.
    pub fn run(
        &self,
        arguments: &[String],
        mode: CompileMode<'_>,
        sink: &dyn DiagnosticSink,
        format: OutputFormat,
    ) -> CallOutcome {
        let mut call = Call::new(self.next_call.fetch_add(1, Ordering::Relaxed), mode.kind());
        let started = Instant::now();
        let gate = self.alive.read();
        let executed = match &gate {
            Ok(alive) if **alive => self.execute(&mut call, arguments, mode, sink, format),
            Ok(_) => report_internal(sink, format, &DispatchError::ShuttingDown),
            Err(_) => report_internal(
                sink,
                format,
                &DispatchError::internal("service state lock poisoned"),
            ),
        };
        let released = release_caches(mode, executed);
        let outcome = deliver(sink, released);
        let elapsed = started.elapsed();

        match &outcome {
            CallOutcome::Completed(status) => {
                call.advance(CallState::Completed);
                info!(
                    target: DISPATCH_TARGET,
                    call = call.id(),
                    kind = call.kind(),
                    status = %status,
                    elapsed_ms = elapsed.as_millis(),
                    "compilation finished"
                );
                self.reporter.call_completed(call.kind(), *status, elapsed);
            }
            CallOutcome::Failed { reason } => {
                call.advance(CallState::Failed);
                warn!(
                    target: DISPATCH_TARGET,
                    call = call.id(),
                    kind = call.kind(),
                    reason = %reason,
                    elapsed_ms = elapsed.as_millis(),
                    "compilation aborted"
                );
                self.reporter.call_failed(call.kind(), reason, elapsed);
            }
        }
        drop(gate);
        outcome
    }

    /// Runs the front-end. The caller holds the read lock.
    fn execute(
        &self,
        call: &mut Call,
        arguments: &[String],
        mode: CompileMode<'_>,
        sink: &dyn DiagnosticSink,
        format: OutputFormat,
    ) -> CallOutcome {
        call.advance(CallState::Dispatched);
        if arguments.is_empty() {
            return report_internal(
                sink,
                format,
                &DispatchError::invalid_arguments("empty arguments list"),
            );
        }

        info!(
            target: DISPATCH_TARGET,
            call = call.id(),
            kind = call.kind(),
            arguments = %arguments.join(" "),
            "compilation started"
        );
        call.advance(CallState::Running);
        let mut context = CompileContext::new(sink, format, mode.components());
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.frontend.execute(arguments, &mut context)
        }));
        drop(context);

        match result {
            Ok(Ok(report)) => {
                debug!(
                    target: DISPATCH_TARGET,
                    call = call.id(),
                    recompiled = ?report.recompiled,
                    reused = ?report.reused,
                    "front-end report"
                );
                CallOutcome::Completed(report.exit_status())
            }
            Ok(Err(FrontendError::Transport { message })) => CallOutcome::Failed { reason: message },
            Ok(Err(error)) => report_internal(sink, format, &error),
            Err(_) => report_internal(sink, format, &"compiler front-end panicked"),
        }
    }
}

/// Closes the call's handles and folds a lost connection into the outcome.
fn release_caches(mode: CompileMode<'_>, outcome: CallOutcome) -> CallOutcome {
    let CompileMode::Incremental(components) = mode else {
        return outcome;
    };
    match components.close_all() {
        Ok(()) => outcome,
        Err(error) if error.is_transport() && outcome.status().is_some() => {
            CallOutcome::failed(error.to_string())
        }
        Err(error) => {
            debug!(target: DISPATCH_TARGET, %error, "cache close failed after call ended");
            outcome
        }
    }
}

/// Hands the outcome to the caller. A status that never arrived turns the
/// call into a failure.
fn deliver(sink: &dyn DiagnosticSink, outcome: CallOutcome) -> CallOutcome {
    match sink.conclude(&outcome) {
        Ok(()) => outcome,
        Err(error) if outcome.status().is_some() => {
            CallOutcome::failed(format!("status not delivered: {error}"))
        }
        Err(error) => {
            debug!(target: DISPATCH_TARGET, %error, "abort frame not delivered");
            outcome
        }
    }
}

/// Reports an internal failure as one exception record and ends the call
/// with [`ExitStatus::InternalError`].
pub(crate) fn report_internal(
    sink: &dyn DiagnosticSink,
    format: OutputFormat,
    error: &dyn fmt::Display,
) -> CallOutcome {
    let record = Diagnostic::exception(error.to_string()).render(format);
    match sink.write_record(record) {
        Ok(()) => CallOutcome::Completed(ExitStatus::InternalError),
        Err(sink_error) => CallOutcome::failed(sink_error.to_string()),
    }
}
