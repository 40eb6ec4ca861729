//! Structured health reporting for daemon lifecycle events.

use std::sync::Arc;
use std::time::Duration;

use kiln_config::{Config, SocketEndpoint};
use kiln_protocol::ExitStatus;

use crate::bootstrap::BootstrapError;
use crate::process::ShutdownCause;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after bootstrap completes successfully.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked once the listener accepts connections.
    fn listener_started(&self, endpoint: &SocketEndpoint);

    /// Invoked when a compilation call ended with a status.
    fn call_completed(&self, kind: &str, status: ExitStatus, elapsed: Duration);

    /// Invoked when a compilation call was aborted.
    fn call_failed(&self, kind: &str, reason: &str, elapsed: Duration);

    /// Invoked when shutdown was requested.
    fn shutdown_requested(&self, cause: ShutdownCause);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        (**self).bootstrap_succeeded(config);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn listener_started(&self, endpoint: &SocketEndpoint) {
        (**self).listener_started(endpoint);
    }

    fn call_completed(&self, kind: &str, status: ExitStatus, elapsed: Duration) {
        (**self).call_completed(kind, status, elapsed);
    }

    fn call_failed(&self, kind: &str, reason: &str, elapsed: Duration) {
        (**self).call_failed(kind, reason, elapsed);
    }

    fn shutdown_requested(&self, cause: ShutdownCause) {
        (**self).shutdown_requested(cause);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting daemon bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            socket = %config.daemon_socket(),
            log_filter = %config.log_filter(),
            log_format = ?config.log_format(),
            cache_query_timeout_ms = config.cache_query_timeout().as_millis(),
            sink_capacity = config.sink_capacity(),
            "daemon bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "daemon bootstrap failed"
        );
    }

    fn listener_started(&self, endpoint: &SocketEndpoint) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "listener_started",
            endpoint = %endpoint,
            "accepting compilation requests"
        );
    }

    fn call_completed(&self, kind: &str, status: ExitStatus, elapsed: Duration) {
        tracing::debug!(
            target: HEALTH_TARGET,
            event = "call_completed",
            kind,
            status = status.code(),
            elapsed_ms = elapsed.as_millis(),
            "call completed"
        );
    }

    fn call_failed(&self, kind: &str, reason: &str, elapsed: Duration) {
        tracing::warn!(
            target: HEALTH_TARGET,
            event = "call_failed",
            kind,
            reason,
            elapsed_ms = elapsed.as_millis(),
            "call aborted"
        );
    }

    fn shutdown_requested(&self, cause: ShutdownCause) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "shutdown_requested",
            cause = %cause,
            "shutdown requested"
        );
    }
}
