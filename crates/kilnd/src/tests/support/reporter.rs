//! Test double for [`HealthReporter`] that records structured events for
//! assertions.

use std::sync::Mutex;
use std::time::Duration;

use kiln_config::{Config, SocketEndpoint};
use kiln_protocol::ExitStatus;

use crate::bootstrap::BootstrapError;
use crate::health::HealthReporter;
use crate::process::ShutdownCause;

/// Structured health events tracked during scenarios.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    /// Bootstrap started.
    BootstrapStarting,
    /// Bootstrap completed successfully.
    BootstrapSucceeded,
    /// Bootstrap failed with an error description.
    BootstrapFailed(String),
    /// The listener is accepting connections.
    ListenerStarted(String),
    /// A call ended with a status.
    CallCompleted {
        kind: String,
        status: ExitStatus,
    },
    /// A call was aborted.
    CallFailed { kind: String, reason: String },
    /// Shutdown was requested.
    ShutdownRequested(ShutdownCause),
}

/// Records health events for assertions.
#[derive(Debug, Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    /// Captures a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    /// Status of every completed call, in completion order.
    pub fn completed_statuses(&self) -> Vec<ExitStatus> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                HealthEvent::CallCompleted { status, .. } => Some(status),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self) {
        self.record(HealthEvent::BootstrapStarting);
    }

    fn bootstrap_succeeded(&self, _config: &Config) {
        self.record(HealthEvent::BootstrapSucceeded);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.record(HealthEvent::BootstrapFailed(error.to_string()));
    }

    fn listener_started(&self, endpoint: &SocketEndpoint) {
        self.record(HealthEvent::ListenerStarted(endpoint.to_string()));
    }

    fn call_completed(&self, kind: &str, status: ExitStatus, _elapsed: Duration) {
        self.record(HealthEvent::CallCompleted {
            kind: kind.to_owned(),
            status,
        });
    }

    fn call_failed(&self, kind: &str, reason: &str, _elapsed: Duration) {
        self.record(HealthEvent::CallFailed {
            kind: kind.to_owned(),
            reason: reason.to_owned(),
        });
    }

    fn shutdown_requested(&self, cause: ShutdownCause) {
        self.record(HealthEvent::ShutdownRequested(cause));
    }
}
