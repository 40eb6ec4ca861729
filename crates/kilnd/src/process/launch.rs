//! Supervises daemon launch sequencing and runtime orchestration.

use std::sync::Arc;
use std::sync::mpsc;

use tracing::{info, warn};

use crate::bootstrap::{ConfigLoader, SystemConfigLoader, bootstrap_with};
use crate::dispatch::{CompileService, DispatchConnectionHandler, DispatchSettings};
use crate::frontend::{CompilerFrontend, SourceCheckFrontend};
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::transport::SocketListener;

use super::errors::LaunchError;
use super::shutdown::{ShutdownCause, ShutdownSignal, SystemShutdownSignal};
use super::PROCESS_TARGET;

/// Runs the daemon in the foreground with the production collaborators.
pub fn run_daemon() -> Result<(), LaunchError> {
    let reporter: Arc<dyn HealthReporter> = Arc::new(StructuredHealthReporter::new());
    let frontend: Arc<dyn CompilerFrontend> = Arc::new(SourceCheckFrontend::new());
    run_daemon_with(&SystemConfigLoader, reporter, frontend, &SystemShutdownSignal::new())
}

/// Runs the daemon with injected collaborators until `shutdown` fires or a
/// caller requests shutdown.
pub fn run_daemon_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    frontend: Arc<dyn CompilerFrontend>,
    shutdown: &dyn ShutdownSignal,
) -> Result<(), LaunchError> {
    let daemon = bootstrap_with(loader, Arc::clone(&reporter), frontend)?;
    let (notifier, requests) = mpsc::channel();
    shutdown.install(notifier.clone())?;

    let service = Arc::new(
        CompileService::new(daemon.frontend(), Arc::clone(&reporter))
            .with_shutdown_notifier(notifier),
    );
    let settings = DispatchSettings::from_config(daemon.config());
    let handler = Arc::new(DispatchConnectionHandler::new(Arc::clone(&service), settings));

    let listener = SocketListener::bind(daemon.config().daemon_socket())?;
    reporter.listener_started(listener.endpoint());
    let listener_handle = listener.start(handler)?;

    let cause = requests.recv().unwrap_or(ShutdownCause::Request);
    if matches!(cause, ShutdownCause::Signal(_)) {
        reporter.shutdown_requested(cause);
        info!(target: PROCESS_TARGET, %cause, "draining running calls");
        if let Err(error) = service.drain() {
            warn!(target: PROCESS_TARGET, %error, "failed to drain running calls");
        }
    }
    info!(target: PROCESS_TARGET, %cause, "stopping listener");
    listener_handle.shutdown();
    listener_handle.join()?;
    info!(target: PROCESS_TARGET, "shutdown sequence completed");
    Ok(())
}
