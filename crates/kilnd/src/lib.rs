//! The Kiln compilation daemon.
//!
//! `kilnd` keeps a compiler front-end resident and runs compilations on
//! behalf of short-lived clients. Each connection carries one call:
//!
//! - a full compilation, streaming diagnostic records back as they are
//!   produced and ending with a status;
//! - an incremental compilation, which additionally calls back into the
//!   caller's cache handles over the same connection to learn which units
//!   are obsolete and to fetch the ones that can be reused;
//! - a `compiler_id` query or a `shutdown` request.
//!
//! Lifecycle events are reported through a [`HealthReporter`]; telemetry is
//! structured `tracing` output configured from [`kiln_config::Config`].

mod bootstrap;
mod cache;
pub mod dispatch;
pub mod frontend;
mod health;
mod process;
mod telemetry;
mod transport;

pub use bootstrap::{
    BootstrapError, ConfigLoader, Daemon, StaticConfigLoader, SystemConfigLoader, bootstrap_with,
};
pub use cache::{CacheRegistry, IncrementalComponents};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use process::{
    LaunchError, ShutdownCause, ShutdownError, ShutdownSignal, SystemShutdownSignal, run_daemon,
    run_daemon_with,
};
pub use telemetry::{TelemetryError, TelemetryHandle};
pub use transport::ListenerError;

#[cfg(test)]
mod tests;
