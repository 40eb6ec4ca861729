//! Shared doubles and fixtures for the daemon test suites.

mod buffer;
mod cache;
mod config_loader;
mod daemon;
mod reporter;
mod sink;

pub use buffer::SharedBuffer;
pub use cache::MockIncrementalCache;
pub use config_loader::{FailingConfigLoader, TestConfigLoader};
pub use daemon::{CallerCache, DaemonHarness};
pub use reporter::{HealthEvent, RecordingHealthReporter};
pub use sink::RecordingSink;
