//! Shared configuration for the Kiln daemon and its clients.
//!
//! Configuration is layered by [`ortho_config`]: built-in defaults, an
//! optional configuration file, `KILN_*` environment variables and finally
//! command-line flags. Both `kilnd` and the `kiln` client resolve the daemon
//! socket from the same structure so they always agree on where to meet.

mod defaults;
mod logging;
mod socket;

use std::ffi::OsString;
use std::sync::Arc;
use std::time::Duration;

use ortho_config::{OrthoConfig, OrthoError};
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_CACHE_QUERY_TIMEOUT_MS, DEFAULT_LOG_FILTER, DEFAULT_MAX_REQUEST_BYTES,
    DEFAULT_SINK_CAPACITY, DEFAULT_SINK_WRITE_TIMEOUT_MS, DEFAULT_TCP_PORT, default_log_filter,
    default_log_filter_string, default_log_format, default_socket_endpoint,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use socket::{SocketEndpoint, SocketParseError, SocketPreparationError};

/// Resolved configuration shared by the daemon and the client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "KILN")]
pub struct Config {
    /// Socket the daemon listens on and the client connects to.
    #[ortho_config(default = default_socket_endpoint())]
    pub daemon_socket: SocketEndpoint,
    /// `tracing` filter expression applied to daemon telemetry.
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Output format of daemon telemetry.
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
    /// Upper bound, in milliseconds, on waiting for one cache-handle reply.
    #[ortho_config(default = DEFAULT_CACHE_QUERY_TIMEOUT_MS)]
    pub cache_query_timeout_ms: u64,
    /// Upper bound, in milliseconds, on one socket write to the client.
    #[ortho_config(default = DEFAULT_SINK_WRITE_TIMEOUT_MS)]
    pub sink_write_timeout_ms: u64,
    /// Number of frames the output sink queues before blocking the producer.
    #[ortho_config(default = DEFAULT_SINK_CAPACITY)]
    pub sink_capacity: usize,
    /// Largest request line the daemon accepts.
    #[ortho_config(default = DEFAULT_MAX_REQUEST_BYTES)]
    pub max_request_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            daemon_socket: default_socket_endpoint(),
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            cache_query_timeout_ms: DEFAULT_CACHE_QUERY_TIMEOUT_MS,
            sink_write_timeout_ms: DEFAULT_SINK_WRITE_TIMEOUT_MS,
            sink_capacity: DEFAULT_SINK_CAPACITY,
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
        }
    }
}

impl Config {
    /// Loads configuration from the process arguments, environment and
    /// configuration files.
    pub fn load() -> Result<Self, Arc<OrthoError>> {
        <Self as OrthoConfig>::load_from_iter(std::env::args_os())
    }

    /// Loads configuration from an explicit argument iterator whose first
    /// item is the program name.
    pub fn load_from_iter<I, T>(args: I) -> Result<Self, Arc<OrthoError>>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as OrthoConfig>::load_from_iter(args)
    }

    /// Socket the daemon binds.
    #[must_use]
    pub fn daemon_socket(&self) -> &SocketEndpoint {
        &self.daemon_socket
    }

    /// Telemetry filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Telemetry output format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Timeout applied to each cache-handle round trip.
    #[must_use]
    pub fn cache_query_timeout(&self) -> Duration {
        Duration::from_millis(self.cache_query_timeout_ms.max(1))
    }

    /// Timeout applied to each socket write towards the client.
    #[must_use]
    pub fn sink_write_timeout(&self) -> Duration {
        Duration::from_millis(self.sink_write_timeout_ms.max(1))
    }

    /// Bounded queue length of the output sink; never zero.
    #[must_use]
    pub fn sink_capacity(&self) -> usize {
        self.sink_capacity.max(1)
    }

    /// Maximum accepted size of a request line, in bytes.
    #[must_use]
    pub fn max_request_bytes(&self) -> usize {
        self.max_request_bytes
    }
}
