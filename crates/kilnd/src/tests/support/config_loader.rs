//! Test configuration loaders for scenarios covering success and failure
//! paths.

use std::ffi::OsString;
use std::sync::Arc;

use ortho_config::OrthoError;
use tempfile::TempDir;

use kiln_config::{Config, SocketEndpoint};

use crate::bootstrap::ConfigLoader;

/// Loader that provisions a Unix socket path under a temporary directory.
pub struct TestConfigLoader {
    socket_dir: TempDir,
}

impl TestConfigLoader {
    #[must_use]
    pub fn new() -> Self {
        Self {
            socket_dir: TempDir::new().expect("failed to create temporary directory for socket"),
        }
    }

    fn socket_path(&self) -> String {
        self.socket_dir
            .path()
            .join("run")
            .join("kilnd.sock")
            .to_str()
            .expect("temporary socket path was not valid UTF-8")
            .to_owned()
    }
}

impl ConfigLoader for TestConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(Config {
            daemon_socket: SocketEndpoint::unix(self.socket_path()),
            log_filter: "kilnd=warn".to_owned(),
            ..Config::default()
        })
    }
}

/// Loader that intentionally fails by passing invalid CLI arguments.
pub struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let args = vec![
            OsString::from("kilnd"),
            OsString::from("--daemon-socket"),
            OsString::from("invalid://socket"),
        ];
        Config::load_from_iter(args)
    }
}
