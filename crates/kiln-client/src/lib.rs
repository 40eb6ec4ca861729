//! Client for the Kiln compilation daemon.
//!
//! [`CompileClient`] runs one call per connection against a daemon endpoint.
//! Incremental compiles lend the caller's cache handles to the daemon: the
//! daemon queries them over the same connection and the client answers from
//! the local handles, closing each exactly once before the call returns.
//!
//! The `kiln` binary is a thin wrapper over [`run`].

mod cli;
mod config;
mod errors;
mod memory;
mod session;
mod transport;

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use clap::error::ErrorKind;
use kiln_config::SocketEndpoint;
use kiln_protocol::framing::FrameReader;
use kiln_protocol::{ExitStatus, OutputFormat, Request};
use tracing::debug;

use cli::{Cli, CliCommand};
use config::{ConfigLoader, OrthoConfigLoader, split_config_arguments};
pub use errors::ClientError;
pub use memory::{LocalCaches, MemoryCache};
use session::{CallSummary, run_call};
use transport::connect;

/// Tracing target for client events.
pub(crate) const CLIENT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::client");
/// Largest daemon frame the client buffers.
const MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;
/// Exit code used when the outcome of a call is unknown.
const TRANSPORT_FAILURE_EXIT: u8 = 3;
/// Exit code used for usage and configuration errors.
const USAGE_FAILURE_EXIT: u8 = 2;

/// Issues calls to a daemon at a fixed endpoint.
#[derive(Debug, Clone)]
pub struct CompileClient {
    endpoint: SocketEndpoint,
}

impl CompileClient {
    /// Client for the daemon listening on `endpoint`.
    #[must_use]
    pub const fn new(endpoint: SocketEndpoint) -> Self {
        Self { endpoint }
    }

    /// Runs a full compile, copying diagnostic records to `output` as they
    /// arrive.
    pub fn compile(
        &self,
        arguments: Vec<String>,
        format: OutputFormat,
        output: &mut dyn Write,
    ) -> Result<ExitStatus, ClientError> {
        let request = Request::Compile {
            arguments,
            output_format: format,
        };
        self.call(&request, &LocalCaches::new(), output)
            .map(|summary| summary.status)
    }

    /// Runs an incremental compile that may consult `caches`.
    ///
    /// Every handle in `caches` is closed exactly once before this returns,
    /// whether or not the daemon used it and whether or not the call
    /// succeeded.
    pub fn incremental_compile(
        &self,
        arguments: Vec<String>,
        caches: &LocalCaches,
        format: OutputFormat,
        output: &mut dyn Write,
    ) -> Result<ExitStatus, ClientError> {
        let request = Request::IncrementalCompile {
            arguments,
            caches: caches.keys().cloned().collect(),
            output_format: format,
        };
        self.call(&request, caches, output)
            .map(|summary| summary.status)
    }

    /// Returns the daemon's compiler name and version.
    pub fn compiler_id(&self) -> Result<(String, String), ClientError> {
        let summary = self.call(&Request::CompilerId, &LocalCaches::new(), &mut std::io::sink())?;
        summary
            .compiler
            .ok_or(ClientError::MissingCompilerId(summary.status))
    }

    /// Asks the daemon to stop accepting work.
    pub fn shutdown(&self) -> Result<ExitStatus, ClientError> {
        self.call(&Request::Shutdown, &LocalCaches::new(), &mut std::io::sink())
            .map(|summary| summary.status)
    }

    fn call(
        &self,
        request: &Request,
        caches: &LocalCaches,
        output: &mut dyn Write,
    ) -> Result<CallSummary, ClientError> {
        let mut connection = match connect(&self.endpoint) {
            Ok(connection) => connection,
            Err(error) => {
                // The daemon never saw the handles, so they are released here.
                release_all(caches);
                return Err(error);
            }
        };
        let reader = match connection.try_clone() {
            Ok(reader) => reader,
            Err(source) => {
                release_all(caches);
                return Err(ClientError::Connect {
                    endpoint: self.endpoint.to_string(),
                    source,
                });
            }
        };
        let mut frames = FrameReader::new(reader, MAX_FRAME_BYTES);
        run_call(&mut frames, &mut connection, request, caches, output)
    }
}

fn release_all(caches: &LocalCaches) {
    for (module, handle) in caches {
        if let Err(error) = handle.close() {
            debug!(target: CLIENT_TARGET, module = %module, %error, "cache handle close failed");
        }
    }
}

/// Runs the `kiln` binary with the given arguments and IO handles.
///
/// Exits with the call status (`0`, `1` or `2`) when the daemon answered,
/// `2` on usage or configuration errors and `3` when the outcome is unknown.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    run_with_loader(args, stdout, stderr, &OrthoConfigLoader)
}

fn run_with_loader<I, W, E, L>(args: I, stdout: &mut W, stderr: &mut E, loader: &L) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
    L: ConfigLoader,
{
    let args: Vec<OsString> = args.into_iter().collect();
    let split = split_config_arguments(&args);

    let cli = match Cli::try_parse_from(&split.cli_arguments) {
        Ok(cli) => cli,
        Err(error) if matches!(error.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = write!(stdout, "{error}");
            return ExitCode::SUCCESS;
        }
        Err(error) => return report(stderr, &ClientError::CliUsage(error)),
    };

    let result = loader
        .load(&split.config_arguments)
        .and_then(|config| execute(cli.command, config.daemon_socket().clone(), stdout));
    match result {
        Ok(code) => code,
        Err(error) => report(stderr, &error),
    }
}

fn execute<W: Write>(
    command: CliCommand,
    endpoint: SocketEndpoint,
    stdout: &mut W,
) -> Result<ExitCode, ClientError> {
    let client = CompileClient::new(endpoint);
    match command {
        CliCommand::Compile { format, arguments } => client
            .compile(arguments, format, stdout)
            .map(status_exit_code),
        CliCommand::CompilerId => {
            let (name, version) = client.compiler_id()?;
            writeln!(stdout, "{name} {version}").map_err(ClientError::ForwardOutput)?;
            Ok(ExitCode::SUCCESS)
        }
        CliCommand::Shutdown => client.shutdown().map(status_exit_code),
    }
}

fn status_exit_code(status: ExitStatus) -> ExitCode {
    match status {
        ExitStatus::Ok => ExitCode::SUCCESS,
        ExitStatus::CompilationError => ExitCode::from(1),
        ExitStatus::InternalError => ExitCode::from(2),
    }
}

fn report<E: Write>(stderr: &mut E, error: &ClientError) -> ExitCode {
    let _ = writeln!(stderr, "kiln: {error}");
    if error.is_transport() {
        ExitCode::from(TRANSPORT_FAILURE_EXIT)
    } else {
        ExitCode::from(USAGE_FAILURE_EXIT)
    }
}
