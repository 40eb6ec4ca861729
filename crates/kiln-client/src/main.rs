//! CLI entrypoint for the Kiln compilation client.
//!
//! The binary delegates to [`kiln_client::run`], which loads configuration,
//! parses the subcommand, and runs one call against the configured daemon.

use std::io::{self, StderrLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    kiln_client::run(std::env::args_os(), &mut stdout, &mut stderr)
}
