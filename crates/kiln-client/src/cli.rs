//! Command-line surface of the `kiln` binary.

use clap::{Parser, Subcommand};
use kiln_protocol::OutputFormat;

/// Client for the Kiln compilation daemon.
#[derive(Parser, Debug)]
#[command(name = "kiln", version, disable_help_subcommand = true)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: CliCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub(crate) enum CliCommand {
    /// Runs a full compilation on the daemon.
    Compile {
        /// Serialisation of diagnostic records (`plain` or `xml`).
        #[arg(long, default_value = "plain")]
        format: OutputFormat,
        /// Compiler arguments, forwarded verbatim.
        #[arg(
            value_name = "ARG",
            num_args = 0..,
            trailing_var_arg = true,
            allow_hyphen_values = true
        )]
        arguments: Vec<String>,
    },
    /// Prints the daemon's compiler name and version.
    CompilerId,
    /// Asks the daemon to stop accepting work.
    Shutdown,
}
