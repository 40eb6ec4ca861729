//! Configuration loading for the `kiln` binary.
//!
//! Leading configuration flags go to `ortho_config`; everything from the
//! first other token onwards is the subcommand and its arguments.

use std::ffi::{OsStr, OsString};

use kiln_config::Config;

use crate::ClientError;

/// Flags understood by the configuration loader.
///
/// Keep in sync with the fields of [`kiln_config::Config`].
const CONFIG_CLI_FLAGS: &[&str] = &[
    "--config-path",
    "--daemon-socket",
    "--log-filter",
    "--log-format",
    "--cache-query-timeout-ms",
    "--sink-write-timeout-ms",
    "--sink-capacity",
    "--max-request-bytes",
];

pub(crate) trait ConfigLoader {
    /// Loads configuration from the program name followed by the leading
    /// configuration flags.
    ///
    /// Configuration flags placed after the subcommand are treated as
    /// compiler arguments.
    fn load(&self, args: &[OsString]) -> Result<Config, ClientError>;
}

pub(crate) struct OrthoConfigLoader;

impl ConfigLoader for OrthoConfigLoader {
    fn load(&self, args: &[OsString]) -> Result<Config, ClientError> {
        Config::load_from_iter(args.iter().cloned()).map_err(ClientError::LoadConfiguration)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlagAction {
    Include { needs_value: bool },
    Stop,
}

fn classify(argument: &OsStr) -> FlagAction {
    let text = argument.to_string_lossy();
    let mut parts = text.splitn(2, '=');
    let flag = parts.next().unwrap_or_default();
    if CONFIG_CLI_FLAGS.contains(&flag) {
        FlagAction::Include {
            needs_value: parts.next().is_none(),
        }
    } else {
        FlagAction::Stop
    }
}

/// Program arguments divided between the configuration loader and clap.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ArgumentSplit {
    pub(crate) config_arguments: Vec<OsString>,
    pub(crate) cli_arguments: Vec<OsString>,
}

pub(crate) fn split_config_arguments(args: &[OsString]) -> ArgumentSplit {
    let Some((program, rest)) = args.split_first() else {
        return ArgumentSplit::default();
    };

    let mut split = ArgumentSplit {
        config_arguments: vec![program.clone()],
        cli_arguments: vec![program.clone()],
    };
    let mut remaining = rest.iter();
    while let Some(argument) = remaining.next() {
        match classify(argument) {
            FlagAction::Include { needs_value } => {
                split.config_arguments.push(argument.clone());
                if needs_value && let Some(value) = remaining.next() {
                    split.config_arguments.push(value.clone());
                }
            }
            FlagAction::Stop => {
                split.cli_arguments.push(argument.clone());
                split.cli_arguments.extend(remaining.cloned());
                break;
            }
        }
    }
    split
}
