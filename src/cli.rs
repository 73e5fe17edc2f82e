// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::params::ParamAssignment;
use crate::resolve::Role;

/// Command-line arguments for `vmprov`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "vmprov",
    version,
    about = "Configure virtual machines by running provisioning scripts.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the engine config file (TOML).
    ///
    /// Default: `Vmprov.toml` in the current working directory. A missing
    /// file means built-in defaults.
    #[arg(long, global = true, value_name = "PATH", default_value = "Vmprov.toml")]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `VMPROV_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Print the final outcome as JSON instead of progress lines.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Provision a VM from a JSON configuration document.
    Provision {
        #[arg(value_name = "VM_JSON")]
        path: PathBuf,

        /// Resolve the script and print it with its parameters, but don't run it.
        #[arg(long)]
        dry_run: bool,
    },

    /// Provision a role with default sizing, overridden by `--param`.
    Role {
        #[arg(value_name = "ROLE")]
        role: Role,

        /// Parameter override, `NAME=VALUE`. May be repeated.
        #[arg(long = "param", value_name = "NAME=VALUE")]
        params: Vec<ParamAssignment>,

        #[arg(long)]
        dry_run: bool,
    },

    /// Run a script by indexed name, or a script file with `--file`.
    Script {
        #[arg(value_name = "NAME", required_unless_present = "file")]
        name: Option<String>,

        #[arg(long, value_name = "PATH", conflicts_with = "name")]
        file: Option<PathBuf>,

        /// Script parameter, `NAME=VALUE`. May be repeated.
        #[arg(long = "param", value_name = "NAME=VALUE")]
        params: Vec<ParamAssignment>,

        #[arg(long)]
        dry_run: bool,
    },

    /// List the role table and where each role's script lives.
    Roles,

    /// List the scripts found under the script root.
    Scripts,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
