// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::engine::ScopeFilter;

/// Command-line arguments for `procsched`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "procsched",
    version,
    about = "Build, launch and track processing tasks on a batch cluster.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `PROCSCHED_CONFIG`, else `Procsched.toml` in the current
    /// working directory.
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `PROCSCHED_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Match processors against the repository and create missing tasks.
    Build(ScopeArgs),

    /// Submit runnable tasks while the cluster has capacity.
    Launch {
        #[command(flatten)]
        scope: ScopeArgs,

        /// Write job scripts without submitting them.
        #[arg(long)]
        dry_run: bool,
    },

    /// Poll running jobs and apply RERUN / REPROC requests.
    Update(ScopeArgs),

    /// Print the processor dependency order and any cycles.
    Order,
}

/// Scope filter shared by the phase commands.
#[derive(Debug, Clone, Default, Args)]
pub struct ScopeArgs {
    /// Only these projects (repeatable).
    #[arg(long = "project", value_name = "PROJECT")]
    pub projects: Vec<String>,

    /// Only these sessions (repeatable).
    #[arg(long = "session", value_name = "SESSION")]
    pub sessions: Vec<String>,
}

impl From<&ScopeArgs> for ScopeFilter {
    fn from(args: &ScopeArgs) -> Self {
        ScopeFilter {
            projects: args.projects.clone(),
            sessions: args.sessions.clone(),
        }
    }
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
