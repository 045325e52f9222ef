//! Clap derive structures for the `cncbridge` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// cncbridge -- CNC telemetry bridge
#[derive(Debug, Parser)]
#[command(
    name = "cncbridge",
    version,
    about = "Poll CNC controllers and stream their telemetry as JSON lines",
    long_about = "Keeps one session per configured controller, reads the tags each \
        device's tag pack declares, and writes one JSON record per device and \
        cycle to stdout. Unreachable devices produce a power_on=0 sentinel.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Configuration file (TOML, or YAML by extension)
    #[arg(long, short = 'c', env = "CNCBRIDGE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log line format on stderr
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,
}

impl GlobalOpts {
    /// `--config`, else the platform default location.
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(cncbridge_config::config_path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Poll every configured device until interrupted
    Run(RunArgs),

    /// Validate the configuration and print a summary
    Check(CheckArgs),

    /// Mirror records read from stdin into the address space and echo them
    Relay,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Do not write records to stdout (overrides `output.stdout`)
    #[arg(long)]
    pub quiet: bool,
}

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Also print the effective configuration as TOML
    #[arg(long)]
    pub effective: bool,
}
