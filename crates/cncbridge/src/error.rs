//! CLI error types with miette diagnostics.

use miette::Diagnostic;
use thiserror::Error;

use cncbridge_config::ConfigError;
use cncbridge_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL: i32 = 1;
    /// Used by clap itself for argument errors.
    #[allow(dead_code)]
    pub const USAGE: i32 = 2;
    pub const CONFIG: i32 = 3;
    pub const LEDGER: i32 = 4;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration file not found: {path}")]
    #[diagnostic(
        code(cncbridge::no_config),
        help(
            "Pass one with --config <file> or set CNCBRIDGE_CONFIG.\n\
             See config.example.toml for a starting point."
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(
        code(cncbridge::config),
        help("Fix the configuration file, then run: cncbridge check")
    )]
    Config(ConfigError),

    #[error(transparent)]
    #[diagnostic(code(cncbridge::invalid))]
    Invalid(CoreError),

    // ── Ledger ───────────────────────────────────────────────────────
    #[error("{count} handle(s) could not be released and were not recorded")]
    #[diagnostic(
        code(cncbridge::ledger),
        help(
            "The ledger at {path} could not be written; the controller may \
             refuse new connections until it frees them."
        )
    )]
    Ledger { count: usize, path: String },

    // ── IO ───────────────────────────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(code(cncbridge::io))]
    Io(#[from] std::io::Error),
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NotFound { path } => Self::NoConfig {
                path: path.display().to_string(),
            },
            other => Self::Config(other),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        Self::Invalid(err)
    }
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NoConfig { .. } | Self::Config(_) => exit_code::CONFIG,
            Self::Invalid(e) if e.is_config() => exit_code::CONFIG,
            Self::Invalid(e) if e.is_ledger() => exit_code::LEDGER,
            Self::Ledger { .. } => exit_code::LEDGER,
            Self::Invalid(_) | Self::Io(_) => exit_code::GENERAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn missing_file_maps_to_config_exit_code() {
        let err = CliError::from(ConfigError::NotFound {
            path: PathBuf::from("/nope.toml"),
        });
        assert!(matches!(err, CliError::NoConfig { .. }));
        assert_eq!(err.exit_code(), exit_code::CONFIG);
    }

    #[test]
    fn validation_failures_are_config_errors() {
        assert_eq!(
            CliError::from(CoreError::NoDevices).exit_code(),
            exit_code::CONFIG
        );
        assert_eq!(
            CliError::Ledger {
                count: 1,
                path: "x".into()
            }
            .exit_code(),
            exit_code::LEDGER
        );
    }
}
