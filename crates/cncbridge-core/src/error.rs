// ── Core error types ──
//
// Errors surfaced by the engine. Only configuration problems are fatal;
// everything on the polling path is logged and retried by the sessions.

use std::path::PathBuf;

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Configuration errors ─────────────────────────────────────────
    #[error("No devices configured")]
    NoDevices,

    #[error("Duplicate device name: {name}")]
    DuplicateName { name: String },

    #[error("Duplicate device address {address} (devices '{first}' and '{second}')")]
    DuplicateAddress {
        address: String,
        first: String,
        second: String,
    },

    #[error("Device '{device}' references unknown tag pack '{pack}'")]
    UnknownTagPack { device: String, pack: String },

    #[error("Tag pack '{pack}': unknown tag '{tag}'")]
    UnknownTag { pack: String, tag: String },

    #[error("Tag pack '{pack}': tag '{tag}' is not served by the {driver} driver")]
    UnsupportedTag {
        pack: String,
        tag: String,
        driver: String,
    },

    #[error("Tag pack '{pack}': '{tag}' addresses a subkey of a reading that is not a map")]
    NotAMap { pack: String, tag: String },

    #[error("Invalid configuration: {message}")]
    Config { message: String },

    // ── Ledger errors ────────────────────────────────────────────────
    #[error("Ledger file {path}: {source}")]
    LedgerIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Ledger file {path} is malformed: {source}")]
    LedgerFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    // ── Runtime errors ───────────────────────────────────────────────
    #[error(transparent)]
    Driver(#[from] cncbridge_driver::Error),

    #[error("Record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    /// `true` for errors raised while validating configuration.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::NoDevices
                | Self::DuplicateName { .. }
                | Self::DuplicateAddress { .. }
                | Self::UnknownTagPack { .. }
                | Self::UnknownTag { .. }
                | Self::UnsupportedTag { .. }
                | Self::NotAMap { .. }
                | Self::Config { .. }
        )
    }

    pub fn is_ledger(&self) -> bool {
        matches!(self, Self::LedgerIo { .. } | Self::LedgerFormat { .. })
    }
}
