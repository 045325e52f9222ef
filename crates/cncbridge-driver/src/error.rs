use thiserror::Error;

use crate::reading::ReadingId;
use crate::status::Status;

/// Top-level error type for the `cncbridge-driver` crate.
///
/// Vendor status codes travel as plain [`Status`] values on the hot path;
/// this type is for the places where a call has to be reported as failed
/// (deadlines, blocking-pool failures, unknown identifiers).
#[derive(Debug, Error)]
pub enum Error {
    /// The vendor library returned a non-zero status.
    #[error("{operation} failed with status {status}")]
    Status {
        operation: &'static str,
        status: Status,
    },

    /// The call did not return within its deadline. The blocking thread
    /// may still be running.
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    /// The blocking task panicked or was aborted.
    #[error("{operation} task failed: {reason}")]
    Join {
        operation: &'static str,
        reason: String,
    },

    /// Identifier is not part of the reading catalogue.
    #[error("unknown reading identifier '{name}'")]
    UnknownReading { name: String },

    /// Identifier exists but the active driver cannot serve it.
    #[error("reading '{reading}' is not supported by the {driver} driver")]
    Unsupported { reading: ReadingId, driver: String },
}

impl Error {
    /// The vendor status carried by this error, if any.
    pub fn status(&self) -> Option<Status> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
