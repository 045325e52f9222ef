// ── Vendor status codes ──
//
// Every library call reports an `i16` status. Zero is success, negative
// values are link/library level failures, positive values are
// function-level rejections from the controller.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Raw status code returned by the vendor library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Status(pub i16);

impl Status {
    pub const PROTOCOL: Self = Self(-17);
    pub const SOCKET: Self = Self(-16);
    pub const NODLL: Self = Self(-15);
    pub const BUS: Self = Self(-11);
    pub const SYSTEM2: Self = Self(-10);
    pub const HSSB: Self = Self(-9);
    pub const HANDLE: Self = Self(-8);
    pub const VERSION: Self = Self(-7);
    pub const UNEXP: Self = Self(-6);
    pub const SYSTEM: Self = Self(-5);
    pub const PARITY: Self = Self(-4);
    pub const MMCSYS: Self = Self(-3);
    pub const RESET: Self = Self(-2);
    pub const BUSY: Self = Self(-1);
    pub const OK: Self = Self(0);
    pub const FUNC: Self = Self(1);
    pub const LENGTH: Self = Self(2);
    pub const NUMBER: Self = Self(3);
    pub const ATTRIB: Self = Self(4);
    pub const DATA: Self = Self(5);
    pub const NOOPT: Self = Self(6);
    pub const PROT: Self = Self(7);
    pub const OVRFLOW: Self = Self(8);
    pub const PARAM: Self = Self(9);
    pub const BUFFER: Self = Self(10);
    pub const PATH: Self = Self(11);
    pub const MODE: Self = Self(12);
    pub const REJECT: Self = Self(13);
    pub const DTSRVR: Self = Self(14);
    pub const ALARM: Self = Self(15);
    pub const STOP: Self = Self(16);
    pub const PASSWD: Self = Self(17);

    pub const fn code(self) -> i16 {
        self.0
    }

    pub const fn is_ok(self) -> bool {
        self.0 == 0
    }

    /// Vendor mnemonic for the code, `"EW_UNKNOWN"` for anything unlisted.
    pub const fn label(self) -> &'static str {
        match self.0 {
            -17 => "EW_PROTOCOL",
            -16 => "EW_SOCKET",
            -15 => "EW_NODLL",
            -11 => "EW_BUS",
            -10 => "EW_SYSTEM2",
            -9 => "EW_HSSB",
            -8 => "EW_HANDLE",
            -7 => "EW_VERSION",
            -6 => "EW_UNEXP",
            -5 => "EW_SYSTEM",
            -4 => "EW_PARITY",
            -3 => "EW_MMCSYS",
            -2 => "EW_RESET",
            -1 => "EW_BUSY",
            0 => "EW_OK",
            1 => "EW_FUNC",
            2 => "EW_LENGTH",
            3 => "EW_NUMBER",
            4 => "EW_ATTRIB",
            5 => "EW_DATA",
            6 => "EW_NOOPT",
            7 => "EW_PROT",
            8 => "EW_OVRFLOW",
            9 => "EW_PARAM",
            10 => "EW_BUFFER",
            11 => "EW_PATH",
            12 => "EW_MODE",
            13 => "EW_REJECT",
            14 => "EW_DTSRVR",
            15 => "EW_ALARM",
            16 => "EW_STOP",
            17 => "EW_PASSWD",
            _ => "EW_UNKNOWN",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0, self.label())
    }
}

// ── Classification ───────────────────────────────────────────────────

/// How a read status affects the rest of the poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Ok,
    /// Skip this reading, keep dispatching.
    Transient,
    /// The handle or link is gone; abort the cycle.
    Fatal,
}

/// Result of a release attempt after classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released,
    /// The library reports the handle as already gone. Treated as success.
    AlreadyReleased(Status),
    Failed(Status),
}

impl ReleaseOutcome {
    pub const fn is_cleared(self) -> bool {
        !matches!(self, Self::Failed(_))
    }
}

/// Which codes are benign on release and which are fatal on read.
///
/// The same code may sit in both sets: `EW_HANDLE` on release means the
/// handle is already freed, while on a read it means the handle is no
/// longer usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusPolicy {
    benign_release: Vec<Status>,
    fatal: Vec<Status>,
}

impl StatusPolicy {
    pub fn new(benign_release: Vec<Status>, fatal: Vec<Status>) -> Self {
        Self {
            benign_release,
            fatal,
        }
    }

    pub fn benign_release(&self) -> &[Status] {
        &self.benign_release
    }

    pub fn fatal(&self) -> &[Status] {
        &self.fatal
    }

    pub fn classify(&self, status: Status) -> StatusClass {
        if status.is_ok() {
            StatusClass::Ok
        } else if self.fatal.contains(&status) {
            StatusClass::Fatal
        } else {
            StatusClass::Transient
        }
    }

    pub fn release_outcome(&self, result: Result<(), Status>) -> ReleaseOutcome {
        match result {
            Ok(()) => ReleaseOutcome::Released,
            Err(status) if status.is_ok() => ReleaseOutcome::Released,
            Err(status) if self.benign_release.contains(&status) => {
                ReleaseOutcome::AlreadyReleased(status)
            }
            Err(status) => ReleaseOutcome::Failed(status),
        }
    }
}

impl Default for StatusPolicy {
    fn default() -> Self {
        Self {
            benign_release: vec![Status::HANDLE],
            fatal: vec![
                Status::HANDLE,
                Status::HSSB,
                Status::BUS,
                Status::NODLL,
                Status::SOCKET,
                Status::PROTOCOL,
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_mnemonic() {
        assert_eq!(Status::SOCKET.to_string(), "-16 (EW_SOCKET)");
        assert_eq!(Status(-99).to_string(), "-99 (EW_UNKNOWN)");
    }

    #[test]
    fn default_policy_classifies_link_loss_as_fatal() {
        let policy = StatusPolicy::default();
        assert_eq!(policy.classify(Status::OK), StatusClass::Ok);
        assert_eq!(policy.classify(Status::SOCKET), StatusClass::Fatal);
        assert_eq!(policy.classify(Status::HANDLE), StatusClass::Fatal);
        assert_eq!(policy.classify(Status::NOOPT), StatusClass::Transient);
        assert_eq!(policy.classify(Status::BUSY), StatusClass::Transient);
    }

    #[test]
    fn already_released_is_success_equivalent() {
        let policy = StatusPolicy::default();
        assert_eq!(policy.release_outcome(Ok(())), ReleaseOutcome::Released);

        let outcome = policy.release_outcome(Err(Status::HANDLE));
        assert_eq!(outcome, ReleaseOutcome::AlreadyReleased(Status::HANDLE));
        assert!(outcome.is_cleared());

        let outcome = policy.release_outcome(Err(Status::SOCKET));
        assert_eq!(outcome, ReleaseOutcome::Failed(Status::SOCKET));
        assert!(!outcome.is_cleared());
    }

    #[test]
    fn custom_policy_overrides_sets() {
        let policy = StatusPolicy::new(vec![Status::SOCKET], vec![Status::BUSY]);
        assert_eq!(policy.classify(Status::SOCKET), StatusClass::Transient);
        assert_eq!(policy.classify(Status::BUSY), StatusClass::Fatal);
        assert!(policy.release_outcome(Err(Status::SOCKET)).is_cleared());
        assert!(!policy.release_outcome(Err(Status::HANDLE)).is_cleared());
    }
}
