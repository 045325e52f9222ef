// ── Handle lifecycle ──
//
// Per-session handle slot, the process-wide registry of held handles, and
// the on-disk ledger of handles a previous run failed to release.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cncbridge_driver::{BlockingCall, Driver, Handle, ReleaseOutcome, Status, StatusPolicy, Waited};
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Timing;
use crate::error::CoreError;

// ── HandleSlot ───────────────────────────────────────────────────────

/// The single handle a session may hold.
///
/// A session can never have an active and a stacked handle at once: the
/// slot holds at most one, tagged with its role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HandleSlot {
    #[default]
    Empty,
    /// In use for reads.
    Active(Handle),
    /// Awaiting release before any new acquire.
    Stacked(Handle),
}

impl HandleSlot {
    pub fn handle(self) -> Option<Handle> {
        match self {
            Self::Empty => None,
            Self::Active(h) | Self::Stacked(h) => Some(h),
        }
    }

    pub fn is_empty(self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn stacked(self) -> Option<Handle> {
        match self {
            Self::Stacked(h) => Some(h),
            _ => None,
        }
    }

    /// Demote an active handle to pending release.
    #[must_use]
    pub fn stack(self) -> Self {
        match self {
            Self::Active(h) => Self::Stacked(h),
            other => other,
        }
    }
}

// ── HeldHandles ──────────────────────────────────────────────────────

/// Handles currently held by each device session, keyed by device name.
///
/// Sessions keep their own entry current; shutdown reads whatever is left
/// for sessions that did not finish in time.
#[derive(Debug, Default)]
pub struct HeldHandles {
    by_device: DashMap<String, Handle>,
}

impl HeldHandles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, device: &str, slot: HandleSlot) {
        match slot.handle() {
            Some(h) => {
                self.by_device.insert(device.to_owned(), h);
            }
            None => {
                self.by_device.remove(device);
            }
        }
    }

    pub fn take(&self, device: &str) -> Option<Handle> {
        self.by_device.remove(device).map(|(_, h)| h)
    }

    pub fn len(&self) -> usize {
        self.by_device.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_device.is_empty()
    }
}

// ── HandleLedger ─────────────────────────────────────────────────────

/// Result of draining the ledger at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// No ledger file existed.
    Absent,
    /// Every listed handle was released and the file removed.
    Drained { released: usize },
    /// Cancelled before every handle was cleared; the file is kept.
    Interrupted { remaining: usize },
}

/// JSON array of raw handle ids that a previous run failed to release.
#[derive(Debug, Clone)]
pub struct HandleLedger {
    path: PathBuf,
}

impl HandleLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Handles listed in the ledger. A missing file is an empty ledger.
    pub async fn load(&self) -> Result<Option<Vec<Handle>>, CoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CoreError::LedgerIo {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| CoreError::LedgerFormat {
                path: self.path.clone(),
                source,
            })
    }

    /// Replace the ledger with `handles`. Nothing is written for an empty
    /// list, so a clean shutdown leaves no file behind.
    pub async fn persist(&self, handles: &[Handle]) -> Result<(), CoreError> {
        if handles.is_empty() {
            return Ok(());
        }
        let json = serde_json::to_vec(handles)?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|source| CoreError::LedgerIo {
                path: self.path.clone(),
                source,
            })?;
        warn!(path = %self.path.display(), count = handles.len(), "unreleased handles written to ledger");
        Ok(())
    }

    /// Release every ledgered handle, retrying each one every
    /// `recovery_interval` until it is released or reported already gone,
    /// then delete the file. Only cancellation stops the retries.
    pub async fn drain(
        &self,
        driver: &Arc<dyn Driver>,
        policy: &StatusPolicy,
        timing: &Timing,
        cancel: &CancellationToken,
    ) -> Result<DrainOutcome, CoreError> {
        let Some(handles) = self.load().await? else {
            debug!(path = %self.path.display(), "no handle ledger");
            return Ok(DrainOutcome::Absent);
        };

        for (index, &handle) in handles.iter().enumerate() {
            let mut attempt: u32 = 0;
            // A release that outlived its timeout is waited on again instead
            // of being overlapped by a second release of the same handle.
            let mut pending: Option<BlockingCall<Result<(), Status>>> = None;
            loop {
                attempt += 1;
                let call = pending.take().unwrap_or_else(|| {
                    BlockingCall::spawn(driver, "release", move |d| d.release(handle))
                });
                match call.wait(timing.release_timeout).await {
                    Waited::Done(result) => match result.map(|r| policy.release_outcome(r)) {
                        Ok(ReleaseOutcome::Failed(status)) => {
                            warn!(%handle, %status, attempt, "ledgered handle still held");
                        }
                        Ok(outcome) => {
                            debug!(%handle, ?outcome, attempt, "ledgered handle released");
                            break;
                        }
                        Err(e) => {
                            warn!(%handle, error = %e, attempt, "ledgered handle release failed");
                        }
                    },
                    Waited::TimedOut { error, call } => {
                        warn!(%handle, %error, attempt, "ledgered handle release still running");
                        pending = Some(call);
                    }
                }

                tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        return Ok(DrainOutcome::Interrupted {
                            remaining: handles.len() - index,
                        });
                    }
                    () = tokio::time::sleep(timing.recovery_interval) => {}
                }
            }
        }

        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(source) => {
                return Err(CoreError::LedgerIo {
                    path: self.path.clone(),
                    source,
                });
            }
        }
        info!(released = handles.len(), "handle ledger drained");
        Ok(DrainOutcome::Drained {
            released: handles.len(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn h(raw: u16) -> Handle {
        Handle::new(raw).unwrap()
    }

    #[test]
    fn slot_holds_one_handle_in_one_role() {
        let slot = HandleSlot::Active(h(5));
        assert_eq!(slot.handle(), Some(h(5)));
        assert_eq!(slot.stacked(), None);

        let stacked = slot.stack();
        assert_eq!(stacked, HandleSlot::Stacked(h(5)));
        assert_eq!(stacked.stacked(), Some(h(5)));
        assert_eq!(HandleSlot::Empty.stack(), HandleSlot::Empty);
    }

    #[test]
    fn registry_tracks_slot_changes() {
        let held = HeldHandles::new();
        held.record("M1", HandleSlot::Active(h(3)));
        held.record("M1", HandleSlot::Stacked(h(3)));
        assert_eq!(held.len(), 1);

        held.record("M1", HandleSlot::Empty);
        assert!(held.is_empty());

        held.record("M2", HandleSlot::Stacked(h(4)));
        assert_eq!(held.take("M2"), Some(h(4)));
        assert_eq!(held.take("M2"), None);
    }

    #[tokio::test]
    async fn persist_then_load_round_trips_as_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = HandleLedger::new(dir.path().join("non_free_handles.json"));

        assert_eq!(ledger.load().await.unwrap(), None);
        ledger.persist(&[]).await.unwrap();
        assert!(!ledger.path().exists(), "empty list writes nothing");

        ledger.persist(&[h(77)]).await.unwrap();
        assert_eq!(std::fs::read_to_string(ledger.path()).unwrap(), "[77]");
        assert_eq!(ledger.load().await.unwrap(), Some(vec![h(77)]));
    }

    #[tokio::test]
    async fn malformed_ledger_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("non_free_handles.json");
        std::fs::write(&path, "not json").unwrap();

        let err = HandleLedger::new(&path).load().await.unwrap_err();
        assert!(err.is_ledger());
    }
}
