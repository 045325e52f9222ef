// ── Device session state machine ──
//
// One session per device, owned by one task. The session alone touches its
// handle slot and reconnect counter; the only shared state it writes is its
// own entry in `HeldHandles`, its own subtree of the address space, and the
// record channel.

use std::sync::Arc;
use std::time::Duration;

use cncbridge_driver::{
    BlockingCall, Driver, Error, Handle, LivenessProbe, ReleaseOutcome, Status, StatusPolicy,
    Waited,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Timing;
use crate::dispatch::{CycleOutcome, CycleVerdict, ReadPlan, read_cycle};
use crate::handles::{HandleSlot, HeldHandles};
use crate::model::{Device, OutputRecord};
use crate::space::AddressSpace;

/// Collaborators shared by every session.
pub struct SessionContext {
    pub driver: Arc<dyn Driver>,
    pub probe: Arc<dyn LivenessProbe>,
    pub timing: Timing,
    pub policy: StatusPolicy,
    pub space: Arc<AddressSpace>,
    pub held: Arc<HeldHandles>,
    pub records: mpsc::Sender<OutputRecord>,
}

/// Where a session is in its connect/poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Emitting the power-off sentinel and probing until the device answers.
    Disconnected,
    /// Releasing a stacked handle before any new acquire.
    RecoveringStaleHandle { attempt: u32 },
    /// Requesting a fresh handle.
    Connecting,
    /// Polling with a live handle.
    Active,
}

/// A driver call that outlived its timeout. It is collected before the
/// session issues any other driver call, so calls for one device never
/// overlap.
#[derive(Debug)]
enum PendingCall {
    Acquire(BlockingCall<Result<Handle, Status>>),
    Release(Handle, BlockingCall<Result<(), Status>>),
    Read(BlockingCall<CycleOutcome>),
}

/// What a pending call returned once it finally did.
enum Settled {
    Acquire(Result<Result<Handle, Status>, Error>),
    Release(Handle, Result<Result<(), Status>, Error>),
    Read(Result<CycleOutcome, Error>),
}

impl PendingCall {
    /// Cancel-safe; see [`BlockingCall::join`].
    async fn join(&mut self) -> Settled {
        match self {
            Self::Acquire(call) => Settled::Acquire(call.join().await),
            Self::Release(handle, call) => Settled::Release(*handle, call.join().await),
            Self::Read(call) => Settled::Read(call.join().await),
        }
    }
}

pub struct Session {
    device: Arc<Device>,
    plan: Arc<ReadPlan>,
    ctx: Arc<SessionContext>,
    state: SessionState,
    slot: HandleSlot,
    reconnect_counter: u32,
    pending: Option<PendingCall>,
}

impl Session {
    pub fn new(device: Device, plan: ReadPlan, ctx: Arc<SessionContext>) -> Self {
        Self {
            device: Arc::new(device),
            plan: Arc::new(plan),
            ctx,
            state: SessionState::Disconnected,
            slot: HandleSlot::Empty,
            reconnect_counter: 0,
            pending: None,
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn slot(&self) -> HandleSlot {
        self.slot
    }

    pub fn reconnect_counter(&self) -> u32 {
        self.reconnect_counter
    }

    /// Whether a timed-out driver call is still outstanding.
    pub fn has_pending_call(&self) -> bool {
        self.pending.is_some()
    }

    /// Drive the session until `cancel` fires, then release whatever handle
    /// is still held. Returns the handle if that final release failed, so
    /// the caller can ledger it.
    pub async fn run(mut self, cancel: CancellationToken) -> Option<Handle> {
        info!(device = %self.device.name, endpoint = %self.device.endpoint(), "session started");
        while !cancel.is_cancelled() {
            self.step(&cancel).await;
        }
        self.teardown().await
    }

    /// Execute the current state once and move to the next one.
    pub async fn step(&mut self, cancel: &CancellationToken) {
        let next = match self.state {
            SessionState::Disconnected => self.disconnected(cancel).await,
            SessionState::RecoveringStaleHandle { attempt } => {
                self.recovering(attempt, cancel).await
            }
            SessionState::Connecting => self.connecting(cancel).await,
            SessionState::Active => self.active(cancel).await,
        };
        if next != self.state {
            debug!(device = %self.device.name, from = ?self.state, to = ?next, "session transition");
        }
        self.state = next;
    }

    /// Wait for any outstanding driver call, then release the held handle,
    /// bounded by the release timeout. A handle granted late by that call is
    /// released here too.
    pub async fn teardown(mut self) -> Option<Handle> {
        if let Some(mut pending) = self.pending.take() {
            debug!(device = %self.device.name, ?pending, "waiting for outstanding driver call");
            let settled = pending.join().await;
            self.absorb(settled);
        }

        let mut unreleased = None;
        if let Some(handle) = self.slot.handle() {
            if !self.release(handle).await {
                unreleased = Some(handle);
            }
        }
        self.slot = HandleSlot::Empty;
        self.ctx.held.take(&self.device.name);
        info!(device = %self.device.name, unreleased = ?unreleased, "session stopped");
        unreleased
    }

    // ── States ───────────────────────────────────────────────────────

    async fn disconnected(&mut self, cancel: &CancellationToken) -> SessionState {
        self.publish(OutputRecord::power_off(&self.device), cancel)
            .await;

        if self.probe(cancel).await {
            return if self.slot.stacked().is_some() {
                SessionState::RecoveringStaleHandle { attempt: 0 }
            } else {
                SessionState::Connecting
            };
        }

        debug!(device = %self.device.name, "device unreachable");
        self.pause(self.device.delay(), cancel).await;
        SessionState::Disconnected
    }

    async fn recovering(&mut self, attempt: u32, cancel: &CancellationToken) -> SessionState {
        if !self.settle(cancel).await {
            return SessionState::RecoveringStaleHandle { attempt };
        }
        let Some(handle) = self.slot.stacked() else {
            return SessionState::Connecting;
        };

        if !self.pause(self.ctx.timing.recovery_interval, cancel).await {
            return SessionState::RecoveringStaleHandle { attempt };
        }
        if self.release(handle).await {
            self.set_slot(HandleSlot::Empty);
            info!(device = %self.device.name, %handle, "stale handle released");
            return SessionState::Connecting;
        }

        let attempt = attempt + 1;
        if attempt >= self.ctx.timing.max_connect {
            warn!(device = %self.device.name, %handle, attempt, "stale handle still held, falling back");
            return SessionState::Disconnected;
        }
        if self.probe(cancel).await {
            SessionState::RecoveringStaleHandle { attempt }
        } else {
            SessionState::Disconnected
        }
    }

    async fn connecting(&mut self, cancel: &CancellationToken) -> SessionState {
        let ctx = Arc::clone(&self.ctx);
        let timing = &ctx.timing;
        let (address, port) = (self.device.address.clone(), self.device.port);

        for attempt in 1..=timing.max_get_handle {
            if !self.settle(cancel).await {
                return SessionState::Connecting;
            }
            if self.slot.stacked().is_some() {
                return SessionState::RecoveringStaleHandle { attempt: 0 };
            }
            if cancel.is_cancelled() {
                return SessionState::Connecting;
            }

            let (address, timeout) = (address.clone(), timing.acquire_timeout);
            let call = BlockingCall::spawn(&ctx.driver, "acquire", move |d| {
                d.acquire(&address, port, timeout)
            });

            match call.wait(timeout).await {
                Waited::Done(Ok(Ok(handle))) => {
                    self.set_slot(HandleSlot::Active(handle));
                    self.reconnect_counter = 0;
                    info!(device = %self.device.name, %handle, attempt, "handle acquired");
                    return SessionState::Active;
                }
                Waited::Done(Ok(Err(status))) => {
                    debug!(device = %self.device.name, %status, attempt, "acquire failed");
                }
                Waited::Done(Err(e)) => {
                    warn!(device = %self.device.name, error = %e, attempt, "acquire failed");
                }
                Waited::TimedOut { error, call } => {
                    warn!(device = %self.device.name, %error, attempt, "acquire still running");
                    self.pending = Some(PendingCall::Acquire(call));
                }
            }
        }

        warn!(device = %self.device.name, attempts = timing.max_get_handle, "no handle acquired");
        SessionState::Disconnected
    }

    async fn active(&mut self, cancel: &CancellationToken) -> SessionState {
        if !self.settle(cancel).await {
            return SessionState::Active;
        }
        let HandleSlot::Active(handle) = self.slot else {
            return SessionState::Connecting;
        };

        let failed = if self.probe(cancel).await {
            match self.read(handle).await {
                Ok(CycleOutcome { record, verdict }) => {
                    self.publish(record, cancel).await;
                    match verdict {
                        CycleVerdict::Clean => {
                            self.reconnect_counter = 0;
                            false
                        }
                        CycleVerdict::Degraded => false,
                        CycleVerdict::Fatal(status) => {
                            debug!(device = %self.device.name, %status, "session-fatal status");
                            true
                        }
                    }
                }
                Err(e) => {
                    warn!(device = %self.device.name, error = %e, "read cycle failed");
                    true
                }
            }
        } else {
            if cancel.is_cancelled() {
                return SessionState::Active;
            }
            debug!(device = %self.device.name, "liveness lost while active");
            true
        };

        if failed {
            self.reconnect_counter += 1;
            if self.reconnect_counter >= self.ctx.timing.max_reconnect {
                warn!(
                    device = %self.device.name,
                    failures = self.reconnect_counter,
                    "restarting session"
                );
                self.set_slot(self.slot.stack());
                self.reconnect_counter = 0;
                return SessionState::Disconnected;
            }
        }

        self.pause(self.device.delay(), cancel).await;
        SessionState::Active
    }

    // ── Helpers ──────────────────────────────────────────────────────

    fn set_slot(&mut self, slot: HandleSlot) {
        self.slot = slot;
        self.ctx.held.record(&self.device.name, slot);
    }

    async fn probe(&self, cancel: &CancellationToken) -> bool {
        self.ctx
            .probe
            .probe(
                &self.device.address,
                self.device.port,
                self.ctx.timing.probe_timeout,
                cancel,
            )
            .await
    }

    /// Wait for an outstanding driver call and fold its result into the
    /// slot. `false` if cancelled first; the call is then kept for teardown.
    async fn settle(&mut self, cancel: &CancellationToken) -> bool {
        let Some(mut pending) = self.pending.take() else {
            return true;
        };
        let settled = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            settled = pending.join() => Some(settled),
        };
        match settled {
            Some(settled) => {
                self.absorb(settled);
                true
            }
            None => {
                self.pending = Some(pending);
                false
            }
        }
    }

    fn absorb(&mut self, settled: Settled) {
        match settled {
            Settled::Acquire(Ok(Ok(handle))) => {
                // Acquires are only issued with an empty slot.
                warn!(device = %self.device.name, %handle, "late handle stacked for release");
                self.set_slot(HandleSlot::Stacked(handle));
            }
            Settled::Acquire(result) => {
                debug!(device = %self.device.name, ?result, "late acquire returned no handle");
            }
            Settled::Release(handle, result) => {
                let gone = result
                    .map(|r| self.ctx.policy.release_outcome(r))
                    .is_ok_and(ReleaseOutcome::is_cleared);
                if gone && self.slot.handle() == Some(handle) {
                    info!(device = %self.device.name, %handle, "late release succeeded");
                    self.set_slot(HandleSlot::Empty);
                }
            }
            Settled::Read(result) => {
                debug!(device = %self.device.name, ok = result.is_ok(), "late read cycle finished");
            }
        }
    }

    /// `true` if the handle is gone, either released or reported already
    /// freed. Callers settle any pending call first.
    async fn release(&mut self, handle: Handle) -> bool {
        let call = BlockingCall::spawn(&self.ctx.driver, "release", move |d| d.release(handle));
        let result = match call.wait(self.ctx.timing.release_timeout).await {
            Waited::Done(result) => result,
            Waited::TimedOut { error, call } => {
                self.pending = Some(PendingCall::Release(handle, call));
                Err(error)
            }
        };

        match result.map(|r| self.ctx.policy.release_outcome(r)) {
            Ok(ReleaseOutcome::Failed(status)) => {
                warn!(device = %self.device.name, %handle, %status, "release failed");
                false
            }
            Ok(outcome) => {
                debug!(device = %self.device.name, %handle, ?outcome, "handle released");
                true
            }
            Err(e) => {
                warn!(device = %self.device.name, %handle, error = %e, "release failed");
                false
            }
        }
    }

    /// One read cycle. Callers settle any pending call first.
    async fn read(&mut self, handle: Handle) -> Result<CycleOutcome, Error> {
        let plan = Arc::clone(&self.plan);
        let device = Arc::clone(&self.device);
        let ctx = Arc::clone(&self.ctx);
        let call = BlockingCall::spawn(&self.ctx.driver, "read_cycle", move |d| {
            read_cycle(&plan, d, handle, &device, &ctx.policy)
        });
        match call.wait(self.ctx.timing.read_timeout).await {
            Waited::Done(result) => result,
            Waited::TimedOut { error, call } => {
                self.pending = Some(PendingCall::Read(call));
                Err(error)
            }
        }
    }

    async fn publish(&self, record: OutputRecord, cancel: &CancellationToken) {
        self.ctx.space.apply(&record);
        tokio::select! {
            biased;
            () = cancel.cancelled() => {}
            result = self.ctx.records.send(record) => {
                if result.is_err() {
                    debug!(device = %self.device.name, "record sink closed");
                }
            }
        }
    }

    /// Sleep unless cancelled first. `false` means cancelled.
    async fn pause(&self, duration: Duration, cancel: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            () = cancel.cancelled() => false,
            () = tokio::time::sleep(duration) => true,
        }
    }
}
