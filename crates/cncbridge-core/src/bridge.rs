// ── Bridge facade ──
//
// Owns the lifecycle of every device session, the record sink and the
// handle ledger. Cloning a `Bridge` is cheap; all clones share one set of
// tasks and one cancellation token.

use std::sync::Arc;

use cncbridge_driver::{Driver, Handle, LivenessProbe};
use tokio::io::AsyncWrite;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::dispatch::ReadPlan;
use crate::error::CoreError;
use crate::handles::{DrainOutcome, HandleLedger, HeldHandles};
use crate::model::Device;
use crate::session::{Session, SessionContext};
use crate::sink::sink_task;
use crate::space::AddressSpace;

const RECORD_CHANNEL_SIZE: usize = 256;

/// What [`Bridge::shutdown`] left behind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Handles that could not be released, in device order.
    pub unreleased: Vec<Handle>,
    /// Devices whose session did not stop before the deadline.
    pub abandoned: Vec<String>,
    /// Whether `unreleased` was written to the ledger.
    pub ledgered: bool,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.unreleased.is_empty() && self.abandoned.is_empty()
    }
}

/// Polling engine facade.
///
/// [`new()`](Self::new) validates configuration, resolves every tag pack and
/// registers each device in the address space. Nothing runs until
/// [`start()`](Self::start).
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<BridgeInner>,
}

struct BridgeInner {
    config: BridgeConfig,
    driver: Arc<dyn Driver>,
    probe: Arc<dyn LivenessProbe>,
    plans: Vec<(Device, ReadPlan)>,
    space: Arc<AddressSpace>,
    held: Arc<HeldHandles>,
    ledger: HandleLedger,
    cancel: CancellationToken,
    sessions: Mutex<Vec<(String, JoinHandle<Option<Handle>>)>>,
    sink: Mutex<Option<JoinHandle<()>>>,
}

impl Bridge {
    pub fn new(
        config: BridgeConfig,
        driver: Arc<dyn Driver>,
        probe: Arc<dyn LivenessProbe>,
    ) -> Result<Self, CoreError> {
        let plans = config.resolve(driver.as_ref())?;
        let space = Arc::new(AddressSpace::new());
        for (device, _) in &plans {
            space.register_device(device, config.pack_for(device)?);
        }
        let ledger = HandleLedger::new(config.ledger_path.clone());

        Ok(Self {
            inner: Arc::new(BridgeInner {
                config,
                driver,
                probe,
                plans,
                space,
                held: Arc::new(HeldHandles::new()),
                ledger,
                cancel: CancellationToken::new(),
                sessions: Mutex::new(Vec::new()),
                sink: Mutex::new(None),
            }),
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    pub fn space(&self) -> &Arc<AddressSpace> {
        &self.inner.space
    }

    pub fn held(&self) -> &Arc<HeldHandles> {
        &self.inner.held
    }

    pub fn ledger(&self) -> &HandleLedger {
        &self.inner.ledger
    }

    /// Resolved read plans, one per device, in configuration order.
    pub fn plans(&self) -> &[(Device, ReadPlan)] {
        &self.inner.plans
    }

    /// Root token; cancelling it has the same effect as starting a
    /// [`shutdown()`](Self::shutdown) without the join.
    pub fn cancellation(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Release handles leaked by a previous run.
    pub async fn drain_ledger(&self) -> Result<DrainOutcome, CoreError> {
        self.inner
            .ledger
            .drain(
                &self.inner.driver,
                &self.inner.config.policy,
                &self.inner.config.timing,
                &self.inner.cancel,
            )
            .await
    }

    /// Drain the ledger, then spawn the record sink and one session per
    /// device. Ledger failures are logged and do not prevent startup.
    /// Calling `start` twice is a no-op.
    pub async fn start<W>(&self, out: W)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let mut sessions = self.inner.sessions.lock().await;
        if !sessions.is_empty() {
            debug!("bridge already started");
            return;
        }

        match self.drain_ledger().await {
            Ok(DrainOutcome::Interrupted { remaining }) => {
                info!(remaining, "ledger drain interrupted");
                return;
            }
            Ok(outcome) => debug!(?outcome, "ledger checked"),
            Err(e) => warn!(error = %e, "ledger drain failed (non-fatal)"),
        }
        if self.inner.cancel.is_cancelled() {
            return;
        }

        let (records, rx) = mpsc::channel(RECORD_CHANNEL_SIZE);
        *self.inner.sink.lock().await = Some(tokio::spawn(sink_task(rx, out)));

        let ctx = Arc::new(SessionContext {
            driver: Arc::clone(&self.inner.driver),
            probe: Arc::clone(&self.inner.probe),
            timing: self.inner.config.timing.clone(),
            policy: self.inner.config.policy.clone(),
            space: Arc::clone(&self.inner.space),
            held: Arc::clone(&self.inner.held),
            records,
        });

        for (device, plan) in &self.inner.plans {
            let session = Session::new(device.clone(), plan.clone(), Arc::clone(&ctx));
            let cancel = self.inner.cancel.child_token();
            sessions.push((device.name.clone(), tokio::spawn(session.run(cancel))));
        }
        info!(devices = sessions.len(), "bridge started");
    }

    /// Cancel every session, wait up to the shutdown timeout for them to
    /// release their handles, then ledger whatever is still held.
    pub async fn shutdown(&self) -> ShutdownReport {
        self.inner.cancel.cancel();
        let deadline = tokio::time::Instant::now() + self.inner.config.timing.shutdown_timeout;

        let mut report = ShutdownReport::default();
        let mut sessions = self.inner.sessions.lock().await;
        for (device, mut task) in sessions.drain(..) {
            match tokio::time::timeout_at(deadline, &mut task).await {
                Ok(Ok(Some(handle))) => report.unreleased.push(handle),
                Ok(Ok(None)) => {}
                Ok(Err(e)) => {
                    warn!(device = %device, error = %e, "session task failed");
                    report.unreleased.extend(self.inner.held.take(&device));
                }
                Err(_) => {
                    task.abort();
                    warn!(device = %device, "session did not stop in time");
                    report.unreleased.extend(self.inner.held.take(&device));
                    report.abandoned.push(device);
                }
            }
        }
        drop(sessions);

        if !report.unreleased.is_empty() {
            match self.inner.ledger.persist(&report.unreleased).await {
                Ok(()) => report.ledgered = true,
                Err(e) => warn!(error = %e, "could not write handle ledger"),
            }
        }

        // Sessions held the only senders; the sink finishes once they are gone.
        if let Some(mut sink) = self.inner.sink.lock().await.take() {
            if tokio::time::timeout_at(deadline, &mut sink).await.is_err() {
                sink.abort();
                warn!("record sink did not drain in time");
            }
        }

        info!(
            unreleased = report.unreleased.len(),
            abandoned = report.abandoned.len(),
            "bridge stopped"
        );
        report
    }
}
