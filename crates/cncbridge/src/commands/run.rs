//! `cncbridge run`: poll every device until a shutdown signal.

use std::sync::Arc;

use cncbridge_core::Bridge;
use cncbridge_driver::{SimDriver, TcpProbe};
use tracing::{info, warn};

use crate::cli::{GlobalOpts, RunArgs};
use crate::error::CliError;

pub async fn handle(args: &RunArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let path = global.config_path();
    let (config, bridge_config) = cncbridge_config::load_bridge_config(&path)?;
    let ledger_path = bridge_config.ledger_path.display().to_string();

    let bridge = Bridge::new(bridge_config, Arc::new(SimDriver::new()), Arc::new(TcpProbe))?;
    info!(
        config = %path.display(),
        devices = bridge.plans().len(),
        "configuration loaded"
    );

    let cancel = bridge.cancellation();
    let signals = tokio::spawn(async move {
        super::shutdown_signal().await;
        cancel.cancel();
    });

    if config.output.stdout && !args.quiet {
        bridge.start(tokio::io::stdout()).await;
    } else {
        bridge.start(tokio::io::sink()).await;
    }

    bridge.cancellation().cancelled().await;
    let report = bridge.shutdown().await;
    signals.abort();

    if !report.abandoned.is_empty() {
        warn!(devices = ?report.abandoned, "sessions abandoned at shutdown");
    }
    if !report.unreleased.is_empty() && !report.ledgered {
        return Err(CliError::Ledger {
            count: report.unreleased.len(),
            path: ledger_path,
        });
    }
    Ok(())
}
