//! `cncbridge relay`: consume records from stdin into an address space.

use cncbridge_core::{AddressSpace, relay};
use tokio::io::BufReader;
use tracing::info;

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub async fn handle(global: &GlobalOpts) -> Result<(), CliError> {
    let path = global.config_path();
    let (_, bridge_config) = cncbridge_config::load_bridge_config(&path)?;

    let space = AddressSpace::new();
    for device in &bridge_config.devices {
        space.register_device(device, bridge_config.pack_for(device)?);
    }

    let cancel = tokio_util::sync::CancellationToken::new();
    let signals = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            super::shutdown_signal().await;
            cancel.cancel();
        })
    };

    let stats = relay(
        &space,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        &cancel,
    )
    .await?;
    signals.abort();

    info!(
        applied = stats.applied,
        sentinels = stats.sentinels,
        rejected = stats.rejected,
        "relay finished"
    );
    Ok(())
}
