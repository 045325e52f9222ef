//! `cncbridge check`: validate configuration and print what would be polled.

use std::fmt::Write as _;

use cncbridge_driver::SimDriver;

use crate::cli::{CheckArgs, GlobalOpts};
use crate::error::CliError;

pub fn handle(args: &CheckArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let path = global.config_path();
    let (config, bridge_config) = cncbridge_config::load_bridge_config(&path)?;
    let plans = bridge_config.resolve(&SimDriver::new())?;

    let mut out = String::new();
    let _ = writeln!(out, "config: {}", path.display());
    let _ = writeln!(out, "ledger: {}", bridge_config.ledger_path.display());
    let _ = writeln!(out, "devices: {}", plans.len());
    for (device, plan) in &plans {
        let readings: Vec<&str> = plan.readings().map(|id| id.as_str()).collect();
        let _ = writeln!(
            out,
            "  {}  {}  every {} ms  pack {}: {}{}",
            device.name,
            device.endpoint(),
            device.delay_ms,
            plan.pack(),
            readings.join(", "),
            if plan.wants_errors() { " (+errors)" } else { "" },
        );
    }
    let _ = writeln!(out, "tag packs: {}", bridge_config.tag_packs.len());
    for name in bridge_config.tag_packs.keys() {
        let tags = config.declared_tags(name).unwrap_or_default();
        let _ = writeln!(out, "  {name}: {} tag(s)", tags.len());
        for (tag, ty) in tags {
            let _ = writeln!(out, "    {tag} = {ty}");
        }
    }
    print!("{out}");

    if args.effective {
        println!();
        print!("{}", config.to_toml()?);
    }
    Ok(())
}
