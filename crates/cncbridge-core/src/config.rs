// ── Runtime bridge configuration ──
//
// These types describe *what* to poll and *how patiently*. They never touch
// disk: `cncbridge-config` builds a `BridgeConfig` from files and the
// environment and hands it in.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use cncbridge_driver::{Driver, StatusPolicy};
use indexmap::IndexMap;

use crate::dispatch::ReadPlan;
use crate::error::CoreError;
use crate::model::{Device, TagPack};

/// Default ledger file name, next to the configuration file.
pub const DEFAULT_LEDGER_FILE: &str = "non_free_handles.json";

/// Deadlines, backoffs and retry limits for every session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timing {
    /// Bound on one TCP liveness probe.
    pub probe_timeout: Duration,
    /// Passed to the driver's acquire and used as the call deadline.
    pub acquire_timeout: Duration,
    pub release_timeout: Duration,
    /// Bound on one complete read cycle.
    pub read_timeout: Duration,
    /// Wait between release retries, for stacked and ledgered handles.
    pub recovery_interval: Duration,
    /// Release attempts on a stacked handle before falling back to Disconnected.
    pub max_connect: u32,
    /// Acquire attempts per Connecting visit.
    pub max_get_handle: u32,
    /// Consecutive failed Active iterations before the session resets.
    pub max_reconnect: u32,
    /// Overall bound on joining device tasks at shutdown.
    pub shutdown_timeout: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(10),
            acquire_timeout: Duration::from_secs(10),
            release_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            recovery_interval: Duration::from_secs(10),
            max_connect: 5,
            max_get_handle: 5,
            max_reconnect: 5,
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

/// Everything the [`Bridge`](crate::Bridge) needs to run.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub devices: Vec<Device>,
    pub tag_packs: IndexMap<String, TagPack>,
    pub timing: Timing,
    pub policy: StatusPolicy,
    pub ledger_path: PathBuf,
}

impl BridgeConfig {
    pub fn new(devices: Vec<Device>, tag_packs: IndexMap<String, TagPack>) -> Self {
        Self {
            devices,
            tag_packs,
            timing: Timing::default(),
            policy: StatusPolicy::default(),
            ledger_path: PathBuf::from(DEFAULT_LEDGER_FILE),
        }
    }

    /// The tag pack a device refers to.
    pub fn pack_for(&self, device: &Device) -> Result<&TagPack, CoreError> {
        self.tag_packs
            .get(&device.tags_pack_name)
            .ok_or_else(|| CoreError::UnknownTagPack {
                device: device.name.clone(),
                pack: device.tags_pack_name.clone(),
            })
    }

    /// Structural checks that need no driver: device list, uniqueness,
    /// pack references and retry limits.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.devices.is_empty() {
            return Err(CoreError::NoDevices);
        }

        let limits = [
            ("max_connect", self.timing.max_connect),
            ("max_get_handle", self.timing.max_get_handle),
            ("max_reconnect", self.timing.max_reconnect),
        ];
        if let Some((name, _)) = limits.iter().find(|(_, v)| *v == 0) {
            return Err(CoreError::Config {
                message: format!("timing.{name} must be at least 1"),
            });
        }

        let mut names: HashSet<&str> = HashSet::new();
        let mut addresses: HashMap<&str, &str> = HashMap::new();
        for device in &self.devices {
            if !names.insert(device.name.as_str()) {
                return Err(CoreError::DuplicateName {
                    name: device.name.clone(),
                });
            }
            if let Some(first) = addresses.insert(device.address.as_str(), device.name.as_str()) {
                return Err(CoreError::DuplicateAddress {
                    address: device.address.clone(),
                    first: first.to_owned(),
                    second: device.name.clone(),
                });
            }
            self.pack_for(device)?;
        }
        Ok(())
    }

    /// Validate and resolve every device's pack against `driver`.
    pub fn resolve(&self, driver: &dyn Driver) -> Result<Vec<(Device, ReadPlan)>, CoreError> {
        self.validate()?;
        self.devices
            .iter()
            .map(|device| {
                let pack = self.pack_for(device)?;
                let plan = ReadPlan::resolve(&device.tags_pack_name, pack, driver)?;
                Ok((device.clone(), plan))
            })
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cncbridge_driver::SimDriver;

    use super::*;
    use crate::model::DeclaredType;

    fn device(name: &str, address: &str) -> Device {
        Device {
            name: name.into(),
            address: address.into(),
            port: 8193,
            delay_ms: 100,
            tags_pack_name: "basic".into(),
        }
    }

    fn config(devices: Vec<Device>) -> BridgeConfig {
        let mut pack = TagPack::new();
        pack.insert("aut".into(), DeclaredType::Int16);
        let mut packs = IndexMap::new();
        packs.insert("basic".into(), pack);
        BridgeConfig::new(devices, packs)
    }

    #[test]
    fn accepts_distinct_devices() {
        let cfg = config(vec![device("M1", "10.0.0.5"), device("M2", "10.0.0.6")]);
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.resolve(&SimDriver::new()).unwrap().len(), 2);
    }

    #[test]
    fn rejects_empty_and_duplicates() {
        assert!(matches!(config(vec![]).validate(), Err(CoreError::NoDevices)));

        let dup_name = config(vec![device("M1", "10.0.0.5"), device("M1", "10.0.0.6")]);
        assert!(matches!(
            dup_name.validate(),
            Err(CoreError::DuplicateName { .. })
        ));

        let dup_addr = config(vec![device("M1", "10.0.0.5"), device("M2", "10.0.0.5")]);
        let err = dup_addr.validate().unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("'M1' and 'M2'"));
    }

    #[test]
    fn rejects_unknown_pack_and_zero_limits() {
        let mut d = device("M1", "10.0.0.5");
        d.tags_pack_name = "missing".into();
        assert!(matches!(
            config(vec![d]).validate(),
            Err(CoreError::UnknownTagPack { .. })
        ));

        let mut cfg = config(vec![device("M1", "10.0.0.5")]);
        cfg.timing.max_reconnect = 0;
        assert!(cfg.validate().unwrap_err().to_string().contains("max_reconnect"));
    }
}
