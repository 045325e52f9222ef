use std::collections::BTreeMap;

use cncbridge_driver::Reading;
use serde::{Deserialize, Serialize};

use super::Device;

/// One line of the output stream: a device's readings for one cycle, or the
/// power-off sentinel when the device is unreachable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub name: String,
    pub address: String,
    pub port: u16,
    pub power_on: u8,
    /// Successfully read tags, plus the `errors` map when declared.
    #[serde(flatten)]
    pub tags: BTreeMap<String, Reading>,
}

impl OutputRecord {
    /// Sentinel for an unreachable device: identity only, no tags.
    pub fn power_off(device: &Device) -> Self {
        Self::with_power(device, 0)
    }

    /// Empty record for a reachable device; readings are added by dispatch.
    pub fn powered(device: &Device) -> Self {
        Self::with_power(device, 1)
    }

    fn with_power(device: &Device, power_on: u8) -> Self {
        Self {
            name: device.name.clone(),
            address: device.address.clone(),
            port: device.port,
            power_on,
            tags: BTreeMap::new(),
        }
    }

    pub fn is_powered(&self) -> bool {
        self.power_on != 0
    }

    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn m1() -> Device {
        Device {
            name: "M1".into(),
            address: "10.0.0.5".into(),
            port: 8193,
            delay_ms: 1000,
            tags_pack_name: "basic".into(),
        }
    }

    #[test]
    fn power_off_sentinel_carries_identity_only() {
        assert_eq!(
            OutputRecord::power_off(&m1()).to_line().unwrap(),
            r#"{"name":"M1","address":"10.0.0.5","port":8193,"power_on":0}"#
        );
    }

    #[test]
    fn tags_are_flattened_after_identity() {
        let mut record = OutputRecord::powered(&m1());
        record.tags.insert("aut".into(), Reading::Int16(3));
        record.tags.insert(
            "servo_loads".into(),
            Reading::MapInt([("X".to_owned(), 12), ("Z".to_owned(), 5)].into()),
        );
        assert_eq!(
            record.to_line().unwrap(),
            r#"{"name":"M1","address":"10.0.0.5","port":8193,"power_on":1,"aut":3,"servo_loads":{"X":12,"Z":5}}"#
        );
    }

    #[test]
    fn decoding_reads_numbers_as_float() {
        let record: OutputRecord = serde_json::from_str(
            r#"{"name":"M1","address":"10.0.0.5","port":8193,"power_on":1,"aut":3,"servo_loads":{"X":12}}"#,
        )
        .unwrap();
        assert!(record.is_powered());
        assert_eq!(record.tags["aut"], Reading::Float64(3.0));
        assert_eq!(record.tags["servo_loads"].map_entry("X"), Some(12.0));
    }
}
