// ── Address space ──
//
// Typed, timestamped node tree mirroring devices and their tags. Every
// declared tag gets a leaf at registration time, initialised to its zero
// value; updates rewrite leaves in place and broadcast a notification for
// each write, including writes of an unchanged value.

pub mod convert;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

use crate::model::{DeclaredType, Device, OutputRecord, TagName, TagPack};

pub use convert::{NodeValue, convert};

const CHANGE_CHANNEL_SIZE: usize = 1024;

/// Current value of a leaf.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeSnapshot {
    pub value: NodeValue,
    pub source_timestamp: DateTime<Utc>,
}

/// Emitted on every leaf write.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeNotification {
    pub node_id: Arc<str>,
    pub value: NodeValue,
    pub timestamp: DateTime<Utc>,
}

/// Leaf declaration kept per device to drive updates.
#[derive(Debug, Clone)]
struct Leaf {
    id: Arc<str>,
    tag: TagName,
    declared: DeclaredType,
}

#[derive(Debug, Clone)]
struct Container {
    id: Arc<str>,
    leaves: Arc<Vec<Leaf>>,
}

/// Shared registry of device containers and their leaves.
///
/// Each device owns a disjoint subtree, so concurrent updates for different
/// devices never touch the same entry.
pub struct AddressSpace {
    nodes: DashMap<Arc<str>, NodeSnapshot>,
    devices: DashMap<String, Container>,
    changes: broadcast::Sender<ChangeNotification>,
}

impl Default for AddressSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl AddressSpace {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_SIZE);
        Self {
            nodes: DashMap::new(),
            devices: DashMap::new(),
            changes,
        }
    }

    /// Create the container and one zeroed leaf per declared tag. Returns
    /// the container id. Registering a device again resets its leaves.
    pub fn register_device(&self, device: &Device, pack: &TagPack) -> Arc<str> {
        let container: Arc<str> = Arc::from(device.name.as_str());
        let now = Utc::now();

        let leaves: Vec<Leaf> = pack
            .iter()
            .map(|(full, declared)| Leaf {
                id: Arc::from(format!("{container}/{full}")),
                tag: TagName::parse(full),
                declared: *declared,
            })
            .collect();

        for leaf in &leaves {
            self.nodes.insert(
                Arc::clone(&leaf.id),
                NodeSnapshot {
                    value: NodeValue::zero(leaf.declared),
                    source_timestamp: now,
                },
            );
        }

        debug!(device = %device.name, leaves = leaves.len(), "device registered in address space");
        self.devices.insert(
            device.name.clone(),
            Container {
                id: Arc::clone(&container),
                leaves: Arc::new(leaves),
            },
        );
        container
    }

    /// Write a device's record into its leaves. Returns the number of leaves
    /// written: zero for power-off sentinels and unregistered devices.
    pub fn apply(&self, record: &OutputRecord) -> usize {
        if !record.is_powered() {
            return 0;
        }
        let Some(leaves) = self
            .devices
            .get(&record.name)
            .map(|c| Arc::clone(&c.value().leaves))
        else {
            warn!(device = %record.name, "update for unregistered device dropped");
            return 0;
        };

        let timestamp = Utc::now();
        for leaf in leaves.iter() {
            let value = convert(
                record.tags.get(leaf.tag.reading()),
                leaf.tag.subkey(),
                leaf.declared,
            );
            self.nodes.insert(
                Arc::clone(&leaf.id),
                NodeSnapshot {
                    value: value.clone(),
                    source_timestamp: timestamp,
                },
            );
            let _ = self.changes.send(ChangeNotification {
                node_id: Arc::clone(&leaf.id),
                value,
                timestamp,
            });
        }
        leaves.len()
    }

    /// Current value of a leaf by node id (`<device>/<tag>`).
    pub fn read(&self, node_id: &str) -> Option<NodeSnapshot> {
        self.nodes.get(node_id).map(|r| r.value().clone())
    }

    /// Leaf ids under a device, in declaration order.
    pub fn browse(&self, device: &str) -> Option<Vec<Arc<str>>> {
        self.devices
            .get(device)
            .map(|c| c.leaves.iter().map(|l| Arc::clone(&l.id)).collect())
    }

    /// Container id for a device name.
    pub fn device_node(&self, device: &str) -> Option<Arc<str>> {
        self.devices.get(device).map(|c| Arc::clone(&c.id))
    }

    pub fn devices(&self) -> Vec<String> {
        self.devices.iter().map(|r| r.key().clone()).collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeNotification> {
        self.changes.subscribe()
    }

    /// [`subscribe`](Self::subscribe) as a `Stream`; lagged receivers
    /// surface as stream errors instead of closing.
    pub fn changes(&self) -> BroadcastStream<ChangeNotification> {
        BroadcastStream::new(self.changes.subscribe())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cncbridge_driver::Reading;
    use futures_util::StreamExt;
    use pretty_assertions::assert_eq;

    use super::*;

    fn m1() -> Device {
        Device {
            name: "M1".into(),
            address: "10.0.0.5".into(),
            port: 8193,
            delay_ms: 10,
            tags_pack_name: "basic".into(),
        }
    }

    fn basic() -> TagPack {
        [
            ("aut".to_owned(), DeclaredType::Int16),
            ("servo_loads.X".to_owned(), DeclaredType::Int64),
            ("frame".to_owned(), DeclaredType::String),
        ]
        .into_iter()
        .collect()
    }

    fn scenario_a() -> OutputRecord {
        let mut record = OutputRecord::powered(&m1());
        record.tags.insert("aut".into(), Reading::Int16(3));
        record.tags.insert(
            "servo_loads".into(),
            Reading::MapInt([("X".to_owned(), 12), ("Z".to_owned(), 5)].into()),
        );
        record
    }

    #[test]
    fn registration_creates_zeroed_leaves() {
        let space = AddressSpace::new();
        let container = space.register_device(&m1(), &basic());

        assert_eq!(&*container, "M1");
        assert_eq!(space.device_node("M1").as_deref(), Some("M1"));
        assert_eq!(
            space
                .browse("M1")
                .unwrap()
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>(),
            vec!["M1/aut", "M1/servo_loads.X", "M1/frame"]
        );
        assert_eq!(space.read("M1/aut").unwrap().value, NodeValue::Int16(0));
        assert_eq!(
            space.read("M1/frame").unwrap().value,
            NodeValue::String(String::new())
        );
    }

    #[test]
    fn apply_converts_into_declared_types() {
        let space = AddressSpace::new();
        space.register_device(&m1(), &basic());

        assert_eq!(space.apply(&scenario_a()), 3);
        assert_eq!(space.read("M1/aut").unwrap().value, NodeValue::Int16(3));
        assert_eq!(
            space.read("M1/servo_loads.X").unwrap().value,
            NodeValue::Int64(12)
        );
        assert_eq!(
            space.read("M1/frame").unwrap().value,
            NodeValue::String(String::new()),
            "absent reading writes the zero value"
        );
    }

    #[test]
    fn applying_twice_is_idempotent() {
        let space = AddressSpace::new();
        space.register_device(&m1(), &basic());

        space.apply(&scenario_a());
        let first = space.read("M1/servo_loads.X").unwrap();
        space.apply(&scenario_a());
        let second = space.read("M1/servo_loads.X").unwrap();

        assert_eq!(first.value, second.value);
        assert!(second.source_timestamp >= first.source_timestamp);
    }

    #[test]
    fn power_off_and_unknown_devices_leave_space_unchanged() {
        let space = AddressSpace::new();
        space.register_device(&m1(), &basic());
        space.apply(&scenario_a());

        assert_eq!(space.apply(&OutputRecord::power_off(&m1())), 0);
        assert_eq!(space.read("M1/aut").unwrap().value, NodeValue::Int16(3));

        let mut stranger = scenario_a();
        stranger.name = "M9".into();
        assert_eq!(space.apply(&stranger), 0);
        assert!(space.read("M9/aut").is_none());
    }

    #[tokio::test]
    async fn every_write_notifies_subscribers() {
        let space = AddressSpace::new();
        space.register_device(&m1(), &basic());
        let mut changes = space.changes();

        space.apply(&scenario_a());
        space.apply(&scenario_a());

        let mut aut_updates = 0;
        for _ in 0..6 {
            let change = changes.next().await.unwrap().unwrap();
            if &*change.node_id == "M1/aut" {
                assert_eq!(change.value, NodeValue::Int16(3));
                aut_updates += 1;
            }
        }
        assert_eq!(aut_updates, 2);
    }
}
