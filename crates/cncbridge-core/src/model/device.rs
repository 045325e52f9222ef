use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A polled controller. Immutable once configuration is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub name: String,
    pub address: String,
    pub port: u16,
    /// Pause between poll iterations.
    pub delay_ms: u64,
    pub tags_pack_name: String,
}

impl Device {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// `address:port`, for log fields.
    pub fn endpoint(&self) -> String {
        cncbridge_driver::format_address(&self.address, self.port)
    }
}
