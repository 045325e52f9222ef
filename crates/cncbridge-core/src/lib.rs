//! Polling engine between the vendor driver and telemetry consumers.
//!
//! - **[`Bridge`]**: Facade owning the full lifecycle:
//!   [`start()`](Bridge::start) drains handles leaked by a previous run,
//!   then spawns one [`Session`] per device plus the record sink.
//!   [`shutdown()`](Bridge::shutdown) cancels, joins with a deadline and
//!   writes anything still unreleased to the [`HandleLedger`].
//!
//! - **[`Session`]**: Per-device state machine
//!   (`Disconnected → RecoveringStaleHandle → Connecting → Active`) that owns
//!   its handle slot and reconnect counter exclusively.
//!
//! - **[`ReadPlan`]**: A tag pack resolved once into the deduplicated set of
//!   reading accessors; [`read_cycle`] runs it against a live handle.
//!
//! - **[`AddressSpace`]**: Typed, timestamped node tree with one leaf per
//!   declared tag, pre-created at zero and updated from output records.
//!
//! - **[`relay()`]**: Consumer side: decodes line-delimited records and
//!   mirrors them into an address space.
//!
//! - **Schema** ([`model`]): `Device`, `TagPack`, `DeclaredType` and
//!   `OutputRecord`, shared by the polling side and the relay side.

pub mod bridge;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod handles;
pub mod model;
pub mod relay;
pub mod session;
pub mod sink;
pub mod space;

// ── Primary re-exports ──────────────────────────────────────────────
pub use bridge::{Bridge, ShutdownReport};
pub use config::{BridgeConfig, Timing};
pub use dispatch::{CycleOutcome, CycleVerdict, ReadPlan, read_cycle};
pub use error::CoreError;
pub use handles::{DrainOutcome, HandleLedger, HandleSlot, HeldHandles};
pub use model::{DeclaredType, Device, OutputRecord, TagName, TagPack};
pub use relay::{RelayStats, relay};
pub use session::{Session, SessionContext, SessionState};
pub use sink::sink_task;
pub use space::{AddressSpace, ChangeNotification, NodeSnapshot, NodeValue};
