//! Typed surface over the CNC vendor device-control library.
//!
//! The vendor library itself is an opaque, blocking collaborator. This crate
//! describes what the rest of the workspace needs from it:
//!
//! - **[`Driver`]**: blocking trait mirroring the library's typed calls
//!   (handle acquire/release plus the controller primitives readings are
//!   derived from). [`BlockingCall`] runs a call on the blocking pool and
//!   keeps hold of it when a deadline passes.
//!
//! - **[`ReadingId`]**: the closed catalogue of reading identifiers. Each one
//!   owns a fixed [`Accessor`] that turns driver primitives into a
//!   [`Reading`], so tag packs can be validated at load time.
//!
//! - **[`Status`] / [`StatusPolicy`]**: vendor status codes and the
//!   benign/transient/fatal classification sessions act on.
//!
//! - **[`LivenessProbe`]**: the TCP reachability check that precedes any
//!   handle acquisition, with [`TcpProbe`] as the production implementation.
//!
//! - **[`SimDriver`]**: deterministic in-process controller simulation.

pub mod driver;
pub mod error;
pub mod handle;
pub mod probe;
pub mod reading;
pub mod sim;
pub mod status;
pub mod value;

pub use driver::{
    AxisDataClass, AxisDataKind, AxisValue, BlockingCall, Driver, PanelSignals, PositionKind,
    ProgramNumbers, SpindleMeter, StatInfo, SysInfo, SysInfoEx, Waited,
};
pub use error::Error;
pub use handle::Handle;
pub use probe::{LivenessProbe, TcpProbe, format_address};
pub use reading::{Accessor, ReadingId};
pub use sim::SimDriver;
pub use status::{ReleaseOutcome, Status, StatusClass, StatusPolicy};
pub use value::Reading;
