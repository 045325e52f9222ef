// ── Shared schema ──
//
// One definition of the device, tag-pack and record shapes, used by the
// polling sessions, the address space and the relay.

pub mod device;
pub mod record;
pub mod tag;

pub use device::Device;
pub use record::OutputRecord;
pub use tag::{DeclaredType, TagName, TagPack};
