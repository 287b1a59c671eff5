//! Device-level flashing operations.
//!
//! [`Flasher`] binds a protocol engine to one discovered device and
//! carries the session state the raw commands leave implicit: cached
//! flash geometry, the eMMC flag learned from the flash ID and the
//! capability bits that steer the erase strategy. Long operations
//! report through the [`Progress`] trait.

mod flasher;
mod info;
mod progress;

pub use flasher::{Flasher, PartitionTable};
pub use info::FlashInfo;
pub use progress::{CallStep, NoProgress, Progress, ProgressEvent, ProgressKind};

/// First sector of the on-flash ID block.
pub const IDB_LBA: u32 = 64;

/// Sectors moved per bulk transfer when streaming LBA data.
pub const LBA_CHUNK_SECTORS: u16 = 128;

/// Sectors cleared per request when erasing by LBA.
pub const ERASE_LBA_CHUNK: u16 = 32768;

/// Disk size assumed for a GPT when the flash geometry is unknown.
pub const DEFAULT_GPT_DISK_SECTORS: u64 = 0x0020_0000;
