//! Rockusb command protocol
//!
//! Rockchip Maskrom/Loader devices speak a mass-storage-like vendor
//! protocol: a 31-byte command block wrapper, an optional data phase and
//! a 13-byte status wrapper, all over USB bulk endpoints. Maskrom boot
//! stages additionally travel over vendor control transfers.

mod engine;
mod wire;

pub use engine::{ReadyStatus, Rockusb};
pub use wire::{Cbw, Csw, CBW_LEN, CBW_SIGNATURE, CSW_LEN, CSW_SIGNATURE};

/// Bytes per logical sector
pub const SECTOR_SIZE: usize = 512;
/// Bytes per raw NAND sector including the spare area
pub const RAW_SECTOR_SIZE: usize = 528;
/// Most sectors a single raw sector command may carry
pub const MAX_RAW_SECTORS: u16 = 32;
/// Most blocks a single erase command may carry
pub const MAX_ERASE_BLOCKS: u16 = 16;
/// Most blocks a single bad-block test may cover
pub const MAX_TEST_BLOCKS: u16 = 512;
/// Resynchronization gives up after draining this many stale bytes
pub const MAX_CLEAR_LEN: usize = 16 * 1024;
/// Bulk timeout for reads whose answer length varies, in milliseconds
pub const BULK_TIMEOUT_MS: u32 = 5000;
/// Attempts of the resynchronization drain loop
pub const RESYNC_ATTEMPTS: u32 = 3;
/// How long each drain attempt waits for stale output, in milliseconds
pub const RESYNC_WAIT_MS: u32 = 3000;

/// Vendor control request carrying Maskrom boot-stage data
pub const BOOT_VENDOR_REQUEST: u8 = 0x0C;
/// Request index selecting the first-stage (DDR init) area
pub const BOOT_AREA_471: u16 = 0x0471;
/// Request index selecting the second-stage (usbplug) area
pub const BOOT_AREA_472: u16 = 0x0472;
/// Chunk size for vendor control requests
pub const BOOT_CHUNK: usize = 4096;

/// Command opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    /// Poll readiness; doubles as the carrier for maintenance sub-codes
    TestUnitReady = 0x00,
    /// Read the 5-byte flash ID
    ReadFlashId = 0x01,
    /// Scan a block range for factory bad-block marks
    TestBadBlock = 0x03,
    /// Read raw NAND sectors (528 bytes each, spare area included)
    ReadSector = 0x04,
    /// Write raw NAND sectors
    WriteSector = 0x05,
    /// Erase blocks, skipping bad ones
    EraseNormal = 0x06,
    /// Erase blocks regardless of bad-block marks
    EraseForce = 0x0B,
    /// Read 512-byte logical sectors
    ReadLba = 0x14,
    /// Write 512-byte logical sectors
    WriteLba = 0x15,
    /// Erase the system disk area
    EraseSystemDisk = 0x16,
    /// Read device SDRAM
    ReadSdram = 0x17,
    /// Load data into device SDRAM
    WriteSdram = 0x18,
    /// Jump to previously loaded SDRAM code
    ExecuteSdram = 0x19,
    /// Query flash geometry
    ReadFlashInfo = 0x1A,
    /// Query the chip identity blob
    ReadChipInfo = 0x1B,
    /// Mark the reset flag ahead of a reboot
    SetResetFlag = 0x1E,
    /// Program efuse bits
    WriteEfuse = 0x1F,
    /// Read efuse bits
    ReadEfuse = 0x20,
    /// Read the SPI boot flash
    ReadSpiFlash = 0x21,
    /// Write the SPI boot flash
    WriteSpiFlash = 0x22,
    /// Program the newer efuse layout
    WriteNewEfuse = 0x23,
    /// Read the newer efuse layout
    ReadNewEfuse = 0x24,
    /// Erase 512-byte logical sectors
    EraseLba = 0x25,
    /// Switch the active storage medium
    ChangeStorage = 0x2A,
    /// Query the available storage media bitmask
    ReadStorage = 0x2B,
    /// Query device capability bits
    ReadCapability = 0xAA,
    /// Reset the device, optionally into another mode
    DeviceReset = 0xFF,
}

/// Transfer direction of a command's data phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Host to device
    Out,
    /// Device to host
    In,
}

impl Direction {
    /// CBW flags byte encoding this direction
    pub fn flags(self) -> u8 {
        match self {
            Direction::Out => 0x00,
            Direction::In => 0x80,
        }
    }
}

impl Opcode {
    /// Data-phase direction, fixed per opcode
    pub fn direction(self) -> Direction {
        match self {
            Opcode::TestUnitReady
            | Opcode::ReadFlashId
            | Opcode::TestBadBlock
            | Opcode::ReadSector
            | Opcode::ReadLba
            | Opcode::ReadSdram
            | Opcode::ReadFlashInfo
            | Opcode::ReadChipInfo
            | Opcode::ReadEfuse
            | Opcode::ReadSpiFlash
            | Opcode::ReadNewEfuse
            | Opcode::ReadStorage
            | Opcode::ReadCapability => Direction::In,
            _ => Direction::Out,
        }
    }

    /// Valid command block length as sent on the wire, fixed per opcode
    pub fn cb_length(self) -> u8 {
        match self {
            Opcode::TestUnitReady
            | Opcode::ReadFlashId
            | Opcode::EraseSystemDisk
            | Opcode::ReadFlashInfo
            | Opcode::ReadChipInfo
            | Opcode::SetResetFlag
            | Opcode::ReadEfuse
            | Opcode::ChangeStorage
            | Opcode::ReadStorage
            | Opcode::ReadCapability
            | Opcode::DeviceReset => 0x06,
            _ => 0x0A,
        }
    }
}

/// Reset sub-codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ResetCode {
    /// Plain reboot
    #[default]
    None = 0,
    /// Reboot into mass-storage mode
    Msc = 1,
    /// Power the device off
    PowerOff = 2,
    /// Reboot into Maskrom mode
    MaskRom = 3,
    /// Drop off the bus without rebooting
    Disconnect = 4,
}

/// Maintenance sub-codes carried by `TestUnitReady`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum TestUnitCode {
    /// Plain readiness poll
    #[default]
    None = 0x00,
    /// Reserve the user sector count query
    GetUserSector = 0xF9,
    /// Wipe the user data area
    EraseUserData = 0xFB,
    /// Low-level reformat
    LowerFormat = 0xFD,
    /// Wipe the system area
    EraseSystem = 0xFE,
}

/// Addressing mode of LBA reads and writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum LbaAccess {
    /// Access through the firmware image mapping
    #[default]
    Image = 0,
    /// Direct logical block access
    Lba = 1,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_table_directions() {
        assert_eq!(Opcode::ReadChipInfo.direction(), Direction::In);
        assert_eq!(Opcode::ReadChipInfo.cb_length(), 0x06);
        assert_eq!(Opcode::WriteLba.direction(), Direction::Out);
        assert_eq!(Opcode::WriteLba.cb_length(), 0x0A);
        assert_eq!(Opcode::EraseLba.direction(), Direction::Out);
        assert_eq!(Opcode::EraseLba.cb_length(), 0x0A);
        assert_eq!(Opcode::DeviceReset.direction(), Direction::Out);
        assert_eq!(Opcode::DeviceReset.cb_length(), 0x06);
        assert_eq!(Opcode::TestBadBlock.direction(), Direction::In);
        assert_eq!(Opcode::TestBadBlock.cb_length(), 0x0A);
    }

    #[test]
    fn direction_flag_bits() {
        assert_eq!(Direction::In.flags(), 0x80);
        assert_eq!(Direction::Out.flags(), 0x00);
    }
}
