//! Flash geometry reported by the device.

use core::fmt;

use crate::error::{Error, FormatError, Result};
use crate::image::{le16, le32};

/// NAND manufacturer names, indexed by the reported manufacturer code.
const MANUFACTURERS: [&str; 8] = [
    "SAMSUNG", "TOSHIBA", "HYNIX", "INFINEON", "MICRON", "RENESAS", "ST", "INTEL",
];

/// Normalized flash geometry.
///
/// Decoded from the raw flash-info response, which reports sizes in
/// 512-byte sectors: flash size u32 at 0, block size u16 at 4, page
/// size u8 at 6, ECC bits u8 at 7, access time u8 at 8, manufacturer
/// code u8 at 9 and the chip-select mask u8 at 10.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashInfo {
    /// Manufacturer name, "UNKNOWN" for codes past the table.
    pub manufacturer: &'static str,
    /// Total capacity in MiB.
    pub size_mb: u32,
    /// Erase block size in KiB.
    pub block_size_kb: u16,
    /// Page size in KiB.
    pub page_size_kb: u32,
    /// ECC strength in bits.
    pub ecc_bits: u8,
    /// Access timing code.
    pub access_time: u8,
    /// Erase blocks per chip select.
    pub block_count: u32,
    /// Sectors per erase block.
    pub sectors_per_block: u16,
    /// Bitmask of populated chip selects.
    pub chip_selects: u8,
    /// Usable 512-byte sectors per block after ECC reservations.
    pub valid_sectors_per_block: u16,
}

impl FlashInfo {
    /// Decode a raw flash-info response of at least 11 bytes.
    ///
    /// A zero block or page size means the device answered without real
    /// geometry; the query counts as failed.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        if raw.len() < 11 {
            return Err(Error::Format(FormatError::Truncated));
        }
        let size_sectors = le32(raw, 0);
        let block_sectors = le16(raw, 4);
        let page_sectors = raw[6];
        if block_sectors == 0 || page_sectors == 0 {
            return Err(Error::Format(FormatError::InvalidField));
        }
        let block_size_kb = block_sectors / 2;
        if block_size_kb == 0 {
            // A one-sector block would divide the block count by zero
            return Err(Error::Format(FormatError::InvalidField));
        }
        let size_mb = size_sectors / 2 / 1024;
        let manufacturer = MANUFACTURERS
            .get(raw[9] as usize)
            .copied()
            .unwrap_or("UNKNOWN");
        Ok(FlashInfo {
            manufacturer,
            size_mb,
            block_size_kb,
            page_size_kb: u32::from(page_sectors) / 2,
            ecc_bits: raw[7],
            access_time: raw[8],
            block_count: size_mb * 1024 / u32::from(block_size_kb),
            sectors_per_block: block_sectors,
            chip_selects: raw[10],
            valid_sectors_per_block: (block_sectors / u16::from(page_sectors)).wrapping_mul(4),
        })
    }

    /// Total capacity in 512-byte sectors.
    pub fn total_sectors(&self) -> u64 {
        u64::from(self.size_mb) * 2 * 1024
    }
}

impl fmt::Display for FlashInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Manufacturer: {}", self.manufacturer)?;
        writeln!(f, "Flash Size: {} MB", self.size_mb)?;
        writeln!(f, "Block Size: {} KB", self.block_size_kb)?;
        writeln!(f, "Page Size: {} KB", self.page_size_kb)?;
        writeln!(f, "Sector Per Block: {}", self.sectors_per_block)?;
        writeln!(f, "Block Num: {}", self.block_count)
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::image::{put_le16, put_le32};
    use alloc::string::ToString;

    /// Raw response for an 8 GiB part: 1024-sector blocks, 4-sector
    /// pages, Samsung, one chip select.
    fn sample_raw() -> [u8; 11] {
        let mut raw = [0u8; 11];
        put_le32(&mut raw, 0, 8192 * 2048);
        put_le16(&mut raw, 4, 1024);
        raw[6] = 4;
        raw[7] = 40;
        raw[8] = 25;
        raw[9] = 0;
        raw[10] = 1;
        raw
    }

    #[test]
    fn parses_reference_geometry() {
        let info = FlashInfo::parse(&sample_raw()).unwrap();
        assert_eq!(info.manufacturer, "SAMSUNG");
        assert_eq!(info.size_mb, 8192);
        assert_eq!(info.block_size_kb, 512);
        assert_eq!(info.page_size_kb, 2);
        assert_eq!(info.block_count, 16384);
        assert_eq!(info.sectors_per_block, 1024);
        assert_eq!(info.valid_sectors_per_block, 1024);
        assert_eq!(info.chip_selects, 1);
        assert_eq!(info.total_sectors(), 8192 * 2048);
    }

    #[test]
    fn unlisted_manufacturer_code_reads_unknown() {
        let mut raw = sample_raw();
        raw[9] = 8;
        let info = FlashInfo::parse(&raw).unwrap();
        assert_eq!(info.manufacturer, "UNKNOWN");
    }

    #[test]
    fn zero_geometry_is_rejected() {
        let mut raw = sample_raw();
        put_le16(&mut raw, 4, 0);
        assert_eq!(
            FlashInfo::parse(&raw).unwrap_err(),
            Error::Format(FormatError::InvalidField)
        );

        let mut raw = sample_raw();
        raw[6] = 0;
        assert_eq!(
            FlashInfo::parse(&raw).unwrap_err(),
            Error::Format(FormatError::InvalidField)
        );
    }

    #[test]
    fn short_response_is_rejected() {
        assert_eq!(
            FlashInfo::parse(&[0u8; 10]).unwrap_err(),
            Error::Format(FormatError::Truncated)
        );
    }

    #[test]
    fn report_lists_the_original_fields() {
        let info = FlashInfo::parse(&sample_raw()).unwrap();
        assert_eq!(
            info.to_string(),
            "Manufacturer: SAMSUNG\n\
             Flash Size: 8192 MB\n\
             Block Size: 512 KB\n\
             Page Size: 2 KB\n\
             Sector Per Block: 1024\n\
             Block Num: 16384\n"
        );
    }
}
