//! Boot image entry container
//!
//! A boot image is a flat blob: a 102-byte header, three entry tables
//! (471 and 472 Maskrom download stages, plus the flash loader pieces)
//! and the entry payloads, sealed by a trailing CRC-32 in the vendor
//! flavor. Entry names are fixed 20-character UTF-16LE fields; lookups
//! compare them case-insensitively.
//!
//! Validation runs in a fixed order: minimum length, trailing CRC over
//! everything before it, then the header tag. The CRC and tag gates are
//! independent; both must pass.

use alloc::string::String;
use alloc::vec::Vec;

use super::{le16, le32};
use crate::crc::crc32_boot;
use crate::error::{Error, FormatError, Result};

/// Boot image header length in bytes.
pub const BOOT_HEADER_LEN: usize = 102;

/// Fixed length of one entry record in bytes.
///
/// The table stride is the per-table size field from the header, which
/// may exceed this but never shrink below it.
pub const BOOT_ENTRY_LEN: usize = 57;

/// "BOOT" header tag.
pub const TAG_BOOT: u32 = 0x544F_4F42;

/// "LDR " header tag of merged loader images.
pub const TAG_LDR: u32 = 0x2052_444C;

/// The three entry tables of a boot image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// First-stage Maskrom download entries (DDR init code).
    Entry471,
    /// Second-stage Maskrom download entries (usbplug code).
    Entry472,
    /// Flash loader pieces (FlashHead/FlashData/FlashBoot).
    Loader,
}

/// Release timestamp carried by boot and firmware headers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReleaseTime {
    /// Calendar year.
    pub year: u16,
    /// Month, 1-12.
    pub month: u8,
    /// Day of month.
    pub day: u8,
    /// Hour, 0-23.
    pub hour: u8,
    /// Minute.
    pub minute: u8,
    /// Second.
    pub second: u8,
}

impl ReleaseTime {
    pub(crate) fn parse(buf: &[u8], off: usize) -> Self {
        Self {
            year: le16(buf, off),
            month: buf[off + 2],
            day: buf[off + 3],
            hour: buf[off + 4],
            minute: buf[off + 5],
            second: buf[off + 6],
        }
    }
}

impl core::fmt::Display for ReleaseTime {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

/// One record of an entry table.
#[derive(Debug, Clone)]
pub struct BootEntry {
    /// The record's own size field. The table stride is authoritative;
    /// this is informational.
    pub size: u8,
    /// Raw entry type discriminant.
    pub entry_type: u32,
    /// Entry name, decoded from its fixed UTF-16LE field.
    pub name: String,
    /// Payload offset from the start of the image.
    pub data_offset: u32,
    /// Payload length in bytes.
    pub data_size: u32,
    /// Delay to honor after downloading this entry, in milliseconds.
    pub data_delay: u32,
}

impl BootEntry {
    /// Parse the fixed fields from a record slice of at least
    /// [`BOOT_ENTRY_LEN`] bytes.
    fn parse(buf: &[u8]) -> Self {
        let units = buf[5..45]
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .take_while(|&u| u != 0);
        let name = core::char::decode_utf16(units)
            .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect();
        Self {
            size: buf[0],
            entry_type: le32(buf, 1),
            name,
            data_offset: le32(buf, 45),
            data_size: le32(buf, 49),
            data_delay: le32(buf, 53),
        }
    }

    /// Case-insensitive name comparison, the way loader entries are
    /// looked up.
    pub fn name_matches(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

#[derive(Debug, Clone, Copy)]
struct EntryTable {
    count: u8,
    offset: u32,
    size: u8,
}

/// A parsed, validated boot image.
#[derive(Debug)]
pub struct BootImage {
    data: Vec<u8>,
    version: u32,
    merge_version: u32,
    release_time: ReleaseTime,
    supported_chip: u32,
    entry471: EntryTable,
    entry472: EntryTable,
    loader: EntryTable,
    sign_flag: bool,
    rc4_disabled: bool,
}

impl BootImage {
    /// Parse and validate a boot image, taking ownership of its bytes.
    pub fn parse(data: Vec<u8>) -> Result<Self> {
        if data.len() < BOOT_HEADER_LEN {
            return Err(Error::Format(FormatError::Truncated));
        }
        let body = data.len() - 4;
        if crc32_boot(&data[..body]) != le32(&data, body) {
            return Err(Error::Format(FormatError::CrcMismatch));
        }
        let tag = le32(&data, 0);
        if tag != TAG_BOOT && tag != TAG_LDR {
            return Err(Error::Format(FormatError::BadMagic));
        }

        let entry471 = EntryTable {
            count: data[25],
            offset: le32(&data, 26),
            size: data[30],
        };
        let entry472 = EntryTable {
            count: data[31],
            offset: le32(&data, 32),
            size: data[36],
        };
        let loader = EntryTable {
            count: data[37],
            offset: le32(&data, 38),
            size: data[42],
        };

        Ok(Self {
            version: le32(&data, 6),
            merge_version: le32(&data, 10),
            release_time: ReleaseTime::parse(&data, 14),
            supported_chip: le32(&data, 21),
            entry471,
            entry472,
            loader,
            sign_flag: data[43] == b'S',
            rc4_disabled: data[44] != 0,
            data,
        })
    }

    /// Loader version as stored (BCD-packed).
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Merge version as stored.
    pub fn merge_version(&self) -> u32 {
        self.merge_version
    }

    /// Release timestamp from the header.
    pub fn release_time(&self) -> ReleaseTime {
        self.release_time
    }

    /// Raw supported-chip discriminant from the header.
    pub fn supported_chip(&self) -> u32 {
        self.supported_chip
    }

    /// True when the image carries a signature ('S' sign flag).
    pub fn sign_flag(&self) -> bool {
        self.sign_flag
    }

    /// True when entry payloads are stored without the vendor RC4
    /// obfuscation. Such payloads must be obfuscated before they land in
    /// an ID block the boot ROM will read.
    pub fn rc4_disabled(&self) -> bool {
        self.rc4_disabled
    }

    /// The whole image, for saving back out.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    fn table(&self, kind: EntryKind) -> EntryTable {
        match kind {
            EntryKind::Entry471 => self.entry471,
            EntryKind::Entry472 => self.entry472,
            EntryKind::Loader => self.loader,
        }
    }

    /// Number of entries in the given table.
    pub fn entry_count(&self, kind: EntryKind) -> u8 {
        self.table(kind).count
    }

    /// Read one entry record, bounds-checked against the image.
    pub fn entry(&self, kind: EntryKind, index: u8) -> Result<BootEntry> {
        let table = self.table(kind);
        if index >= table.count {
            return Err(Error::Format(FormatError::OutOfBounds));
        }
        let stride = table.size as usize;
        if stride < BOOT_ENTRY_LEN {
            return Err(Error::Format(FormatError::InvalidField));
        }
        let start = (table.offset as usize)
            .checked_add(stride * index as usize)
            .ok_or(Error::Format(FormatError::OutOfBounds))?;
        let end = start
            .checked_add(stride)
            .ok_or(Error::Format(FormatError::OutOfBounds))?;
        if end > self.data.len() {
            return Err(Error::Format(FormatError::OutOfBounds));
        }
        Ok(BootEntry::parse(&self.data[start..start + BOOT_ENTRY_LEN]))
    }

    /// Find an entry by case-insensitive name. Malformed records are
    /// skipped, not fatal.
    pub fn entry_by_name(&self, kind: EntryKind, name: &str) -> Option<BootEntry> {
        (0..self.table(kind).count)
            .filter_map(|i| self.entry(kind, i).ok())
            .find(|e| e.name_matches(name))
    }

    /// Borrow an entry's payload.
    ///
    /// The on-disk format trusts the header blindly here; we do not.
    pub fn entry_data(&self, entry: &BootEntry) -> Result<&[u8]> {
        let start = entry.data_offset as usize;
        let end = start
            .checked_add(entry.data_size as usize)
            .ok_or(Error::Format(FormatError::OutOfBounds))?;
        if end > self.data.len() {
            return Err(Error::Format(FormatError::OutOfBounds));
        }
        Ok(&self.data[start..end])
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::image::{put_le16, put_le32};
    use alloc::vec;

    fn put_name(buf: &mut [u8], off: usize, name: &str) {
        for (i, unit) in name.encode_utf16().enumerate() {
            put_le16(buf, off + i * 2, unit);
        }
    }

    fn seal(mut data: Vec<u8>) -> Vec<u8> {
        let body = data.len() - 4;
        let crc = crc32_boot(&data[..body]);
        put_le32(&mut data, body, crc);
        data
    }

    /// Header, one loader entry named "FlashBoot", a payload region and
    /// the trailing CRC.
    fn sample_image() -> Vec<u8> {
        let payload_at = BOOT_HEADER_LEN + BOOT_ENTRY_LEN;
        let mut data = vec![0u8; payload_at + 32 + 4];

        put_le32(&mut data, 0, TAG_BOOT);
        put_le16(&mut data, 4, BOOT_HEADER_LEN as u16);
        put_le32(&mut data, 6, 0x0102_0304); // version
        put_le16(&mut data, 14, 2024); // release year
        data[16] = 6;
        data[17] = 1;
        data[37] = 1; // loader count
        put_le32(&mut data, 38, BOOT_HEADER_LEN as u32);
        data[42] = BOOT_ENTRY_LEN as u8;
        data[43] = b'S';
        data[44] = 1; // rc4 disabled

        let e = BOOT_HEADER_LEN;
        data[e] = BOOT_ENTRY_LEN as u8;
        put_le32(&mut data, e + 1, 4); // loader entry type
        put_name(&mut data, e + 5, "FlashBoot");
        put_le32(&mut data, e + 45, payload_at as u32);
        put_le32(&mut data, e + 49, 32);
        put_le32(&mut data, e + 53, 5);

        for (i, b) in data[payload_at..payload_at + 32].iter_mut().enumerate() {
            *b = i as u8;
        }
        seal(data)
    }

    #[test]
    fn parses_valid_image() {
        let boot = BootImage::parse(sample_image()).unwrap();
        assert_eq!(boot.version(), 0x0102_0304);
        assert_eq!(boot.release_time().year, 2024);
        assert!(boot.sign_flag());
        assert!(boot.rc4_disabled());
        assert_eq!(boot.entry_count(EntryKind::Loader), 1);
        assert_eq!(boot.entry_count(EntryKind::Entry471), 0);
    }

    #[test]
    fn entry_lookup_is_case_insensitive() {
        let boot = BootImage::parse(sample_image()).unwrap();
        let entry = boot.entry_by_name(EntryKind::Loader, "flashboot").unwrap();
        assert_eq!(entry.name, "FlashBoot");
        assert_eq!(entry.data_size, 32);
        assert_eq!(entry.data_delay, 5);
        assert!(boot.entry_by_name(EntryKind::Loader, "FlashData").is_none());
    }

    #[test]
    fn entry_data_matches_written_payload() {
        let boot = BootImage::parse(sample_image()).unwrap();
        let entry = boot.entry(EntryKind::Loader, 0).unwrap();
        let data = boot.entry_data(&entry).unwrap();
        assert_eq!(data.len(), 32);
        assert_eq!(data[5], 5);
    }

    #[test]
    fn rejects_truncated_buffer() {
        assert_eq!(
            BootImage::parse(vec![0u8; BOOT_HEADER_LEN - 1]).unwrap_err(),
            Error::Format(FormatError::Truncated)
        );
    }

    #[test]
    fn rejects_bad_crc() {
        let mut data = sample_image();
        let last = data.len() - 1;
        data[last] ^= 0xFF;
        assert_eq!(
            BootImage::parse(data).unwrap_err(),
            Error::Format(FormatError::CrcMismatch)
        );
    }

    #[test]
    fn zero_tag_fails_after_crc_passes() {
        // CRC validity and tag validity are independent gates.
        let mut data = sample_image();
        put_le32(&mut data, 0, 0);
        let data = seal(data);
        assert_eq!(
            BootImage::parse(data).unwrap_err(),
            Error::Format(FormatError::BadMagic)
        );
    }

    #[test]
    fn ldr_tag_is_accepted() {
        let mut data = sample_image();
        put_le32(&mut data, 0, TAG_LDR);
        assert!(BootImage::parse(seal(data)).is_ok());
    }

    #[test]
    fn entry_payload_outside_image_is_rejected() {
        let mut data = sample_image();
        let e = BOOT_HEADER_LEN;
        put_le32(&mut data, e + 49, 0xFFFF_0000); // data size
        let boot = BootImage::parse(seal(data)).unwrap();
        let entry = boot.entry(EntryKind::Loader, 0).unwrap();
        assert_eq!(
            boot.entry_data(&entry).unwrap_err(),
            Error::Format(FormatError::OutOfBounds)
        );
    }

    #[test]
    fn entry_index_past_count_is_rejected() {
        let boot = BootImage::parse(sample_image()).unwrap();
        assert!(boot.entry(EntryKind::Loader, 1).is_err());
    }

    #[test]
    fn undersized_table_stride_is_rejected() {
        let mut data = sample_image();
        data[42] = 16; // loader entry size below the fixed record length
        let boot = BootImage::parse(seal(data)).unwrap();
        assert_eq!(
            boot.entry(EntryKind::Loader, 0).unwrap_err(),
            Error::Format(FormatError::InvalidField)
        );
    }
}
