//! GPT building and lookup.
//!
//! Only the primary copy is handled: protective MBR in sector 0, header in
//! sector 1 and a fixed 128-entry array in sectors 2..34. That 34-sector
//! window is what gets written when provisioning a table and what gets read
//! back when resolving a partition name.

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use crate::crc::{crc32, crc32_boot};
use crate::image::{le32, le64, put_le16, put_le32, put_le64};
use crate::partition::Partition;

/// "EFI PART" read as a little-endian u64.
pub const GPT_SIGNATURE: u64 = 0x5452_4150_2049_4645;

/// Sectors covered by the primary GPT: protective MBR, header, entry array.
pub const GPT_SECTORS: usize = 34;

const SECTOR_LEN: usize = 512;
const HEADER_LEN: usize = 92;
const ENTRY_ARRAY_OFFSET: usize = 2 * SECTOR_LEN;
const ENTRY_LEN: usize = 128;
const ENTRY_COUNT: usize = 128;
const NAME_UNITS: usize = 36;

// Basic-data partition type, in the mixed-endian byte order GUIDs are
// stored with on disk.
const BASIC_DATA_GUID: [u8; 16] = [
    0xa2, 0xa0, 0xd0, 0xeb, 0xe5, 0xb9, 0x33, 0x44, 0x87, 0xc0, 0x68, 0xb6, 0xb7, 0x26, 0x99, 0xc7,
];

/// A named GPT entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GptPartition {
    /// Entry name decoded from UTF-16.
    pub name: String,
    /// First LBA of the partition.
    pub first_lba: u64,
    /// Last LBA, inclusive.
    pub last_lba: u64,
}

// Stable stand-in for the random GUIDs the stock tool generates, with the
// RFC 4122 version and variant bits patched in.
fn derive_guid(seed: &[u8], salt: u32) -> [u8; 16] {
    let a = crc32(seed) ^ salt;
    let b = crc32_boot(seed) ^ salt.rotate_left(16);
    let mut guid = [0u8; 16];
    guid[..4].copy_from_slice(&a.to_le_bytes());
    guid[4..8].copy_from_slice(&b.to_le_bytes());
    guid[8..12].copy_from_slice(&(a ^ b).to_le_bytes());
    guid[12..16].copy_from_slice(&a.wrapping_add(b).to_le_bytes());
    guid[7] = (guid[7] & 0x0f) | 0x40;
    guid[8] = (guid[8] & 0x3f) | 0x80;
    guid
}

/// Build the primary GPT for a disk of `disk_sectors` total sectors.
///
/// Partitions beyond the 128 entry slots are dropped. A grow partition
/// (size 0) is written with its zero size untouched; the device resolves
/// the real extent on first boot.
pub fn build_gpt(parts: &[Partition], disk_sectors: u64) -> Vec<u8> {
    let mut buf = vec![0u8; GPT_SECTORS * SECTOR_LEN];

    // Protective MBR: a single 0xEE record spanning the disk.
    buf[450] = 0xee;
    put_le32(&mut buf, 454, 1);
    let nr_sects = if disk_sectors > u64::from(u32::MAX) {
        u32::MAX
    } else {
        (disk_sectors as u32).wrapping_sub(1)
    };
    put_le32(&mut buf, 458, nr_sects);
    put_le16(&mut buf, 510, 0xaa55);

    for (index, part) in parts.iter().take(ENTRY_COUNT).enumerate() {
        let base = ENTRY_ARRAY_OFFSET + index * ENTRY_LEN;
        buf[base..base + 16].copy_from_slice(&BASIC_DATA_GUID);
        let unique = derive_guid(part.name.as_bytes(), index as u32 + 1);
        buf[base + 16..base + 32].copy_from_slice(&unique);
        put_le64(&mut buf, base + 32, u64::from(part.offset));
        let last = part.offset.wrapping_add(part.size).wrapping_sub(1);
        put_le64(&mut buf, base + 40, u64::from(last));
        for (unit, ch) in part.name.encode_utf16().take(NAME_UNITS - 1).enumerate() {
            put_le16(&mut buf, base + 56 + unit * 2, ch);
        }
    }

    // Header in sector 1. The entry array is summed first, then the header
    // itself with its own CRC field still zero.
    put_le64(&mut buf, 512, GPT_SIGNATURE);
    put_le32(&mut buf, 520, 0x0001_0000);
    put_le32(&mut buf, 524, HEADER_LEN as u32);
    put_le64(&mut buf, 536, 1);
    put_le64(&mut buf, 544, disk_sectors.wrapping_sub(1));
    put_le64(&mut buf, 552, GPT_SECTORS as u64);
    put_le64(&mut buf, 560, disk_sectors.wrapping_sub(GPT_SECTORS as u64));
    let disk_guid = derive_guid(&disk_sectors.to_le_bytes(), parts.len() as u32);
    buf[568..584].copy_from_slice(&disk_guid);
    put_le64(&mut buf, 584, 2);
    put_le32(&mut buf, 592, ENTRY_COUNT as u32);
    put_le32(&mut buf, 596, ENTRY_LEN as u32);
    let array_end = ENTRY_ARRAY_OFFSET + ENTRY_COUNT * ENTRY_LEN;
    let array_crc = crc32(&buf[ENTRY_ARRAY_OFFSET..array_end]);
    put_le32(&mut buf, 600, array_crc);
    let header_crc = crc32(&buf[512..512 + HEADER_LEN]);
    put_le32(&mut buf, 528, header_crc);

    buf
}

fn decode_name(raw: &[u8]) -> String {
    let units = raw
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .take_while(|&u| u != 0);
    core::char::decode_utf16(units)
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

/// Probe whether a buffer holds a primary GPT.
///
/// Two sectors are enough to decide, so callers can probe with a short
/// read before fetching the whole window.
pub fn is_gpt(buf: &[u8]) -> bool {
    buf.len() >= 2 * SECTOR_LEN && le64(buf, 512) == GPT_SIGNATURE
}

/// List the used entries of a primary GPT.
///
/// Walks the entry array at the location, stride and count the header
/// declares, stopping at the end of the buffer. Entries with an all-zero
/// type GUID are unused and skipped.
pub fn list_partitions(buf: &[u8]) -> Vec<GptPartition> {
    let mut parts = Vec::new();
    if buf.len() < GPT_SECTORS * SECTOR_LEN || le64(buf, 512) != GPT_SIGNATURE {
        return parts;
    }

    let entry_len = le32(buf, 596) as usize;
    let entry_count = le32(buf, 592) as usize;
    let array_offset = le64(buf, 584).saturating_mul(SECTOR_LEN as u64) as usize;
    if entry_len < ENTRY_LEN {
        return parts;
    }

    for index in 0..entry_count {
        let base = index
            .checked_mul(entry_len)
            .and_then(|off| off.checked_add(array_offset));
        let base = match base {
            Some(base) if base.checked_add(entry_len).is_some_and(|end| end <= buf.len()) => base,
            _ => break,
        };
        if buf[base..base + 16].iter().all(|&b| b == 0) {
            continue;
        }
        parts.push(GptPartition {
            name: decode_name(&buf[base + 56..base + 56 + 2 * NAME_UNITS]),
            first_lba: le64(buf, base + 32),
            last_lba: le64(buf, base + 40),
        });
    }
    parts
}

/// Resolve a partition name to its `(first_lba, last_lba)` range.
///
/// Matching is case-insensitive; the first match wins.
pub fn find_partition(buf: &[u8], name: &str) -> Option<(u64, u64)> {
    list_partitions(buf)
        .into_iter()
        .find(|part| part.name.eq_ignore_ascii_case(name))
        .map(|part| (part.first_lba, part.last_lba))
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::image::le16;
    use alloc::string::ToString;

    const DISK_SECTORS: u64 = 0x20_0000;

    fn sample_parts() -> Vec<Partition> {
        vec![
            Partition {
                name: "kernel".to_string(),
                offset: 0x8000,
                size: 0x10000,
            },
            Partition {
                name: "rootfs".to_string(),
                offset: 0x18000,
                size: 0x10_0000,
            },
        ]
    }

    #[test]
    fn built_table_matches_reference_layout() {
        let buf = build_gpt(&sample_parts(), DISK_SECTORS);
        assert_eq!(buf.len(), GPT_SECTORS * 512);
        assert_eq!(le16(&buf, 510), 0xaa55);
        assert_eq!(le64(&buf, 512), GPT_SIGNATURE);

        let (start, end) = find_partition(&buf, "kernel").unwrap();
        assert_eq!(start, 0x8000);
        assert_eq!(end, 0x8000 + 0x10000 - 1);
    }

    #[test]
    fn protective_mbr_spans_the_disk() {
        let buf = build_gpt(&sample_parts(), DISK_SECTORS);
        assert_eq!(buf[450], 0xee);
        assert_eq!(le32(&buf, 454), 1);
        assert_eq!(le32(&buf, 458), (DISK_SECTORS - 1) as u32);

        let huge = build_gpt(&sample_parts(), 1 << 40);
        assert_eq!(le32(&huge, 458), u32::MAX);
    }

    #[test]
    fn header_crc_is_computed_with_field_zeroed() {
        let mut buf = build_gpt(&sample_parts(), DISK_SECTORS);
        let stored = le32(&buf, 528);
        put_le32(&mut buf, 528, 0);
        assert_eq!(crc32(&buf[512..604]), stored);

        let array = &buf[1024..1024 + 128 * 128];
        assert_eq!(crc32(array), le32(&buf, 600));
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let buf = build_gpt(&sample_parts(), DISK_SECTORS);
        assert!(find_partition(&buf, "KERNEL").is_some());
        assert!(find_partition(&buf, "boot").is_none());
    }

    #[test]
    fn grow_partition_keeps_zero_size() {
        let parts = vec![Partition {
            name: "rootfs".to_string(),
            offset: 0x40000,
            size: 0,
        }];
        let buf = build_gpt(&parts, DISK_SECTORS);
        let (start, end) = find_partition(&buf, "rootfs").unwrap();
        assert_eq!(start, 0x40000);
        assert_eq!(end, 0x3ffff);
    }

    #[test]
    fn unused_entries_are_skipped() {
        let mut buf = build_gpt(&sample_parts(), DISK_SECTORS);
        for b in &mut buf[1024..1024 + 16] {
            *b = 0;
        }
        let listed = list_partitions(&buf);
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "rootfs");
        assert_eq!(listed[0].first_lba, 0x18000);
    }

    #[test]
    fn short_buffer_is_not_a_table() {
        let buf = build_gpt(&sample_parts(), DISK_SECTORS);
        assert!(is_gpt(&buf));
        assert!(!is_gpt(&buf[..512]));
        assert!(list_partitions(&buf[..33 * 512]).is_empty());
    }

    #[test]
    fn header_stride_and_count_are_honored() {
        let mut buf = build_gpt(&sample_parts(), DISK_SECTORS);
        // Doubling the stride makes the scan land on the empty slot after
        // entry 0, so only the first partition remains visible.
        put_le32(&mut buf, 596, 256);
        let listed = list_partitions(&buf);
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "kernel");

        // An absurd count must stop at the end of the buffer.
        put_le32(&mut buf, 596, 128);
        put_le32(&mut buf, 592, u32::MAX);
        assert_eq!(list_partitions(&buf).len(), 2);
    }

    #[test]
    fn long_names_truncate_at_35_units() {
        let long = "a".repeat(40);
        let parts = vec![Partition {
            name: long.clone(),
            offset: 64,
            size: 64,
        }];
        let buf = build_gpt(&parts, DISK_SECTORS);
        let listed = list_partitions(&buf);
        assert_eq!(listed[0].name, long[..35]);
        assert!(find_partition(&buf, &long[..35]).is_some());
    }

    #[test]
    fn rebuilt_tables_are_byte_stable() {
        let a = build_gpt(&sample_parts(), DISK_SECTORS);
        let b = build_gpt(&sample_parts(), DISK_SECTORS);
        assert_eq!(a, b);

        // Unique GUIDs carry RFC 4122 version and variant bits.
        let entry = &a[1024..1152];
        assert_eq!(entry[16 + 7] & 0xf0, 0x40);
        assert_eq!(entry[16 + 8] & 0xc0, 0x80);
    }
}
