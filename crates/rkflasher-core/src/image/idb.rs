//! ID block builders
//!
//! The boot ROM reads its bootstrap region from a fixed layout at a
//! well-known LBA. Two generations exist: the legacy four-sector block
//! (parameter sectors, then the DDR-init and loader-code payloads) and
//! the "new" block that simply concatenates the FlashHead, FlashData
//! and FlashBoot loader entries.
//!
//! The RC4 inclusion pattern of the legacy block is a device-side
//! contract: payload sectors are obfuscated per 512-byte unit of their
//! raw length, and of the parameter sectors 0, 2 and 3 are obfuscated
//! whole while sector 1 stays clear.

use alloc::vec;
use alloc::vec::Vec;

use super::{put_le16, put_le32};
use crate::crc::{crc16_ccitt, crc32_boot, rc4_apply, rc4_units};

/// Sector length of the ID block layout.
pub const IDB_SECTOR_LEN: usize = 512;

/// Tag opening parameter sector 0.
const SECTOR0_TAG: u32 = 0x0FF0_AA55;

/// "RK28" chip tag in parameter sector 1.
const SECTOR1_CHIP_TAG: u32 = 0x3832_4B52;

/// Sector count of a loader payload, aligned up to 2 KiB.
pub fn aligned_sectors(len: usize) -> usize {
    (len + 2047) / 2048 * 2048 / IDB_SECTOR_LEN
}

fn make_sector0(rc4: bool, data_sectors: u16, code_sectors: u16) -> [u8; IDB_SECTOR_LEN] {
    let mut sec = [0u8; IDB_SECTOR_LEN];
    put_le32(&mut sec, 0, SECTOR0_TAG);
    put_le32(&mut sec, 8, rc4 as u32);
    put_le16(&mut sec, 12, 4); // first boot code at sector 4
    put_le16(&mut sec, 14, 4);
    put_le16(&mut sec, 506, data_sectors);
    put_le16(&mut sec, 508, data_sectors + code_sectors);
    sec
}

fn make_sector1() -> [u8; IDB_SECTOR_LEN] {
    let mut sec = [0u8; IDB_SECTOR_LEN];
    put_le16(&mut sec, 0, 0x000C); // system reserved blocks
    put_le16(&mut sec, 2, 0xFFFF); // disk 0 size
    put_le32(&mut sec, 10, SECTOR1_CHIP_TAG);
    sec
}

fn make_sector2() -> [u8; IDB_SECTOR_LEN] {
    let mut sec = [0u8; IDB_SECTOR_LEN];
    sec[491] = b'V';
    sec[492] = b'C';
    sec[506..509].copy_from_slice(b"CRC");
    sec
}

/// Build the legacy four-sector ID block around the DDR-init and
/// loader-code payloads.
///
/// `rc4` both stamps sector 0's flag and selects payload obfuscation;
/// it is set when the source image does NOT carry the rc4-disable flag,
/// meaning its entries still need the transform the ROM expects.
pub fn build_legacy_idb(ddr: &[u8], loader: &[u8], rc4: bool) -> Vec<u8> {
    let data_sectors = aligned_sectors(ddr.len());
    let code_sectors = aligned_sectors(loader.len());
    let mut idb = vec![0u8; (4 + data_sectors + code_sectors) * IDB_SECTOR_LEN];

    let sector0 = make_sector0(rc4, data_sectors as u16, code_sectors as u16);
    let sector1 = make_sector1();
    let sector3 = [0u8; IDB_SECTOR_LEN];
    let mut sector2 = make_sector2();

    // Sector CRCs cover the clear parameter sectors, before any RC4.
    put_le16(&mut sector2, 494, crc16_ccitt(&sector0));
    put_le16(&mut sector2, 496, crc16_ccitt(&sector1));
    put_le16(&mut sector2, 510, crc16_ccitt(&sector3));

    idb[..IDB_SECTOR_LEN].copy_from_slice(&sector0);
    idb[IDB_SECTOR_LEN..2 * IDB_SECTOR_LEN].copy_from_slice(&sector1);
    // Sector 2 lands once the boot-code CRC is known; sector 3 stays
    // zero.

    let data_at = 4 * IDB_SECTOR_LEN;
    let code_at = (4 + data_sectors) * IDB_SECTOR_LEN;
    idb[data_at..data_at + ddr.len()].copy_from_slice(ddr);
    idb[code_at..code_at + loader.len()].copy_from_slice(loader);
    if rc4 {
        rc4_units(&mut idb[data_at..data_at + ddr.len()]);
        rc4_units(&mut idb[code_at..code_at + loader.len()]);
    }

    // Boot-code CRC covers the whole aligned payload region as written,
    // padding included.
    let code_region = (data_sectors + code_sectors) * IDB_SECTOR_LEN;
    put_le32(
        &mut sector2,
        498,
        crc32_boot(&idb[data_at..data_at + code_region]),
    );
    idb[2 * IDB_SECTOR_LEN..3 * IDB_SECTOR_LEN].copy_from_slice(&sector2);

    for sector in 0..4 {
        if sector == 1 {
            continue;
        }
        rc4_apply(&mut idb[sector * IDB_SECTOR_LEN..(sector + 1) * IDB_SECTOR_LEN]);
    }
    idb
}

/// Build the "new" ID block: FlashHead, FlashData and FlashBoot
/// concatenated at 2 KiB-aligned sector boundaries.
///
/// `rc4` is set when the source image carries the rc4-disable flag, so
/// its clear entries still need the transform before the ROM reads
/// them.
pub fn build_new_idb(head: &[u8], ddr: &[u8], loader: &[u8], rc4: bool) -> Vec<u8> {
    let head_sectors = aligned_sectors(head.len());
    let data_sectors = aligned_sectors(ddr.len());
    let code_sectors = aligned_sectors(loader.len());
    let mut idb = vec![0u8; (head_sectors + data_sectors + code_sectors) * IDB_SECTOR_LEN];

    let data_at = head_sectors * IDB_SECTOR_LEN;
    let code_at = (head_sectors + data_sectors) * IDB_SECTOR_LEN;
    idb[..head.len()].copy_from_slice(head);
    idb[data_at..data_at + ddr.len()].copy_from_slice(ddr);
    idb[code_at..code_at + loader.len()].copy_from_slice(loader);
    if rc4 {
        rc4_units(&mut idb[..head.len()]);
        rc4_units(&mut idb[data_at..data_at + ddr.len()]);
        rc4_units(&mut idb[code_at..code_at + loader.len()]);
    }
    idb
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::image::{le16, le32};

    fn clear_sector(idb: &[u8], index: usize) -> [u8; IDB_SECTOR_LEN] {
        let mut sec = [0u8; IDB_SECTOR_LEN];
        sec.copy_from_slice(&idb[index * IDB_SECTOR_LEN..(index + 1) * IDB_SECTOR_LEN]);
        if index != 1 {
            rc4_apply(&mut sec);
        }
        sec
    }

    #[test]
    fn alignment_rounds_to_2k() {
        assert_eq!(aligned_sectors(0), 0);
        assert_eq!(aligned_sectors(1), 4);
        assert_eq!(aligned_sectors(2048), 4);
        assert_eq!(aligned_sectors(2049), 8);
    }

    #[test]
    fn legacy_block_layout() {
        let ddr = vec![0x11u8; 600];
        let loader = vec![0x22u8; 100];
        let idb = build_legacy_idb(&ddr, &loader, true);
        // 4 parameter sectors + 4 DDR + 4 code
        assert_eq!(idb.len(), 12 * IDB_SECTOR_LEN);

        let sec0 = clear_sector(&idb, 0);
        assert_eq!(le32(&sec0, 0), 0x0FF0_AA55);
        assert_eq!(le32(&sec0, 8), 1);
        assert_eq!(le16(&sec0, 12), 4);
        assert_eq!(le16(&sec0, 506), 4); // data sectors
        assert_eq!(le16(&sec0, 508), 8); // data + code sectors
    }

    #[test]
    fn sector_one_stays_clear() {
        let idb = build_legacy_idb(&[0x11u8; 512], &[0x22u8; 512], true);
        assert_eq!(le16(&idb, 512), 0x000C);
        assert_eq!(le16(&idb, 514), 0xFFFF);
        assert_eq!(le32(&idb, 522), 0x3832_4B52);
    }

    #[test]
    fn sector_crcs_cover_clear_sectors() {
        let idb = build_legacy_idb(&[0x11u8; 512], &[0x22u8; 512], true);
        let sec0 = clear_sector(&idb, 0);
        let sec2 = clear_sector(&idb, 2);
        assert_eq!(le16(&sec2, 494), crc16_ccitt(&sec0));
        assert_eq!(le16(&sec2, 496), crc16_ccitt(&idb[512..1024]));
        assert_eq!(le16(&sec2, 510), crc16_ccitt(&[0u8; IDB_SECTOR_LEN]));
        assert_eq!(sec2[491], b'V');
        assert_eq!(&sec2[506..509], b"CRC");
    }

    #[test]
    fn boot_code_crc_matches_written_region() {
        let idb = build_legacy_idb(&[0x11u8; 2048], &[0x22u8; 2048], true);
        let sec2 = clear_sector(&idb, 2);
        assert_eq!(le32(&sec2, 498), crc32_boot(&idb[2048..2048 + 8 * 512]));
    }

    #[test]
    fn legacy_without_rc4_keeps_payload_verbatim() {
        let ddr = vec![0x33u8; 700];
        let idb = build_legacy_idb(&ddr, &[0x44u8; 100], false);
        assert_eq!(&idb[2048..2048 + 700], &ddr[..]);
        let sec0 = clear_sector(&idb, 0);
        assert_eq!(le32(&sec0, 8), 0);
    }

    #[test]
    fn legacy_rc4_only_covers_whole_units() {
        // 700 bytes: one full unit transformed, the 188-byte tail as-is.
        let ddr = vec![0x33u8; 700];
        let idb = build_legacy_idb(&ddr, &[], true);
        assert_ne!(&idb[2048..2048 + 512], &ddr[..512]);
        assert_eq!(&idb[2048 + 512..2048 + 700], &ddr[512..]);
    }

    #[test]
    fn new_block_concatenates_at_aligned_offsets() {
        let head = vec![0x55u8; 2048];
        let ddr = vec![0x66u8; 1000];
        let loader = vec![0x77u8; 100];
        let idb = build_new_idb(&head, &ddr, &loader, false);
        assert_eq!(idb.len(), 12 * IDB_SECTOR_LEN);
        assert_eq!(&idb[..2048], &head[..]);
        assert_eq!(&idb[2048..2048 + 1000], &ddr[..]);
        assert_eq!(&idb[4096..4096 + 100], &loader[..]);
    }

    #[test]
    fn new_block_rc4_roundtrips() {
        let head = vec![0x55u8; 2048];
        let idb = build_new_idb(&head, &[], &[], true);
        assert_ne!(&idb[..2048], &head[..]);
        let mut restored = idb.clone();
        rc4_units(&mut restored[..2048]);
        assert_eq!(&restored[..2048], &head[..]);
    }
}
