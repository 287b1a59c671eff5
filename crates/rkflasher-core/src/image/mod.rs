//! Binary container formats of the provisioning pipeline
//!
//! Four formats meet here: the boot image entry container holding the
//! Maskrom download stages and flash loader pieces, the "RKFW" firmware
//! container wrapping one, the Android sparse image, and the legacy
//! four-sector ID block. Everything is little-endian unless a byte-swap
//! quirk is called out. The parsers own their bytes and bounds-check
//! every header-declared region rather than trusting the header.

pub mod boot;
pub mod firmware;
pub mod idb;
pub mod sparse;

pub use boot::{BootEntry, BootImage, EntryKind, ReleaseTime};
pub use firmware::FirmwareImage;

pub(crate) fn le16(buf: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([buf[off], buf[off + 1]])
}

pub(crate) fn le32(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

pub(crate) fn le64(buf: &[u8], off: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&buf[off..off + 8]);
    u64::from_le_bytes(raw)
}

pub(crate) fn put_le16(buf: &mut [u8], off: usize, value: u16) {
    buf[off..off + 2].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn put_le32(buf: &mut [u8], off: usize, value: u32) {
    buf[off..off + 4].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn put_le64(buf: &mut [u8], off: usize, value: u64) {
    buf[off..off + 8].copy_from_slice(&value.to_le_bytes());
}
