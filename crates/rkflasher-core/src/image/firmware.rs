//! "RKFW" firmware container
//!
//! An update image wraps a boot image and a firmware region in a
//! 102-byte header, followed by an MD5 digest of everything before it
//! (plus a signature blob on signed images). Firmware offsets are
//! 32-bit unless the reserved area carries the "HI" marker, which adds
//! the upper 32 bits of the firmware end for images past 4 GiB.

use alloc::vec::Vec;

use super::boot::{BootImage, ReleaseTime};
use super::{le16, le32};
use crate::error::{Error, FormatError, Result};

/// Firmware container header length in bytes.
pub const FIRMWARE_HEADER_LEN: usize = 102;

/// "RKFW" header tag.
pub const TAG_RKFW: u32 = 0x5746_4B52;

/// OS type stored in the reserved area: plain RK OS.
pub const OS_TYPE_RKOS: u32 = 0;

/// OS type stored in the reserved area: Android.
pub const OS_TYPE_ANDROID: u32 = 1;

/// A parsed firmware container, or a bare boot image presented as one.
#[derive(Debug)]
pub struct FirmwareImage {
    data: Vec<u8>,
    boot: BootImage,
    version: u32,
    merge_version: u32,
    release_time: ReleaseTime,
    supported_chip: u32,
    os_type: u32,
    backup_size: u16,
    boot_offset: u32,
    boot_size: u32,
    fw_offset: u32,
    fw_size: u64,
    md5: [u8; 32],
    signature: Option<Vec<u8>>,
}

impl FirmwareImage {
    /// Parse an "RKFW" container, taking ownership of its bytes.
    ///
    /// The embedded boot image must itself validate or the whole load
    /// fails.
    pub fn parse(data: Vec<u8>) -> Result<Self> {
        if data.len() < FIRMWARE_HEADER_LEN {
            return Err(Error::Format(FormatError::Truncated));
        }
        if le32(&data, 0) != TAG_RKFW {
            return Err(Error::Format(FormatError::BadMagic));
        }

        let boot_offset = le32(&data, 25);
        let boot_size = le32(&data, 29);
        let fw_offset = le32(&data, 33);
        let fw_size = le32(&data, 37);

        // Reserved area at 41: OS type at +4, backup size at +12, the
        // "HI" 64-bit extension marker at +14 with its upper half at +16.
        let reserved = &data[41..FIRMWARE_HEADER_LEN];
        let fw_end = if reserved[14] == b'H' && reserved[15] == b'I' {
            ((le32(reserved, 16) as u64) << 32) + fw_offset as u64 + fw_size as u64
        } else {
            fw_offset as u64 + fw_size as u64
        };
        if fw_end > data.len() as u64 {
            return Err(Error::Format(FormatError::OutOfBounds));
        }

        let trailing = data.len() - fw_end as usize;
        let mut md5 = [0u8; 32];
        let signature = if trailing >= 160 {
            let sign_start = fw_end as usize + 32;
            md5.copy_from_slice(&data[fw_end as usize..sign_start]);
            Some(data[sign_start..].to_vec())
        } else {
            if data.len() < 32 {
                return Err(Error::Format(FormatError::Truncated));
            }
            md5.copy_from_slice(&data[data.len() - 32..]);
            None
        };

        let boot_end = (boot_offset as usize)
            .checked_add(boot_size as usize)
            .ok_or(Error::Format(FormatError::OutOfBounds))?;
        if boot_end > data.len() {
            return Err(Error::Format(FormatError::OutOfBounds));
        }
        let boot = BootImage::parse(data[boot_offset as usize..boot_end].to_vec())?;

        Ok(Self {
            boot,
            version: le32(&data, 6),
            merge_version: le32(&data, 10),
            release_time: ReleaseTime::parse(&data, 14),
            supported_chip: le32(&data, 21),
            os_type: le32(reserved, 4),
            backup_size: le16(reserved, 12),
            boot_offset,
            boot_size,
            fw_offset,
            fw_size: fw_end - fw_offset as u64,
            md5,
            signature,
            data,
        })
    }

    /// Present a bare boot image (a loader `.bin`) as a container with
    /// an empty firmware region.
    pub fn parse_boot_only(data: Vec<u8>) -> Result<Self> {
        let boot = BootImage::parse(data.clone())?;
        let supported_chip = boot.supported_chip();
        Ok(Self {
            boot_offset: 0,
            boot_size: data.len() as u32,
            fw_offset: 0,
            fw_size: 0,
            version: 0,
            merge_version: 0,
            release_time: ReleaseTime::default(),
            supported_chip,
            os_type: OS_TYPE_RKOS,
            backup_size: 0,
            md5: [0u8; 32],
            signature: None,
            boot,
            data,
        })
    }

    /// The embedded boot image.
    pub fn boot(&self) -> &BootImage {
        &self.boot
    }

    /// Container version as stored, zero for bare boot images.
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

    /// Raw supported-chip discriminant.
    pub fn supported_chip(&self) -> u32 {
        self.supported_chip
    }

    /// OS type from the reserved area.
    pub fn os_type(&self) -> u32 {
        self.os_type
    }

    /// Backup size from the reserved area.
    pub fn backup_size(&self) -> u16 {
        self.backup_size
    }

    /// Offset of the embedded boot image.
    pub fn boot_offset(&self) -> u32 {
        self.boot_offset
    }

    /// Size of the embedded boot image in bytes.
    pub fn boot_size(&self) -> u32 {
        self.boot_size
    }

    /// Offset of the firmware region.
    pub fn fw_offset(&self) -> u32 {
        self.fw_offset
    }

    /// Size of the firmware region in bytes, after the "HI" extension.
    pub fn fw_size(&self) -> u64 {
        self.fw_size
    }

    /// The firmware region.
    pub fn firmware_region(&self) -> &[u8] {
        let start = self.fw_offset as usize;
        &self.data[start..start + self.fw_size as usize]
    }

    /// MD5 digest trailing the firmware region.
    pub fn md5(&self) -> &[u8; 32] {
        &self.md5
    }

    /// Signature blob of a signed image.
    pub fn signature(&self) -> Option<&[u8]> {
        self.signature.as_deref()
    }

    /// Whole container length in bytes.
    pub fn image_len(&self) -> u64 {
        self.data.len() as u64
    }
}

#[cfg(feature = "std")]
impl FirmwareImage {
    /// Load an image file. Files with a `.bin` extension are treated as
    /// bare boot images; everything else must be an "RKFW" container.
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        let bare = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("bin"));
        if bare {
            Self::parse_boot_only(data)
        } else {
            Self::parse(data)
        }
    }

    /// Write the embedded boot image out as a standalone file.
    pub fn save_boot(&self, path: &std::path::Path) -> Result<()> {
        let start = self.boot_offset as usize;
        let end = start + self.boot_size as usize;
        std::fs::write(path, &self.data[start..end])?;
        Ok(())
    }

    /// Write the firmware region out as a standalone file.
    pub fn save_firmware(&self, path: &std::path::Path) -> Result<()> {
        std::fs::write(path, self.firmware_region())?;
        Ok(())
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::crc::crc32_boot;
    use crate::image::boot::{BOOT_HEADER_LEN, TAG_BOOT};
    use crate::image::{put_le16, put_le32};
    use alloc::vec;

    fn minimal_boot() -> Vec<u8> {
        let mut data = vec![0u8; BOOT_HEADER_LEN + 4];
        put_le32(&mut data, 0, TAG_BOOT);
        put_le32(&mut data, 21, 0x60); // supported chip
        let body = data.len() - 4;
        let crc = crc32_boot(&data[..body]);
        put_le32(&mut data, body, crc);
        data
    }

    /// Header + boot blob + empty firmware region + `trailing` tail
    /// bytes.
    fn make_rkfw(trailing: usize) -> Vec<u8> {
        let boot = minimal_boot();
        let boot_offset = FIRMWARE_HEADER_LEN as u32;
        let fw_offset = boot_offset + boot.len() as u32;
        let mut data = vec![0u8; fw_offset as usize + trailing];

        put_le32(&mut data, 0, TAG_RKFW);
        put_le16(&mut data, 4, FIRMWARE_HEADER_LEN as u16);
        put_le32(&mut data, 6, 0x0800_0000); // version
        put_le16(&mut data, 14, 2024);
        put_le32(&mut data, 21, 0x60);
        put_le32(&mut data, 25, boot_offset);
        put_le32(&mut data, 29, boot.len() as u32);
        put_le32(&mut data, 33, fw_offset);
        put_le32(&mut data, 37, 0); // fw size
        put_le32(&mut data, 45, OS_TYPE_ANDROID); // reserved + 4

        data[boot_offset as usize..fw_offset as usize].copy_from_slice(&boot);
        for (i, b) in data[fw_offset as usize..].iter_mut().enumerate() {
            *b = i as u8;
        }
        data
    }

    #[test]
    fn parses_plain_container() {
        let fw = FirmwareImage::parse(make_rkfw(32)).unwrap();
        assert_eq!(fw.version(), 0x0800_0000);
        assert_eq!(fw.os_type(), OS_TYPE_ANDROID);
        assert_eq!(fw.fw_size(), 0);
        assert!(fw.signature().is_none());
        assert_eq!(fw.md5()[0], 0);
        assert_eq!(fw.boot().supported_chip(), 0x60);
    }

    #[test]
    fn long_tail_means_signed() {
        let fw = FirmwareImage::parse(make_rkfw(160)).unwrap();
        assert_eq!(fw.md5()[0], 0);
        assert_eq!(fw.md5()[31], 31);
        let sig = fw.signature().unwrap();
        assert_eq!(sig.len(), 128);
        assert_eq!(sig[0], 32);
    }

    #[test]
    fn rejects_wrong_tag() {
        let mut data = make_rkfw(32);
        put_le32(&mut data, 0, TAG_BOOT);
        assert_eq!(
            FirmwareImage::parse(data).unwrap_err(),
            Error::Format(FormatError::BadMagic)
        );
    }

    #[test]
    fn hi_marker_extends_firmware_end() {
        let mut data = make_rkfw(32);
        data[41 + 14] = b'H';
        data[41 + 15] = b'I';
        put_le32(&mut data, 41 + 16, 1); // upper half pushes the end past the buffer
        assert_eq!(
            FirmwareImage::parse(data).unwrap_err(),
            Error::Format(FormatError::OutOfBounds)
        );
    }

    #[test]
    fn corrupt_embedded_boot_fails_load() {
        let mut data = make_rkfw(32);
        data[FIRMWARE_HEADER_LEN + 10] ^= 0xFF; // inside the boot blob
        assert_eq!(
            FirmwareImage::parse(data).unwrap_err(),
            Error::Format(FormatError::CrcMismatch)
        );
    }

    #[test]
    fn saves_boot_region() {
        let fw = FirmwareImage::parse(make_rkfw(32)).unwrap();
        let path = std::env::temp_dir().join("rkflasher-save-boot-test.bin");
        fw.save_boot(&path).unwrap();
        let saved = std::fs::read(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(saved, minimal_boot());
    }

    #[test]
    fn bare_boot_image_wraps_cleanly() {
        let fw = FirmwareImage::parse_boot_only(minimal_boot()).unwrap();
        assert_eq!(fw.boot_offset(), 0);
        assert_eq!(fw.boot_size(), (BOOT_HEADER_LEN + 4) as u32);
        assert_eq!(fw.fw_size(), 0);
        assert_eq!(fw.supported_chip(), 0x60);
        assert_eq!(fw.os_type(), OS_TYPE_RKOS);
    }
}
