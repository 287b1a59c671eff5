//! `parameter` blob parsing and construction.
//!
//! The parameter blob is plain ASCII key/value text wrapped in a small
//! on-flash frame: a "PARM" magic, the text length, the text itself and a
//! 32-bit byte-sum trailer. The partition layout hides inside the `CMDLINE`
//! value as an `mtdparts=` list of `size@offset(name[:flags])` tokens, with
//! sizes and offsets counted in 512-byte sectors.

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use crate::crc::byte_sum;
use crate::error::FormatError;
use crate::image::{le32, put_le32};

/// Magic identifying a parameter blob ("PARM" read as little-endian).
pub const PARAMETER_MAGIC: u32 = 0x4D52_4150;

/// One partition from an `mtdparts=` list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    /// Partition name, with any `:flags` suffix stripped.
    pub name: String,
    /// Start offset in sectors.
    pub offset: u32,
    /// Size in sectors. Zero for a grow partition (`-` size) whose real
    /// extent is only known once the disk size is.
    pub size: u32,
}

fn parse_number(text: &str) -> Option<u32> {
    match text.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

fn parse_token(token: &str) -> Option<Partition> {
    let at = token.find('@')?;
    let open = token.find('(')?;
    let close = token.rfind(')')?;
    if at > open || open > close {
        return None;
    }

    let size_text = token[..at].trim();
    let offset_text = token[at + 1..open].trim();
    let mut name = token[open + 1..close].trim();
    if let Some(colon) = name.find(':') {
        name = &name[..colon];
    }

    let size = if size_text == "-" {
        0
    } else {
        parse_number(size_text)?
    };
    let offset = parse_number(offset_text)?;

    Some(Partition {
        name: String::from(name),
        offset,
        size,
    })
}

/// Extract the partition list from parameter text.
///
/// Looks for `mtdparts=`, skips the `name:` device prefix if one is
/// present and parses the comma-separated tokens after it. Tokens that do
/// not parse are skipped rather than failing the whole list.
pub fn parse_partitions(parameter: &str) -> Vec<Partition> {
    let marker = "mtdparts=";
    let mut tail = match parameter.find(marker) {
        Some(pos) => &parameter[pos + marker.len()..],
        None => return Vec::new(),
    };
    if let Some(colon) = tail.find(':') {
        tail = &tail[colon + 1..];
    }
    tail.split(',').filter_map(parse_token).collect()
}

/// Frame parameter text into the on-flash blob, padded to whole sectors.
pub fn build_parameter(parameter: &str) -> Vec<u8> {
    let content = parameter.as_bytes();
    let padded = (content.len() + 12 + 511) / 512 * 512;
    let mut buf = vec![0u8; padded];

    put_le32(&mut buf, 0, PARAMETER_MAGIC);
    put_le32(&mut buf, 4, content.len() as u32);
    buf[8..8 + content.len()].copy_from_slice(content);
    let sum = byte_sum(&buf[..content.len() + 8]);
    put_le32(&mut buf, content.len() + 8, sum);
    buf
}

/// Recover the text from a parameter blob read back off the device.
///
/// The stored length is clamped to the buffer so a corrupt length field
/// cannot read past the end. The trailing byte-sum is not checked.
pub fn parameter_text(buf: &[u8]) -> Result<String, FormatError> {
    if buf.len() < 12 {
        return Err(FormatError::Truncated);
    }
    if le32(buf, 0) != PARAMETER_MAGIC {
        return Err(FormatError::BadMagic);
    }
    let mut length = le32(buf, 4) as usize;
    if length > buf.len() - 8 {
        length = buf.len() - 8;
    }
    Ok(String::from_utf8_lossy(&buf[8..8 + length]).into_owned())
}

/// Look up one partition by name in a parameter blob, case-insensitively.
pub fn find_partition(buf: &[u8], name: &str) -> Option<Partition> {
    let text = parameter_text(buf).ok()?;
    parse_partitions(&text)
        .into_iter()
        .find(|part| part.name.eq_ignore_ascii_case(name))
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    const SAMPLE: &str = "FIRMWARE_VER: 6.0.0\n\
                          MACHINE_MODEL: RK3399\n\
                          CMDLINE: mtdparts=rk29xxnand:0x00001f40@0x00000040(loader1),\
                          0x00002000@0x00004000(loader2),-@0x0040000(rootfs:grow)";

    #[test]
    fn parses_sample_cmdline() {
        let parts = parse_partitions(SAMPLE);
        assert_eq!(parts.len(), 3);

        assert_eq!(parts[0].name, "loader1");
        assert_eq!(parts[0].offset, 0x40);
        assert_eq!(parts[0].size, 0x1f40);

        assert_eq!(parts[2].name, "rootfs");
        assert_eq!(parts[2].offset, 0x40000);
        assert_eq!(parts[2].size, 0);
    }

    #[test]
    fn decimal_values_parse() {
        let parts = parse_partitions("mtdparts=nand:8192@16384(data)");
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].offset, 16384);
        assert_eq!(parts[0].size, 8192);
    }

    #[test]
    fn malformed_tokens_are_skipped() {
        let parts = parse_partitions(
            "mtdparts=nand:oops,0x20@0x40(good),16q@2(bad),(misplaced)0x10@0x20",
        );
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].name, "good");
    }

    #[test]
    fn missing_mtdparts_yields_nothing() {
        assert!(parse_partitions("CMDLINE: console=ttyS2").is_empty());
    }

    #[test]
    fn build_roundtrips_text() {
        let buf = build_parameter(SAMPLE);
        assert_eq!(buf.len() % 512, 0);
        assert!(buf.len() >= SAMPLE.len() + 12);
        assert_eq!(le32(&buf, 0), PARAMETER_MAGIC);
        assert_eq!(le32(&buf, 4) as usize, SAMPLE.len());
        assert_eq!(parameter_text(&buf).unwrap(), SAMPLE);
    }

    #[test]
    fn build_places_byte_sum() {
        let buf = build_parameter("CMDLINE: mtdparts=nand:0x20@0x40(boot)");
        let text_len = le32(&buf, 4) as usize;
        let stored = le32(&buf, text_len + 8);
        assert_eq!(stored, byte_sum(&buf[..text_len + 8]));
        assert_ne!(stored, 0);
    }

    #[test]
    fn find_partition_is_case_insensitive() {
        let buf = build_parameter(SAMPLE);
        let part = find_partition(&buf, "LOADER1").unwrap();
        assert_eq!(part.offset, 0x40);
        assert_eq!(part.size, 0x1f40);
        assert!(find_partition(&buf, "loader3").is_none());
    }

    #[test]
    fn oversized_length_field_is_clamped() {
        let mut buf = build_parameter("CMDLINE: x");
        put_le32(&mut buf, 4, 0xffff_ffff);
        let text = parameter_text(&buf).unwrap();
        assert_eq!(text.len(), buf.len() - 8);
    }

    #[test]
    fn bad_frames_are_rejected() {
        assert_eq!(parameter_text(&[0u8; 4]), Err(FormatError::Truncated));
        assert_eq!(parameter_text(&[0u8; 512]), Err(FormatError::BadMagic));
        assert!(find_partition(&[0u8; 512], "boot").is_none());
    }
}
