//! Checksum and obfuscation helpers
//!
//! Three unrelated CRC flavors coexist in the Rockchip formats: the
//! reflected CRC-32 stamped into GPT headers, the vendor's MSB-first
//! CRC-32 variant sealing boot images, and CRC-16/CCITT trailing vendor
//! control requests. Keep them apart; none is interchangeable with
//! another.

/// Streaming reflected CRC-32 (polynomial 0xEDB88320), as used by GPT.
///
/// Streaming matters here: a GPT header is checksummed with its own CRC
/// field zeroed, then the entry array separately.
pub struct Crc32 {
    value: u32,
}

impl Crc32 {
    /// Start a new checksum (seed 0xFFFFFFFF).
    pub fn new() -> Self {
        Self { value: 0xFFFF_FFFF }
    }

    /// Feed more bytes into the checksum.
    pub fn update(&mut self, data: &[u8]) {
        for &byte in data {
            self.value ^= byte as u32;
            for _ in 0..8 {
                let mask = (self.value & 1).wrapping_neg();
                self.value = (self.value >> 1) ^ (0xEDB8_8320 & mask);
            }
        }
    }

    /// Finish and return the checksum (final xor 0xFFFFFFFF).
    pub fn finalize(self) -> u32 {
        self.value ^ 0xFFFF_FFFF
    }
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot reflected CRC-32 over `data`.
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = Crc32::new();
    crc.update(data);
    crc.finalize()
}

/// Vendor CRC-32 sealing boot images and the ID-block boot code.
///
/// MSB-first with polynomial 0x04C10DB7 (the vendor's variant of the
/// standard 0x04C11DB7), zero init, no final xor.
pub fn crc32_boot(data: &[u8]) -> u32 {
    let mut crc = 0u32;
    for &byte in data {
        crc ^= (byte as u32) << 24;
        for _ in 0..8 {
            if crc & 0x8000_0000 != 0 {
                crc = (crc << 1) ^ 0x04C1_0DB7;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

/// CRC-16/CCITT (polynomial 0x1021, init 0xFFFF, MSB-first).
pub fn crc16_ccitt(data: &[u8]) -> u16 {
    let mut crc = 0xFFFFu16;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

/// Wrapping byte sum, the checksum of the "PARM" parameter blob.
pub fn byte_sum(data: &[u8]) -> u32 {
    data.iter().fold(0u32, |acc, &b| acc.wrapping_add(b as u32))
}

/// Fixed vendor RC4 key. Obfuscation only; this is not a security boundary.
const RC4_KEY: [u8; 16] = [
    124, 78, 3, 4, 85, 5, 9, 7, 45, 44, 123, 56, 23, 13, 23, 17,
];

/// Apply the vendor RC4 keystream to `data` in place.
///
/// The keystream starts fresh on every call; applying twice restores the
/// original bytes.
pub fn rc4_apply(data: &mut [u8]) {
    let mut s = [0u8; 256];
    for (i, v) in s.iter_mut().enumerate() {
        *v = i as u8;
    }
    let mut j = 0u8;
    for i in 0..256 {
        j = j
            .wrapping_add(s[i])
            .wrapping_add(RC4_KEY[i % RC4_KEY.len()]);
        s.swap(i, j as usize);
    }

    let mut x = 0u8;
    let mut y = 0u8;
    for byte in data.iter_mut() {
        x = x.wrapping_add(1);
        y = y.wrapping_add(s[x as usize]);
        s.swap(x as usize, y as usize);
        let k = s[s[x as usize].wrapping_add(s[y as usize]) as usize];
        *byte ^= k;
    }
}

/// Restart the RC4 keystream for every complete 512-byte unit of `data`.
///
/// The device expects per-sector obfuscation. A trailing partial unit is
/// left untouched, matching the vendor's whole-unit loops.
pub fn rc4_units(data: &mut [u8]) {
    let full = data.len() / 512 * 512;
    for chunk in data[..full].chunks_exact_mut(512) {
        rc4_apply(chunk);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc16_reference_vector() {
        assert_eq!(crc16_ccitt(b"123456789"), 0x29B1);
    }

    #[test]
    fn boot_crc_reference_vector() {
        assert_eq!(crc32_boot(&[1, 2, 3, 4]), 0x9F99_91C6);
    }

    #[test]
    fn crc32_check_value() {
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn crc32_streaming_matches_one_shot() {
        let data = b"EFI PART streaming vector";
        let mut streaming = Crc32::new();
        streaming.update(&data[..7]);
        streaming.update(&data[7..]);
        assert_eq!(streaming.finalize(), crc32(data));
    }

    #[test]
    fn rc4_double_application_restores() {
        let mut data = [0u8; 1024];
        for (i, b) in data.iter_mut().enumerate() {
            *b = i as u8;
        }
        let original = data;
        rc4_units(&mut data);
        assert_ne!(data[..], original[..]);
        rc4_units(&mut data);
        assert_eq!(data[..], original[..]);
    }

    #[test]
    fn rc4_units_skip_partial_tail() {
        let mut data = [0xAAu8; 600];
        rc4_units(&mut data);
        assert_ne!(data[..512], [0xAA; 512][..]);
        assert_eq!(data[512..], [0xAA; 88][..]);
    }

    #[test]
    fn byte_sum_is_wrapping() {
        assert_eq!(byte_sum(&[1, 2, 3]), 6);
        assert_eq!(byte_sum(&[0xFF; 4]), 0x3FC);
    }
}
