//! Command and status wrapper frames

use crate::error::{Error, FormatError, Result};
use crate::protocol::{Direction, Opcode};

/// Serialized length of a command block wrapper
pub const CBW_LEN: usize = 31;
/// Serialized length of a command status wrapper
pub const CSW_LEN: usize = 13;

/// Command block signature, "USBC" as a little-endian word
pub const CBW_SIGNATURE: u32 = 0x4342_5355;
/// Command status signature, "USBS" as a little-endian word
pub const CSW_SIGNATURE: u32 = 0x5342_5355;

/// A 31-byte command block wrapper
///
/// `address` and `length` hold the logical sector position and count;
/// serialization byte-reverses both relative to the little-endian frame
/// around them. The device applies the identical reversal, so encode and
/// decode share one transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cbw {
    /// Token the matching status frame must echo
    pub tag: u32,
    /// Bytes moved in the data phase
    pub transfer_length: u32,
    /// Direction flag byte
    pub flags: u8,
    /// Logical unit; erase commands route the chip select through it
    pub lun: u8,
    /// Valid command block length
    pub cb_length: u8,
    /// Command opcode byte
    pub opcode: u8,
    /// Sub-code qualifying the opcode
    pub sub_code: u8,
    /// Sector position
    pub address: u32,
    /// Sector count
    pub length: u16,
}

impl Cbw {
    /// Command frame for `opcode` with the direction and block length the
    /// opcode dictates. Position, count and transfer length start at zero.
    pub fn new(opcode: Opcode, tag: u32) -> Self {
        Self {
            tag,
            transfer_length: 0,
            flags: opcode.direction().flags(),
            lun: 0,
            cb_length: opcode.cb_length(),
            opcode: opcode as u8,
            sub_code: 0,
            address: 0,
            length: 0,
        }
    }

    /// Serialize into the on-wire layout
    pub fn to_bytes(&self) -> [u8; CBW_LEN] {
        let mut buf = [0u8; CBW_LEN];
        buf[0..4].copy_from_slice(&CBW_SIGNATURE.to_le_bytes());
        buf[4..8].copy_from_slice(&self.tag.to_le_bytes());
        buf[8..12].copy_from_slice(&self.transfer_length.to_le_bytes());
        buf[12] = self.flags;
        buf[13] = self.lun;
        buf[14] = self.cb_length;
        buf[15] = self.opcode;
        buf[16] = self.sub_code;
        // Byte-reversed within the otherwise little-endian frame
        buf[17..21].copy_from_slice(&self.address.swap_bytes().to_le_bytes());
        buf[22..24].copy_from_slice(&self.length.swap_bytes().to_le_bytes());
        buf
    }

    /// Parse an on-wire frame, validating the signature
    pub fn from_bytes(buf: &[u8; CBW_LEN]) -> Result<Self> {
        let signature = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        if signature != CBW_SIGNATURE {
            return Err(Error::Format(FormatError::BadMagic));
        }
        Ok(Self {
            tag: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
            transfer_length: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
            flags: buf[12],
            lun: buf[13],
            cb_length: buf[14],
            opcode: buf[15],
            sub_code: buf[16],
            address: u32::from_le_bytes([buf[17], buf[18], buf[19], buf[20]]).swap_bytes(),
            length: u16::from_le_bytes([buf[22], buf[23]]).swap_bytes(),
        })
    }

    /// True when the data phase moves device-to-host
    pub fn is_in(&self) -> bool {
        self.flags == Direction::In.flags()
    }
}

/// A 13-byte command status wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Csw {
    /// Signature as read off the wire
    pub signature: u32,
    /// Echo of the command tag
    pub tag: u32,
    /// Residue word; some commands smuggle progress counters through it
    pub data_residue: u32,
    /// Completion status, zero on success
    pub status: u8,
}

impl Csw {
    /// Parse an on-wire frame without judging its validity
    pub fn from_bytes(buf: &[u8; CSW_LEN]) -> Self {
        Self {
            signature: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            tag: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
            data_residue: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
            status: buf[12],
        }
    }

    /// Serialize into the on-wire layout
    pub fn to_bytes(&self) -> [u8; CSW_LEN] {
        let mut buf = [0u8; CSW_LEN];
        buf[0..4].copy_from_slice(&self.signature.to_le_bytes());
        buf[4..8].copy_from_slice(&self.tag.to_le_bytes());
        buf[8..12].copy_from_slice(&self.data_residue.to_le_bytes());
        buf[12] = self.status;
        buf
    }

    /// True when the signature is valid and the tag echoes `tag`
    pub fn matches(&self, tag: u32) -> bool {
        self.signature == CSW_SIGNATURE && self.tag == tag
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cbw_layout() {
        let mut cbw = Cbw::new(Opcode::ReadLba, 0xA1B2_C3D4);
        cbw.transfer_length = 0x0102 * 512;
        cbw.sub_code = 1;
        cbw.address = 0x1234_5678;
        cbw.length = 0x0102;
        let bytes = cbw.to_bytes();

        assert_eq!(&bytes[0..4], b"USBC");
        assert_eq!(bytes[4..8], 0xA1B2_C3D4u32.to_le_bytes());
        assert_eq!(bytes[8..12], (0x0102u32 * 512).to_le_bytes());
        assert_eq!(bytes[12], 0x80);
        assert_eq!(bytes[13], 0);
        assert_eq!(bytes[14], 0x0A);
        assert_eq!(bytes[15], 0x14);
        assert_eq!(bytes[16], 1);
        // position and count ride byte-reversed
        assert_eq!(bytes[17..21], [0x12, 0x34, 0x56, 0x78]);
        assert_eq!(bytes[21], 0);
        assert_eq!(bytes[22..24], [0x01, 0x02]);
        assert_eq!(bytes[24..31], [0; 7]);
    }

    #[test]
    fn cbw_round_trip() {
        let mut cbw = Cbw::new(Opcode::WriteSector, 7);
        cbw.transfer_length = 4 * 528;
        cbw.address = 0xDEAD_BEEF;
        cbw.length = 4;
        let parsed = Cbw::from_bytes(&cbw.to_bytes()).unwrap();
        assert_eq!(parsed, cbw);
        assert!(!parsed.is_in());
    }

    #[test]
    fn cbw_rejects_bad_signature() {
        let mut bytes = Cbw::new(Opcode::TestUnitReady, 1).to_bytes();
        bytes[0] = b'X';
        assert!(Cbw::from_bytes(&bytes).is_err());
    }

    #[test]
    fn csw_layout_and_match() {
        let csw = Csw {
            signature: CSW_SIGNATURE,
            tag: 0x0055_AA11,
            data_residue: 0x0001_0002,
            status: 1,
        };
        let bytes = csw.to_bytes();
        assert_eq!(&bytes[0..4], b"USBS");
        assert_eq!(bytes[12], 1);

        let parsed = Csw::from_bytes(&bytes);
        assert_eq!(parsed, csw);
        assert!(parsed.matches(0x0055_AA11));
        assert!(!parsed.matches(0x0055_AA12));
    }
}
