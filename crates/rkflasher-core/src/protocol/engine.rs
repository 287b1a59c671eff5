//! Command exchange engine
//!
//! `Rockusb` drives the command/data/status cycle over a [`Transport`].
//! Every method maps to one vendor command; callers sequence them into
//! whole operations (see `crate::flash`).

use crate::crc::crc16_ccitt;
use crate::error::{Error, Result};
use crate::protocol::wire::{Cbw, Csw, CSW_LEN};
use crate::protocol::{
    LbaAccess, Opcode, ResetCode, TestUnitCode, BOOT_AREA_471, BOOT_AREA_472, BOOT_CHUNK,
    BOOT_VENDOR_REQUEST, BULK_TIMEOUT_MS, MAX_CLEAR_LEN, MAX_ERASE_BLOCKS, MAX_RAW_SECTORS,
    MAX_TEST_BLOCKS, RAW_SECTOR_SIZE, RESYNC_ATTEMPTS, RESYNC_WAIT_MS, SECTOR_SIZE,
};
use crate::scan::UsbMode;
use crate::transport::Transport;

#[cfg(feature = "alloc")]
use alloc::vec;

/// Device readiness snapshot
///
/// Long-running maintenance commands keep answering `TestUnitReady` with
/// progress counters smuggled through the status residue. The counters
/// stay meaningful whether or not the device reports ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyStatus {
    /// False while the device is still busy
    pub ready: bool,
    /// Total work units of the operation in progress
    pub total: u16,
    /// Work units finished so far
    pub current: u16,
}

/// A Rockusb protocol session over some transport
///
/// Commands are half duplex; each call owns the bus until its status
/// frame is in. The few commands the bootloader answers while rebooting
/// (`reset_device`, `change_storage`, `test_unit_ready`) tolerate stale
/// status frames by draining until the matching one shows up.
pub struct Rockusb<T: Transport> {
    transport: T,
    mode: UsbMode,
    tag: u32,
}

impl<T: Transport> Rockusb<T> {
    /// Wrap an open transport to a device in `mode`
    pub fn new(transport: T, mode: UsbMode) -> Self {
        Self {
            transport,
            mode,
            tag: 0,
        }
    }

    /// Mode the device enumerated in
    pub fn mode(&self) -> UsbMode {
        self.mode
    }

    /// Read the 16-byte chip identity blob
    pub fn read_chip_info(&mut self) -> Result<[u8; 16]> {
        self.ensure_rockusb()?;
        let mut cbw = self.begin(Opcode::ReadChipInfo);
        cbw.transfer_length = 16;
        self.submit(&cbw)?;
        let mut info = [0u8; 16];
        self.transport.read(&mut info)?;
        self.finish(&cbw)?;
        Ok(info)
    }

    /// Read the 5-byte flash ID
    pub fn read_flash_id(&mut self) -> Result<[u8; 5]> {
        self.ensure_rockusb()?;
        let mut cbw = self.begin(Opcode::ReadFlashId);
        cbw.transfer_length = 5;
        self.submit(&cbw)?;
        let mut id = [0u8; 5];
        self.transport.read(&mut id)?;
        self.finish(&cbw)?;
        Ok(id)
    }

    /// Read the flash geometry blob
    ///
    /// Devices answer anywhere between 11 and 512 bytes depending on the
    /// bootloader generation. Returns how many bytes landed in `buf`.
    pub fn read_flash_info(&mut self, buf: &mut [u8; 512]) -> Result<usize> {
        self.ensure_rockusb()?;
        let mut cbw = self.begin(Opcode::ReadFlashInfo);
        cbw.transfer_length = 11;
        self.submit(&cbw)?;
        let n = self.transport.read_timeout(buf, BULK_TIMEOUT_MS)?;
        if n < 11 {
            return Err(Error::ReadFailed);
        }
        self.finish(&cbw)?;
        Ok(n)
    }

    /// Read the 8-byte capability bitmap
    pub fn read_capability(&mut self) -> Result<[u8; 8]> {
        self.ensure_rockusb()?;
        let mut cbw = self.begin(Opcode::ReadCapability);
        cbw.transfer_length = 8;
        self.submit(&cbw)?;
        let mut caps = [0u8; 8];
        self.transport.read(&mut caps)?;
        self.finish(&cbw)?;
        Ok(caps)
    }

    /// Read which storage medium is active
    ///
    /// The device answers a 32-bit medium bitmask; the lowest set bit
    /// names the active medium. Returns 255 when no bit is set.
    pub fn read_storage(&mut self) -> Result<u8> {
        self.ensure_rockusb()?;
        let mut cbw = self.begin(Opcode::ReadStorage);
        cbw.transfer_length = 4;
        self.submit(&cbw)?;
        let mut raw = [0u8; 4];
        self.transport.read(&mut raw)?;
        self.finish(&cbw)?;
        let bits = u32::from_le_bytes(raw);
        if bits == 0 {
            Ok(255)
        } else {
            Ok(bits.trailing_zeros() as u8)
        }
    }

    /// Switch the active storage medium
    pub fn change_storage(&mut self, storage: u8) -> Result<()> {
        self.ensure_rockusb()?;
        let mut cbw = self.begin(Opcode::ChangeStorage);
        cbw.sub_code = storage;
        self.submit(&cbw)?;
        let csw = self.finish_resync(&cbw)?;
        if csw.status == 1 {
            return Err(Error::CommandFailed);
        }
        Ok(())
    }

    /// Read `count` logical sectors starting at `pos`
    ///
    /// `buf` must hold at least `count * 512` bytes.
    pub fn read_lba(
        &mut self,
        pos: u32,
        count: u16,
        buf: &mut [u8],
        access: LbaAccess,
    ) -> Result<()> {
        self.ensure_rockusb()?;
        let total = count as usize * SECTOR_SIZE;
        if buf.len() < total {
            return Err(Error::BufferTooSmall);
        }
        let mut cbw = self.begin(Opcode::ReadLba);
        cbw.transfer_length = total as u32;
        cbw.address = pos;
        cbw.length = count;
        cbw.sub_code = access as u8;
        self.submit(&cbw)?;
        self.transport.read(&mut buf[..total])?;
        let csw = self.finish(&cbw)?;
        if csw.status == 1 {
            return Err(Error::CommandFailed);
        }
        Ok(())
    }

    /// Write `count` logical sectors starting at `pos`
    ///
    /// `buf` must hold at least `count * 512` bytes.
    pub fn write_lba(&mut self, pos: u32, count: u16, buf: &[u8], access: LbaAccess) -> Result<()> {
        self.ensure_rockusb()?;
        let total = count as usize * SECTOR_SIZE;
        if buf.len() < total {
            return Err(Error::BufferTooSmall);
        }
        let mut cbw = self.begin(Opcode::WriteLba);
        cbw.transfer_length = total as u32;
        cbw.address = pos;
        cbw.length = count;
        cbw.sub_code = access as u8;
        self.submit(&cbw)?;
        self.transport.write(&buf[..total])?;
        let csw = self.finish(&cbw)?;
        if csw.status == 1 {
            return Err(Error::CommandFailed);
        }
        Ok(())
    }

    /// Erase `count` logical sectors starting at `pos`
    pub fn erase_lba(&mut self, pos: u32, count: u16) -> Result<()> {
        self.ensure_rockusb()?;
        let mut cbw = self.begin(Opcode::EraseLba);
        cbw.address = pos;
        cbw.length = count;
        self.submit(&cbw)?;
        let csw = self.finish(&cbw)?;
        if csw.status == 1 {
            return Err(Error::CommandFailed);
        }
        Ok(())
    }

    /// Read `count` raw sectors (528 bytes each) starting at `pos`
    ///
    /// At most [`MAX_RAW_SECTORS`] per call; `buf` must hold
    /// `count * 528` bytes.
    pub fn read_sector(&mut self, pos: u32, count: u16, buf: &mut [u8]) -> Result<()> {
        self.ensure_rockusb()?;
        if count > MAX_RAW_SECTORS {
            return Err(Error::CrossBorder);
        }
        let total = count as usize * RAW_SECTOR_SIZE;
        if buf.len() < total {
            return Err(Error::BufferTooSmall);
        }
        let mut cbw = self.begin(Opcode::ReadSector);
        cbw.transfer_length = total as u32;
        cbw.address = pos;
        cbw.length = count;
        self.submit(&cbw)?;
        self.transport.read(&mut buf[..total])?;
        let csw = self.finish(&cbw)?;
        if csw.status == 1 {
            return Err(Error::CommandFailed);
        }
        Ok(())
    }

    /// Write `count` raw sectors (528 bytes each) starting at `pos`
    ///
    /// At most [`MAX_RAW_SECTORS`] per call; `buf` must hold
    /// `count * 528` bytes.
    pub fn write_sector(&mut self, pos: u32, count: u16, buf: &[u8]) -> Result<()> {
        self.ensure_rockusb()?;
        if count > MAX_RAW_SECTORS {
            return Err(Error::CrossBorder);
        }
        let total = count as usize * RAW_SECTOR_SIZE;
        if buf.len() < total {
            return Err(Error::BufferTooSmall);
        }
        let mut cbw = self.begin(Opcode::WriteSector);
        cbw.transfer_length = total as u32;
        cbw.address = pos;
        cbw.length = count;
        self.submit(&cbw)?;
        self.transport.write(&buf[..total])?;
        let csw = self.finish(&cbw)?;
        if csw.status == 1 {
            return Err(Error::CommandFailed);
        }
        Ok(())
    }

    /// Erase `count` physical blocks on chip select `cs` starting at `pos`
    ///
    /// At most [`MAX_ERASE_BLOCKS`] per call. With `force` the device
    /// erases through factory bad-block marks. Reports
    /// [`Error::BadBlock`] when the range contained one.
    pub fn erase_blocks(&mut self, cs: u8, pos: u32, count: u16, force: bool) -> Result<()> {
        self.ensure_rockusb()?;
        if count > MAX_ERASE_BLOCKS {
            return Err(Error::CrossBorder);
        }
        let opcode = if force {
            Opcode::EraseForce
        } else {
            Opcode::EraseNormal
        };
        let mut cbw = self.begin(opcode);
        cbw.lun = cs;
        cbw.address = pos;
        cbw.length = count;
        self.submit(&cbw)?;
        let csw = self.finish(&cbw)?;
        if csw.status == 1 {
            return Err(Error::BadBlock);
        }
        Ok(())
    }

    /// Erase the system disk area
    pub fn erase_system_disk(&mut self) -> Result<()> {
        self.ensure_rockusb()?;
        let cbw = self.begin(Opcode::EraseSystemDisk);
        self.submit(&cbw)?;
        let csw = self.finish(&cbw)?;
        if csw.status == 1 {
            return Err(Error::CommandFailed);
        }
        Ok(())
    }

    /// Scan `count` blocks on chip select `cs` for bad-block marks
    ///
    /// At most [`MAX_TEST_BLOCKS`] per call. Returns the 64-byte block
    /// bitmap and whether any block in the range is marked bad.
    pub fn test_bad_block(&mut self, cs: u8, pos: u32, count: u16) -> Result<([u8; 64], bool)> {
        self.ensure_rockusb()?;
        if count > MAX_TEST_BLOCKS {
            return Err(Error::CrossBorder);
        }
        let mut cbw = self.begin(Opcode::TestBadBlock);
        cbw.transfer_length = 64;
        cbw.lun = cs;
        cbw.address = pos;
        cbw.length = count;
        self.submit(&cbw)?;
        let mut map = [0u8; 64];
        self.transport.read(&mut map)?;
        let csw = self.finish(&cbw)?;
        Ok((map, csw.status == 1))
    }

    /// Poll device readiness, optionally kicking off a maintenance job
    ///
    /// An unready answer is a state, not a failure; the progress
    /// counters are valid either way.
    pub fn test_unit_ready(&mut self, code: TestUnitCode) -> Result<ReadyStatus> {
        self.ensure_rockusb()?;
        let mut cbw = self.begin(Opcode::TestUnitReady);
        cbw.sub_code = code as u8;
        self.submit(&cbw)?;
        let csw = self.finish_resync(&cbw)?;
        // Progress counters ride byte-swapped in the residue halfwords
        let current = ((csw.data_residue >> 16) as u16).swap_bytes();
        let total = (csw.data_residue as u16).swap_bytes();
        Ok(ReadyStatus {
            ready: csw.status != 1,
            total,
            current,
        })
    }

    /// Reset the device, optionally into another mode
    pub fn reset_device(&mut self, code: ResetCode) -> Result<()> {
        self.ensure_rockusb()?;
        let mut cbw = self.begin(Opcode::DeviceReset);
        cbw.sub_code = code as u8;
        self.submit(&cbw)?;
        let csw = self.finish_resync(&cbw)?;
        if csw.status == 1 {
            return Err(Error::CommandFailed);
        }
        Ok(())
    }

    /// Push a boot stage into a Maskrom device over the vendor control
    /// request
    ///
    /// `code` selects the target area, [`BOOT_AREA_471`] for the DDR
    /// init stage or [`BOOT_AREA_472`] for the usbplug stage. The stage
    /// travels in 4096-byte control chunks with a big-endian CRC-16
    /// tail; payloads landing one or two bytes short of a chunk
    /// boundary get the pad byte or trailing pend packet the boot ROM
    /// insists on.
    #[cfg(feature = "alloc")]
    pub fn device_request(&mut self, code: u16, data: &[u8]) -> Result<()> {
        if self.mode != UsbMode::MaskRom {
            return Err(Error::NotSupported);
        }
        if code != BOOT_AREA_471 && code != BOOT_AREA_472 {
            return Err(Error::RequestNotSupported);
        }

        let mut payload_len = data.len();
        let mut send_pend = false;
        match payload_len % BOOT_CHUNK {
            r if r == BOOT_CHUNK - 1 => payload_len += 1,
            r if r == BOOT_CHUNK - 2 => send_pend = true,
            _ => {}
        }

        let mut staged = vec![0u8; payload_len + 2];
        staged[..data.len()].copy_from_slice(data);
        let crc = crc16_ccitt(&staged[..payload_len]);
        staged[payload_len] = (crc >> 8) as u8;
        staged[payload_len + 1] = crc as u8;

        log::debug!(
            "rockusb: boot request 0x{:04x}, {} bytes ({} on the wire)",
            code,
            data.len(),
            staged.len()
        );

        for chunk in staged.chunks(BOOT_CHUNK) {
            self.transport.control_out(BOOT_VENDOR_REQUEST, 0, code, chunk)?;
        }

        if send_pend {
            // Boot ROM wants a lone byte to finish a boundary-sized stage
            let _ = self.transport.control_out(BOOT_VENDOR_REQUEST, 0, code, &[0]);
        }

        Ok(())
    }

    // ---- Exchange plumbing ----

    fn ensure_rockusb(&self) -> Result<()> {
        match self.mode {
            UsbMode::Loader | UsbMode::MaskRom => Ok(()),
            UsbMode::Msc => Err(Error::NotSupported),
        }
    }

    fn begin(&mut self, opcode: Opcode) -> Cbw {
        self.tag = self.tag.wrapping_add(1);
        Cbw::new(opcode, self.tag)
    }

    fn submit(&mut self, cbw: &Cbw) -> Result<()> {
        log::trace!("rockusb: cmd 0x{:02x} tag {}", cbw.opcode, cbw.tag);
        self.transport.write(&cbw.to_bytes())
    }

    /// Read the status frame; it must belong to `cbw`
    fn finish(&mut self, cbw: &Cbw) -> Result<Csw> {
        let mut buf = [0u8; CSW_LEN];
        self.transport.read(&mut buf)?;
        let csw = Csw::from_bytes(&buf);
        if !csw.matches(cbw.tag) {
            return Err(Error::CswMismatch);
        }
        Ok(csw)
    }

    /// Read the status frame, hunting through stale output for it
    ///
    /// Bounded at [`RESYNC_ATTEMPTS`] empty reads and [`MAX_CLEAR_LEN`]
    /// drained bytes.
    fn finish_resync(&mut self, cbw: &Cbw) -> Result<Csw> {
        let mut buf = [0u8; CSW_LEN];
        self.transport.read(&mut buf)?;
        let csw = Csw::from_bytes(&buf);
        if csw.matches(cbw.tag) {
            return Ok(csw);
        }

        log::debug!("rockusb: status frame out of step, draining");
        let mut drained = 0usize;
        let mut tries = RESYNC_ATTEMPTS;
        while tries > 0 {
            let n = self.transport.read_timeout(&mut buf, RESYNC_WAIT_MS)?;
            if n == CSW_LEN {
                let csw = Csw::from_bytes(&buf);
                if csw.matches(cbw.tag) {
                    return Ok(csw);
                }
            } else {
                tries -= 1;
            }
            drained += n;
            if drained >= MAX_CLEAR_LEN {
                break;
            }
        }
        Err(Error::CswMismatch)
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::protocol::wire::CSW_SIGNATURE;
    use std::collections::VecDeque;
    use std::vec::Vec;

    /// Transport fed from scripted reply buffers
    struct MockTransport {
        sent: Vec<Vec<u8>>,
        control: Vec<(u8, u16, u16, Vec<u8>)>,
        replies: VecDeque<Vec<u8>>,
    }

    impl MockTransport {
        fn new() -> Self {
            Self {
                sent: Vec::new(),
                control: Vec::new(),
                replies: VecDeque::new(),
            }
        }

        fn push_reply(&mut self, data: Vec<u8>) {
            self.replies.push_back(data);
        }

        fn push_csw(&mut self, tag: u32, residue: u32, status: u8) {
            let csw = Csw {
                signature: CSW_SIGNATURE,
                tag,
                data_residue: residue,
                status,
            };
            self.replies.push_back(csw.to_bytes().to_vec());
        }

        fn sent_cbw(&self, idx: usize) -> Cbw {
            let mut raw = [0u8; 31];
            raw.copy_from_slice(&self.sent[idx]);
            Cbw::from_bytes(&raw).unwrap()
        }
    }

    impl Transport for MockTransport {
        fn write(&mut self, data: &[u8]) -> Result<()> {
            self.sent.push(data.to_vec());
            Ok(())
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<()> {
            let reply = self.replies.pop_front().ok_or(Error::ReadFailed)?;
            assert_eq!(reply.len(), buf.len(), "scripted reply length mismatch");
            buf.copy_from_slice(&reply);
            Ok(())
        }

        fn read_timeout(&mut self, buf: &mut [u8], _timeout_ms: u32) -> Result<usize> {
            match self.replies.pop_front() {
                Some(reply) => {
                    let n = reply.len().min(buf.len());
                    buf[..n].copy_from_slice(&reply[..n]);
                    Ok(n)
                }
                None => Ok(0),
            }
        }

        fn control_out(&mut self, request: u8, value: u16, index: u16, data: &[u8]) -> Result<()> {
            self.control.push((request, value, index, data.to_vec()));
            Ok(())
        }
    }

    fn loader(transport: MockTransport) -> Rockusb<MockTransport> {
        Rockusb::new(transport, UsbMode::Loader)
    }

    // The tag counter starts at zero, so the first command carries tag 1.

    #[test]
    fn chip_info_exchange() {
        let mut mock = MockTransport::new();
        mock.push_reply(b"RK330c\0\0\0\0\0\0\0\0\0\0".to_vec());
        mock.push_csw(1, 0, 0);

        let mut dev = loader(mock);
        let info = dev.read_chip_info().unwrap();
        assert_eq!(&info[..6], b"RK330c");

        let cbw = dev.transport.sent_cbw(0);
        assert_eq!(cbw.opcode, 0x1B);
        assert_eq!(cbw.transfer_length, 16);
        assert_eq!(cbw.cb_length, 0x06);
        assert!(cbw.is_in());
    }

    #[test]
    fn write_lba_carries_data_and_subcode() {
        let mut mock = MockTransport::new();
        mock.push_csw(1, 0, 0);

        let mut dev = loader(mock);
        let data = [0xABu8; 2 * 512];
        dev.write_lba(0x2000, 2, &data, LbaAccess::Lba).unwrap();

        let cbw = dev.transport.sent_cbw(0);
        assert_eq!(cbw.opcode, 0x15);
        assert_eq!(cbw.address, 0x2000);
        assert_eq!(cbw.length, 2);
        assert_eq!(cbw.sub_code, 1);
        assert_eq!(cbw.transfer_length, 1024);
        assert_eq!(dev.transport.sent[1], data.to_vec());
    }

    #[test]
    fn write_lba_failure_status() {
        let mut mock = MockTransport::new();
        mock.push_csw(1, 0, 1);

        let mut dev = loader(mock);
        let data = [0u8; 512];
        assert!(matches!(
            dev.write_lba(0, 1, &data, LbaAccess::Image),
            Err(Error::CommandFailed)
        ));
    }

    #[test]
    fn erase_blocks_routes_chip_select_through_lun() {
        let mut mock = MockTransport::new();
        mock.push_csw(1, 0, 0);

        let mut dev = loader(mock);
        dev.erase_blocks(2, 100, 16, true).unwrap();

        let cbw = dev.transport.sent_cbw(0);
        assert_eq!(cbw.opcode, 0x0B);
        assert_eq!(cbw.lun, 2);
        assert_eq!(cbw.address, 100);
        assert_eq!(cbw.length, 16);
        assert_eq!(cbw.transfer_length, 0);
    }

    #[test]
    fn erase_blocks_limits_and_bad_block() {
        let mut dev = loader(MockTransport::new());
        assert!(matches!(
            dev.erase_blocks(0, 0, 17, false),
            Err(Error::CrossBorder)
        ));
        assert!(dev.transport.sent.is_empty());

        dev.transport.push_csw(1, 0, 1);
        assert!(matches!(
            dev.erase_blocks(0, 0, 1, false),
            Err(Error::BadBlock)
        ));
    }

    #[test]
    fn raw_sector_count_limit() {
        let mut dev = loader(MockTransport::new());
        let mut buf = [0u8; 33 * 528];
        assert!(matches!(
            dev.read_sector(0, 33, &mut buf),
            Err(Error::CrossBorder)
        ));
        assert!(matches!(
            dev.write_sector(0, 33, &buf),
            Err(Error::CrossBorder)
        ));
    }

    #[test]
    fn test_unit_ready_swaps_progress_counters() {
        let mut mock = MockTransport::new();
        // current 0x0102 and total 0x0304, byte-swapped into the residue
        mock.push_csw(1, 0x0201_0403, 1);

        let mut dev = loader(mock);
        let status = dev.test_unit_ready(TestUnitCode::LowerFormat).unwrap();
        assert!(!status.ready);
        assert_eq!(status.current, 0x0102);
        assert_eq!(status.total, 0x0304);

        let cbw = dev.transport.sent_cbw(0);
        assert_eq!(cbw.opcode, 0x00);
        assert_eq!(cbw.sub_code, 0xFD);
    }

    #[test]
    fn reset_recovers_from_stale_status() {
        let mut mock = MockTransport::new();
        mock.push_csw(0xDEAD, 0, 0); // stale frame from an earlier exchange
        mock.push_csw(0xBEEF, 0, 0);
        mock.push_csw(1, 0, 0);

        let mut dev = loader(mock);
        dev.reset_device(ResetCode::MaskRom).unwrap();
        let cbw = dev.transport.sent_cbw(0);
        assert_eq!(cbw.opcode, 0xFF);
        assert_eq!(cbw.sub_code, 3);
    }

    #[test]
    fn reset_resync_gives_up() {
        let mut mock = MockTransport::new();
        mock.push_csw(0xDEAD, 0, 0);

        let mut dev = loader(mock);
        assert!(matches!(
            dev.reset_device(ResetCode::None),
            Err(Error::CswMismatch)
        ));
    }

    #[test]
    fn lba_read_requires_matching_status_tag() {
        let mut mock = MockTransport::new();
        mock.push_reply(vec![0u8; 512]);
        mock.push_csw(99, 0, 0);

        let mut dev = loader(mock);
        let mut buf = [0u8; 512];
        assert!(matches!(
            dev.read_lba(0, 1, &mut buf, LbaAccess::Image),
            Err(Error::CswMismatch)
        ));
    }

    #[test]
    fn storage_scan_picks_lowest_bit() {
        let mut mock = MockTransport::new();
        mock.push_reply(4u32.to_le_bytes().to_vec());
        mock.push_csw(1, 0, 0);
        let mut dev = loader(mock);
        assert_eq!(dev.read_storage().unwrap(), 2);

        dev.transport.push_reply(0u32.to_le_bytes().to_vec());
        dev.transport.push_csw(2, 0, 0);
        assert_eq!(dev.read_storage().unwrap(), 255);
    }

    #[test]
    fn flash_info_accepts_short_answer() {
        let mut mock = MockTransport::new();
        mock.push_reply(vec![0x11u8; 11]);
        mock.push_csw(1, 0, 0);

        let mut dev = loader(mock);
        let mut buf = [0u8; 512];
        assert_eq!(dev.read_flash_info(&mut buf).unwrap(), 11);
        assert_eq!(buf[10], 0x11);

        let cbw = dev.transport.sent_cbw(0);
        assert_eq!(cbw.transfer_length, 11);
    }

    #[test]
    fn msc_mode_refuses_vendor_commands() {
        let mut dev = Rockusb::new(MockTransport::new(), UsbMode::Msc);
        assert!(matches!(dev.read_chip_info(), Err(Error::NotSupported)));
    }

    #[test]
    fn boot_request_needs_maskrom() {
        let mut dev = loader(MockTransport::new());
        assert!(matches!(
            dev.device_request(BOOT_AREA_471, &[1, 2, 3]),
            Err(Error::NotSupported)
        ));

        let mut dev = Rockusb::new(MockTransport::new(), UsbMode::MaskRom);
        assert!(matches!(
            dev.device_request(0x0470, &[1, 2, 3]),
            Err(Error::RequestNotSupported)
        ));
    }

    #[test]
    fn boot_request_appends_crc() {
        let mut dev = Rockusb::new(MockTransport::new(), UsbMode::MaskRom);
        dev.device_request(BOOT_AREA_471, &[1, 2, 3, 4]).unwrap();

        assert_eq!(dev.transport.control.len(), 1);
        let (request, value, index, data) = &dev.transport.control[0];
        assert_eq!(*request, 0x0C);
        assert_eq!(*value, 0);
        assert_eq!(*index, 0x0471);
        assert_eq!(data.len(), 6);
        assert_eq!(&data[..4], &[1, 2, 3, 4]);
        let crc = crc16_ccitt(&[1, 2, 3, 4]);
        assert_eq!(data[4], (crc >> 8) as u8);
        assert_eq!(data[5], crc as u8);
    }

    #[test]
    fn boot_request_pads_at_chunk_minus_one() {
        let mut dev = Rockusb::new(MockTransport::new(), UsbMode::MaskRom);
        let stage = vec![0x5Au8; 4095];
        dev.device_request(BOOT_AREA_472, &stage).unwrap();

        // 4095 + 1 pad + 2 crc split into a full chunk and a 2-byte tail
        assert_eq!(dev.transport.control.len(), 2);
        assert_eq!(dev.transport.control[0].3.len(), 4096);
        assert_eq!(dev.transport.control[1].3.len(), 2);
        assert_eq!(dev.transport.control[0].3[4095], 0);
    }

    #[test]
    fn boot_request_pends_at_chunk_minus_two() {
        let mut dev = Rockusb::new(MockTransport::new(), UsbMode::MaskRom);
        let stage = vec![0xA5u8; 4094];
        dev.device_request(BOOT_AREA_472, &stage).unwrap();

        // payload + crc fills the chunk exactly, then the lone pend byte
        assert_eq!(dev.transport.control.len(), 2);
        assert_eq!(dev.transport.control[0].3.len(), 4096);
        assert_eq!(dev.transport.control[1].3, vec![0]);
    }
}
