//! The [`Flasher`] session type.

use alloc::vec;
use alloc::vec::Vec;

use super::{
    CallStep, FlashInfo, Progress, ProgressEvent, ProgressKind, DEFAULT_GPT_DISK_SECTORS,
    ERASE_LBA_CHUNK, IDB_LBA, LBA_CHUNK_SECTORS,
};
use crate::error::{Error, FormatError, Result};
use crate::image::idb;
use crate::image::{le32, BootEntry, BootImage, EntryKind};
use crate::partition::{gpt, parameter, GptPartition, Partition};
use crate::protocol::{
    LbaAccess, ResetCode, Rockusb, MAX_ERASE_BLOCKS, MAX_RAW_SECTORS, RAW_SECTOR_SIZE, SECTOR_SIZE,
};
use crate::scan::{ChipFamily, DeviceDescriptor};
use crate::transport::Transport;

#[cfg(feature = "std")]
use crate::image::sparse::{
    is_sparse_image, ChunkHeader, ChunkKind, SparseHeader, CHUNK_HEADER_LEN, SPARSE_HEADER_LEN,
};
#[cfg(feature = "std")]
use crate::protocol::{ReadyStatus, TestUnitCode, BOOT_AREA_471, BOOT_AREA_472};

/// Flash ID bytes spelling "EMMC", little endian.
const EMMC_ID: u32 = 0x434d_4d45;

/// Ready polls before a transfer error is fatal.
#[cfg(feature = "std")]
const READY_ATTEMPTS: u32 = 3;

/// Erase chunks between two progress reports.
const ERASE_REPORT_INTERVAL: u32 = 8;

/// Bytes per bulk transfer when streaming sector data.
const STREAM_BYTES: usize = LBA_CHUNK_SECTORS as usize * SECTOR_SIZE;

/// Chip ID words the ROM answers, keyed to the USB product family.
const CHIP_MAGICS: [(u32, ChipFamily); 14] = [
    (0x524B_3237, ChipFamily::Rk27),
    (0x3237_3341, ChipFamily::Cayman),
    (0x524B_3238, ChipFamily::Rk28),
    (0x3238_3158, ChipFamily::Rk281x),
    (0x3238_3242, ChipFamily::Panda),
    (0x3239_3058, ChipFamily::Rk29),
    (0x3239_3258, ChipFamily::Rk292x),
    (0x3330_3041, ChipFamily::Rk30),
    (0x3331_3041, ChipFamily::Rk30b),
    (0x3331_3042, ChipFamily::Rk31),
    (0x3332_3041, ChipFamily::Rk32),
    (0x3236_3243, ChipFamily::Smart),
    (0x6E61_6E6F, ChipFamily::Nano),
    (0x4E4F_5243, ChipFamily::Crown),
];

/// Partition table read back from LBA 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionTable {
    /// A GUID partition table.
    Gpt(Vec<GptPartition>),
    /// A Rockchip parameter blob with an `mtdparts=` list.
    Parameter(Vec<Partition>),
}

/// One flashing session against one device.
///
/// Wraps the raw command engine with the sequencing the device expects:
/// geometry is read once and cached, the erase strategy follows the
/// medium, partition writes are bounds-checked against the table on
/// flash.
pub struct Flasher<T: Transport> {
    device: Rockusb<T>,
    desc: DeviceDescriptor,
    flash_info: Option<FlashInfo>,
    emmc: bool,
    direct_lba: bool,
    first_4m_access: bool,
}

impl<T: Transport> Flasher<T> {
    /// Binds a transport to the device it was opened for.
    pub fn new(transport: T, desc: DeviceDescriptor) -> Self {
        Self {
            device: Rockusb::new(transport, desc.mode),
            desc,
            flash_info: None,
            emmc: false,
            direct_lba: false,
            first_4m_access: false,
        }
    }

    /// The descriptor this session was opened with.
    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.desc
    }

    /// Direct access to the command engine.
    pub fn device(&mut self) -> &mut Rockusb<T> {
        &mut self.device
    }

    /// Cached flash geometry, if [`Self::load_flash_info`] has run.
    pub fn flash_info(&self) -> Option<&FlashInfo> {
        self.flash_info.as_ref()
    }

    /// Whether the flash ID named an eMMC part.
    pub fn is_emmc(&self) -> bool {
        self.emmc
    }

    /// Whether the device advertised direct LBA access.
    pub fn supports_direct_lba(&self) -> bool {
        self.direct_lba
    }

    /// Whether the device advertised first-4M access.
    pub fn first_4m_access(&self) -> bool {
        self.first_4m_access
    }

    /// Reads and caches the flash geometry, then the flash ID to learn
    /// whether the medium is eMMC. A failed ID read leaves the eMMC
    /// flag alone; the geometry is still good.
    pub fn load_flash_info(&mut self) -> Result<FlashInfo> {
        let mut raw = [0u8; 512];
        let n = self.device.read_flash_info(&mut raw)?;
        let info = FlashInfo::parse(&raw[..n])?;
        if let Ok(id) = self.device.read_flash_id() {
            self.emmc = le32(&id, 0) == EMMC_ID;
        }
        log::debug!(
            "flash: {} MB {}, {} blocks of {} KB",
            info.size_mb,
            info.manufacturer,
            info.block_count,
            info.block_size_kb
        );
        self.flash_info = Some(info);
        Ok(info)
    }

    /// Checks that the chip the ROM reports matches the USB product
    /// family the device enumerated under.
    pub fn check_chip(&mut self) -> Result<bool> {
        let raw = self.device.read_chip_info()?;
        let chip_id = le32(&raw, 0);
        if chip_id == self.desc.family as u32 {
            return Ok(true);
        }
        let family = CHIP_MAGICS
            .iter()
            .find(|(magic, _)| *magic == chip_id)
            .map(|(_, family)| *family)
            .unwrap_or(ChipFamily::Unknown);
        Ok(family == self.desc.family)
    }

    /// Resets the device.
    ///
    /// Most reset codes tear the link down before the status frame
    /// arrives, so transfer failures count as success here.
    pub fn reset(&mut self, code: ResetCode) -> Result<()> {
        match self.device.reset_device(code) {
            Ok(()) | Err(Error::WriteFailed) | Err(Error::ReadFailed) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Powers the device off.
    pub fn power_off(&mut self) -> Result<()> {
        self.device.reset_device(ResetCode::PowerOff)
    }

    /// Writes an in-memory blob starting at sector `begin`, in
    /// 128-sector requests. A ragged tail is zero-padded to a whole
    /// sector.
    pub fn write_slice(&mut self, begin: u32, data: &[u8]) -> Result<()> {
        let mut pos = begin;
        let mut written = 0usize;
        while written < data.len() {
            let n = (data.len() - written).min(STREAM_BYTES);
            let sectors = (n + SECTOR_SIZE - 1) / SECTOR_SIZE;
            let padded = sectors * SECTOR_SIZE;
            if n == padded {
                self.device
                    .write_lba(pos, sectors as u16, &data[written..written + n], LbaAccess::Image)?;
            } else {
                let mut tail = vec![0u8; padded];
                tail[..n].copy_from_slice(&data[written..]);
                self.device
                    .write_lba(pos, sectors as u16, &tail, LbaAccess::Image)?;
            }
            pos = pos.wrapping_add(sectors as u32);
            written += n;
        }
        Ok(())
    }

    /// Reads `sectors` sectors starting at `begin` into memory.
    pub fn read_range(&mut self, begin: u32, sectors: u32) -> Result<Vec<u8>> {
        let mut out = vec![0u8; sectors as usize * SECTOR_SIZE];
        let mut done = 0u32;
        while done < sectors {
            let step = (sectors - done).min(u32::from(LBA_CHUNK_SECTORS)) as u16;
            let at = done as usize * SECTOR_SIZE;
            let len = step as usize * SECTOR_SIZE;
            self.device.read_lba(
                begin.wrapping_add(done),
                step,
                &mut out[at..at + len],
                LbaAccess::Image,
            )?;
            done += u32::from(step);
        }
        Ok(out)
    }

    /// Erases the whole flash.
    ///
    /// eMMC and direct-LBA media are cleared by LBA unless
    /// `force_block_erase` demands raw block erases. NAND is walked
    /// chip select by chip select in 16-block strides, pushing on
    /// through bad blocks.
    pub fn erase_flash<P: Progress>(&mut self, force_block_erase: bool, progress: &mut P) -> Result<()> {
        let info = self.cached_info()?;
        // Capability is advisory; old loaders do not answer it.
        let _ = self.load_capability();
        if !force_block_erase && (self.emmc || self.direct_lba) {
            return self.erase_by_lba(info, progress);
        }

        let cs_count = u64::from(info.chip_selects.count_ones());
        let total = u64::from(info.block_count) * cs_count;
        let mut done_cs = 0u64;
        let mut step = CallStep::First;
        for cs in 0..8u8 {
            if info.chip_selects & (1 << cs) == 0 {
                continue;
            }
            let mut erase_pos = 0u32;
            let mut passes = 0u32;
            while erase_pos < info.block_count {
                let count = (info.block_count - erase_pos).min(u32::from(MAX_ERASE_BLOCKS)) as u16;
                match self.device.erase_blocks(cs, erase_pos, count, true) {
                    Ok(()) => {}
                    Err(Error::BadBlock) => {
                        log::warn!("erase: bad block near block {} on cs {}", erase_pos, cs);
                    }
                    Err(err) => return Err(err),
                }
                erase_pos += u32::from(count);
                passes += 1;
                if passes % ERASE_REPORT_INTERVAL == 0 {
                    self.emit(
                        progress,
                        ProgressKind::EraseFlash,
                        total,
                        done_cs * u64::from(info.block_count) + u64::from(erase_pos),
                        step,
                    );
                    step = CallStep::Middle;
                }
            }
            done_cs += 1;
        }
        self.emit(
            progress,
            ProgressKind::EraseFlash,
            total,
            done_cs * u64::from(info.block_count),
            CallStep::Last,
        );
        Ok(())
    }

    fn erase_by_lba<P: Progress>(&mut self, info: FlashInfo, progress: &mut P) -> Result<()> {
        let total = info.total_sectors();
        let mut offset = 0u64;
        let mut loops = 0u32;
        let mut step = CallStep::First;
        while offset < total {
            let count = (total - offset).min(u64::from(ERASE_LBA_CHUNK)) as u16;
            self.device.erase_lba(offset as u32, count)?;
            offset += u64::from(count);
            loops += 1;
            if loops % ERASE_REPORT_INTERVAL == 0 {
                self.emit(progress, ProgressKind::EraseFlash, total, offset, step);
                step = CallStep::Middle;
            }
        }
        self.emit(progress, ProgressKind::EraseFlash, total, total, CallStep::Last);
        Ok(())
    }

    /// Blanks the first four raw sectors of `count` blocks starting at
    /// block `pos` on chip select `cs`, wiping any ID block candidates
    /// there.
    pub fn erase_emmc_blocks(&mut self, cs: u8, pos: u32, count: u32) -> Result<()> {
        let info = self.cached_info()?;
        let blank = vec![0xFFu8; 4 * RAW_SECTOR_SIZE];
        for done in 0..count {
            let block = u32::from(cs)
                .wrapping_mul(info.block_count)
                .wrapping_add(pos)
                .wrapping_add(done);
            let sector = block.wrapping_mul(u32::from(info.sectors_per_block));
            self.device.write_sector(sector, 4, &blank)?;
        }
        Ok(())
    }

    /// Blanks `count` logical sectors starting at `pos` by writing
    /// all-ones data, for media without a block erase.
    pub fn erase_emmc_by_write(&mut self, pos: u32, count: u32) -> Result<()> {
        let blank = vec![0xFFu8; usize::from(MAX_RAW_SECTORS) * SECTOR_SIZE];
        let mut at = pos;
        let mut left = count;
        while left > 0 {
            let step = left.min(u32::from(MAX_RAW_SECTORS)) as u16;
            let len = usize::from(step) * SECTOR_SIZE;
            self.device.write_lba(at, step, &blank[..len], LbaAccess::Image)?;
            at = at.wrapping_add(u32::from(step));
            left -= u32::from(step);
        }
        Ok(())
    }

    /// Rebuilds the on-flash ID block from a loader image and writes
    /// it at sector [`IDB_LBA`].
    ///
    /// `FlashBoot` and `FlashData` entries are required. A `FlashHead`
    /// entry selects the new-style ID block, which the device must
    /// advertise support for; without one the legacy four-sector
    /// layout is built.
    pub fn upgrade_loader(&mut self, boot: &BootImage) -> Result<()> {
        let code_entry = required_entry(boot, "FlashBoot")?;
        let data_entry = required_entry(boot, "FlashData")?;
        let code = boot.entry_data(&code_entry)?;
        let data = boot.entry_data(&data_entry)?;

        let idb = match boot.entry_by_name(EntryKind::Loader, "FlashHead") {
            Some(head_entry) => {
                let caps = self.device.read_capability()?;
                if caps[1] & 1 == 0 {
                    log::error!("loader: device does not take the new ID block layout");
                    return Err(Error::NotSupported);
                }
                let head = boot.entry_data(&head_entry)?;
                idb::build_new_idb(head, data, code, boot.rc4_disabled())
            }
            None => idb::build_legacy_idb(data, code, !boot.rc4_disabled()),
        };

        log::info!("loader: writing {} sectors at LBA {}", idb.len() / SECTOR_SIZE, IDB_LBA);
        self.write_slice(IDB_LBA, &idb)
    }

    /// Frames parameter text into the on-flash blob and writes it at
    /// LBA 0.
    pub fn write_parameter(&mut self, text: &str) -> Result<()> {
        let blob = parameter::build_parameter(text);
        self.write_slice(0, &blob)
    }

    /// Builds a GPT from the `mtdparts=` list in `text` and writes it
    /// at LBA 0.
    ///
    /// The disk size comes from the cached flash geometry when there
    /// is one, else [`DEFAULT_GPT_DISK_SECTORS`].
    pub fn write_gpt(&mut self, text: &str) -> Result<()> {
        let parts = parameter::parse_partitions(text);
        if parts.is_empty() {
            log::error!("gpt: no mtdparts list in the parameter text");
            return Err(Error::Format(FormatError::InvalidField));
        }
        let disk_sectors = self
            .flash_info
            .map(|info| info.total_sectors())
            .unwrap_or(DEFAULT_GPT_DISK_SECTORS);
        let table = gpt::build_gpt(&parts, disk_sectors);
        self.write_slice(0, &table)
    }

    /// Reads whichever partition table the device carries at LBA 0.
    pub fn read_partition_table(&mut self) -> Result<PartitionTable> {
        let head = self.read_range(0, gpt::GPT_SECTORS as u32)?;
        if gpt::is_gpt(&head) {
            return Ok(PartitionTable::Gpt(gpt::list_partitions(&head)));
        }
        let text = parameter::parameter_text(&head)?;
        Ok(PartitionTable::Parameter(parameter::parse_partitions(&text)))
    }

    /// Start sector and length in sectors of a named partition, from
    /// whichever table is on flash.
    ///
    /// A zero length marks a grow partition running to the end of the
    /// disk.
    pub fn locate_partition(&mut self, name: &str) -> Result<(u32, u32)> {
        let head = self.read_range(0, gpt::GPT_SECTORS as u32)?;
        if gpt::is_gpt(&head) {
            return match gpt::find_partition(&head, name) {
                Some((first, last)) => {
                    let sectors = last.wrapping_sub(first).wrapping_add(1);
                    Ok((first as u32, sectors as u32))
                }
                None => Err(Error::PartitionNotFound),
            };
        }
        match parameter::find_partition(&head, name) {
            Some(part) => Ok((part.offset, part.size)),
            None => Err(Error::PartitionNotFound),
        }
    }

    fn cached_info(&mut self) -> Result<FlashInfo> {
        match self.flash_info {
            Some(info) => Ok(info),
            None => self.load_flash_info(),
        }
    }

    fn load_capability(&mut self) -> Result<()> {
        let caps = self.device.read_capability()?;
        self.direct_lba = caps[0] & 0x1 != 0;
        self.first_4m_access = caps[0] & 0x4 != 0;
        Ok(())
    }

    fn emit<P: Progress>(
        &self,
        progress: &mut P,
        kind: ProgressKind,
        total: u64,
        current: u64,
        step: CallStep,
    ) {
        progress.update(ProgressEvent {
            location_id: self.desc.location_id,
            kind,
            total,
            current,
            step,
        });
    }
}

#[cfg(feature = "std")]
impl<T: Transport> Flasher<T> {
    /// Stages every boot image entry into the Maskrom device, the DDR
    /// init entries first, then the usbplug entries.
    pub fn download_boot(&mut self, boot: &BootImage) -> Result<()> {
        self.send_boot_entries(boot, EntryKind::Entry471, BOOT_AREA_471)?;
        self.send_boot_entries(boot, EntryKind::Entry472, BOOT_AREA_472)?;
        // The freshly started loader needs a moment before it answers
        std::thread::sleep(std::time::Duration::from_secs(1));
        Ok(())
    }

    fn send_boot_entries(&mut self, boot: &BootImage, kind: EntryKind, area: u16) -> Result<()> {
        for index in 0..boot.entry_count(kind) {
            let entry = boot.entry(kind, index)?;
            if entry.data_size == 0 {
                continue;
            }
            log::debug!("boot: staging {} into area 0x{:04x}", entry.name, area);
            self.device.device_request(area, boot.entry_data(&entry)?)?;
            if entry.data_delay > 0 {
                std::thread::sleep(std::time::Duration::from_millis(u64::from(entry.data_delay)));
            }
        }
        Ok(())
    }

    /// Waits until the device reports ready, reporting any maintenance
    /// progress it announces along the way.
    pub fn test_device<P: Progress>(&mut self, progress: &mut P) -> Result<()> {
        let mut step = CallStep::First;
        loop {
            let status = self.poll_ready()?;
            if status.ready {
                if step == CallStep::Middle {
                    self.emit(progress, ProgressKind::TestDevice, 100, 100, CallStep::Last);
                }
                return Ok(());
            }
            self.emit(
                progress,
                ProgressKind::TestDevice,
                u64::from(status.total),
                u64::from(status.current),
                step,
            );
            step = CallStep::Middle;
            std::thread::sleep(std::time::Duration::from_secs(1));
        }
    }

    fn poll_ready(&mut self) -> Result<ReadyStatus> {
        let mut last = Error::DeviceUnready;
        for _ in 0..READY_ATTEMPTS {
            match self.device.test_unit_ready(TestUnitCode::None) {
                Ok(status) => return Ok(status),
                Err(err) => {
                    last = err;
                    std::thread::sleep(std::time::Duration::from_secs(1));
                }
            }
        }
        Err(last)
    }

    /// Streams `total` bytes from a reader to sectors starting at
    /// `begin`, reporting download progress in bytes.
    pub fn write_lba_from<R: std::io::Read, P: Progress>(
        &mut self,
        begin: u32,
        reader: &mut R,
        total: u64,
        progress: &mut P,
    ) -> Result<()> {
        let mut chunk = vec![0u8; STREAM_BYTES];
        let mut pos = begin;
        let mut sent = 0u64;
        let mut step = CallStep::First;
        loop {
            let n = read_full(reader, &mut chunk)?;
            if n == 0 {
                break;
            }
            let sectors = (n + SECTOR_SIZE - 1) / SECTOR_SIZE;
            let padded = sectors * SECTOR_SIZE;
            chunk[n..padded].fill(0);
            self.device
                .write_lba(pos, sectors as u16, &chunk[..padded], LbaAccess::Image)?;
            pos = pos.wrapping_add(sectors as u32);
            sent += n as u64;
            self.emit(progress, ProgressKind::DownloadImage, total, sent, step);
            step = CallStep::Middle;
        }
        self.emit(progress, ProgressKind::DownloadImage, total, total, CallStep::Last);
        Ok(())
    }

    /// Writes a file to sectors starting at `begin`.
    pub fn write_lba_file<P: Progress>(
        &mut self,
        begin: u32,
        path: &std::path::Path,
        progress: &mut P,
    ) -> Result<()> {
        let mut file = std::fs::File::open(path)?;
        let total = file.metadata()?.len();
        self.write_lba_from(begin, &mut file, total, progress)
    }

    /// Streams `sectors` sectors starting at `begin` into a writer,
    /// reporting check progress in bytes.
    pub fn read_lba_to<W: std::io::Write, P: Progress>(
        &mut self,
        begin: u32,
        sectors: u32,
        writer: &mut W,
        progress: &mut P,
    ) -> Result<()> {
        let total = u64::from(sectors) * SECTOR_SIZE as u64;
        let mut buf = vec![0u8; STREAM_BYTES];
        let mut pos = begin;
        let mut done = 0u32;
        let mut step = CallStep::First;
        while done < sectors {
            let count = (sectors - done).min(u32::from(LBA_CHUNK_SECTORS)) as u16;
            let len = usize::from(count) * SECTOR_SIZE;
            self.device.read_lba(pos, count, &mut buf[..len], LbaAccess::Image)?;
            writer.write_all(&buf[..len])?;
            pos = pos.wrapping_add(u32::from(count));
            done += u32::from(count);
            self.emit(
                progress,
                ProgressKind::CheckImage,
                total,
                u64::from(done) * SECTOR_SIZE as u64,
                step,
            );
            step = CallStep::Middle;
        }
        self.emit(progress, ProgressKind::CheckImage, total, total, CallStep::Last);
        Ok(())
    }

    /// Reads sectors into a file.
    pub fn read_lba_file<P: Progress>(
        &mut self,
        begin: u32,
        sectors: u32,
        path: &std::path::Path,
        progress: &mut P,
    ) -> Result<()> {
        let mut file = std::fs::File::create(path)?;
        self.read_lba_to(begin, sectors, &mut file, progress)
    }

    /// Expands an Android sparse stream onto sectors starting at
    /// `begin`. Progress counts bytes of the expanded image.
    pub fn write_sparse_from<R: std::io::Read, P: Progress>(
        &mut self,
        begin: u32,
        reader: &mut R,
        progress: &mut P,
    ) -> Result<()> {
        let mut head = [0u8; SPARSE_HEADER_LEN];
        read_exact_into(reader, &mut head)?;
        let header = SparseHeader::parse(&head)?;
        skip_extra(
            reader,
            u64::from(header.file_header_size).saturating_sub(SPARSE_HEADER_LEN as u64),
        )?;

        let total = header.expanded_len();
        let mut chunk_buf = vec![0u8; STREAM_BYTES];
        let mut pos = begin;
        let mut written = 0u64;
        let mut step = CallStep::First;

        for _ in 0..header.total_chunks {
            let mut raw = [0u8; CHUNK_HEADER_LEN];
            read_exact_into(reader, &mut raw)?;
            let chunk = ChunkHeader::parse(&raw)?;
            skip_extra(
                reader,
                u64::from(header.chunk_header_size).saturating_sub(CHUNK_HEADER_LEN as u64),
            )?;

            match chunk.kind {
                ChunkKind::Raw => {
                    let mut left = chunk.payload_len();
                    while left > 0 {
                        let n = left.min(STREAM_BYTES as u64) as usize;
                        read_exact_into(reader, &mut chunk_buf[..n])?;
                        let sectors = (n + SECTOR_SIZE - 1) / SECTOR_SIZE;
                        let padded = sectors * SECTOR_SIZE;
                        chunk_buf[n..padded].fill(0);
                        self.device.write_lba(
                            pos,
                            sectors as u16,
                            &chunk_buf[..padded],
                            LbaAccess::Image,
                        )?;
                        pos = pos.wrapping_add(sectors as u32);
                        left -= n as u64;
                        written += n as u64;
                        self.emit(progress, ProgressKind::DownloadImage, total, written, step);
                        step = CallStep::Middle;
                    }
                }
                ChunkKind::Fill => {
                    let mut pattern = [0u8; 4];
                    read_exact_into(reader, &mut pattern)?;
                    for slot in chunk_buf.chunks_exact_mut(4) {
                        slot.copy_from_slice(&pattern);
                    }
                    let mut left = chunk.expanded_len(&header);
                    while left > 0 {
                        let n = left.min(STREAM_BYTES as u64) as usize;
                        let sectors = (n + SECTOR_SIZE - 1) / SECTOR_SIZE;
                        let padded = sectors * SECTOR_SIZE;
                        self.device.write_lba(
                            pos,
                            sectors as u16,
                            &chunk_buf[..padded],
                            LbaAccess::Image,
                        )?;
                        pos = pos.wrapping_add(sectors as u32);
                        left -= n as u64;
                        written += n as u64;
                        self.emit(progress, ProgressKind::DownloadImage, total, written, step);
                        step = CallStep::Middle;
                    }
                }
                ChunkKind::DontCare => {
                    let skip = chunk.expanded_len(&header);
                    pos = pos.wrapping_add((skip / SECTOR_SIZE as u64) as u32);
                    written += skip;
                    self.emit(progress, ProgressKind::DownloadImage, total, written, step);
                    step = CallStep::Middle;
                }
                ChunkKind::Crc32 => {
                    skip_extra(reader, chunk.payload_len())?;
                }
            }
        }
        self.emit(progress, ProgressKind::DownloadImage, total, total, CallStep::Last);
        Ok(())
    }

    /// Expands a sparse image file onto sectors starting at `begin`.
    pub fn write_sparse_file<P: Progress>(
        &mut self,
        begin: u32,
        path: &std::path::Path,
        progress: &mut P,
    ) -> Result<()> {
        let mut file = std::fs::File::open(path)?;
        self.write_sparse_from(begin, &mut file, progress)
    }

    /// Writes an image file into the named partition, expanding sparse
    /// images on the fly.
    ///
    /// The expanded image must fit the partition span; a grow
    /// partition (length zero) takes any size.
    pub fn write_partition<P: Progress>(
        &mut self,
        name: &str,
        path: &std::path::Path,
        progress: &mut P,
    ) -> Result<()> {
        use std::io::Seek;

        let (start, sectors) = self.locate_partition(name)?;
        let span_bytes = u64::from(sectors) * SECTOR_SIZE as u64;

        let mut file = std::fs::File::open(path)?;
        let total = file.metadata()?.len();
        let mut prefix = [0u8; SPARSE_HEADER_LEN];
        let probed = read_full(&mut file, &mut prefix)?;
        file.seek(std::io::SeekFrom::Start(0))?;

        if probed == SPARSE_HEADER_LEN && is_sparse_image(&prefix) {
            let header = SparseHeader::parse(&prefix)?;
            if sectors > 0 && header.expanded_len() > span_bytes {
                log::error!("write: sparse image does not fit partition {}", name);
                return Err(Error::CrossBorder);
            }
            return self.write_sparse_from(start, &mut file, progress);
        }
        if sectors > 0 && total > span_bytes {
            log::error!("write: image does not fit partition {}", name);
            return Err(Error::CrossBorder);
        }
        self.write_lba_from(start, &mut file, total, progress)
    }
}

fn required_entry(boot: &BootImage, name: &str) -> Result<BootEntry> {
    match boot.entry_by_name(EntryKind::Loader, name) {
        Some(entry) => Ok(entry),
        None => {
            log::error!("loader: image has no {} entry", name);
            Err(Error::Format(FormatError::InvalidField))
        }
    }
}

/// Reads until `buf` is full or the stream ends; returns how many
/// bytes landed.
#[cfg(feature = "std")]
fn read_full<R: std::io::Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0usize;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(feature = "std")]
fn read_exact_into<R: std::io::Read>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    if read_full(reader, buf)? < buf.len() {
        return Err(Error::Format(FormatError::Truncated));
    }
    Ok(())
}

#[cfg(feature = "std")]
fn skip_extra<R: std::io::Read>(reader: &mut R, mut extra: u64) -> Result<()> {
    let mut scratch = [0u8; 64];
    while extra > 0 {
        let n = extra.min(scratch.len() as u64) as usize;
        read_exact_into(reader, &mut scratch[..n])?;
        extra -= n as u64;
    }
    Ok(())
}
