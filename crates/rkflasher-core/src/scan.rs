//! Device discovery and arrival debouncing
//!
//! Rockchip devices enumerate under a handful of vendor IDs, and the
//! same board shows up as a different device depending on its boot
//! state: Maskrom (blank or recovery), Loader (bootloader running) or
//! plain USB mass storage. The low bit of the USB release number tells
//! Maskrom from Loader apart.
//!
//! Devices also drop off and re-enumerate mid-operation (after reset or
//! a loader download), so discovery is debounced: a device counts as
//! present only after several consecutive sightings on the same port.

use bitflags::bitflags;
use core::fmt;

#[cfg(feature = "alloc")]
use alloc::format;
#[cfg(feature = "alloc")]
use alloc::string::String;
#[cfg(feature = "alloc")]
use alloc::vec::Vec;

#[cfg(feature = "std")]
use crate::error::{Error, Result};

/// Boot state a device enumerated in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum UsbMode {
    /// Boot ROM waiting for a loader over vendor requests
    MaskRom = 0x01,
    /// Bootloader running the full command set
    Loader = 0x02,
    /// Rebooted into USB mass storage
    Msc = 0x04,
}

bitflags! {
    /// Mode filter for device searches
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct UsbModeMask: u32 {
        /// Match Maskrom devices
        const MASK_ROM = 0x01;
        /// Match Loader devices
        const LOADER = 0x02;
        /// Match mass-storage devices
        const MSC = 0x04;
    }
}

impl UsbMode {
    /// This mode as a one-bit filter mask
    pub fn mask(self) -> UsbModeMask {
        UsbModeMask::from_bits_truncate(self as u32)
    }
}

impl fmt::Display for UsbMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UsbMode::MaskRom => "Maskrom",
            UsbMode::Loader => "Loader",
            UsbMode::Msc => "MSC",
        };
        f.write_str(name)
    }
}

/// Chip family a product ID belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ChipFamily {
    /// Not in the known table
    Unknown = 0x00,
    /// RK27xx
    Rk27 = 0x10,
    /// RK Cayman
    Cayman = 0x11,
    /// RK28xx
    Rk28 = 0x20,
    /// RK281x
    Rk281x = 0x21,
    /// RK Panda
    Panda = 0x22,
    /// RK Nano
    Nano = 0x30,
    /// RK Smart
    Smart = 0x31,
    /// RK Crown
    Crown = 0x40,
    /// RK29xx
    Rk29 = 0x50,
    /// RK292x
    Rk292x = 0x51,
    /// RK30xx
    Rk30 = 0x60,
    /// RK30xx series B
    Rk30b = 0x61,
    /// RK31xx
    Rk31 = 0x70,
    /// RK32xx
    Rk32 = 0x80,
}

impl fmt::Display for ChipFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChipFamily::Unknown => "unknown",
            ChipFamily::Rk27 => "RK27",
            ChipFamily::Cayman => "Cayman",
            ChipFamily::Rk28 => "RK28",
            ChipFamily::Rk281x => "RK281x",
            ChipFamily::Panda => "Panda",
            ChipFamily::Nano => "Nano",
            ChipFamily::Smart => "Smart",
            ChipFamily::Crown => "Crown",
            ChipFamily::Rk29 => "RK29",
            ChipFamily::Rk292x => "RK292x",
            ChipFamily::Rk30 => "RK30",
            ChipFamily::Rk30b => "RK30b",
            ChipFamily::Rk31 => "RK31",
            ChipFamily::Rk32 => "RK32",
        };
        f.write_str(name)
    }
}

/// Known Rockusb vendor/product IDs
const ROCKUSB_IDS: &[(u16, u16, ChipFamily)] = &[
    (0x071B, 0x3201, ChipFamily::Rk27),
    (0x071B, 0x3228, ChipFamily::Rk28),
    (0x071B, 0x3226, ChipFamily::Nano),
    (0x2207, 0x261A, ChipFamily::Crown),
    (0x2207, 0x281A, ChipFamily::Rk281x),
    (0x2207, 0x273A, ChipFamily::Cayman),
    (0x2207, 0x290A, ChipFamily::Rk29),
    (0x2207, 0x282B, ChipFamily::Panda),
    (0x2207, 0x262C, ChipFamily::Smart),
    (0x2207, 0x292A, ChipFamily::Rk292x),
    (0x2207, 0x300A, ChipFamily::Rk30),
    (0x2207, 0x300B, ChipFamily::Rk30b),
    (0x2207, 0x310B, ChipFamily::Rk31),
    (0x2207, 0x310C, ChipFamily::Rk31),
    (0x2207, 0x320A, ChipFamily::Rk32),
];

/// Vendor/product IDs of devices rebooted into mass storage
const MSC_IDS: &[(u16, u16)] = &[
    (0x071B, 0x3203),
    (0x071B, 0x3205),
    (0x0BB4, 0x2910),
    (0x2207, 0x0000),
    (0x2207, 0x0010),
];

/// Rockchip vendor ID used by newer chips
const ROCKCHIP_VID: u16 = 0x2207;

/// A discovered device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// USB vendor ID
    pub vid: u16,
    /// USB product ID
    pub pid: u16,
    /// USB release number; its low bit separates Maskrom from Loader
    pub bcd_usb: u16,
    /// Physical port identity, bus number and address packed together
    pub location_id: u32,
    /// Boot state the device enumerated in
    pub mode: UsbMode,
    /// Chip family, [`ChipFamily::Unknown`] for mass storage or
    /// unlisted product IDs
    pub family: ChipFamily,
}

impl DeviceDescriptor {
    /// Classify a raw USB device, if it is a Rockchip device at all
    pub fn new(vid: u16, pid: u16, bcd_usb: u16, bus_number: u8, address: u8) -> Option<Self> {
        let (mode, family) = classify(vid, pid, bcd_usb)?;
        Some(Self {
            vid,
            pid,
            bcd_usb,
            location_id: location_id(bus_number, address),
            mode,
            family,
        })
    }

    /// Classify a raw USB device against a custom [`IdTable`]
    #[cfg(feature = "alloc")]
    pub fn with_table(
        table: &IdTable,
        vid: u16,
        pid: u16,
        bcd_usb: u16,
        bus_number: u8,
        address: u8,
    ) -> Option<Self> {
        let (mode, family) = table.classify(vid, pid, bcd_usb)?;
        Some(Self {
            vid,
            pid,
            bcd_usb,
            location_id: location_id(bus_number, address),
            mode,
            family,
        })
    }

    /// Human-readable port name, `bus-address`
    #[cfg(feature = "alloc")]
    pub fn layer_name(&self) -> String {
        format!("{}-{}", self.location_id >> 8, self.location_id & 0xFF)
    }
}

/// Pack a bus number and device address into a port identity
pub fn location_id(bus_number: u8, address: u8) -> u32 {
    ((bus_number as u32) << 8) | (address as u32)
}

/// Decide what kind of Rockchip device a vid/pid pair is
///
/// Product IDs outside the known table still count as Rockusb when they
/// carry the Rockchip vendor ID with a plausible product ID; the family
/// is then [`ChipFamily::Unknown`]. The mass-storage table wins over
/// the Rockusb match.
pub fn classify(vid: u16, pid: u16, bcd_usb: u16) -> Option<(UsbMode, ChipFamily)> {
    classify_in(ROCKUSB_IDS, MSC_IDS, vid, pid, bcd_usb)
}

fn classify_in(
    rockusb_ids: &[(u16, u16, ChipFamily)],
    msc_ids: &[(u16, u16)],
    vid: u16,
    pid: u16,
    bcd_usb: u16,
) -> Option<(UsbMode, ChipFamily)> {
    let rockusb = rockusb_ids
        .iter()
        .find(|(v, p, _)| *v == vid && *p == pid)
        .map(|(_, _, family)| *family)
        .or_else(|| {
            if vid == ROCKCHIP_VID && (pid >> 8) > 0 {
                Some(ChipFamily::Unknown)
            } else {
                None
            }
        });
    let msc = msc_ids.iter().any(|(v, p)| *v == vid && *p == pid);

    if msc {
        Some((UsbMode::Msc, ChipFamily::Unknown))
    } else if let Some(family) = rockusb {
        let mode = if bcd_usb & 0x1 == 0 {
            UsbMode::MaskRom
        } else {
            UsbMode::Loader
        };
        Some((mode, family))
    } else {
        None
    }
}

/// Classification tables with room for out-of-tree IDs
///
/// Some boards ship their Boot ROM under an OEM vendor/product pair
/// instead of the stock one. Seed a table, register the OEM pairs next
/// to the chip they actually carry, then hand the table to a scanner.
/// The table is built up front and read-only afterwards.
#[cfg(feature = "alloc")]
#[derive(Debug, Clone)]
pub struct IdTable {
    rockusb: Vec<(u16, u16, ChipFamily)>,
    msc: Vec<(u16, u16)>,
}

#[cfg(feature = "alloc")]
impl IdTable {
    /// Table holding the builtin IDs
    pub fn new() -> Self {
        Self {
            rockusb: ROCKUSB_IDS.to_vec(),
            msc: MSC_IDS.to_vec(),
        }
    }

    /// Register a Rockusb pair under the family of an already known one
    ///
    /// Returns false when any ID is zero or the reference pair is not in
    /// the table.
    pub fn add_vid_pid(&mut self, new_vid: u16, new_pid: u16, like_vid: u16, like_pid: u16) -> bool {
        if new_vid == 0 || new_pid == 0 || like_vid == 0 || like_pid == 0 {
            return false;
        }
        let family = self
            .rockusb
            .iter()
            .find(|(v, p, _)| *v == like_vid && *p == like_pid)
            .map(|(_, _, family)| *family);
        match family {
            Some(family) => {
                self.rockusb.push((new_vid, new_pid, family));
                true
            }
            None => false,
        }
    }

    /// Register an extra mass-storage pair
    pub fn add_msc(&mut self, vid: u16, pid: u16) {
        if !self.msc.contains(&(vid, pid)) {
            self.msc.push((vid, pid));
        }
    }

    /// Decide what kind of Rockchip device a vid/pid pair is
    ///
    /// Same rules as [`classify`], consulting this table instead of the
    /// builtin one.
    pub fn classify(&self, vid: u16, pid: u16, bcd_usb: u16) -> Option<(UsbMode, ChipFamily)> {
        classify_in(&self.rockusb, &self.msc, vid, pid, bcd_usb)
    }
}

#[cfg(feature = "alloc")]
impl Default for IdTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Consecutive sightings before a device counts as present
pub const WAIT_CONSECUTIVE: u32 = 8;
/// Consecutive sightings before a new arrival counts as settled
pub const NEWCOMER_CONSECUTIVE: u32 = 10;
/// Pause between discovery passes, in milliseconds
pub const SCAN_INTERVAL_MS: u64 = 50;
/// Pause between the paired snapshot passes, in milliseconds
pub const SNAPSHOT_INTERVAL_MS: u64 = 20;
/// How long the paired snapshot keeps retrying, in seconds
pub const SNAPSHOT_WINDOW_SECS: u64 = 3;
/// Default wait for a Rockusb device to come back, in seconds
pub const DEFAULT_ROCKUSB_TIMEOUT_SECS: u64 = 20;
/// Default wait for a mass-storage device to come back, in seconds
pub const DEFAULT_MSC_TIMEOUT_SECS: u64 = 30;

/// Debounces one port until its device has been seen enough times in a
/// row
///
/// Feed it one discovery pass at a time; it answers the settled device
/// once [`WAIT_CONSECUTIVE`] passes in a row contained it. A vid or pid
/// of zero matches anything.
#[derive(Debug)]
pub struct WaitCounter {
    location_id: u32,
    vid: u16,
    pid: u16,
    seen: u32,
}

impl WaitCounter {
    /// Track `location_id`, optionally pinned to a vid/pid
    pub fn new(location_id: u32, vid: u16, pid: u16) -> Self {
        Self {
            location_id,
            vid,
            pid,
            seen: 0,
        }
    }

    /// Record one discovery pass
    pub fn observe<'a>(&mut self, devices: &'a [DeviceDescriptor]) -> Option<&'a DeviceDescriptor> {
        let found = devices.iter().find(|d| {
            d.location_id == self.location_id
                && (self.vid == 0 || d.vid == self.vid)
                && (self.pid == 0 || d.pid == self.pid)
        });
        match found {
            Some(desc) => {
                self.seen += 1;
                if self.seen >= WAIT_CONSECUTIVE {
                    Some(desc)
                } else {
                    None
                }
            }
            None => {
                self.seen = 0;
                None
            }
        }
    }
}

/// Watches for exactly one device beyond a known set
///
/// Used across a mode switch: snapshot the ports that stay put, then
/// wait until precisely one unlisted port shows up and stays stable for
/// [`NEWCOMER_CONSECUTIVE`] passes. Any ambiguity resets the count.
#[derive(Debug, Default)]
pub struct NewcomerCounter {
    candidate: u32,
    seen: u32,
}

impl NewcomerCounter {
    /// Fresh tracker with no candidate
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one discovery pass against the known port set
    pub fn observe(&mut self, devices: &[DeviceDescriptor], existing: &[u32]) -> Option<u32> {
        if devices.len() != existing.len() + 1 {
            self.reset();
            return None;
        }

        let mut newcomer = 0u32;
        let mut extras = 0;
        for d in devices {
            if !existing.contains(&d.location_id) {
                extras += 1;
                newcomer = d.location_id;
            }
        }
        if extras != 1 {
            self.reset();
            return None;
        }

        if self.candidate == 0 {
            self.candidate = newcomer;
            self.seen = 1;
        } else if self.candidate == newcomer {
            self.seen += 1;
        } else {
            self.reset();
            return None;
        }

        if self.seen >= NEWCOMER_CONSECUTIVE {
            Some(newcomer)
        } else {
            None
        }
    }

    fn reset(&mut self) {
        self.candidate = 0;
        self.seen = 0;
    }
}

/// One pass of USB discovery
///
/// Implementations list currently attached devices, classify them and
/// keep only those matching `mask`.
#[cfg(feature = "std")]
pub trait UsbScan {
    /// List attached Rockchip devices matching `mask`
    fn scan(&mut self, mask: UsbModeMask) -> Result<Vec<DeviceDescriptor>>;
}

/// Wait until the device on one port has settled
///
/// Polls every [`SCAN_INTERVAL_MS`] until the port has answered
/// [`WAIT_CONSECUTIVE`] passes in a row, or `timeout` elapsed. A vid or
/// pid of zero matches anything.
#[cfg(feature = "std")]
pub fn wait_for_device<S: UsbScan>(
    scanner: &mut S,
    location_id: u32,
    mask: UsbModeMask,
    vid: u16,
    pid: u16,
    timeout: core::time::Duration,
) -> Result<DeviceDescriptor> {
    let start = std::time::Instant::now();
    let mut counter = WaitCounter::new(location_id, vid, pid);
    while start.elapsed() <= timeout {
        let devices = scanner.scan(mask)?;
        if let Some(desc) = counter.observe(&devices) {
            return Ok(*desc);
        }
        std::thread::sleep(core::time::Duration::from_millis(SCAN_INTERVAL_MS));
    }
    log::debug!("scan: no settled device on port {:#x}", location_id);
    Err(Error::Timeout)
}

/// Snapshot the ports that will stay put across a mode switch
///
/// Takes paired discovery passes until two agree, then returns every
/// port except `offline_location`, the device about to drop off. Fails
/// when the view never settles or the offline device is already gone.
#[cfg(feature = "std")]
pub fn snapshot_ports<S: UsbScan>(scanner: &mut S, offline_location: u32) -> Result<Vec<u32>> {
    let start = std::time::Instant::now();
    let window = core::time::Duration::from_secs(SNAPSHOT_WINDOW_SECS);
    let (first, second) = loop {
        let first = scanner.scan(UsbModeMask::all())?;
        std::thread::sleep(core::time::Duration::from_millis(SNAPSHOT_INTERVAL_MS));
        let second = scanner.scan(UsbModeMask::all())?;
        if first.len() == second.len() || start.elapsed() > window {
            break (first, second);
        }
    };

    if first.is_empty() || first.len() != second.len() {
        return Err(Error::DeviceNotFound);
    }

    let mut ports = Vec::new();
    let mut found_offline = false;
    for desc in &second {
        if desc.location_id != offline_location {
            ports.push(desc.location_id);
        } else {
            found_offline = true;
        }
    }
    if !found_offline {
        return Err(Error::DeviceNotFound);
    }
    Ok(ports)
}

/// Wait for the one device that re-enumerates after a mode switch
///
/// Watches for exactly one port beyond `existing` to settle, then
/// hands off to [`wait_for_device`] on that port with a fresh timeout.
#[cfg(feature = "std")]
pub fn wait_for_newcomer<S: UsbScan>(
    scanner: &mut S,
    existing: &[u32],
    mask: UsbModeMask,
    vid: u16,
    pid: u16,
    timeout: core::time::Duration,
) -> Result<DeviceDescriptor> {
    let start = std::time::Instant::now();
    let mut counter = NewcomerCounter::new();
    while start.elapsed() <= timeout {
        let devices = scanner.scan(UsbModeMask::all())?;
        if let Some(location) = counter.observe(&devices, existing) {
            return wait_for_device(scanner, location, mask, vid, pid, timeout);
        }
        std::thread::sleep(core::time::Duration::from_millis(SCAN_INTERVAL_MS));
    }
    log::debug!("scan: no newcomer settled beyond {} known ports", existing.len());
    Err(Error::Timeout)
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    fn dev(location_id: u32) -> DeviceDescriptor {
        DeviceDescriptor {
            vid: 0x2207,
            pid: 0x320A,
            bcd_usb: 0x0201,
            location_id,
            mode: UsbMode::Loader,
            family: ChipFamily::Rk32,
        }
    }

    #[test]
    fn classify_table_entry() {
        assert_eq!(
            classify(0x2207, 0x320A, 0x0200),
            Some((UsbMode::MaskRom, ChipFamily::Rk32))
        );
        assert_eq!(
            classify(0x2207, 0x320A, 0x0201),
            Some((UsbMode::Loader, ChipFamily::Rk32))
        );
        assert_eq!(
            classify(0x071B, 0x3201, 0x0100),
            Some((UsbMode::MaskRom, ChipFamily::Rk27))
        );
    }

    #[test]
    fn classify_unlisted_rockchip_pid() {
        assert_eq!(
            classify(0x2207, 0x350A, 0x0201),
            Some((UsbMode::Loader, ChipFamily::Unknown))
        );
        // product IDs below 0x100 never match the heuristic
        assert_eq!(classify(0x2207, 0x0042, 0x0201), None);
        assert_eq!(classify(0x1D6B, 0x0002, 0x0200), None);
    }

    #[test]
    fn classify_mass_storage() {
        assert_eq!(
            classify(0x2207, 0x0010, 0x0200),
            Some((UsbMode::Msc, ChipFamily::Unknown))
        );
        assert_eq!(
            classify(0x0BB4, 0x2910, 0x0201),
            Some((UsbMode::Msc, ChipFamily::Unknown))
        );
    }

    #[test]
    fn id_table_registers_oem_pairs() {
        let mut table = IdTable::new();
        assert!(!table.add_vid_pid(0x3333, 0x0042, 0x1111, 0x2222));
        assert!(!table.add_vid_pid(0, 0x0042, 0x2207, 0x320A));
        assert!(table.add_vid_pid(0x3333, 0x0042, 0x2207, 0x320A));
        assert_eq!(
            table.classify(0x3333, 0x0042, 0x0200),
            Some((UsbMode::MaskRom, ChipFamily::Rk32))
        );
        // builtin entries still resolve through the table
        assert_eq!(
            table.classify(0x071B, 0x3201, 0x0101),
            Some((UsbMode::Loader, ChipFamily::Rk27))
        );
        assert_eq!(table.classify(0x3333, 0x0043, 0x0200), None);
    }

    #[test]
    fn id_table_msc_extra() {
        let mut table = IdTable::new();
        table.add_msc(0x0BB4, 0x2910);
        table.add_msc(0x1234, 0x5678);
        assert_eq!(
            table.classify(0x1234, 0x5678, 0x0200),
            Some((UsbMode::Msc, ChipFamily::Unknown))
        );
    }

    #[test]
    fn descriptor_with_custom_table() {
        let mut table = IdTable::new();
        table.add_vid_pid(0x3333, 0x0042, 0x2207, 0x320A);
        let d = DeviceDescriptor::with_table(&table, 0x3333, 0x0042, 0x0200, 3, 7).unwrap();
        assert_eq!(d.family, ChipFamily::Rk32);
        assert_eq!(d.mode, UsbMode::MaskRom);
        assert_eq!(d.layer_name(), "3-7");
    }

    #[test]
    fn port_names() {
        assert_eq!(location_id(1, 2), 0x102);
        let d = DeviceDescriptor::new(0x2207, 0x320A, 0x0201, 1, 2).unwrap();
        assert_eq!(d.layer_name(), "1-2");
        let d = DeviceDescriptor::new(0x2207, 0x320A, 0x0201, 16, 255).unwrap();
        assert_eq!(d.layer_name(), "16-255");
    }

    #[test]
    fn wait_counter_needs_consecutive_sightings() {
        let mut counter = WaitCounter::new(0x102, 0, 0);
        let present = [dev(0x102), dev(0x203)];
        for _ in 0..7 {
            assert!(counter.observe(&present).is_none());
        }
        let settled = counter.observe(&present).unwrap();
        assert_eq!(settled.location_id, 0x102);
    }

    #[test]
    fn wait_counter_resets_on_gap() {
        let mut counter = WaitCounter::new(0x102, 0, 0);
        let present = [dev(0x102)];
        for _ in 0..7 {
            assert!(counter.observe(&present).is_none());
        }
        assert!(counter.observe(&[]).is_none());
        for _ in 0..7 {
            assert!(counter.observe(&present).is_none());
        }
        assert!(counter.observe(&present).is_some());
    }

    #[test]
    fn wait_counter_honors_id_filter() {
        let mut counter = WaitCounter::new(0x102, 0x2207, 0x0010);
        let present = [dev(0x102)]; // wrong pid on the right port
        for _ in 0..10 {
            assert!(counter.observe(&present).is_none());
        }
    }

    #[test]
    fn newcomer_settles_after_ten_passes() {
        let existing = [0x102, 0x203];
        let mut counter = NewcomerCounter::new();
        let view = [dev(0x102), dev(0x203), dev(0x304)];
        for _ in 0..9 {
            assert!(counter.observe(&view, &existing).is_none());
        }
        assert_eq!(counter.observe(&view, &existing), Some(0x304));
    }

    #[test]
    fn newcomer_resets_on_ambiguity() {
        let existing = [0x102];
        let mut counter = NewcomerCounter::new();
        let good = [dev(0x102), dev(0x304)];
        for _ in 0..9 {
            assert!(counter.observe(&good, &existing).is_none());
        }
        // a second unlisted device makes the view ambiguous
        let crowded = [dev(0x102), dev(0x304), dev(0x405)];
        assert!(counter.observe(&crowded, &existing).is_none());
        for _ in 0..9 {
            assert!(counter.observe(&good, &existing).is_none());
        }
        assert_eq!(counter.observe(&good, &existing), Some(0x304));
    }

    #[test]
    fn newcomer_resets_when_candidate_moves() {
        let existing = [0x102];
        let mut counter = NewcomerCounter::new();
        assert!(counter.observe(&[dev(0x102), dev(0x304)], &existing).is_none());
        assert!(counter.observe(&[dev(0x102), dev(0x405)], &existing).is_none());
        // the move reset the count, so ten more passes are needed
        for _ in 0..9 {
            assert!(counter.observe(&[dev(0x102), dev(0x405)], &existing).is_none());
        }
        assert_eq!(counter.observe(&[dev(0x102), dev(0x405)], &existing), Some(0x405));
    }
}
