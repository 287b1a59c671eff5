//! rkflasher-usb - nusb transport for Rockchip USB devices
//!
//! This crate connects the transport-agnostic session logic in
//! `rkflasher-core` to real hardware. It lists attached devices,
//! classifies them through the core vid/pid tables and exposes a
//! claimed device as a [`Transport`](rkflasher_core::transport::Transport)
//! the protocol engine can drive.
//!
//! Rockchip devices enumerate in one of three states:
//! - Maskrom: the Boot ROM, waiting for loader stages over vendor
//!   control requests
//! - Loader: a running bootloader speaking the full Rockusb command set
//! - MSC: rebooted into plain USB mass storage
//!
//! # Example
//!
//! ```no_run
//! use rkflasher_core::scan::{UsbModeMask, UsbScan};
//! use rkflasher_usb::NusbScanner;
//!
//! let mut scanner = NusbScanner::new();
//! let devices = scanner.scan(UsbModeMask::MASK_ROM | UsbModeMask::LOADER)?;
//! for dev in &devices {
//!     println!("{:04x}:{:04x} at {}: {}", dev.vid, dev.pid, dev.layer_name(), dev.mode);
//! }
//!
//! if let Some(dev) = devices.first() {
//!     let mut flasher = rkflasher_usb::open_flasher(dev)?;
//!     let info = flasher.load_flash_info()?;
//!     println!("flash: {} MB, {} sectors", info.size_mb, info.total_sectors());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod device;
mod error;

pub use device::{open_flasher, NusbScanner, UsbTransport};
pub use error::{Result, UsbError};
