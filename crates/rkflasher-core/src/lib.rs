//! rkflasher-core - Core library for Rockchip USB device flashing
//!
//! This crate implements the vendor command protocol spoken by Rockchip
//! SoCs in Maskrom/Loader mode, the binary container formats involved in
//! provisioning them (boot images, RKFW firmware, GPT, Android sparse,
//! legacy ID blocks, parameter blobs) and the orchestration on top. It is
//! `no_std` compatible; the pieces that need files or wall-clock time are
//! gated behind the `std` feature.
//!
//! # Features
//!
//! - `std` - Enable standard library support (includes `alloc`)
//! - `alloc` - Enable heap allocation for container parsing and builders
//!
//! # Example
//!
//! ```ignore
//! use rkflasher_core::protocol::Rockusb;
//! use rkflasher_core::scan::UsbMode;
//! use rkflasher_core::transport::Transport;
//!
//! fn identify<T: Transport>(transport: T) {
//!     let mut dev = Rockusb::new(transport, UsbMode::Loader);
//!     match dev.read_chip_info() {
//!         Ok(info) => println!("chip: {:02x?}", info),
//!         Err(e) => println!("chip info failed: {}", e),
//!     }
//! }
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod crc;
pub mod error;
#[cfg(feature = "alloc")]
pub mod flash;
#[cfg(feature = "alloc")]
pub mod image;
#[cfg(feature = "alloc")]
pub mod partition;
pub mod protocol;
pub mod scan;
pub mod transport;

pub use error::{Error, Result};
