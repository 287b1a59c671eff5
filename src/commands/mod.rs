//! CLI command implementations
//!
//! One module per command family. Every command that talks to a device
//! takes an open [`Flasher`](rkflasher_core::flash::Flasher) session;
//! device selection itself happens in `main`. Long operations report
//! through the [`progress::ConsoleProgress`] bars.

pub mod boot;
pub mod device;
pub mod erase;
pub mod info;
pub mod list;
pub mod progress;
pub mod read;
pub mod table;
pub mod unpack;
pub mod write;
