//! Partition table handling.
//!
//! Rockchip devices describe their disk layout in one of two places. Older
//! firmware keeps a `parameter` text blob at the start of flash whose
//! `CMDLINE` line carries an mtdparts-style partition list; newer firmware
//! uses a regular GPT. Both are built and queried here, so the orchestrator
//! can resolve a partition name to an LBA range no matter which scheme the
//! device was provisioned with.

pub mod gpt;
pub mod parameter;

pub use gpt::GptPartition;
pub use parameter::Partition;
