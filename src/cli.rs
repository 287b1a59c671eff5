//! CLI argument parsing

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Parse a string as a hex or decimal u32
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

#[derive(Parser)]
#[command(name = "rkflasher")]
#[command(author, version, about = "Rockchip USB flashing tool", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Device number when several are attached, as printed by `list`
    #[arg(short, long, global = true, default_value_t = 1)]
    pub device: usize,

    #[command(subcommand)]
    pub command: Commands,
}

/// Reboot target for the reset command
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResetMode {
    /// Plain reboot
    #[default]
    Reboot,
    /// Reboot into USB mass storage
    Msc,
    /// Power the device off
    PowerOff,
    /// Reboot into Maskrom mode
    Maskrom,
    /// Drop off the bus without rebooting
    Disconnect,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List attached Rockchip devices
    List,

    /// Stage a loader into a Maskrom device over vendor requests
    DownloadBoot {
        /// Loader image file
        loader: PathBuf,
    },

    /// Write a loader image to the on-flash ID blocks
    UpgradeLoader {
        /// Loader image file
        loader: PathBuf,
    },

    /// Read sectors into a file
    Read {
        /// First sector (hex with 0x prefix, or decimal)
        #[arg(value_parser = parse_hex_u32)]
        begin: u32,

        /// Number of sectors to read
        #[arg(value_parser = parse_hex_u32)]
        count: u32,

        /// Output file
        output: PathBuf,
    },

    /// Write a file to flash; sparse images are expanded on the fly
    Write {
        /// First sector (hex with 0x prefix, or decimal)
        #[arg(value_parser = parse_hex_u32)]
        begin: u32,

        /// Image file
        input: PathBuf,
    },

    /// Write a file into a named partition from the on-flash table
    WritePartition {
        /// Partition name, case-insensitive
        name: String,

        /// Image file
        input: PathBuf,
    },

    /// Erase the whole flash
    Erase {
        /// Erase block by block even when LBA erase is available
        #[arg(long)]
        force: bool,
    },

    /// Erase the system disk area
    EraseSystem,

    /// Reset the device
    Reset {
        /// Reboot target
        #[arg(long, value_enum, default_value_t = ResetMode::Reboot)]
        mode: ResetMode,
    },

    /// Poll the device until it reports ready
    TestDevice,

    /// Print the chip identity
    ChipInfo,

    /// Print the raw flash ID
    FlashId,

    /// Print the flash geometry
    FlashInfo,

    /// Print the loader capability bits
    Capability,

    /// Print the active storage medium, or switch it
    Storage {
        /// Media code to switch to
        #[arg(long)]
        switch: Option<u8>,
    },

    /// Print the on-flash partition table
    Partitions,

    /// Write a parameter file to the parameter sectors
    WriteParameter {
        /// Parameter text file
        input: PathBuf,
    },

    /// Build a GPT from a parameter file and write it to LBA 0
    WriteGpt {
        /// Parameter text file with an mtdparts list
        input: PathBuf,
    },

    /// Show a loader image's contents, optionally extracting the entries
    Unpack {
        /// Loader image file
        loader: PathBuf,

        /// Directory to extract entry payloads into
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}
