//! rkflasher - Rockchip USB flashing tool
//!
//! Talks the Rockusb protocol to Rockchip SoCs attached over USB, in
//! either of their two download states:
//! - **Maskrom** - the Boot ROM; only accepts loader stages over
//!   vendor control requests (`download-boot`)
//! - **Loader** - a running bootloader speaking the full command set:
//!   LBA read/write, erase, partition tables, loader upgrade
//!
//! Device discovery and classification live in `rkflasher-usb` /
//! `rkflasher-core`; this binary is argument parsing, device selection
//! and console output around the core session type.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use rkflasher_core::flash::Flasher;
use rkflasher_core::scan::{UsbModeMask, UsbScan};
use rkflasher_usb::{NusbScanner, UsbTransport};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.verbose {
        0 => {}
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    match cli.command {
        Commands::List => commands::list::run(),
        Commands::DownloadBoot { loader } => {
            let mut flasher = select_device(cli.device, UsbModeMask::MASK_ROM)?;
            commands::boot::download(&mut flasher, &loader)
        }
        Commands::UpgradeLoader { loader } => {
            let mut flasher = rockusb_device(cli.device)?;
            commands::boot::upgrade(&mut flasher, &loader)
        }
        Commands::Read {
            begin,
            count,
            output,
        } => {
            let mut flasher = rockusb_device(cli.device)?;
            commands::read::run(&mut flasher, begin, count, &output)
        }
        Commands::Write { begin, input } => {
            let mut flasher = rockusb_device(cli.device)?;
            commands::write::run(&mut flasher, begin, &input)
        }
        Commands::WritePartition { name, input } => {
            let mut flasher = rockusb_device(cli.device)?;
            commands::write::run_partition(&mut flasher, &name, &input)
        }
        Commands::Erase { force } => {
            let mut flasher = rockusb_device(cli.device)?;
            commands::erase::run(&mut flasher, force)
        }
        Commands::EraseSystem => {
            let mut flasher = rockusb_device(cli.device)?;
            commands::erase::run_system(&mut flasher)
        }
        Commands::Reset { mode } => {
            let mut flasher = rockusb_device(cli.device)?;
            commands::device::reset(&mut flasher, mode)
        }
        Commands::TestDevice => {
            let mut flasher = rockusb_device(cli.device)?;
            commands::device::test(&mut flasher)
        }
        Commands::ChipInfo => {
            let mut flasher = rockusb_device(cli.device)?;
            commands::info::chip_info(&mut flasher)
        }
        Commands::FlashId => {
            let mut flasher = rockusb_device(cli.device)?;
            commands::info::flash_id(&mut flasher)
        }
        Commands::FlashInfo => {
            let mut flasher = rockusb_device(cli.device)?;
            commands::info::flash_info(&mut flasher)
        }
        Commands::Capability => {
            let mut flasher = rockusb_device(cli.device)?;
            commands::info::capability(&mut flasher)
        }
        Commands::Storage { switch } => {
            let mut flasher = rockusb_device(cli.device)?;
            commands::info::storage(&mut flasher, switch)
        }
        Commands::Partitions => {
            let mut flasher = rockusb_device(cli.device)?;
            commands::table::partitions(&mut flasher)
        }
        Commands::WriteParameter { input } => {
            let mut flasher = rockusb_device(cli.device)?;
            commands::table::write_parameter(&mut flasher, &input)
        }
        Commands::WriteGpt { input } => {
            let mut flasher = rockusb_device(cli.device)?;
            commands::table::write_gpt(&mut flasher, &input)
        }
        Commands::Unpack { loader, output } => commands::unpack::run(&loader, output.as_deref()),
    }
}

/// Open the selected device in either Rockusb state
fn rockusb_device(number: usize) -> Result<Flasher<UsbTransport>, Box<dyn std::error::Error>> {
    select_device(number, UsbModeMask::MASK_ROM | UsbModeMask::LOADER)
}

/// Scan for devices matching `mask` and open the `number`-th, counted
/// from 1 the way `list` prints them
fn select_device(
    number: usize,
    mask: UsbModeMask,
) -> Result<Flasher<UsbTransport>, Box<dyn std::error::Error>> {
    let mut scanner = NusbScanner::new();
    let devices = scanner.scan(mask)?;
    if devices.is_empty() {
        return Err("no matching Rockchip device attached".into());
    }
    let desc = devices.get(number.wrapping_sub(1)).ok_or_else(|| {
        format!(
            "device {} not found, {} device(s) attached",
            number,
            devices.len()
        )
    })?;
    log::info!(
        "using {:04x}:{:04x} at {} ({})",
        desc.vid,
        desc.pid,
        desc.layer_name(),
        desc.mode
    );
    Ok(rkflasher_usb::open_flasher(desc)?)
}
