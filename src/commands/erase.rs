//! Erase commands.

use rkflasher_core::flash::Flasher;
use rkflasher_usb::UsbTransport;

use super::progress::ConsoleProgress;

/// Erase the whole flash
///
/// eMMC and direct-LBA devices are cleared by LBA erase; NAND is
/// walked block by block per chip select. `force` takes the block
/// path regardless.
pub fn run(
    flasher: &mut Flasher<UsbTransport>,
    force: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let info = flasher.load_flash_info()?;
    println!(
        "Erasing {} MB ({} blocks of {} KB)...",
        info.size_mb, info.block_count, info.block_size_kb
    );
    let mut progress = ConsoleProgress::new();
    flasher.erase_flash(force, &mut progress)?;
    println!("Erase success.");
    Ok(())
}

/// Erase the system disk area
pub fn run_system(flasher: &mut Flasher<UsbTransport>) -> Result<(), Box<dyn std::error::Error>> {
    println!("Erasing system disk...");
    flasher.device().erase_system_disk()?;
    println!("Erase success.");
    Ok(())
}
