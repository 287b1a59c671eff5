//! Sector read command.

use std::path::Path;

use rkflasher_core::flash::Flasher;
use rkflasher_usb::UsbTransport;

use super::progress::ConsoleProgress;

/// Read `count` sectors starting at `begin` into `output`
pub fn run(
    flasher: &mut Flasher<UsbTransport>,
    begin: u32,
    count: u32,
    output: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("Reading {} sector(s) from {}...", count, begin);
    let mut progress = ConsoleProgress::new();
    flasher.read_lba_file(begin, count, output, &mut progress)?;
    println!("Wrote {} sector(s) to {:?}", count, output);
    Ok(())
}
