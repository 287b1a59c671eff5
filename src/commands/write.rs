//! Sector and partition write commands.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use rkflasher_core::flash::Flasher;
use rkflasher_core::image::sparse::{is_sparse_image, SPARSE_HEADER_LEN};
use rkflasher_usb::UsbTransport;

use super::progress::ConsoleProgress;

/// Write `input` starting at sector `begin`
///
/// Sparse images are detected by magic and expanded while streaming;
/// anything else is written raw.
pub fn run(
    flasher: &mut Flasher<UsbTransport>,
    begin: u32,
    input: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut progress = ConsoleProgress::new();
    if probe_sparse(input)? {
        println!("Writing sparse image {:?} at sector {}...", input, begin);
        flasher.write_sparse_file(begin, input, &mut progress)?;
    } else {
        println!("Writing {:?} at sector {}...", input, begin);
        flasher.write_lba_file(begin, input, &mut progress)?;
    }
    println!("Write success.");
    Ok(())
}

/// Write `input` into the named partition from the on-flash table
pub fn run_partition(
    flasher: &mut Flasher<UsbTransport>,
    name: &str,
    input: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("Writing {:?} to partition {}...", input, name);
    let mut progress = ConsoleProgress::new();
    flasher.write_partition(name, input, &mut progress)?;
    println!("Write success.");
    Ok(())
}

/// Whether the file starts with a sparse image header
fn probe_sparse(path: &Path) -> Result<bool, Box<dyn std::error::Error>> {
    let mut head = [0u8; SPARSE_HEADER_LEN];
    let mut file = File::open(path)?;
    let mut filled = 0;
    while filled < head.len() {
        let n = file.read(&mut head[filled..])?;
        if n == 0 {
            return Ok(false);
        }
        filled += n;
    }
    Ok(is_sparse_image(&head))
}
