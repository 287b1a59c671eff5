//! Partition table commands.

use std::path::Path;

use rkflasher_core::flash::{Flasher, PartitionTable};
use rkflasher_usb::UsbTransport;

/// Print the on-flash partition table, GPT or parameter
pub fn partitions(flasher: &mut Flasher<UsbTransport>) -> Result<(), Box<dyn std::error::Error>> {
    match flasher.read_partition_table()? {
        PartitionTable::Gpt(parts) => {
            println!("**********Partition Info(GPT)**********");
            println!("NO  LBA       Size      Name");
            for (index, part) in parts.iter().enumerate() {
                let sectors = part.last_lba.wrapping_sub(part.first_lba).wrapping_add(1);
                println!(
                    "{:02}  {:08X}  {:08X}  {}",
                    index, part.first_lba, sectors, part.name
                );
            }
        }
        PartitionTable::Parameter(parts) => {
            println!("**********Partition Info(parameter)**********");
            println!("NO  LBA       Size      Name");
            for (index, part) in parts.iter().enumerate() {
                println!(
                    "{:02}  {:08X}  {:08X}  {}",
                    index, part.offset, part.size, part.name
                );
            }
        }
    }
    Ok(())
}

/// Write a parameter file to the parameter sectors
pub fn write_parameter(
    flasher: &mut Flasher<UsbTransport>,
    input: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(input)?;
    println!("Writing parameter from {:?}...", input);
    flasher.write_parameter(&text)?;
    println!("Write parameter success.");
    Ok(())
}

/// Build a GPT from a parameter file and write it at LBA 0
pub fn write_gpt(
    flasher: &mut Flasher<UsbTransport>,
    input: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(input)?;
    println!("Writing GPT from {:?}...", input);
    flasher.write_gpt(&text)?;
    println!("Write GPT success.");
    Ok(())
}
