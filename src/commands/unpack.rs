//! Loader image inspection and extraction.

use std::path::Path;

use rkflasher_core::image::{BootEntry, BootImage, EntryKind};

use super::boot::load_image;

/// Print a loader image's header and entry tables; with an output
/// directory, also extract every entry payload and, for firmware
/// containers, the boot and firmware regions
pub fn run(loader: &Path, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let image = load_image(loader)?;
    let boot = image.boot();

    if image.version() != 0 {
        println!(
            "Firmware: version 0x{:08x}, OS type {}, released {}",
            image.version(),
            image.os_type(),
            image.release_time()
        );
    }
    println!(
        "Boot image: version 0x{:08x}, chip 0x{:08x}, released {}",
        boot.version(),
        boot.supported_chip(),
        boot.release_time()
    );
    if boot.sign_flag() {
        println!("Signed: yes");
    }
    if boot.rc4_disabled() {
        println!("RC4: disabled");
    }

    for (kind, label) in [
        (EntryKind::Entry471, "471"),
        (EntryKind::Entry472, "472"),
        (EntryKind::Loader, "loader"),
    ] {
        for index in 0..boot.entry_count(kind) {
            let entry = boot.entry(kind, index)?;
            println!(
                "{:>6} {}  {:<24} size 0x{:x}  delay {} ms",
                label, index, entry.name, entry.data_size, entry.data_delay
            );
            if let Some(dir) = output {
                extract(boot, &entry, dir)?;
            }
        }
    }

    // Bare loader .bin files have nothing beyond their entries.
    if image.version() != 0 {
        if let Some(dir) = output {
            std::fs::create_dir_all(dir)?;
            let boot_path = dir.join("boot.bin");
            image.save_boot(&boot_path)?;
            println!("        -> {:?}", boot_path);
            if image.fw_size() > 0 {
                let fw_path = dir.join("firmware.img");
                image.save_firmware(&fw_path)?;
                println!("        -> {:?}", fw_path);
            }
        }
    }
    Ok(())
}

fn extract(
    boot: &BootImage,
    entry: &BootEntry,
    dir: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    if entry.name.is_empty() || entry.data_size == 0 {
        return Ok(());
    }
    std::fs::create_dir_all(dir)?;
    let data = boot.entry_data(entry)?;
    let path = dir.join(&entry.name);
    std::fs::write(&path, data)?;
    println!("        -> {:?}", path);
    Ok(())
}
