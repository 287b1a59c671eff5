//! Device identity and geometry queries.

use rkflasher_core::flash::Flasher;
use rkflasher_usb::UsbTransport;

/// Print the 16-byte chip identity
pub fn chip_info(flasher: &mut Flasher<UsbTransport>) -> Result<(), Box<dyn std::error::Error>> {
    let raw = flasher.device().read_chip_info()?;
    print!("Chip Info:");
    for word in raw.chunks(4) {
        print!(" {:02X}{:02X}{:02X}{:02X}", word[3], word[2], word[1], word[0]);
    }
    println!();
    Ok(())
}

/// Print the 5-byte flash ID
pub fn flash_id(flasher: &mut Flasher<UsbTransport>) -> Result<(), Box<dyn std::error::Error>> {
    let id = flasher.device().read_flash_id()?;
    print!("Flash ID:");
    for byte in id {
        print!(" {:02X}", byte);
    }
    println!();
    Ok(())
}

/// Print the flash geometry
pub fn flash_info(flasher: &mut Flasher<UsbTransport>) -> Result<(), Box<dyn std::error::Error>> {
    let info = flasher.load_flash_info()?;
    println!("Flash Info:");
    println!("\tManufacturer: {}", info.manufacturer);
    println!("\tFlash Size: {} MB", info.size_mb);
    println!("\tBlock Size: {} KB", info.block_size_kb);
    println!("\tPage Size: {} KB", info.page_size_kb);
    println!("\tSector Per Block: {}", info.sectors_per_block);
    println!("\tBlock Num: {}", info.block_count);
    println!("\tECC Bits: {}", info.ecc_bits);
    println!("\tAccess Time: {}", info.access_time);
    print!("\tFlash CS:");
    for cs in 0..8 {
        if info.chip_selects & (1 << cs) != 0 {
            print!(" Flash<{}>", cs);
        }
    }
    println!();
    if flasher.is_emmc() {
        println!("\tMedium: eMMC");
    }
    Ok(())
}

/// Print the loader capability bits
pub fn capability(flasher: &mut Flasher<UsbTransport>) -> Result<(), Box<dyn std::error::Error>> {
    let caps = flasher.device().read_capability()?;
    print!("Capability:");
    for byte in caps {
        print!(" {:02X}", byte);
    }
    println!();
    if caps[0] & 0x01 != 0 {
        println!("\tDirect LBA: enabled");
    }
    if caps[0] & 0x04 != 0 {
        println!("\tFirst 4M Access: enabled");
    }
    if caps[1] & 0x01 != 0 {
        println!("\tNew IDB: enabled");
    }
    Ok(())
}

/// Print the active storage medium, switching first when asked
pub fn storage(
    flasher: &mut Flasher<UsbTransport>,
    switch: Option<u8>,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(media) = switch {
        println!("Switching storage to {}...", media);
        flasher.device().change_storage(media)?;
    }
    let current = flasher.device().read_storage()?;
    println!("Current storage: {}", current);
    Ok(())
}
