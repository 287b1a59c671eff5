//! Device listing.

use rkflasher_core::scan::{UsbModeMask, UsbScan};
use rkflasher_usb::NusbScanner;

/// List every attached Rockchip device, whatever its mode
pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut scanner = NusbScanner::new();
    let devices = scanner.scan(UsbModeMask::all())?;

    if devices.is_empty() {
        println!("No Rockchip devices found.");
        return Ok(());
    }

    for (index, dev) in devices.iter().enumerate() {
        println!(
            "DevNo={}\tVid=0x{:04X},Pid=0x{:04X},LocationID={}\t{}",
            index + 1,
            dev.vid,
            dev.pid,
            dev.layer_name(),
            dev.mode
        );
    }
    Ok(())
}
