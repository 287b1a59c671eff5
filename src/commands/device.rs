//! Device state commands.

use rkflasher_core::flash::Flasher;
use rkflasher_core::protocol::ResetCode;
use rkflasher_usb::UsbTransport;

use super::progress::ConsoleProgress;
use crate::cli::ResetMode;

/// Poll the device until it reports ready
pub fn test(flasher: &mut Flasher<UsbTransport>) -> Result<(), Box<dyn std::error::Error>> {
    let mut progress = ConsoleProgress::new();
    flasher.test_device(&mut progress)?;
    println!("Device is ready.");
    Ok(())
}

/// Reset the device into the requested target
pub fn reset(
    flasher: &mut Flasher<UsbTransport>,
    mode: ResetMode,
) -> Result<(), Box<dyn std::error::Error>> {
    match mode {
        // Power-off expects a confirmed status, a reboot does not
        ResetMode::PowerOff => flasher.power_off()?,
        _ => flasher.reset(reset_code(mode))?,
    }
    println!("Reset device success.");
    Ok(())
}

fn reset_code(mode: ResetMode) -> ResetCode {
    match mode {
        ResetMode::Reboot => ResetCode::None,
        ResetMode::Msc => ResetCode::Msc,
        ResetMode::PowerOff => ResetCode::PowerOff,
        ResetMode::Maskrom => ResetCode::MaskRom,
        ResetMode::Disconnect => ResetCode::Disconnect,
    }
}
