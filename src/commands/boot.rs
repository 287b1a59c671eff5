//! Loader staging and upgrade.

use std::path::Path;

use rkflasher_core::flash::Flasher;
use rkflasher_core::image::FirmwareImage;
use rkflasher_usb::UsbTransport;

/// Load a loader image, unwrapping an "RKFW" container when present
pub fn load_image(path: &Path) -> Result<FirmwareImage, Box<dyn std::error::Error>> {
    let image = FirmwareImage::load(path)?;
    log::debug!(
        "loader: {:?} holds a boot image for chip 0x{:08x}",
        path,
        image.boot().supported_chip()
    );
    Ok(image)
}

/// Stage the loader into a Maskrom device over vendor requests
pub fn download(
    flasher: &mut Flasher<UsbTransport>,
    loader: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let image = load_image(loader)?;
    println!("Downloading boot...");
    flasher.download_boot(image.boot())?;
    println!("Download boot success.");
    Ok(())
}

/// Rebuild the ID blocks from the loader image and flash them
pub fn upgrade(
    flasher: &mut Flasher<UsbTransport>,
    loader: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let image = load_image(loader)?;
    println!("Upgrading loader...");
    flasher.upgrade_loader(image.boot())?;
    println!("Upgrade loader success.");
    Ok(())
}
