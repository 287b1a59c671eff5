//! Error types for the USB transport layer.

use thiserror::Error;

/// Result type for USB transport operations
pub type Result<T> = core::result::Result<T, UsbError>;

/// Errors raised while discovering or talking to a USB device
#[derive(Debug, Error)]
pub enum UsbError {
    /// No device matching the requested descriptor is attached
    #[error("no matching USB device attached")]
    DeviceNotFound,

    /// Opening the device node failed
    #[error("failed to open device: {0}")]
    OpenFailed(String),

    /// Claiming the vendor interface failed
    #[error("failed to claim interface: {0}")]
    ClaimFailed(String),

    /// The active configuration exposes no bulk in/out endpoint pair
    #[error("device has no bulk endpoint pair")]
    NoBulkEndpoints,

    /// A transfer failed after the device was opened
    #[error("USB transfer failed: {0}")]
    TransferFailed(String),

    /// A protocol-level failure from the core session
    #[error("device error: {0}")]
    Device(#[from] rkflasher_core::Error),
}
