//! Error types for rkflasher-core
//!
//! This module provides a no_std compatible error type that can be used
//! throughout the crate. Protocol failures are plain codes, following the
//! device's own status-driven error model.

use core::fmt;

/// Reason a binary container failed to parse or build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatError {
    /// Buffer is shorter than the fixed header it should contain
    Truncated,
    /// Magic number or tag does not identify the expected format
    BadMagic,
    /// Stored checksum does not match the container contents
    CrcMismatch,
    /// A header offset/size pair points outside the buffer
    OutOfBounds,
    /// A field holds a value the format does not allow
    InvalidField,
}

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    // Transport surface
    /// Writing to the device failed
    WriteFailed,
    /// Reading from the device failed
    ReadFailed,

    // Protocol status
    /// No status block matching the command arrived, even after draining
    /// stale device output
    CswMismatch,
    /// Device reports it is not ready yet
    DeviceUnready,
    /// Erase hit a bad block (continuable during a chip erase)
    BadBlock,
    /// Device reported the command failed
    CommandFailed,
    /// Request exceeds the per-command transfer limit
    CrossBorder,
    /// Operation is not valid for the device's current mode
    NotSupported,
    /// Vendor request code is not accepted in this mode
    RequestNotSupported,
    /// Vendor control request failed
    RequestFailed,
    /// Provided buffer is too small for the response
    BufferTooSmall,

    // Discovery / session
    /// No matching device was found
    DeviceNotFound,
    /// Operation timed out
    Timeout,
    /// I/O error occurred
    Io,
    /// Named partition does not exist in the on-flash table
    PartitionNotFound,

    // Containers
    /// Binary container parse or build failure
    Format(FormatError),
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "buffer truncated"),
            Self::BadMagic => write!(f, "bad magic or tag"),
            Self::CrcMismatch => write!(f, "checksum mismatch"),
            Self::OutOfBounds => write!(f, "offset/size outside buffer"),
            Self::InvalidField => write!(f, "invalid field value"),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WriteFailed => write!(f, "device write failed"),
            Self::ReadFailed => write!(f, "device read failed"),
            Self::CswMismatch => write!(f, "command status not matching"),
            Self::DeviceUnready => write!(f, "device not ready"),
            Self::BadBlock => write!(f, "bad block found"),
            Self::CommandFailed => write!(f, "command failed"),
            Self::CrossBorder => write!(f, "transfer crosses command limit"),
            Self::NotSupported => write!(f, "operation not supported by device mode"),
            Self::RequestNotSupported => write!(f, "vendor request not supported"),
            Self::RequestFailed => write!(f, "vendor request failed"),
            Self::BufferTooSmall => write!(f, "buffer too small"),
            Self::DeviceNotFound => write!(f, "device not found"),
            Self::Timeout => write!(f, "operation timed out"),
            Self::Io => write!(f, "I/O error"),
            Self::PartitionNotFound => write!(f, "partition not found"),
            Self::Format(e) => write!(f, "format error: {}", e),
        }
    }
}

impl From<FormatError> for Error {
    fn from(e: FormatError) -> Self {
        Error::Format(e)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

#[cfg(feature = "std")]
impl From<std::io::Error> for Error {
    fn from(_: std::io::Error) -> Self {
        Error::Io
    }
}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
