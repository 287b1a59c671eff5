//! Transport layer abstraction for rockusb communication
//!
//! The protocol engine only needs a byte pipe with timeout semantics plus
//! vendor control transfers; concrete USB plumbing lives outside this
//! crate. Implementations map their native failures to
//! [`Error::WriteFailed`](crate::Error::WriteFailed) /
//! [`Error::ReadFailed`](crate::Error::ReadFailed) /
//! [`Error::RequestFailed`](crate::Error::RequestFailed).

use crate::error::Result;

/// Transport trait for rockusb devices
pub trait Transport {
    /// Write bytes to the bulk-out pipe
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Read bytes from the bulk-in pipe
    ///
    /// Reads exactly `buf.len()` bytes into the buffer.
    /// Returns an error if not enough bytes are available.
    fn read(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Read with timeout (non-blocking)
    ///
    /// Reads up to `buf.len()` bytes, waiting up to `timeout_ms`
    /// milliseconds. Returns the number of bytes read, or 0 on timeout.
    /// Used by status resynchronization to drain stale device output.
    fn read_timeout(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<usize>;

    /// Issue a vendor control-out transfer
    ///
    /// Sends `data` with the given request code, value and index on the
    /// default control pipe (host-to-device, vendor type). Maskrom boot
    /// stages are delivered this way, never over bulk.
    fn control_out(&mut self, request: u8, value: u16, index: u16, data: &[u8]) -> Result<()>;
}
