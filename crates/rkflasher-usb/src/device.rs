//! nusb-backed device discovery and bulk transport.
//!
//! [`NusbScanner`] lists attached devices and classifies them through
//! the core scan tables; [`UsbTransport`] claims one device and feeds
//! its bulk endpoint pair plus the default control pipe to the
//! protocol engine.

use std::time::Duration;

use nusb::descriptors::TransferType;
use nusb::transfer::{Buffer, Bulk, In, Out};
use nusb::{Device, Endpoint, Interface, MaybeFuture};
use rkflasher_core::error::{Error as CoreError, Result as CoreResult};
use rkflasher_core::flash::Flasher;
use rkflasher_core::scan::{location_id, DeviceDescriptor, IdTable, UsbModeMask, UsbScan};
use rkflasher_core::transport::Transport;

use crate::error::{Result, UsbError};

/// Interface number carrying the Rockusb endpoint pair
const ROCKUSB_INTERFACE: u8 = 0;

/// Device discovery backed by the host's USB device list
///
/// Classification runs against an [`IdTable`]; use [`with_table`] to
/// scan for boards enumerating under OEM vendor/product pairs.
///
/// [`with_table`]: NusbScanner::with_table
#[derive(Debug, Clone, Default)]
pub struct NusbScanner {
    table: IdTable,
}

impl NusbScanner {
    /// Scanner over the builtin ID tables
    pub fn new() -> Self {
        Self::default()
    }

    /// Scanner over a caller-provided ID table
    pub fn with_table(table: IdTable) -> Self {
        Self { table }
    }
}

impl UsbScan for NusbScanner {
    fn scan(&mut self, mask: UsbModeMask) -> CoreResult<Vec<DeviceDescriptor>> {
        let list = nusb::list_devices().wait().map_err(|e| {
            log::warn!("usb: listing devices failed: {}", e);
            CoreError::Io
        })?;

        let mut found = Vec::new();
        for info in list {
            let desc = match DeviceDescriptor::with_table(
                &self.table,
                info.vendor_id(),
                info.product_id(),
                info.usb_version(),
                info.busnum(),
                info.device_address(),
            ) {
                Some(desc) => desc,
                None => continue,
            };
            if mask.contains(desc.mode.mask()) {
                log::trace!(
                    "usb: {:04x}:{:04x} at {} is a {} device",
                    desc.vid,
                    desc.pid,
                    desc.layer_name(),
                    desc.mode
                );
                found.push(desc);
            }
        }
        Ok(found)
    }
}

/// A claimed Rockusb device
///
/// Holds the vendor interface plus the addresses of its bulk endpoint
/// pair, discovered from the active configuration at open time. The
/// interface is released when the transport is dropped.
pub struct UsbTransport {
    interface: Interface,
    in_endpoint: u8,
    out_endpoint: u8,
}

impl UsbTransport {
    /// Open and claim the device behind `desc`
    ///
    /// The descriptor's port identity is resolved against the current
    /// bus state; a stale descriptor for a device that re-enumerated
    /// elsewhere fails with [`UsbError::DeviceNotFound`].
    pub fn open(desc: &DeviceDescriptor) -> Result<Self> {
        let info = nusb::list_devices()
            .wait()
            .map_err(|e| UsbError::OpenFailed(e.to_string()))?
            .find(|d| {
                d.vendor_id() == desc.vid
                    && d.product_id() == desc.pid
                    && location_id(d.busnum(), d.device_address()) == desc.location_id
            })
            .ok_or(UsbError::DeviceNotFound)?;

        let device = info
            .open()
            .wait()
            .map_err(|e| UsbError::OpenFailed(e.to_string()))?;

        let (in_endpoint, out_endpoint) = bulk_endpoints(&device)?;

        let interface = device
            .claim_interface(ROCKUSB_INTERFACE)
            .wait()
            .map_err(|e| UsbError::ClaimFailed(e.to_string()))?;

        log::debug!(
            "usb: claimed {:04x}:{:04x} at {}, bulk in 0x{:02x} out 0x{:02x}",
            desc.vid,
            desc.pid,
            desc.layer_name(),
            in_endpoint,
            out_endpoint
        );

        Ok(Self {
            interface,
            in_endpoint,
            out_endpoint,
        })
    }

    fn bulk_read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let mut in_ep: Endpoint<Bulk, In> = self
            .interface
            .endpoint(self.in_endpoint)
            .map_err(|e| UsbError::TransferFailed(e.to_string()))?;

        let max_packet_size = in_ep.max_packet_size();
        let request_len = buf.len().div_ceil(max_packet_size) * max_packet_size;
        let mut in_buf = Buffer::new(request_len);
        in_buf.set_requested_len(request_len);

        let completion = in_ep.transfer_blocking(in_buf, timeout);
        let data = completion
            .into_result()
            .map_err(|e| UsbError::TransferFailed(e.to_string()))?;

        let len = data.len().min(buf.len());
        buf[..len].copy_from_slice(&data[..len]);
        Ok(len)
    }

    fn bulk_write(&mut self, data: &[u8], timeout: Duration) -> Result<()> {
        let mut out_ep: Endpoint<Bulk, Out> = self
            .interface
            .endpoint(self.out_endpoint)
            .map_err(|e| UsbError::TransferFailed(e.to_string()))?;

        let mut out_buf = Buffer::new(data.len());
        out_buf.extend_from_slice(data);

        let completion = out_ep.transfer_blocking(out_buf, timeout);
        match completion.status {
            Ok(()) if completion.actual_len == data.len() => Ok(()),
            Ok(()) => Err(UsbError::TransferFailed(format!(
                "short write: sent {} of {} bytes",
                completion.actual_len,
                data.len()
            ))),
            Err(e) => Err(UsbError::TransferFailed(e.to_string())),
        }
    }
}

impl Transport for UsbTransport {
    fn write(&mut self, data: &[u8]) -> CoreResult<()> {
        self.bulk_write(data, Duration::from_secs(5)).map_err(|e| {
            log::debug!("usb: bulk write of {} bytes failed: {}", data.len(), e);
            CoreError::WriteFailed
        })
    }

    fn read(&mut self, buf: &mut [u8]) -> CoreResult<()> {
        let len = self.bulk_read(buf, Duration::from_secs(5)).map_err(|e| {
            log::debug!("usb: bulk read of {} bytes failed: {}", buf.len(), e);
            CoreError::ReadFailed
        })?;
        if len != buf.len() {
            log::debug!("usb: short read, {} of {} bytes", len, buf.len());
            return Err(CoreError::ReadFailed);
        }
        Ok(())
    }

    fn read_timeout(&mut self, buf: &mut [u8], timeout_ms: u32) -> CoreResult<usize> {
        match self.bulk_read(buf, Duration::from_millis(timeout_ms as u64)) {
            Ok(len) => Ok(len),
            Err(e) => {
                log::trace!("usb: timed read returned nothing: {}", e);
                Ok(0)
            }
        }
    }

    fn control_out(&mut self, request: u8, value: u16, index: u16, data: &[u8]) -> CoreResult<()> {
        self.interface
            .control_out(
                nusb::transfer::ControlOut {
                    control_type: nusb::transfer::ControlType::Vendor,
                    recipient: nusb::transfer::Recipient::Device,
                    request,
                    value,
                    index,
                    data,
                },
                Duration::from_secs(5),
            )
            .wait()
            .map_err(|e| {
                log::debug!("usb: vendor request 0x{:02x} failed: {}", request, e);
                CoreError::RequestFailed
            })?;
        Ok(())
    }
}

/// Open the device behind `desc` and wrap it in a flashing session
pub fn open_flasher(desc: &DeviceDescriptor) -> Result<Flasher<UsbTransport>> {
    let transport = UsbTransport::open(desc)?;
    Ok(Flasher::new(transport, *desc))
}

/// Locate the first bulk in/out endpoint pair on the vendor interface
///
/// Both Maskrom and Loader devices expose one pair; the addresses vary
/// between Boot ROM generations, so they are read from the descriptor
/// rather than assumed.
fn bulk_endpoints(device: &Device) -> Result<(u8, u8)> {
    let config = device
        .active_configuration()
        .map_err(|e| UsbError::OpenFailed(e.to_string()))?;

    let mut ep_in = None;
    let mut ep_out = None;
    for iface in config.interface_alt_settings() {
        if iface.interface_number() != ROCKUSB_INTERFACE {
            continue;
        }
        for ep in iface.endpoints() {
            if !matches!(ep.transfer_type(), TransferType::Bulk) {
                continue;
            }
            if ep.address() & 0x80 != 0 {
                ep_in.get_or_insert(ep.address());
            } else {
                ep_out.get_or_insert(ep.address());
            }
        }
    }

    match (ep_in, ep_out) {
        (Some(input), Some(output)) => Ok((input, output)),
        _ => Err(UsbError::NoBulkEndpoints),
    }
}
