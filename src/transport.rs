//! USB bulk transport used by the transaction engine.
//!
//! [`Transport`] is the seam between the board logic and the USB stack.
//! [`NusbTransport`] is the real implementation; tests substitute a simulated
//! board.

use crate::consts;
use crate::device::Sub20DeviceInfo;
use crate::error::{Error, Result, UsbFault};
use log::{debug, trace};
use nusb::transfer::{Buffer, Bulk, In, Out, TransferError};
use nusb::MaybeFuture;
use std::time::Duration;

/// Blocking bulk transfers on a claimed device.
///
/// Implementations report timeouts as [`UsbFault::Timeout`]. No retry is
/// expected at this level.
pub trait Transport: Send {
    /// Writes `data` to the OUT endpoint, returning the number of bytes accepted.
    fn bulk_write(
        &mut self,
        endpoint: u8,
        data: &[u8],
        timeout: Duration,
    ) -> std::result::Result<usize, UsbFault>;

    /// Reads one transfer from the IN endpoint into `buf`, returning its length.
    fn bulk_read(
        &mut self,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> std::result::Result<usize, UsbFault>;
}

/// [`Transport`] over a SUB-20 opened with `nusb`.
pub struct NusbTransport {
    #[allow(dead_code)] // Kept to ensure the USB device stays open
    device: nusb::Device,
    interface: nusb::Interface,
}

impl std::fmt::Debug for NusbTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NusbTransport").finish_non_exhaustive()
    }
}

impl NusbTransport {
    /// Opens the board described by `info` and claims its bulk interface.
    pub fn open(info: &Sub20DeviceInfo) -> Result<Self> {
        let dev_info = nusb::list_devices()
            .wait()?
            .find(|d| {
                d.vendor_id() == consts::SUB20_VID
                    && d.product_id() == consts::SUB20_PID
                    && d.busnum() == info.bus
                    && d.device_address() == info.address
            })
            .ok_or(Error::DeviceNotFound)?;
        Self::from_device_info(dev_info)
    }

    /// Opens an already-discovered [`nusb::DeviceInfo`].
    pub fn from_device_info(dev_info: nusb::DeviceInfo) -> Result<Self> {
        let device = dev_info.open().wait()?;
        // Detach kernel driver and claim interface
        let interface = device
            .detach_and_claim_interface(consts::INTERFACE)
            .wait()?;
        debug!(
            "Claimed SUB-20 interface {} (bus {}, address {})",
            consts::INTERFACE,
            dev_info.busnum(),
            dev_info.device_address()
        );
        Ok(Self { device, interface })
    }
}

fn map_transfer_error(err: TransferError) -> UsbFault {
    match err {
        // Blocking transfers are only cancelled when the timeout expires
        TransferError::Cancelled => UsbFault::Timeout,
        TransferError::Stall => UsbFault::Stall,
        TransferError::Disconnected => UsbFault::Disconnected,
        other => UsbFault::Other(other.to_string()),
    }
}

impl Transport for NusbTransport {
    fn bulk_write(
        &mut self,
        endpoint: u8,
        data: &[u8],
        timeout: Duration,
    ) -> std::result::Result<usize, UsbFault> {
        let mut ep = self
            .interface
            .endpoint::<Bulk, Out>(endpoint)
            .map_err(|e| UsbFault::Other(e.to_string()))?;
        let mut transfer_buf = Buffer::new(data.len());
        transfer_buf.extend_from_slice(data);

        let completion = ep.transfer_blocking(transfer_buf, timeout);
        completion.status.map_err(map_transfer_error)?;
        trace!("Bulk OUT 0x{:02X}: {} bytes", endpoint, completion.actual_len);
        Ok(completion.actual_len)
    }

    fn bulk_read(
        &mut self,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> std::result::Result<usize, UsbFault> {
        let mut ep = self
            .interface
            .endpoint::<Bulk, In>(endpoint)
            .map_err(|e| UsbFault::Other(e.to_string()))?;
        let transfer_buf = Buffer::new(buf.len());

        let completion = ep.transfer_blocking(transfer_buf, timeout);
        completion.status.map_err(map_transfer_error)?;

        let actual_len = completion.actual_len;
        let raw_data = completion.buffer.into_vec();
        let actual_len = actual_len.min(raw_data.len()).min(buf.len());
        buf[..actual_len].copy_from_slice(&raw_data[..actual_len]);
        trace!("Bulk IN 0x{:02X}: {} bytes", endpoint, actual_len);
        Ok(actual_len)
    }
}
