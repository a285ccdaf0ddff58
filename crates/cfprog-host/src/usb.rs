//! USB link using nusb
//!
//! All requests are vendor control transfers addressed to interface 0.

use std::time::Duration;

use cfprog_icd::{Request, USB_MANUFACTURER, USB_PID, USB_PRODUCT, USB_VID};
use nusb::transfer::{ControlIn, ControlOut, ControlType, Recipient, TransferError};
use nusb::{Interface, MaybeFuture};

use crate::error::{HostError, Result};
use crate::link::Link;

/// Default per-transfer timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(50);

/// Open USB connection to the programmer
pub struct UsbLink {
    interface: Interface,
    timeout: Duration,
}

fn is_programmer(info: &nusb::DeviceInfo) -> bool {
    info.vendor_id() == USB_VID
        && info.product_id() == USB_PID
        && info.manufacturer_string() == Some(USB_MANUFACTURER)
        && info.product_string() == Some(USB_PRODUCT)
}

impl UsbLink {
    /// Open the first connected programmer with the default timeout
    pub fn open() -> Result<Self> {
        Self::open_with_timeout(DEFAULT_TIMEOUT)
    }

    /// Open the first connected programmer
    pub fn open_with_timeout(timeout: Duration) -> Result<Self> {
        let device_info = nusb::list_devices()
            .wait()
            .map_err(|e| HostError::OpenFailed(e.to_string()))?
            .find(is_programmer)
            .ok_or(HostError::DeviceNotFound)?;

        log::info!(
            "Opening 27CF840 programmer at bus {} address {}",
            device_info.bus_id(),
            device_info.device_address()
        );

        let device = device_info
            .open()
            .wait()
            .map_err(|e| HostError::OpenFailed(e.to_string()))?;

        // Detaches a kernel driver if one is bound
        let interface = device
            .detach_and_claim_interface(0)
            .wait()
            .map_err(|e| HostError::ClaimFailed(e.to_string()))?;
        log::debug!("Interface 0 claimed");

        Ok(Self { interface, timeout })
    }

    fn map_error(request: &Request, e: TransferError) -> HostError {
        match e {
            TransferError::Cancelled => HostError::Timeout,
            TransferError::Stall => HostError::Rejected(request.request),
            TransferError::Disconnected => HostError::Disconnected,
            other => HostError::TransferFailed(other.to_string()),
        }
    }
}

impl Link for UsbLink {
    fn control_out(&mut self, request: &Request, data: &[u8]) -> Result<()> {
        self.interface
            .control_out(
                ControlOut {
                    control_type: ControlType::Vendor,
                    recipient: Recipient::Interface,
                    request: request.request,
                    value: request.value,
                    index: request.index,
                    data,
                },
                self.timeout,
            )
            .wait()
            .map_err(|e| Self::map_error(request, e))
    }

    fn control_in(&mut self, request: &Request, buf: &mut [u8]) -> Result<usize> {
        let data = self
            .interface
            .control_in(
                ControlIn {
                    control_type: ControlType::Vendor,
                    recipient: Recipient::Interface,
                    request: request.request,
                    value: request.value,
                    index: request.index,
                    length: buf.len() as u16,
                },
                self.timeout,
            )
            .wait()
            .map_err(|e| Self::map_error(request, e))?;

        let len = data.len().min(buf.len());
        buf[..len].copy_from_slice(&data[..len]);
        Ok(len)
    }
}
