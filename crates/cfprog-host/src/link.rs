//! Link abstraction for vendor control transfers
//!
//! A [`Link`] moves raw requests to the device. The USB implementation is
//! in [`crate::usb`]; tests use the in-process link from `cfprog-emulator`.

use std::time::Duration;

use cfprog_icd::Request;

use crate::error::Result;

/// Request/response channel to the programmer
pub trait Link {
    /// Send an OUT request with an optional data phase
    fn control_out(&mut self, request: &Request, data: &[u8]) -> Result<()>;

    /// Send an IN request and read the response into `buf`
    ///
    /// Returns the number of bytes received.
    fn control_in(&mut self, request: &Request, buf: &mut [u8]) -> Result<usize>;

    /// Wait between requests
    ///
    /// The device keeps executing while the host sleeps.
    fn pause(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

impl<L: Link + ?Sized> Link for &mut L {
    fn control_out(&mut self, request: &Request, data: &[u8]) -> Result<()> {
        (**self).control_out(request, data)
    }

    fn control_in(&mut self, request: &Request, buf: &mut [u8]) -> Result<usize> {
        (**self).control_in(request, buf)
    }

    fn pause(&mut self, duration: Duration) {
        (**self).pause(duration)
    }
}
