//! cfprog-host - Host-side driver for the 27CF840 USB programmer
//!
//! This crate talks to the programmer firmware through vendor control
//! transfers. It is split into:
//!
//! - [`Link`] - the request/response transport (USB via nusb with the
//!   `usb` feature)
//! - [`Session`] - setup, bulk read/write, erase and identification with
//!   bounded status polling
//!
//! # Example
//!
//! ```no_run
//! use cfprog_host::{Session, UsbLink};
//!
//! let link = UsbLink::open()?;
//! let mut session = Session::new(link);
//! let id = session.identify()?;
//! println!("manufacturer 0x{:02X} device 0x{:02X}", id.manufacturer, id.device);
//! # Ok::<(), cfprog_host::HostError>(())
//! ```

pub mod error;
pub mod link;
pub mod poll;
pub mod session;
#[cfg(feature = "usb")]
pub mod usb;

pub use error::{HostError, Result};
pub use link::Link;
pub use poll::{PollPolicy, SessionConfig};
pub use session::{ChipId, Session, FLASH_SIZE};
#[cfg(feature = "usb")]
pub use usb::UsbLink;

pub use cfprog_icd as icd;
