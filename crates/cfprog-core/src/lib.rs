//! cfprog-core - Device-side core of the 27CF840 parallel flash programmer
//!
//! This crate turns vendor requests coming from the host into bit-banged
//! traffic on a chain of 74HC595 shift registers that drive the address and
//! control lines of a JEDEC parallel NOR flash in byte mode. It is `no_std`
//! and platform independent: the board only has to implement [`BusPins`].
//!
//! # Layout
//!
//! - [`bus`] - pin abstraction and the shift-register driver
//! - [`registers`] - address/control register model
//! - [`algorithm`] - unlock-sequenced program, read, erase and ID readout
//! - [`setup`] - the setup meta-command
//! - [`mailbox`] - single-slot command mailbox shared with the USB interrupt
//! - [`dispatch`] - the command loop
//!
//! # Example
//!
//! ```ignore
//! use cfprog_core::{Dispatcher, Mailbox};
//!
//! static MAILBOX: Mailbox = Mailbox::new();
//!
//! // USB interrupt: MAILBOX.on_setup(&request), MAILBOX.on_data_phase(&buf)
//! fn main() -> ! {
//!     let pins = board::Pins::take();
//!     Dispatcher::new(&MAILBOX, pins).run()
//! }
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod algorithm;
pub mod bus;
pub mod dispatch;
pub mod error;
pub mod mailbox;
pub mod registers;
pub mod retry;
pub mod setup;

pub use bus::{Bus, BusPins, Pin, PortDirection};
pub use dispatch::{Dispatcher, Step};
pub use error::{Error, Result};
pub use mailbox::{CommandState, Mailbox, Reply};
pub use registers::{AddressRegister, ControlRegister, RegisterState};

pub use cfprog_icd as icd;
