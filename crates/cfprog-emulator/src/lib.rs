//! cfprog-emulator - Emulated 27CF840 programmer for testing
//!
//! This crate runs the real device core against a pin-level model of the
//! programmer board and a flash chip held in memory, so the host session
//! can be exercised end to end without hardware.
//!
//! ```
//! use cfprog_core::Mailbox;
//! use cfprog_emulator::{EmulatedBoard, EmulatedLink};
//! use cfprog_host::Session;
//!
//! let mailbox = Mailbox::new();
//! let link = EmulatedLink::new(&mailbox, EmulatedBoard::default());
//! let mut session = Session::new(link);
//! let id = session.identify().unwrap();
//! assert_eq!(id.manufacturer, 0x04);
//! ```

pub mod board;
pub mod chip;
pub mod link;

pub use board::EmulatedBoard;
pub use chip::{BusWrite, ChipConfig, EmulatedChip};
pub use link::EmulatedLink;
