//! Error types for host-side operations

use thiserror::Error;

/// Errors that can occur while talking to the programmer
#[derive(Debug, Error)]
pub enum HostError {
    /// No matching device on the bus
    #[error("27CF840 programmer not found (VID:16c0 PID:05dc)")]
    DeviceNotFound,

    /// The device was found but could not be opened
    #[error("Failed to open device: {0}")]
    OpenFailed(String),

    /// Interface 0 could not be claimed
    #[error("Failed to claim interface: {0}")]
    ClaimFailed(String),

    /// A control transfer did not complete in time
    #[error("Timeout during USB transfer")]
    Timeout,

    /// The device stalled the request (unsupported or busy)
    #[error("Request 0x{0:02X} rejected by the device")]
    Rejected(u8),

    /// The device went away
    #[error("Device disconnected")]
    Disconnected,

    /// Any other transfer failure
    #[error("USB transfer failed: {0}")]
    TransferFailed(String),

    /// The device returned fewer bytes than the request needs
    #[error("Short transfer: expected {expected} bytes, got {got}")]
    ShortTransfer {
        /// Bytes expected
        expected: usize,
        /// Bytes received
        got: usize,
    },

    /// The status byte is not a known status
    #[error("Invalid status byte 0x{0:02X}")]
    InvalidStatus(u8),

    /// Programming a block failed; nothing after `offset` was written
    #[error("Programming failed at offset 0x{offset:05X}")]
    ProgramFailed {
        /// Byte offset of the failing block
        offset: usize,
    },

    /// The erase never completed
    #[error("Erase failed")]
    EraseFailed,

    /// The device stayed busy for the whole polling budget
    #[error("Device still busy after {polls} status polls")]
    PollExhausted {
        /// Number of status polls made
        polls: u32,
    },

    /// Address range does not fit the 20-bit flash
    #[error("Address range 0x{start:05X}+0x{len:X} exceeds the 1 MiB address space")]
    OutOfRange {
        /// Start address
        start: u32,
        /// Length in bytes
        len: usize,
    },
}

/// Result type for host operations
pub type Result<T> = std::result::Result<T, HostError>;
