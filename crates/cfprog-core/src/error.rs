//! Error types for cfprog-core
//!
//! Errors are `Copy` and `no_std` compatible. Every failure is local to the
//! command that produced it; the dispatcher reports it through [`Status`]
//! and goes back to idle.

use core::fmt;

use cfprog_icd::{DecodeError, Status};

/// Core error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The ready line stayed low for the whole spin budget
    ReadyTimeout {
        /// Address of the byte being programmed
        addr: u32,
    },
    /// 0xFF was never read back while waiting for an erase
    EraseTimeout,
    /// A command is already pending or executing
    Busy,
    /// The request could not be decoded
    Unsupported(DecodeError),
    /// A data phase arrived without an armed write
    UnexpectedData,
    /// The write data phase did not carry a full block
    DataLength {
        /// Expected number of bytes
        expected: usize,
        /// Number of bytes received
        got: usize,
    },
}

impl Error {
    /// Status reported to the host for this failure
    pub const fn status(&self) -> Status {
        match self {
            Self::ReadyTimeout { .. } => Status::ProgramFailed,
            Self::EraseTimeout => Status::EraseFailed,
            Self::Busy
            | Self::Unsupported(_)
            | Self::UnexpectedData
            | Self::DataLength { .. } => Status::Initialised,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadyTimeout { addr } => {
                write!(f, "flash never became ready while programming 0x{:05X}", addr)
            }
            Self::EraseTimeout => write!(f, "erase did not complete"),
            Self::Busy => write!(f, "a command is already in progress"),
            Self::Unsupported(e) => write!(f, "unsupported request: {}", e),
            Self::UnexpectedData => write!(f, "data phase without a pending write"),
            Self::DataLength { expected, got } => {
                write!(f, "expected {} data bytes, got {}", expected, got)
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
