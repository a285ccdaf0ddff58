//! Interface Control Document for the 27CF840 programmer
//!
//! This crate defines the vendor control requests shared between the host
//! tool and the device-side command dispatcher. Every request is a USB
//! vendor control transfer addressed to interface 0:
//!
//! - the opcode lives in the top nibble of `bRequest`, the bottom nibble
//!   is a sub-selector (only used by the read request)
//! - `wValue` carries the low 16 bits of the 20-bit flash address (or a
//!   single data/control byte in its low byte)
//! - `wIndex` carries the bank (A19..A16) in its low byte and a per-opcode
//!   parameter (setup mode, slow-write flag) in its high byte
//!
//! Bulk data always moves in fixed [`IO_CHUNK`] sized blocks.

#![no_std]

#[cfg(feature = "std")]
extern crate std;

use core::fmt;

/// USB vendor ID (shared VOTI/OBDEV VID)
pub const USB_VID: u16 = 0x16c0;

/// USB product ID
pub const USB_PID: u16 = 0x05dc;

/// Manufacturer string reported by the device
pub const USB_MANUFACTURER: &str = "github.com/ole00";

/// Product string reported by the device
pub const USB_PRODUCT: &str = "27cf840_prog";

/// Size of one bulk transfer block in bytes
pub const IO_CHUNK: usize = 64;

/// Response length reported for requests the device does not handle
pub const NOT_SUPPORTED: u8 = 0xFF;

/// Bit in `wIndex` selecting the fixed-delay write variant
pub const SLOW_WRITE_FLAG: u16 = 0x0100;

/// Mask for the 20-bit flash address space
pub const ADDRESS_MASK: u32 = 0x000F_FFFF;

/// Length of the GET_DATA response: `[data, status]`
pub const GET_DATA_LEN: usize = 2;

// ============================================================================
// ENUMS
// ============================================================================

/// Request opcode, stored in the top nibble of `bRequest`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    /// Load the control shift register
    SetControl = 0x10,
    /// Load the 20-bit address onto the bus
    SetAddress = 0x20,
    /// Drive a byte on the data port
    SetData = 0x30,
    /// Return `[data, status]`
    GetData = 0x40,
    /// Program one 64-byte block (followed by an OUT data phase)
    Write = 0x50,
    /// Arm (`0x60`) or fetch (`0x61`) one 64-byte block
    Read = 0x60,
    /// Jump to the ROM bootloader
    Bootloader = 0xB0,
    /// Setup meta-command, see [`SetupMode`]
    Setup = 0xF0,
}

impl Opcode {
    /// Extract the opcode from a raw `bRequest` value
    pub const fn from_request(request: u8) -> Option<Self> {
        match request & 0xF0 {
            0x10 => Some(Self::SetControl),
            0x20 => Some(Self::SetAddress),
            0x30 => Some(Self::SetData),
            0x40 => Some(Self::GetData),
            0x50 => Some(Self::Write),
            0x60 => Some(Self::Read),
            0xB0 => Some(Self::Bootloader),
            0xF0 => Some(Self::Setup),
            _ => None,
        }
    }
}

/// `bRequest` used to arm a read at an address
pub const READ_ARM: u8 = Opcode::Read as u8;

/// `bRequest` used to fetch the 64 bytes of an armed read
pub const READ_FETCH: u8 = Opcode::Read as u8 | 0x01;

/// Setup meta-command modes, carried in the high byte of `wIndex`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SetupMode {
    /// Read the manufacturer ID into the data register
    ManufacturerId = 0,
    /// Read the device ID into the data register
    DeviceId = 1,
    /// Read the protection status of the sector at the given address
    SectorProtection = 2,
    /// Erase the whole chip
    ChipErase = 4,
    /// Erase the sector at the given address
    SectorErase = 5,
    /// Turn the data port around and enable the chip outputs
    BeginRead = 6,
    /// Assert write-enable for a following series of bulk writes
    BeginWrite = 7,
    /// Reset the chip and return the bus to idle
    Ready = 10,
}

impl SetupMode {
    /// Convert from the raw wire value
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::ManufacturerId),
            1 => Some(Self::DeviceId),
            2 => Some(Self::SectorProtection),
            4 => Some(Self::ChipErase),
            5 => Some(Self::SectorErase),
            6 => Some(Self::BeginRead),
            7 => Some(Self::BeginWrite),
            10 => Some(Self::Ready),
            _ => None,
        }
    }

    /// Whether this mode reads an ID or protection byte into the data
    /// register
    pub const fn is_query(&self) -> bool {
        matches!(
            self,
            Self::ManufacturerId | Self::DeviceId | Self::SectorProtection
        )
    }

    /// Whether this mode starts a long-running erase
    pub const fn is_erase(&self) -> bool {
        matches!(self, Self::ChipErase | Self::SectorErase)
    }
}

/// Operation status reported in the second byte of GET_DATA
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Status {
    /// Idle, last operation succeeded
    #[default]
    Initialised = 0,
    /// Erase is running
    EraseInProgress = 1,
    /// Erase never completed
    EraseFailed = 2,
    /// A 64-byte program is running
    ProgramInProgress = 3,
    /// The chip never signalled ready during a program
    ProgramFailed = 4,
    /// A 64-byte read is running
    ReadInProgress = 5,
}

impl Status {
    /// Convert from the raw wire value
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Initialised),
            1 => Some(Self::EraseInProgress),
            2 => Some(Self::EraseFailed),
            3 => Some(Self::ProgramInProgress),
            4 => Some(Self::ProgramFailed),
            5 => Some(Self::ReadInProgress),
            _ => None,
        }
    }

    /// Whether an operation is still running
    pub const fn is_busy(&self) -> bool {
        matches!(
            self,
            Self::EraseInProgress | Self::ProgramInProgress | Self::ReadInProgress
        )
    }

    /// Whether the last operation failed
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::EraseFailed | Self::ProgramFailed)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Initialised => "initialised",
            Self::EraseInProgress => "erase in progress",
            Self::EraseFailed => "erase failed",
            Self::ProgramInProgress => "program in progress",
            Self::ProgramFailed => "program failed",
            Self::ReadInProgress => "read in progress",
        };
        f.write_str(s)
    }
}

// ============================================================================
// ADDRESS HELPERS
// ============================================================================

/// Split a 20-bit flash address into `(wValue, bank)`
pub const fn split_address(addr: u32) -> (u16, u8) {
    let addr = addr & ADDRESS_MASK;
    ((addr & 0xFFFF) as u16, (addr >> 16) as u8)
}

/// Rebuild a 20-bit flash address from `wValue` and the low byte of `wIndex`
pub const fn join_address(value: u16, index: u16) -> u32 {
    ((index as u32 & 0x0F) << 16) | value as u32
}

// ============================================================================
// REQUESTS
// ============================================================================

/// A raw vendor control request as seen on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    /// `bRequest`
    pub request: u8,
    /// `wValue`
    pub value: u16,
    /// `wIndex`
    pub index: u16,
}

impl Request {
    /// Create a raw request
    pub const fn new(request: u8, value: u16, index: u16) -> Self {
        Self {
            request,
            value,
            index,
        }
    }
}

/// Typed view of every request the device understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Load the control register with a raw byte
    SetControl(u8),
    /// Load a 20-bit address
    SetAddress(u32),
    /// Drive a byte on the data port
    SetData(u8),
    /// Query `[data, status]`
    GetData,
    /// Program 64 bytes starting at `addr`
    Write {
        /// Start address
        addr: u32,
        /// Use fixed delays instead of polling the ready line
        slow: bool,
    },
    /// Arm a 64-byte read at `addr`
    ReadArm {
        /// Start address
        addr: u32,
    },
    /// Fetch the 64 bytes of the last armed read
    ReadFetch,
    /// Run a setup meta-command
    Setup {
        /// Selected mode
        mode: SetupMode,
        /// Address parameter (sector base for erase/protection)
        addr: u32,
    },
    /// Jump to the ROM bootloader
    Bootloader,
}

/// Reasons a raw request cannot be decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Opcode nibble is not assigned
    UnknownOpcode(u8),
    /// Setup mode is not assigned
    UnknownSetupMode(u8),
    /// Sub-selector is not valid for this opcode
    BadSubSelector(u8),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownOpcode(r) => write!(f, "unknown request 0x{:02X}", r),
            Self::UnknownSetupMode(m) => write!(f, "unknown setup mode {}", m),
            Self::BadSubSelector(r) => write!(f, "invalid sub-selector in request 0x{:02X}", r),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DecodeError {}

impl Command {
    /// Encode into a raw request
    pub const fn encode(&self) -> Request {
        match *self {
            Self::SetControl(ctrl) => Request::new(Opcode::SetControl as u8, ctrl as u16, 0),
            Self::SetAddress(addr) => {
                let (value, bank) = split_address(addr);
                Request::new(Opcode::SetAddress as u8, value, bank as u16)
            }
            Self::SetData(data) => Request::new(Opcode::SetData as u8, data as u16, 0),
            Self::GetData => Request::new(Opcode::GetData as u8, 0, 0),
            Self::Write { addr, slow } => {
                let (value, bank) = split_address(addr);
                let flag = if slow { SLOW_WRITE_FLAG } else { 0 };
                Request::new(Opcode::Write as u8, value, bank as u16 | flag)
            }
            Self::ReadArm { addr } => {
                let (value, bank) = split_address(addr);
                Request::new(READ_ARM, value, bank as u16)
            }
            Self::ReadFetch => Request::new(READ_FETCH, 0, 0),
            Self::Setup { mode, addr } => {
                let (value, bank) = split_address(addr);
                Request::new(
                    Opcode::Setup as u8,
                    value,
                    ((mode as u16) << 8) | bank as u16,
                )
            }
            Self::Bootloader => Request::new(Opcode::Bootloader as u8, 0, 0),
        }
    }

    /// Decode a raw request
    pub fn decode(req: &Request) -> Result<Self, DecodeError> {
        let opcode =
            Opcode::from_request(req.request).ok_or(DecodeError::UnknownOpcode(req.request))?;
        let sub = req.request & 0x0F;
        let addr = join_address(req.value, req.index);

        let cmd = match opcode {
            Opcode::SetControl => Self::SetControl(req.value as u8),
            Opcode::SetAddress => Self::SetAddress(addr),
            Opcode::SetData => Self::SetData(req.value as u8),
            Opcode::GetData => Self::GetData,
            // The data phase is only accepted for the exact write request
            Opcode::Write if sub != 0 => return Err(DecodeError::BadSubSelector(req.request)),
            Opcode::Write => Self::Write {
                addr,
                slow: req.index & 0xFF00 != 0,
            },
            Opcode::Read if sub == 0 => Self::ReadArm { addr },
            Opcode::Read => Self::ReadFetch,
            Opcode::Setup => {
                let raw = (req.index >> 8) as u8;
                let mode = SetupMode::from_u8(raw).ok_or(DecodeError::UnknownSetupMode(raw))?;
                Self::Setup { mode, addr }
            }
            Opcode::Bootloader => Self::Bootloader,
        };
        Ok(cmd)
    }
}
