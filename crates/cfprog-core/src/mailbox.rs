//! Single-slot command mailbox
//!
//! The USB interrupt ([`Mailbox::on_setup`], [`Mailbox::on_data_phase`])
//! and the dispatch loop ([`Mailbox::take`], [`Mailbox::complete`]) share
//! one `Mailbox`. All state moves as a group inside a critical section, so
//! the interrupt never observes a half-written command.
//!
//! At most one command is outstanding. Queries (GET_DATA and the read
//! fetch) only look at published results and are answered at any time;
//! everything else is refused while a command is pending or executing.

use core::cell::RefCell;

use cfprog_icd::{Command, Request, Status, IO_CHUNK, NOT_SUPPORTED};
use critical_section::Mutex;
use heapless::Vec;

use crate::error::Error;

/// Answer to a setup packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Accepted, nothing to return
    Ack,
    /// Accepted, bytes for the IN data phase
    Data(Vec<u8, IO_CHUNK>),
    /// Refused
    Stall(Error),
}

impl Reply {
    /// Response length as seen by the USB stack
    ///
    /// Refusals report [`NOT_SUPPORTED`], which the stack turns into a
    /// stall.
    pub fn wire_len(&self) -> u8 {
        match self {
            Self::Ack => 0,
            Self::Data(buf) => buf.len() as u8,
            Self::Stall(_) => NOT_SUPPORTED,
        }
    }

    fn with(bytes: &[u8]) -> Self {
        let mut buf = Vec::new();
        match buf.extend_from_slice(bytes) {
            Ok(()) => Self::Data(buf),
            Err(()) => Self::Stall(Error::DataLength {
                expected: IO_CHUNK,
                got: bytes.len(),
            }),
        }
    }
}

/// A command handed to the dispatch loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandState {
    /// Decoded command with its parameters
    pub command: Command,
    /// Write payload (zeroes for other commands)
    pub payload: [u8; IO_CHUNK],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    /// Write setup seen, waiting for its 64-byte data phase
    AwaitingData { addr: u32, slow: bool },
    Received,
    Executing,
    Bootloader,
}

struct Inner {
    phase: Phase,
    pending: Option<CommandState>,
    data: u8,
    status: Status,
    block: [u8; IO_CHUNK],
}

impl Inner {
    const fn new() -> Self {
        Self {
            phase: Phase::Idle,
            pending: None,
            data: 0,
            status: Status::Initialised,
            block: [0; IO_CHUNK],
        }
    }

    fn accepting(&self) -> bool {
        matches!(self.phase, Phase::Idle | Phase::AwaitingData { .. })
    }

    fn post(&mut self, command: Command, payload: [u8; IO_CHUNK]) {
        // In-progress status is published together with the command
        match command {
            Command::Write { .. } => self.status = Status::ProgramInProgress,
            Command::ReadArm { .. } => self.status = Status::ReadInProgress,
            Command::Setup { mode, .. } if mode.is_erase() => {
                self.status = Status::EraseInProgress
            }
            Command::Setup { mode, .. } if mode.is_query() => {
                self.status = Status::ReadInProgress
            }
            _ => {}
        }
        self.pending = Some(CommandState { command, payload });
        self.phase = Phase::Received;
    }
}

/// Command mailbox shared between the USB interrupt and the dispatch loop
pub struct Mailbox {
    inner: Mutex<RefCell<Inner>>,
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}

impl Mailbox {
    /// Create an idle mailbox (usable in a `static`)
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Inner::new())),
        }
    }

    /// Handle a vendor setup packet
    pub fn on_setup(&self, req: &Request) -> Reply {
        let command = match Command::decode(req) {
            Ok(command) => command,
            Err(e) => {
                log::trace!("rejecting request 0x{:02X}: {}", req.request, e);
                return Reply::Stall(Error::Unsupported(e));
            }
        };

        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            match command {
                Command::GetData => Reply::with(&[inner.data, inner.status as u8]),
                Command::ReadFetch => Reply::with(&inner.block),
                _ if !inner.accepting() => Reply::Stall(Error::Busy),
                Command::Write { addr, slow } => {
                    inner.phase = Phase::AwaitingData { addr, slow };
                    Reply::Ack
                }
                _ => {
                    inner.post(command, [0; IO_CHUNK]);
                    Reply::Ack
                }
            }
        })
    }

    /// Handle the OUT data phase of a write request
    pub fn on_data_phase(&self, data: &[u8]) -> Result<(), Error> {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            let Phase::AwaitingData { addr, slow } = inner.phase else {
                return Err(Error::UnexpectedData);
            };
            let payload: [u8; IO_CHUNK] = match data.try_into() {
                Ok(block) => block,
                Err(_) => {
                    inner.phase = Phase::Idle;
                    return Err(Error::DataLength {
                        expected: IO_CHUNK,
                        got: data.len(),
                    });
                }
            };
            inner.post(Command::Write { addr, slow }, payload);
            Ok(())
        })
    }

    /// Claim the pending command, if any
    pub fn take(&self) -> Option<CommandState> {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            if inner.phase != Phase::Received {
                return None;
            }
            let state = inner.pending.take()?;
            inner.phase = if state.command == Command::Bootloader {
                Phase::Bootloader
            } else {
                Phase::Executing
            };
            Some(state)
        })
    }

    /// Publish the results of the executing command and go back to idle
    pub fn complete(&self, data: u8, status: Status, block: Option<&[u8; IO_CHUNK]>) {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            inner.data = data;
            inner.status = status;
            if let Some(block) = block {
                inner.block = *block;
            }
            if inner.phase != Phase::Bootloader {
                inner.phase = Phase::Idle;
            }
        })
    }

    /// Whether a new command would be accepted
    pub fn is_idle(&self) -> bool {
        critical_section::with(|cs| self.inner.borrow_ref(cs).accepting())
    }

    /// Currently published status
    pub fn status(&self) -> Status {
        critical_section::with(|cs| self.inner.borrow_ref(cs).status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cfprog_icd::SetupMode;

    fn get_data(mb: &Mailbox) -> (u8, u8) {
        match mb.on_setup(&Command::GetData.encode()) {
            Reply::Data(buf) => (buf[0], buf[1]),
            other => panic!("unexpected reply {:?}", other),
        }
    }

    #[test]
    fn test_accepts_one_command_at_a_time() {
        let mb = Mailbox::new();
        assert_eq!(mb.on_setup(&Command::SetData(0x12).encode()), Reply::Ack);
        assert_eq!(
            mb.on_setup(&Command::SetData(0x34).encode()),
            Reply::Stall(Error::Busy)
        );

        let state = mb.take().unwrap();
        assert_eq!(state.command, Command::SetData(0x12));
        assert_eq!(mb.take(), None);
        assert!(!mb.is_idle());

        mb.complete(0x12, Status::Initialised, None);
        assert!(mb.is_idle());
        assert_eq!(get_data(&mb), (0x12, 0));
    }

    #[test]
    fn test_queries_answered_while_executing() {
        let mb = Mailbox::new();
        mb.on_setup(&Command::ReadArm { addr: 0 }.encode());
        mb.take().unwrap();
        assert_eq!(get_data(&mb), (0, Status::ReadInProgress as u8));
        match mb.on_setup(&Command::ReadFetch.encode()) {
            Reply::Data(buf) => assert_eq!(buf.len(), IO_CHUNK),
            other => panic!("unexpected reply {:?}", other),
        }
    }

    #[test]
    fn test_write_waits_for_data_phase() {
        let mb = Mailbox::new();
        let req = Command::Write {
            addr: 0x40,
            slow: false,
        }
        .encode();
        assert_eq!(mb.on_setup(&req), Reply::Ack);
        assert_eq!(mb.take(), None);

        let payload = [0xA5u8; IO_CHUNK];
        mb.on_data_phase(&payload).unwrap();
        assert_eq!(mb.status(), Status::ProgramInProgress);

        let state = mb.take().unwrap();
        assert_eq!(
            state.command,
            Command::Write {
                addr: 0x40,
                slow: false
            }
        );
        assert_eq!(state.payload, payload);
    }

    #[test]
    fn test_short_data_phase_is_dropped() {
        let mb = Mailbox::new();
        mb.on_setup(&Command::Write { addr: 0, slow: true }.encode());
        assert_eq!(
            mb.on_data_phase(&[0u8; 10]),
            Err(Error::DataLength {
                expected: IO_CHUNK,
                got: 10
            })
        );
        assert!(mb.is_idle());
        assert_eq!(mb.on_data_phase(&[0u8; IO_CHUNK]), Err(Error::UnexpectedData));
    }

    #[test]
    fn test_unsupported_reports_sentinel() {
        let mb = Mailbox::new();
        let reply = mb.on_setup(&Request::new(0x70, 0, 0));
        assert_eq!(reply.wire_len(), NOT_SUPPORTED);
        let reply = mb.on_setup(&Request::new(0xF0, 0, 0x0800));
        assert_eq!(reply.wire_len(), NOT_SUPPORTED);
        assert!(mb.is_idle());
    }

    #[test]
    fn test_bootloader_is_terminal() {
        let mb = Mailbox::new();
        mb.on_setup(&Command::Bootloader.encode());
        assert_eq!(mb.take().unwrap().command, Command::Bootloader);
        assert_eq!(
            mb.on_setup(&Command::SetData(1).encode()),
            Reply::Stall(Error::Busy)
        );
    }

    #[test]
    fn test_refuses_commands_while_executing() {
        let mb = Mailbox::new();
        mb.on_setup(
            &Command::Write {
                addr: 0x80,
                slow: false,
            }
            .encode(),
        );
        mb.on_data_phase(&[0x3C; IO_CHUNK]).unwrap();
        let taken = mb.take().unwrap();

        assert_eq!(
            mb.on_setup(&Command::SetData(0x55).encode()),
            Reply::Stall(Error::Busy)
        );
        assert_eq!(mb.on_data_phase(&[0u8; IO_CHUNK]), Err(Error::UnexpectedData));
        assert_eq!(
            taken,
            CommandState {
                command: Command::Write {
                    addr: 0x80,
                    slow: false
                },
                payload: [0x3C; IO_CHUNK],
            }
        );
        assert_eq!(mb.take(), None);
        assert_eq!(mb.status(), Status::ProgramInProgress);

        mb.complete(0, Status::Initialised, None);
        assert_eq!(mb.on_setup(&Command::SetData(0x55).encode()), Reply::Ack);
    }

    #[test]
    fn test_id_setup_publishes_in_progress() {
        let mb = Mailbox::new();
        mb.complete(0x04, Status::Initialised, None);
        mb.on_setup(
            &Command::Setup {
                mode: SetupMode::DeviceId,
                addr: 0,
            }
            .encode(),
        );
        assert_eq!(get_data(&mb), (0x04, Status::ReadInProgress as u8));

        mb.take().unwrap();
        mb.complete(0xD6, Status::Initialised, None);
        assert_eq!(get_data(&mb), (0xD6, 0));
    }

    #[test]
    fn test_erase_setup_publishes_in_progress() {
        let mb = Mailbox::new();
        mb.on_setup(
            &Command::Setup {
                mode: SetupMode::ChipErase,
                addr: 0,
            }
            .encode(),
        );
        assert_eq!(mb.status(), Status::EraseInProgress);
    }
}
