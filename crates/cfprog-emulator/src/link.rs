//! In-process link to an emulated programmer
//!
//! Requests go through the same [`Mailbox`] the firmware's USB interrupt
//! uses, and a [`Dispatcher`] runs them on an [`EmulatedBoard`].

use std::time::Duration;

use cfprog_core::mailbox::Reply;
use cfprog_core::{Dispatcher, Mailbox, Step};
use cfprog_host::icd::{Command, Request};
use cfprog_host::{HostError, Link, Result};

use crate::board::EmulatedBoard;

/// [`Link`] backed by the device core running on an emulated board
pub struct EmulatedLink<'m> {
    mailbox: &'m Mailbox,
    dispatcher: Dispatcher<'m, EmulatedBoard>,
    run_on_pause_only: bool,
    in_bootloader: bool,
    executed: Vec<Command>,
}

impl<'m> EmulatedLink<'m> {
    /// Attach to `mailbox` and power up `board`
    pub fn new(mailbox: &'m Mailbox, board: EmulatedBoard) -> Self {
        Self {
            mailbox,
            dispatcher: Dispatcher::new(mailbox, board),
            run_on_pause_only: false,
            in_bootloader: false,
            executed: Vec::new(),
        }
    }

    /// Only execute accepted commands when the host pauses
    ///
    /// By default a command runs as soon as it is accepted. With this set,
    /// requests sent back to back see the previous command still pending.
    pub fn run_on_pause_only(mut self, enabled: bool) -> Self {
        self.run_on_pause_only = enabled;
        self
    }

    /// The emulated board
    pub fn board(&self) -> &EmulatedBoard {
        self.dispatcher.bus().pins()
    }

    /// Mutable emulated board
    pub fn board_mut(&mut self) -> &mut EmulatedBoard {
        self.dispatcher.bus_mut().pins_mut()
    }

    /// Commands executed by the device so far
    pub fn executed(&self) -> &[Command] {
        &self.executed
    }

    /// Whether the device has handed over to its bootloader
    pub fn in_bootloader(&self) -> bool {
        self.in_bootloader
    }

    /// Execute the pending command, if any
    pub fn run_pending(&mut self) {
        match self.dispatcher.poll() {
            Step::Idle => {}
            Step::Executed(command) => self.executed.push(command),
            Step::Bootloader => {
                log::debug!("emulated device left for the bootloader");
                self.executed.push(Command::Bootloader);
                self.in_bootloader = true;
            }
        }
    }

    fn submit(&mut self, request: &Request) -> Result<Reply> {
        if self.in_bootloader {
            return Err(HostError::Disconnected);
        }
        match self.mailbox.on_setup(request) {
            Reply::Stall(e) => {
                log::debug!("request 0x{:02X} stalled: {}", request.request, e);
                Err(HostError::Rejected(request.request))
            }
            reply => Ok(reply),
        }
    }
}

impl Link for EmulatedLink<'_> {
    fn control_out(&mut self, request: &Request, data: &[u8]) -> Result<()> {
        self.submit(request)?;
        if !data.is_empty() {
            self.mailbox.on_data_phase(data).map_err(|e| {
                log::debug!("data phase of 0x{:02X} refused: {}", request.request, e);
                HostError::Rejected(request.request)
            })?;
        }
        if !self.run_on_pause_only {
            self.run_pending();
        }
        Ok(())
    }

    fn control_in(&mut self, request: &Request, buf: &mut [u8]) -> Result<usize> {
        match self.submit(request)? {
            Reply::Data(bytes) => {
                let len = bytes.len().min(buf.len());
                buf[..len].copy_from_slice(&bytes[..len]);
                Ok(len)
            }
            Reply::Ack => Ok(0),
            Reply::Stall(_) => Err(HostError::Rejected(request.request)),
        }
    }

    fn pause(&mut self, duration: Duration) {
        if !self.in_bootloader {
            self.run_pending();
        }
        log::trace!("host paused for {:?}", duration);
    }
}
