//! Command dispatch loop
//!
//! The dispatcher owns the bus and runs each command from the mailbox
//! synchronously to completion before publishing its results. Nothing here
//! can be interrupted or cancelled from the host.

use cfprog_icd::{Command, Status, IO_CHUNK};

use crate::algorithm::{self, WriteTiming};
use crate::bus::{Bus, BusPins};
use crate::mailbox::{CommandState, Mailbox};
use crate::registers::{AddressRegister, ControlRegister};
use crate::setup;

/// Delay before handing over to the bootloader
pub const BOOTLOADER_DELAY_MS: u32 = 100;

/// Outcome of one [`Dispatcher::poll`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// No command was pending
    Idle,
    /// A command ran to completion
    Executed(Command),
    /// The bootloader was requested; the dispatcher must stop
    Bootloader,
}

/// Runs commands from a [`Mailbox`] against the flash bus
pub struct Dispatcher<'m, P> {
    mailbox: &'m Mailbox,
    bus: Bus<P>,
    block: [u8; IO_CHUNK],
}

impl<'m, P: BusPins> Dispatcher<'m, P> {
    /// Bring the bus to idle and attach to the mailbox
    pub fn new(mailbox: &'m Mailbox, pins: P) -> Self {
        Self {
            mailbox,
            bus: Bus::new(pins),
            block: [0; IO_CHUNK],
        }
    }

    /// The flash bus
    pub fn bus(&self) -> &Bus<P> {
        &self.bus
    }

    /// Mutable flash bus
    pub fn bus_mut(&mut self) -> &mut Bus<P> {
        &mut self.bus
    }

    /// Execute the pending command, if any
    pub fn poll(&mut self) -> Step {
        let Some(CommandState { command, payload }) = self.mailbox.take() else {
            return Step::Idle;
        };
        log::trace!("executing {:?}", command);

        let mut published_block = false;
        match command {
            Command::SetControl(ctrl) => {
                self.bus.registers_mut().control = ControlRegister::from_bits_retain(ctrl);
                self.bus.apply_control();
            }
            Command::SetAddress(addr) => {
                self.bus.registers_mut().address = AddressRegister::from_u32(addr);
                self.bus.apply_address();
            }
            Command::SetData(data) => {
                self.bus.registers_mut().data = data;
                self.bus.drive_data(data);
            }
            Command::Write { addr, slow } => {
                self.bus.registers_mut().address = AddressRegister::from_u32(addr);
                self.blink_activity();
                let timing = if slow {
                    WriteTiming::FixedDelay
                } else {
                    WriteTiming::ReadyPolled
                };
                let status = match algorithm::program_chunk(&mut self.bus, &payload, timing) {
                    Ok(()) => Status::Initialised,
                    Err(e) => {
                        log::warn!("{}", e);
                        e.status()
                    }
                };
                self.bus.registers_mut().status = status;
            }
            Command::ReadArm { addr } => {
                self.bus.registers_mut().address = AddressRegister::from_u32(addr);
                self.blink_activity();
                algorithm::read_chunk(&mut self.bus, &mut self.block);
                self.bus.registers_mut().status = Status::Initialised;
                published_block = true;
            }
            Command::Setup { mode, addr } => setup::run(&mut self.bus, mode, addr),
            Command::Bootloader => {
                log::info!("entering bootloader");
                self.bus.pins_mut().delay_ms(BOOTLOADER_DELAY_MS);
                return Step::Bootloader;
            }
            // Answered directly by the mailbox
            Command::GetData | Command::ReadFetch => {}
        }

        let regs = *self.bus.registers();
        let block = if published_block {
            Some(&self.block)
        } else {
            None
        };
        self.mailbox.complete(regs.data, regs.status, block);
        Step::Executed(command)
    }

    /// Run forever, handing over to the bootloader when asked to
    pub fn run(mut self) -> ! {
        loop {
            if self.poll() == Step::Bootloader {
                self.bus.pins_mut().enter_bootloader();
            }
        }
    }

    /// Toggle the LED every 8 KiB of a bulk transfer
    fn blink_activity(&mut self) {
        match self.bus.registers().address.high & 0x3F {
            0x00 => self.bus.set_led(false),
            0x20 => self.bus.set_led(true),
            _ => {}
        }
    }
}
