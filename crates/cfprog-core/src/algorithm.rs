//! JEDEC byte-mode program, read, erase and identification
//!
//! Command codes and unlock addresses follow the AMD command set as used by
//! the 27CF840 / 29F800 family in byte mode.

use cfprog_icd::IO_CHUNK;

use crate::bus::{Bus, BusPins, PortDirection};
use crate::error::{Error, Result};
use crate::registers::{Carry, ControlRegister};
use crate::retry::{poll_until, spin_until, Poll};

/// Ready-line checks before giving up on a program cycle
pub const READY_SPIN_LIMIT: u32 = 255;
/// Time allowed for each byte in the fixed-delay write variant
pub const SLOW_WRITE_DELAY_US: u32 = 8;
/// Delay before the first erase completion check
pub const ERASE_START_DELAY_MS: u32 = 50;
/// Erase completion checks before giving up
pub const ERASE_POLL_RETRIES: u32 = 100;
/// Delay between erase completion checks
pub const ERASE_POLL_INTERVAL_MS: u32 = 100;

/// First unlock address
pub const UNLOCK_ADDR_1: u16 = 0x0AAA;
/// Second unlock address
pub const UNLOCK_ADDR_2: u16 = 0x0555;
/// Second unlock address of the preamble issued by setup
pub const PREAMBLE_ADDR_2: u32 = 0x1555;
/// Any address accepts the reset command; this one is used
pub const RESET_ADDR: u32 = 0x000F;
/// Address polled during a chip erase
pub const CHIP_ERASE_POLL_ADDR: u32 = 0x0_0001;

/// Autoselect offset of the manufacturer ID
pub const MANUFACTURER_ID_OFFSET: u32 = 0x00;
/// Autoselect offset of the device ID
pub const DEVICE_ID_OFFSET: u32 = 0x02;
/// Autoselect offset of a sector's protection status
pub const SECTOR_PROTECT_OFFSET: u32 = 0x04;

/// Flash command bytes
pub mod cmd {
    /// First unlock cycle
    pub const UNLOCK_1: u8 = 0xAA;
    /// Second unlock cycle
    pub const UNLOCK_2: u8 = 0x55;
    /// Byte program
    pub const PROGRAM: u8 = 0xA0;
    /// Erase setup
    pub const ERASE_SETUP: u8 = 0x80;
    /// Chip erase confirm
    pub const CHIP_ERASE: u8 = 0x10;
    /// Sector erase confirm
    pub const SECTOR_ERASE: u8 = 0x30;
    /// Autoselect (ID readout)
    pub const AUTOSELECT: u8 = 0x90;
    /// Return to read array mode
    pub const RESET: u8 = 0xF0;
}

/// How a bulk write waits for each byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteTiming {
    /// Poll RY/BY# before each unlock sequence and after the last byte
    ReadyPolled,
    /// Wait a fixed time after each byte; may under-wait on slow chips
    FixedDelay,
}

fn wait_ready<P: BusPins>(bus: &mut Bus<P>, addr: u32) -> Result<()> {
    match spin_until(bus, READY_SPIN_LIMIT, |b, _| b.pins_mut().is_ready()) {
        Poll::Done(_) => Ok(()),
        Poll::Exhausted => {
            log::debug!("ready line stuck low at 0x{:05X}", addr);
            Err(Error::ReadyTimeout { addr })
        }
    }
}

/// Program one block at the current address
///
/// WE# must already be held low (setup begin-write); every cycle is then a
/// CE# strobe. The address register ends one past the last byte written.
pub fn program_chunk<P: BusPins>(
    bus: &mut Bus<P>,
    data: &[u8; IO_CHUNK],
    timing: WriteTiming,
) -> Result<()> {
    bus.set_direction(PortDirection::Output);
    bus.apply_address();

    let mut target = bus.registers().address;
    for &byte in data {
        bus.shift_word(UNLOCK_ADDR_1);
        if timing == WriteTiming::ReadyPolled {
            wait_ready(bus, target.to_u32())?;
        }
        bus.strobe_write(cmd::UNLOCK_1);
        bus.shift_word(UNLOCK_ADDR_2);
        bus.strobe_write(cmd::UNLOCK_2);
        bus.shift_word(UNLOCK_ADDR_1);
        bus.strobe_write(cmd::PROGRAM);

        bus.shift_word(target.word());
        bus.strobe_write(byte);
        if timing == WriteTiming::FixedDelay {
            bus.pins_mut().delay_us(SLOW_WRITE_DELAY_US);
        }

        let carry = target.increment();
        bus.registers_mut().address = target;
        if carry == Carry::Bank {
            bus.registers_mut().control.set_bank(target.bank);
            bus.apply_control();
        }
    }

    if timing == WriteTiming::ReadyPolled {
        wait_ready(bus, target.to_u32())?;
    }
    Ok(())
}

/// Read one block starting at the current address
///
/// OE# must already be held low (setup begin-read). Only the low address
/// byte is re-shifted per byte; when it wraps, the full address (and bank)
/// is shifted again.
pub fn read_chunk<P: BusPins>(bus: &mut Bus<P>, out: &mut [u8; IO_CHUNK]) {
    bus.set_direction(PortDirection::Input);
    bus.apply_address();
    bus.registers_mut()
        .control
        .insert(ControlRegister::ADDR_LATCH_SELECT);
    bus.apply_control();

    let mut addr = bus.registers().address;
    for slot in out.iter_mut() {
        *slot = bus.strobe_read();

        let carry = addr.increment();
        bus.registers_mut().address = addr;
        if carry == Carry::None {
            bus.shift_address_low();
        } else {
            bus.apply_address();
            bus.registers_mut()
                .control
                .insert(ControlRegister::ADDR_LATCH_SELECT);
            bus.apply_control();
        }
    }
}

/// Write 0xF0 to return the chip to read-array mode
pub fn reset<P: BusPins>(bus: &mut Bus<P>) {
    bus.write_byte_at(RESET_ADDR, cmd::RESET);
}

/// The two unlock cycles that precede autoselect and erase commands
pub fn unlock_preamble<P: BusPins>(bus: &mut Bus<P>) {
    bus.write_byte_at(UNLOCK_ADDR_1 as u32, cmd::UNLOCK_1);
    bus.write_byte_at(PREAMBLE_ADDR_2, cmd::UNLOCK_2);
}

fn erase_prefix<P: BusPins>(bus: &mut Bus<P>) {
    bus.write_byte_at(UNLOCK_ADDR_1 as u32, cmd::ERASE_SETUP);
    bus.write_byte_at(UNLOCK_ADDR_1 as u32, cmd::UNLOCK_1);
    bus.write_byte_at(UNLOCK_ADDR_2 as u32, cmd::UNLOCK_2);
}

/// Erase the whole chip and wait for completion
///
/// Expects [`unlock_preamble`] to have been issued.
pub fn chip_erase<P: BusPins>(bus: &mut Bus<P>) -> Result<()> {
    erase_prefix(bus);
    bus.write_byte_at(UNLOCK_ADDR_1 as u32, cmd::CHIP_ERASE);
    wait_for_erase(bus, CHIP_ERASE_POLL_ADDR)
}

/// Erase the sector starting at `sector` and wait for completion
///
/// Expects [`unlock_preamble`] to have been issued.
pub fn sector_erase<P: BusPins>(bus: &mut Bus<P>, sector: u32) -> Result<()> {
    erase_prefix(bus);
    bus.write_byte_at(sector, cmd::SECTOR_ERASE);
    wait_for_erase(bus, sector)
}

/// Poll `addr` until it reads back 0xFF
///
/// The LED blinks while waiting. Success means 0xFF was observed, even on
/// the last allowed check.
pub fn wait_for_erase<P: BusPins>(bus: &mut Bus<P>, addr: u32) -> Result<()> {
    bus.pins_mut().delay_ms(ERASE_START_DELAY_MS);
    bus.set_led(false);

    let poll = poll_until(
        bus,
        ERASE_POLL_RETRIES,
        |b, attempt| {
            b.registers_mut()
                .control
                .set(ControlRegister::STATUS_LED, attempt & 1 != 0);
            b.read_byte_at(addr) == 0xFF
        },
        |b| b.pins_mut().delay_ms(ERASE_POLL_INTERVAL_MS),
    );

    bus.set_led(true);
    match poll {
        Poll::Done(checks) => {
            log::debug!("erase complete after {} checks", checks);
            Ok(())
        }
        Poll::Exhausted => {
            log::debug!("erase did not complete");
            Err(Error::EraseTimeout)
        }
    }
}

fn autoselect_read<P: BusPins>(bus: &mut Bus<P>, addr: u32) -> u8 {
    bus.write_byte_at(UNLOCK_ADDR_1 as u32, cmd::AUTOSELECT);
    bus.read_byte_at(addr)
}

/// Read the manufacturer ID; expects [`unlock_preamble`]
pub fn read_manufacturer_id<P: BusPins>(bus: &mut Bus<P>) -> u8 {
    autoselect_read(bus, MANUFACTURER_ID_OFFSET)
}

/// Read the device ID; expects [`unlock_preamble`]
pub fn read_device_id<P: BusPins>(bus: &mut Bus<P>) -> u8 {
    autoselect_read(bus, DEVICE_ID_OFFSET)
}

/// Read the protection status of a sector; expects [`unlock_preamble`]
///
/// Returns 0x01 for a protected sector on conforming chips.
pub fn read_sector_protection<P: BusPins>(bus: &mut Bus<P>, sector: u32) -> u8 {
    autoselect_read(bus, sector | SECTOR_PROTECT_OFFSET)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Pin;

    /// Pins with a configurable ready line and a call counter
    struct ReadyPins {
        ready: bool,
        ready_checks: u32,
        delay_us: u32,
    }

    impl ReadyPins {
        fn new(ready: bool) -> Self {
            Self {
                ready,
                ready_checks: 0,
                delay_us: 0,
            }
        }
    }

    impl BusPins for ReadyPins {
        fn set_pin(&mut self, _pin: Pin, _high: bool) {}
        fn is_ready(&mut self) -> bool {
            self.ready_checks += 1;
            self.ready
        }
        fn set_port_direction(&mut self, _direction: PortDirection) {}
        fn write_port(&mut self, _value: u8) {}
        fn read_port(&mut self) -> u8 {
            0x00
        }
        fn settle(&mut self) {}
        fn delay_us(&mut self, us: u32) {
            self.delay_us += us;
        }
        fn enter_bootloader(&mut self) -> ! {
            panic!("bootloader")
        }
    }

    #[test]
    fn test_stuck_ready_fails_after_spin_limit() {
        let mut bus = Bus::new(ReadyPins::new(false));
        bus.registers_mut().address = crate::AddressRegister::from_u32(0x1_0040);
        let res = program_chunk(&mut bus, &[0u8; IO_CHUNK], WriteTiming::ReadyPolled);
        assert_eq!(res, Err(Error::ReadyTimeout { addr: 0x1_0040 }));
        assert_eq!(bus.pins().ready_checks, READY_SPIN_LIMIT);
    }

    #[test]
    fn test_ready_polled_checks_once_per_byte_plus_final() {
        let mut bus = Bus::new(ReadyPins::new(true));
        program_chunk(&mut bus, &[0u8; IO_CHUNK], WriteTiming::ReadyPolled).unwrap();
        assert_eq!(bus.pins().ready_checks, IO_CHUNK as u32 + 1);
        assert_eq!(bus.registers().address.to_u32(), IO_CHUNK as u32);
    }

    #[test]
    fn test_fixed_delay_ignores_ready_line() {
        let mut bus = Bus::new(ReadyPins::new(false));
        program_chunk(&mut bus, &[0u8; IO_CHUNK], WriteTiming::FixedDelay).unwrap();
        assert_eq!(bus.pins().ready_checks, 0);
        assert_eq!(bus.pins().delay_us, SLOW_WRITE_DELAY_US * IO_CHUNK as u32);
    }

    #[test]
    fn test_erase_timeout_when_never_ff() {
        let mut bus = Bus::new(ReadyPins::new(true));
        assert_eq!(chip_erase(&mut bus), Err(Error::EraseTimeout));
        let expected_ms = ERASE_START_DELAY_MS + (ERASE_POLL_RETRIES - 1) * ERASE_POLL_INTERVAL_MS;
        assert_eq!(bus.pins().delay_us, expected_ms * 1000);
        assert!(bus.registers().control.contains(ControlRegister::STATUS_LED));
    }
}
