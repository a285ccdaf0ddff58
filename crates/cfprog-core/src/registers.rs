//! Register model for the address and control shift registers
//!
//! The 20-bit flash address is split over three places: the low and high
//! bytes live in the two daisy-chained address registers (U1 and U2), and
//! the bank (A19..A16) rides in the top nibble of the control register (U3).

use bitflags::bitflags;
use cfprog_icd::{Status, ADDRESS_MASK};

bitflags! {
    /// Control register (U3) bits
    ///
    /// `OUTPUT_ENABLE` and `WRITE_ENABLE` drive the chip's active-low OE# and
    /// WE# inputs: a set bit means the line is high, i.e. inactive.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ControlRegister: u8 {
        /// Activity LED
        const STATUS_LED = 0x01;
        /// SH1B: when set, U2 (high address byte) receives no shift clocks
        const ADDR_LATCH_SELECT = 0x02;
        /// OE# line level
        const OUTPUT_ENABLE = 0x04;
        /// WE# line level
        const WRITE_ENABLE = 0x08;
        /// A19..A16
        const BANK = 0xF0;
    }
}

impl ControlRegister {
    /// Bus idle: LED on, OE# and WE# high, SH1B low, bank 0
    pub const IDLE: Self = Self::STATUS_LED
        .union(Self::OUTPUT_ENABLE)
        .union(Self::WRITE_ENABLE);

    /// Bank currently held in the top nibble
    pub const fn bank(&self) -> u8 {
        self.bits() >> 4
    }

    /// Replace the bank nibble
    pub fn set_bank(&mut self, bank: u8) {
        *self = Self::from_bits_retain((self.bits() & 0x0F) | ((bank & 0x0F) << 4));
    }

    /// Whether the chip outputs are enabled (OE# low)
    pub const fn outputs_enabled(&self) -> bool {
        !self.contains(Self::OUTPUT_ENABLE)
    }

    /// Whether writes are enabled (WE# low)
    pub const fn writes_enabled(&self) -> bool {
        !self.contains(Self::WRITE_ENABLE)
    }
}

impl Default for ControlRegister {
    fn default() -> Self {
        Self::IDLE
    }
}

/// 20-bit flash address as held by the shift registers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AddressRegister {
    /// A19..A16
    pub bank: u8,
    /// A15..A8 (U2)
    pub high: u8,
    /// A7..A0 (U1)
    pub low: u8,
}

/// Which parts of the address changed on an increment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Carry {
    /// Only the low byte changed
    None,
    /// The low byte wrapped into the high byte
    High,
    /// The high byte wrapped into the bank
    Bank,
}

impl AddressRegister {
    /// Split a flat address, ignoring bits above A19
    pub const fn from_u32(addr: u32) -> Self {
        let addr = addr & ADDRESS_MASK;
        Self {
            bank: (addr >> 16) as u8,
            high: (addr >> 8) as u8,
            low: addr as u8,
        }
    }

    /// Flat 20-bit address
    pub const fn to_u32(&self) -> u32 {
        ((self.bank as u32 & 0x0F) << 16) | ((self.high as u32) << 8) | self.low as u32
    }

    /// Low 16 bits, as shifted into U2:U1
    pub const fn word(&self) -> u16 {
        ((self.high as u16) << 8) | self.low as u16
    }

    /// Advance by one byte, wrapping at the top of the 20-bit space
    pub fn increment(&mut self) -> Carry {
        self.low = self.low.wrapping_add(1);
        if self.low != 0 {
            return Carry::None;
        }
        self.high = self.high.wrapping_add(1);
        if self.high != 0 {
            return Carry::High;
        }
        self.bank = (self.bank + 1) & 0x0F;
        Carry::Bank
    }
}

/// Mutable state shared between the dispatcher, the algorithms and the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegisterState {
    /// Current address
    pub address: AddressRegister,
    /// Current control register value
    pub control: ControlRegister,
    /// Generic data byte (last driven or sampled)
    pub data: u8,
    /// Status of the last operation
    pub status: Status,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_value() {
        assert_eq!(ControlRegister::IDLE.bits(), 0x0D);
        assert!(!ControlRegister::IDLE.outputs_enabled());
        assert!(!ControlRegister::IDLE.writes_enabled());
    }

    #[test]
    fn test_bank_nibble() {
        let mut ctrl = ControlRegister::IDLE;
        ctrl.set_bank(0x0B);
        assert_eq!(ctrl.bits(), 0xBD);
        assert_eq!(ctrl.bank(), 0x0B);
        ctrl.set_bank(0x12);
        assert_eq!(ctrl.bank(), 0x02);
    }

    #[test]
    fn test_address_split() {
        let addr = AddressRegister::from_u32(0x7_A5C3);
        assert_eq!(addr.bank, 0x07);
        assert_eq!(addr.high, 0xA5);
        assert_eq!(addr.low, 0xC3);
        assert_eq!(addr.word(), 0xA5C3);
        assert_eq!(addr.to_u32(), 0x7_A5C3);
        assert_eq!(AddressRegister::from_u32(0x12_3456).to_u32(), 0x2_3456);
    }

    #[test]
    fn test_increment_carries() {
        let mut addr = AddressRegister::from_u32(0x0_00FE);
        assert_eq!(addr.increment(), Carry::None);
        assert_eq!(addr.increment(), Carry::High);
        assert_eq!(addr.to_u32(), 0x0_0100);

        let mut addr = AddressRegister::from_u32(0x3_FFFF);
        assert_eq!(addr.increment(), Carry::Bank);
        assert_eq!(addr.to_u32(), 0x4_0000);

        let mut addr = AddressRegister::from_u32(0xF_FFFF);
        addr.increment();
        assert_eq!(addr.to_u32(), 0);
    }
}
