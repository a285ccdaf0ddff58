//! Parallel flash bus driver
//!
//! [`Bus`] owns the board pins and the register state and knows how to put
//! an address, a control value or a data byte on the flash bus. The
//! shift-level bit streams live in [`shift`]; this module adds the chip
//! enable / write enable / output enable strobes on top.

pub mod pins;
pub mod shift;

pub use pins::{BusPins, Pin, PortDirection};

use crate::registers::{AddressRegister, ControlRegister, RegisterState};

/// Flash bus: board pins plus the register values they currently reflect
pub struct Bus<P> {
    pins: P,
    regs: RegisterState,
    direction: PortDirection,
}

impl<P: BusPins> Bus<P> {
    /// Take ownership of the pins and bring the bus to its idle state
    ///
    /// CE# high, control register idle, address 0 and 0 driven on the data
    /// port.
    pub fn new(mut pins: P) -> Self {
        pins.set_low(Pin::SerialData);
        pins.set_low(Pin::StoreClock);
        pins.set_high(Pin::AddressClock);
        pins.set_high(Pin::ControlClock);
        pins.set_high(Pin::ChipEnable);
        pins.set_port_direction(PortDirection::Output);
        pins.write_port(0);

        let mut bus = Self {
            pins,
            regs: RegisterState::default(),
            direction: PortDirection::Output,
        };
        bus.apply_address();
        bus
    }

    /// Current register values
    pub fn registers(&self) -> &RegisterState {
        &self.regs
    }

    /// Mutable register values; call one of the `apply_*` methods to make
    /// changes visible on the bus
    pub fn registers_mut(&mut self) -> &mut RegisterState {
        &mut self.regs
    }

    /// Board pins
    pub fn pins(&self) -> &P {
        &self.pins
    }

    /// Mutable board pins
    pub fn pins_mut(&mut self) -> &mut P {
        &mut self.pins
    }

    /// Shift the control register value out
    pub fn apply_control(&mut self) {
        shift::shift_control(&mut self.pins, self.regs.control.bits());
    }

    /// Put the full 20-bit address on the bus
    ///
    /// Clears SH1B and loads the bank into the control register first, so
    /// both address registers receive the following 16 clocks.
    pub fn apply_address(&mut self) {
        self.regs.control.remove(ControlRegister::ADDR_LATCH_SELECT);
        self.regs.control.set_bank(self.regs.address.bank);
        self.apply_control();
        self.shift_address();
    }

    /// Shift the low 16 address bits as currently held in the registers
    ///
    /// Requires SH1B low.
    pub fn shift_address(&mut self) {
        let AddressRegister { high, low, .. } = self.regs.address;
        shift::shift_full_address(&mut self.pins, high, low);
    }

    /// Shift an arbitrary 16-bit word into the address chain without
    /// touching the address register
    ///
    /// Used for unlock cycles; requires SH1B low.
    pub fn shift_word(&mut self, word: u16) {
        shift::shift_full_address(&mut self.pins, (word >> 8) as u8, word as u8);
    }

    /// Shift only the low address byte
    ///
    /// Requires SH1B high.
    pub fn shift_address_low(&mut self) {
        shift::shift_low_address(&mut self.pins, self.regs.address.low);
    }

    /// Switch the data port direction if needed
    pub fn set_direction(&mut self, direction: PortDirection) {
        if self.direction != direction {
            self.pins.set_port_direction(direction);
            self.direction = direction;
        }
    }

    /// Drive a byte on the data port
    pub fn drive_data(&mut self, value: u8) {
        self.set_direction(PortDirection::Output);
        self.pins.write_port(value);
    }

    /// Write one byte with a full CE#/WE# cycle
    ///
    /// Slow and self-contained; used for resets and unlock/erase sequences
    /// outside the bulk write path. The address register is left at `addr`.
    pub fn write_byte_at(&mut self, addr: u32, value: u8) {
        self.regs.address = AddressRegister::from_u32(addr);
        self.drive_data(value);
        self.apply_address();

        self.pins.set_low(Pin::ChipEnable);
        self.regs.control.remove(ControlRegister::WRITE_ENABLE);
        self.apply_control();
        self.regs.control.insert(ControlRegister::WRITE_ENABLE);
        self.apply_control();
        self.pins.set_high(Pin::ChipEnable);
    }

    /// Read one byte with a full CE#/OE# cycle
    pub fn read_byte_at(&mut self, addr: u32) -> u8 {
        self.regs.address = AddressRegister::from_u32(addr);
        self.set_direction(PortDirection::Input);
        self.apply_address();

        self.pins.set_low(Pin::ChipEnable);
        self.regs.control.remove(ControlRegister::OUTPUT_ENABLE);
        self.apply_control();
        self.pins.settle();
        let value = self.pins.read_port();
        self.regs.control.insert(ControlRegister::OUTPUT_ENABLE);
        self.apply_control();
        self.pins.set_high(Pin::ChipEnable);

        self.regs.data = value;
        value
    }

    /// Latch `value` at the address on the bus with a CE# pulse
    ///
    /// WE# must already be held low.
    pub fn strobe_write(&mut self, value: u8) {
        self.pins.set_low(Pin::ChipEnable);
        self.pins.write_port(value);
        self.pins.settle();
        self.pins.set_high(Pin::ChipEnable);
    }

    /// Sample the data port with a CE# pulse
    ///
    /// OE# must already be held low and the port must be an input.
    pub fn strobe_read(&mut self) -> u8 {
        self.pins.set_low(Pin::ChipEnable);
        self.pins.settle();
        let value = self.pins.read_port();
        self.pins.set_high(Pin::ChipEnable);
        value
    }

    /// Drive the status LED
    pub fn set_led(&mut self, on: bool) {
        self.regs.control.set(ControlRegister::STATUS_LED, on);
        self.apply_control();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::vec::Vec;

    /// Records every pin event
    #[derive(Default)]
    struct Recorder {
        events: Vec<(Pin, bool)>,
    }

    impl Recorder {
        /// Bits sampled on each rising edge of `clock`
        fn clocked(&self, clock: Pin) -> Vec<bool> {
            let mut data = false;
            let mut bits = Vec::new();
            for &(pin, high) in &self.events {
                if pin == Pin::SerialData {
                    data = high;
                } else if pin == clock && high {
                    bits.push(data);
                }
            }
            bits
        }
    }

    impl BusPins for Recorder {
        fn set_pin(&mut self, pin: Pin, high: bool) {
            self.events.push((pin, high));
        }
        fn is_ready(&mut self) -> bool {
            true
        }
        fn set_port_direction(&mut self, _direction: PortDirection) {}
        fn write_port(&mut self, _value: u8) {}
        fn read_port(&mut self) -> u8 {
            0xFF
        }
        fn settle(&mut self) {}
        fn delay_us(&mut self, _us: u32) {}
        fn enter_bootloader(&mut self) -> ! {
            panic!("bootloader")
        }
    }

    fn byte_bits(byte: u8, msb_first: bool) -> Vec<bool> {
        let order: Vec<u8> = if msb_first {
            (0..8).rev().collect()
        } else {
            (0..8).collect()
        };
        order.into_iter().map(|i| (byte >> i) & 1 != 0).collect()
    }

    #[test]
    fn test_control_is_lsb_first() {
        let mut pins = Recorder::default();
        shift::shift_control(&mut pins, 0xA6);
        assert_eq!(pins.clocked(Pin::ControlClock), byte_bits(0xA6, false));
        assert!(pins.clocked(Pin::AddressClock).is_empty());
    }

    #[test]
    fn test_address_is_high_then_low_msb_first() {
        let mut pins = Recorder::default();
        shift::shift_full_address(&mut pins, 0x0A, 0xAA);
        let mut expected = byte_bits(0x0A, true);
        expected.extend(byte_bits(0xAA, true));
        assert_eq!(pins.clocked(Pin::AddressClock), expected);
    }

    #[test]
    fn test_store_clock_frames_each_shift() {
        let mut pins = Recorder::default();
        shift::shift_low_address(&mut pins, 0x3C);
        assert_eq!(pins.events.first(), Some(&(Pin::StoreClock, false)));
        assert_eq!(pins.events.last(), Some(&(Pin::StoreClock, true)));
        assert_eq!(pins.clocked(Pin::AddressClock).len(), 8);
    }

    #[test]
    fn test_data_set_while_clock_low() {
        let mut pins = Recorder::default();
        shift::shift_control(&mut pins, 0x5A);
        let mut clock_high = true;
        for &(pin, high) in &pins.events {
            match pin {
                Pin::ControlClock => clock_high = high,
                Pin::SerialData => assert!(!clock_high, "data changed while clock high"),
                _ => {}
            }
        }
    }

    #[test]
    fn test_apply_address_clears_latch_select_and_loads_bank() {
        let mut bus = Bus::new(Recorder::default());
        bus.registers_mut()
            .control
            .insert(ControlRegister::ADDR_LATCH_SELECT);
        bus.registers_mut().address = AddressRegister::from_u32(0x9_1234);
        bus.pins_mut().events.clear();
        bus.apply_address();

        let ctrl = bus.registers().control;
        assert!(!ctrl.contains(ControlRegister::ADDR_LATCH_SELECT));
        assert_eq!(ctrl.bank(), 0x9);

        // Control goes out before the address
        let first_addr = bus
            .pins()
            .events
            .iter()
            .position(|&(p, _)| p == Pin::AddressClock);
        let last_ctrl = bus
            .pins()
            .events
            .iter()
            .rposition(|&(p, _)| p == Pin::ControlClock);
        assert!(last_ctrl < first_addr);
        assert_eq!(
            bus.pins().clocked(Pin::ControlClock),
            byte_bits(ctrl.bits(), false)
        );
    }
}
