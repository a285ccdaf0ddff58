//! Programmer board model
//!
//! Models the three 74HC595 shift registers, the CE# line and the data
//! port at the level of individual pin edges, then forwards the resulting
//! bus cycles to an [`EmulatedChip`]. Time is virtual: delays and ready
//! checks advance a clock that the chip uses for its busy periods.

use std::time::Duration;

use cfprog_core::bus::{BusPins, Pin, PortDirection};
use cfprog_core::ControlRegister;

use crate::chip::EmulatedChip;

/// Virtual time spent on one RY/BY# sample
const READY_CHECK_NS: u64 = 500;
/// Virtual time of one settle
const SETTLE_NS: u64 = 100;

/// Emulated programmer board with a flash chip in the socket
pub struct EmulatedBoard {
    chip: EmulatedChip,
    store_clock: bool,
    control_clock: bool,
    address_clock: bool,
    serial_data: bool,
    chip_enable: bool,
    control_shift: u8,
    control_out: u8,
    address_shift: u16,
    address_out: u16,
    port_direction: PortDirection,
    port_out: u8,
    write_addr: Option<u32>,
    now_ns: u64,
    ready_checks: u64,
}

impl EmulatedBoard {
    /// Put `chip` in the socket
    pub fn new(chip: EmulatedChip) -> Self {
        Self {
            chip,
            store_clock: false,
            control_clock: false,
            address_clock: false,
            serial_data: false,
            chip_enable: true,
            control_shift: 0,
            control_out: 0,
            address_shift: 0,
            address_out: 0,
            port_direction: PortDirection::Input,
            port_out: 0,
            write_addr: None,
            now_ns: 0,
            ready_checks: 0,
        }
    }

    /// The flash chip
    pub fn chip(&self) -> &EmulatedChip {
        &self.chip
    }

    /// Mutable flash chip
    pub fn chip_mut(&mut self) -> &mut EmulatedChip {
        &mut self.chip
    }

    /// Latched control register outputs
    pub fn control(&self) -> ControlRegister {
        ControlRegister::from_bits_retain(self.control_out)
    }

    /// 20-bit address currently on the flash pins
    pub fn address(&self) -> u32 {
        ((self.control_out as u32 >> 4) << 16) | self.address_out as u32
    }

    /// Whether the activity LED is lit
    pub fn led_on(&self) -> bool {
        self.control().contains(ControlRegister::STATUS_LED)
    }

    /// Whether CE# is high
    pub fn chip_enable_high(&self) -> bool {
        self.chip_enable
    }

    /// Number of RY/BY# samples taken
    pub fn ready_checks(&self) -> u64 {
        self.ready_checks
    }

    /// Virtual time since power-up
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.now_ns)
    }

    fn now_us(&self) -> u64 {
        self.now_ns / 1000
    }

    fn write_enable_low(&self) -> bool {
        self.control_out & ControlRegister::WRITE_ENABLE.bits() == 0
    }

    fn output_enable_low(&self) -> bool {
        self.control_out & ControlRegister::OUTPUT_ENABLE.bits() == 0
    }

    fn clock_control(&mut self) {
        self.control_shift = (self.control_shift << 1) | self.serial_data as u8;
    }

    fn clock_address(&mut self) {
        let bit = self.serial_data as u16;
        if self.control_out & ControlRegister::ADDR_LATCH_SELECT.bits() != 0 {
            // U2 is gated off; only U1 shifts
            let low = ((self.address_shift << 1) | bit) & 0x00FF;
            self.address_shift = (self.address_shift & 0xFF00) | low;
        } else {
            self.address_shift = (self.address_shift << 1) | bit;
        }
    }

    /// ST_CLK rising edge: all three registers transfer to their outputs
    fn latch(&mut self) {
        let we_was_low = self.write_enable_low();
        // U3 outputs are wired in reverse order
        self.control_out = self.control_shift.reverse_bits();
        self.address_out = self.address_shift;

        match (we_was_low, self.write_enable_low()) {
            (false, true) => self.begin_write(),
            (true, false) => self.end_write(),
            _ => {}
        }
    }

    fn set_chip_enable(&mut self, high: bool) {
        let was_high = self.chip_enable;
        self.chip_enable = high;
        if was_high && !high && self.write_enable_low() {
            self.begin_write();
        } else if !was_high && high && self.write_enable_low() {
            self.end_write();
        }
    }

    /// Address is taken on the later falling edge of CE# and WE#
    fn begin_write(&mut self) {
        if !self.chip_enable && self.write_enable_low() {
            self.write_addr = Some(self.address());
        }
    }

    /// Data is taken on the first rising edge of CE# or WE#
    fn end_write(&mut self) {
        if let Some(addr) = self.write_addr.take() {
            if self.port_direction == PortDirection::Input {
                log::warn!("write cycle at 0x{:05X} with the data port floating", addr);
            }
            let now = self.now_us();
            self.chip.bus_write(addr, self.port_out, now);
        }
    }
}

impl Default for EmulatedBoard {
    fn default() -> Self {
        Self::new(EmulatedChip::default())
    }
}

impl BusPins for EmulatedBoard {
    fn set_pin(&mut self, pin: Pin, high: bool) {
        match pin {
            Pin::StoreClock => {
                let rising = !self.store_clock && high;
                self.store_clock = high;
                if rising {
                    self.latch();
                }
            }
            Pin::ControlClock => {
                let rising = !self.control_clock && high;
                self.control_clock = high;
                if rising {
                    self.clock_control();
                }
            }
            Pin::AddressClock => {
                let rising = !self.address_clock && high;
                self.address_clock = high;
                if rising {
                    self.clock_address();
                }
            }
            Pin::SerialData => self.serial_data = high,
            Pin::ChipEnable => self.set_chip_enable(high),
        }
    }

    fn is_ready(&mut self) -> bool {
        self.ready_checks += 1;
        self.now_ns += READY_CHECK_NS;
        let now = self.now_us();
        self.chip.is_ready(now)
    }

    fn set_port_direction(&mut self, direction: PortDirection) {
        self.port_direction = direction;
    }

    fn write_port(&mut self, value: u8) {
        self.port_out = value;
    }

    fn read_port(&mut self) -> u8 {
        match self.port_direction {
            PortDirection::Output => self.port_out,
            PortDirection::Input if !self.chip_enable && self.output_enable_low() => {
                let (addr, now) = (self.address(), self.now_us());
                self.chip.bus_read(addr, now)
            }
            // Pulled up while nothing drives the port
            PortDirection::Input => 0xFF,
        }
    }

    fn settle(&mut self) {
        self.now_ns += SETTLE_NS;
    }

    fn delay_us(&mut self, us: u32) {
        self.now_ns += us as u64 * 1000;
    }

    fn enter_bootloader(&mut self) -> ! {
        panic!("the emulated board has no bootloader")
    }
}
