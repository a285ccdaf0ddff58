//! Board pin abstraction
//!
//! The bus driver only needs a handful of GPIOs plus the 8-bit data port.
//! Everything above this trait is board independent, which is also what
//! lets the emulator crate run the real state machine on a host.

/// Output lines driven by the bus driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pin {
    /// ST_CLK: rising edge transfers all three shift registers to their outputs
    StoreClock,
    /// SH2: shift clock of the control register (U3)
    ControlClock,
    /// SH1: shift clock of the address chain (U1, and U2 unless SH1B is set)
    AddressClock,
    /// SDATA: serial data shared by all shift registers
    SerialData,
    /// CE#: flash chip enable, wired directly to the MCU
    ChipEnable,
}

/// Direction of the 8-bit data port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    /// Sampling the flash data outputs
    Input,
    /// Driving data into the flash
    Output,
}

/// Platform capability needed by the bus driver
///
/// Edge order is the contract: implementations must apply every call
/// immediately and in order.
pub trait BusPins {
    /// Drive an output line
    fn set_pin(&mut self, pin: Pin, high: bool);

    /// Sample RY/BY# from the flash (true = ready)
    fn is_ready(&mut self) -> bool;

    /// Set the direction of the data port
    fn set_port_direction(&mut self, direction: PortDirection);

    /// Drive the data port (only meaningful as output)
    fn write_port(&mut self, value: u8);

    /// Sample the data port (only meaningful as input)
    fn read_port(&mut self) -> u8;

    /// Wait at least the minimum strobe width of the flash
    fn settle(&mut self);

    /// Busy-wait for the given number of microseconds
    fn delay_us(&mut self, us: u32);

    /// Busy-wait for the given number of milliseconds
    fn delay_ms(&mut self, ms: u32) {
        for _ in 0..ms {
            self.delay_us(1000);
        }
    }

    /// Hand the MCU over to its ROM bootloader
    fn enter_bootloader(&mut self) -> !;

    /// Drive a line high
    fn set_high(&mut self, pin: Pin) {
        self.set_pin(pin, true);
    }

    /// Drive a line low
    fn set_low(&mut self, pin: Pin) {
        self.set_pin(pin, false);
    }
}
