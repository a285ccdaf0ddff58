//! Shift-register bit streams
//!
//! Every shift pulls ST_CLK low, clocks the bits in (clock low, data,
//! clock high) and raises ST_CLK to transfer them to the outputs. The
//! storage clock is shared, so each shift re-latches all three registers.

use super::pins::{BusPins, Pin};

fn clock_bit<P: BusPins + ?Sized>(pins: &mut P, clock: Pin, bit: bool) {
    pins.set_low(clock);
    pins.set_pin(Pin::SerialData, bit);
    pins.set_high(clock);
}

fn clock_byte_msb_first<P: BusPins + ?Sized>(pins: &mut P, byte: u8) {
    for i in (0..8).rev() {
        clock_bit(pins, Pin::AddressClock, (byte >> i) & 1 != 0);
    }
}

/// Load the control register (U3), bit 0 first
///
/// U3's outputs are wired in reverse, so LSB-first shifting puts bit n on
/// control line n.
pub fn shift_control<P: BusPins + ?Sized>(pins: &mut P, ctrl: u8) {
    pins.set_low(Pin::StoreClock);
    for i in 0..8 {
        clock_bit(pins, Pin::ControlClock, (ctrl >> i) & 1 != 0);
    }
    pins.set_high(Pin::StoreClock);
}

/// Load both address registers, high byte then low byte, MSB first
///
/// SH1B must be low so U2 sees the clock.
pub fn shift_full_address<P: BusPins + ?Sized>(pins: &mut P, high: u8, low: u8) {
    pins.set_low(Pin::StoreClock);
    clock_byte_msb_first(pins, high);
    clock_byte_msb_first(pins, low);
    pins.set_high(Pin::StoreClock);
}

/// Load only the low address register (U1), MSB first
///
/// SH1B must be high so U2 keeps the high byte.
pub fn shift_low_address<P: BusPins + ?Sized>(pins: &mut P, low: u8) {
    pins.set_low(Pin::StoreClock);
    clock_byte_msb_first(pins, low);
    pins.set_high(Pin::StoreClock);
}
