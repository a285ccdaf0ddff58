//! Setup meta-command
//!
//! Every setup starts by soft-resetting the chip and parking the bus. The
//! mode then either primes the bus for bulk reads/writes or runs one of the
//! unlock-sequenced operations (ID readout, sector protection, erase).

use cfprog_icd::{SetupMode, Status};

use crate::algorithm;
use crate::bus::{Bus, BusPins, Pin, PortDirection};
use crate::registers::{AddressRegister, ControlRegister};

/// Run a setup command
///
/// `addr` is the address parameter of the request: the sector base for
/// [`SetupMode::SectorErase`] and [`SetupMode::SectorProtection`], ignored
/// otherwise. Results are left in the register state (`data`, `status`).
pub fn run<P: BusPins>(bus: &mut Bus<P>, mode: SetupMode, addr: u32) {
    log::debug!("setup {:?} at 0x{:05X}", mode, addr);

    park(bus);

    if mode == SetupMode::Ready {
        bus.drive_data(0);
        return;
    }

    bus.registers_mut().status = Status::Initialised;

    match mode {
        SetupMode::BeginRead => {
            bus.set_direction(PortDirection::Input);
            bus.registers_mut()
                .control
                .remove(ControlRegister::OUTPUT_ENABLE);
            bus.apply_control();
            return;
        }
        SetupMode::BeginWrite => {
            bus.registers_mut()
                .control
                .remove(ControlRegister::WRITE_ENABLE);
            bus.apply_control();
            return;
        }
        _ => {}
    }

    algorithm::unlock_preamble(bus);

    match mode {
        SetupMode::ManufacturerId => {
            algorithm::read_manufacturer_id(bus);
        }
        SetupMode::DeviceId => {
            algorithm::read_device_id(bus);
        }
        SetupMode::SectorProtection => {
            algorithm::read_sector_protection(bus, addr);
        }
        SetupMode::ChipErase => {
            bus.registers_mut().status = Status::EraseInProgress;
            let result = algorithm::chip_erase(bus);
            finish_erase(bus, result);
        }
        SetupMode::SectorErase => {
            bus.registers_mut().status = Status::EraseInProgress;
            let result = algorithm::sector_erase(bus, addr);
            finish_erase(bus, result);
        }
        SetupMode::Ready | SetupMode::BeginRead | SetupMode::BeginWrite => {}
    }
}

/// Soft reset and return the bus to idle with the address at 0
fn park<P: BusPins>(bus: &mut Bus<P>) {
    {
        let regs = bus.registers_mut();
        regs.address = AddressRegister::default();
        regs.control = ControlRegister::IDLE;
    }
    bus.apply_control();

    algorithm::reset(bus);

    bus.registers_mut().address = AddressRegister::default();
    bus.pins_mut().set_high(Pin::ChipEnable);
    bus.registers_mut().control = ControlRegister::IDLE;
    bus.apply_control();
}

fn finish_erase<P: BusPins>(bus: &mut Bus<P>, result: crate::Result<()>) {
    bus.registers_mut().status = match result {
        Ok(()) => Status::Initialised,
        Err(e) => {
            log::warn!("{}", e);
            e.status()
        }
    };
}
