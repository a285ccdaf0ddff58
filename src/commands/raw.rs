//! Raw register pokes and status peek

use cfprog_host::{Link, Session};

/// Load the control register
pub fn run_control<L: Link>(
    session: &mut Session<L>,
    value: u8,
) -> Result<(), Box<dyn std::error::Error>> {
    session.set_control(value)?;
    log::info!("Control register set to 0x{:02X}", value);
    Ok(())
}

/// Put an address on the bus
pub fn run_address<L: Link>(
    session: &mut Session<L>,
    addr: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    session.set_address(addr)?;
    log::info!("Address set to 0x{:05X}", addr);
    Ok(())
}

/// Drive a data byte
pub fn run_data<L: Link>(
    session: &mut Session<L>,
    value: u8,
) -> Result<(), Box<dyn std::error::Error>> {
    session.set_data(value)?;
    log::info!("Data set to 0x{:02X}", value);
    Ok(())
}

/// Print the data and status bytes
pub fn run_status<L: Link>(session: &mut Session<L>) -> Result<(), Box<dyn std::error::Error>> {
    let (data, status) = session.get_data()?;
    println!("Data:   0x{:02X}", data);
    println!("Status: {} ({})", status as u8, status);
    Ok(())
}

/// Reboot the programmer into its bootloader
pub fn run_bootloader<L: Link>(session: Session<L>) -> Result<(), Box<dyn std::error::Error>> {
    session.jump_to_bootloader()?;
    println!("Programmer is rebooting into the bootloader");
    Ok(())
}
