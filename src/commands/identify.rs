//! Identify command implementation

use cfprog_host::{Link, Session};

/// Print the chip's manufacturer and device IDs
pub fn run_identify<L: Link>(session: &mut Session<L>) -> Result<(), Box<dyn std::error::Error>> {
    let id = session.identify()?;
    println!(
        "Manufacturer ID: 0x{:02X} ({})",
        id.manufacturer,
        id.manufacturer_name().unwrap_or("unknown")
    );
    println!("Device ID:       0x{:02X}", id.device);
    Ok(())
}
