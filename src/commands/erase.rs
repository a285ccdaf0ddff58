//! Erase and sector protection commands

use cfprog_host::{Link, Session};

use super::spinner;

/// Run the erase command
///
/// Erases the sector at `sector`, or the whole chip when `None`.
pub fn run_erase<L: Link>(
    session: &mut Session<L>,
    sector: Option<u32>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (pb, result) = match sector {
        Some(addr) => {
            let pb = spinner(format!("Erasing sector at 0x{:05X}...", addr));
            (pb, session.erase_sector(addr))
        }
        None => {
            let pb = spinner("Erasing full chip...".to_string());
            (pb, session.erase_chip())
        }
    };

    match result {
        Ok(()) => {
            pb.finish_with_message("Erase complete");
            Ok(())
        }
        Err(e) => {
            pb.abandon_with_message("Erase failed");
            Err(e.into())
        }
    }
}

/// Run the sector protection check
pub fn run_protect<L: Link>(
    session: &mut Session<L>,
    sector: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let protected = session.sector_protection(sector)?;
    println!(
        "Sector 0x{:05X}: {}",
        sector,
        if protected { "protected" } else { "unprotected" }
    );
    Ok(())
}
