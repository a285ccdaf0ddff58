//! Write command implementation

use cfprog_host::{Link, Session};
use std::path::Path;

use super::progress_bar;

/// Run the write command
///
/// The target range must already be erased.
pub fn run_write<L: Link>(
    session: &mut Session<L>,
    input: &Path,
    start: u32,
    slow: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = std::fs::read(input)?;
    log::info!(
        "Writing {} bytes from {:?} at 0x{:05X}{}",
        data.len(),
        input,
        start,
        if slow { " (fixed delay)" } else { "" }
    );

    let pb = progress_bar(data.len() as u64, "Writing");
    match session.write_all(start, &data, slow, |done| pb.set_position(done as u64)) {
        Ok(()) => {
            pb.finish_with_message("Write complete");
            println!("Wrote {} bytes", data.len());
            Ok(())
        }
        Err(e) => {
            pb.abandon();
            Err(e.into())
        }
    }
}
