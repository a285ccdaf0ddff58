//! Read command implementation

use cfprog_host::icd::IO_CHUNK;
use cfprog_host::{HostError, Link, Session, FLASH_SIZE};
use std::fs::File;
use std::io::Write;
use std::path::Path;

use super::progress_bar;

/// Run the read command
///
/// Reads `blocks` 64-byte blocks from `start`. Without an output path the
/// data goes to stdout; progress always goes to stderr.
pub fn run_read<L: Link>(
    session: &mut Session<L>,
    start: u32,
    blocks: u32,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let len = (blocks as usize).saturating_mul(IO_CHUNK);
    if (start as usize).saturating_add(len) > FLASH_SIZE {
        return Err(HostError::OutOfRange { start, len }.into());
    }
    let mut data = vec![0u8; len];

    let pb = progress_bar(len as u64, "Reading");
    let result = session.read(start, &mut data, |done| pb.set_position(done as u64));
    match result {
        Ok(()) => pb.finish_with_message("Read complete"),
        Err(e) => {
            pb.abandon();
            return Err(e.into());
        }
    }

    match output {
        Some(path) => {
            let mut file = File::create(path)?;
            file.write_all(&data)?;
            eprintln!("Wrote {} bytes to {:?}", data.len(), path);
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&data)?;
            stdout.flush()?;
        }
    }

    Ok(())
}
