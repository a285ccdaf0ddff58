//! CLI command implementations
//!
//! Every command works on a [`cfprog_host::Session`] over any
//! [`cfprog_host::Link`], so the same code runs against real hardware and
//! the emulator.

mod erase;
mod identify;
mod raw;
mod read;
mod write;

pub use erase::{run_erase, run_protect};
pub use identify::run_identify;
pub use raw::{run_address, run_bootloader, run_control, run_data, run_status};
pub use read::run_read;
pub use write::run_write;

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Byte progress bar on stderr
fn progress_bar(total: u64, phase: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{bytes}}/{{total_bytes}} ({{bytes_per_sec}}, {{eta}}) {}",
                phase
            ))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}

/// Spinner for operations without byte progress
fn spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

#[cfg(test)]
mod tests {
    use super::*;
    use cfprog_core::Mailbox;
    use cfprog_emulator::{EmulatedBoard, EmulatedLink};
    use cfprog_host::{HostError, Session};
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("cfprog-{}-{}", std::process::id(), name))
    }

    #[test]
    fn test_write_file_then_read_file() {
        let mailbox = Mailbox::new();
        let mut link = EmulatedLink::new(&mailbox, EmulatedBoard::default());
        let mut session = Session::new(&mut link);

        let input = temp_path("in.bin");
        let output = temp_path("out.bin");
        let image: Vec<u8> = (0..200u32).map(|i| (i * 7) as u8).collect();
        std::fs::write(&input, &image).unwrap();

        run_write(&mut session, &input, 0x1_0000, false).unwrap();
        run_read(&mut session, 0x1_0000, 4, Some(&output)).unwrap();

        let read_back = std::fs::read(&output).unwrap();
        assert_eq!(read_back.len(), 256);
        assert_eq!(&read_back[..200], &image[..]);
        assert!(read_back[200..].iter().all(|&b| b == 0xFF));

        std::fs::remove_file(input).ok();
        std::fs::remove_file(output).ok();
    }

    #[test]
    fn test_erase_and_protect() {
        let mailbox = Mailbox::new();
        let mut board = EmulatedBoard::default();
        board.chip_mut().memory_mut()[..0x100].fill(0x00);
        board.chip_mut().protect_sector(0x3_0000);
        let mut link = EmulatedLink::new(&mailbox, board);
        let mut session = Session::new(&mut link);

        run_erase(&mut session, Some(0)).unwrap();
        run_protect(&mut session, 0x3_0000).unwrap();
        run_identify(&mut session).unwrap();

        assert!(link.board().chip().memory()[..0x100]
            .iter()
            .all(|&b| b == 0xFF));
    }

    #[test]
    fn test_read_past_end_is_refused_before_allocating() {
        let mailbox = Mailbox::new();
        let mut link = EmulatedLink::new(&mailbox, EmulatedBoard::default());
        let mut session = Session::new(&mut link);

        let err = run_read(&mut session, 0, u32::MAX, None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<HostError>(),
            Some(HostError::OutOfRange { start: 0, .. })
        ));
        let err = run_read(&mut session, 0xF_FFC0, 2, None).unwrap_err();
        assert!(err.downcast_ref::<HostError>().is_some());
        assert!(link.executed().is_empty());
    }

    #[test]
    fn test_missing_input_file() {
        let mailbox = Mailbox::new();
        let mut link = EmulatedLink::new(&mailbox, EmulatedBoard::default());
        let mut session = Session::new(&mut link);
        assert!(run_write(&mut session, &temp_path("missing.bin"), 0, false).is_err());
        assert!(link.executed().is_empty());
    }
}
