//! cfprog - Programmer for 27CF840 parallel NOR flash
//!
//! Talks to the CH552-based programmer board over USB vendor control
//! transfers. Each invocation performs exactly one action: identify the
//! chip, read, write, erase, check sector protection, poke the bus
//! registers directly, or reboot the board into its bootloader.

mod cli;
mod commands;

use std::time::Duration;

use cfprog_host::{Session, UsbLink};
use clap::Parser;
use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();

    // Initialize logger
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    match cli.verbose {
        0 => {} // default (info)
        1 => {
            builder.filter_level(log::LevelFilter::Debug);
        }
        _ => {
            builder.filter_level(log::LevelFilter::Trace);
        }
    }
    if cli.debug {
        builder.filter_module("cfprog_host", log::LevelFilter::Trace);
    }
    builder.init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let link = UsbLink::open_with_timeout(Duration::from_millis(cli.timeout_ms))?;
    let mut session = Session::new(link);

    match cli.command {
        Commands::Identify => commands::run_identify(&mut session),
        Commands::Read {
            sectors,
            start,
            output,
        } => commands::run_read(&mut session, start, sectors, output.as_deref()),
        Commands::Write { input, start, slow } => {
            commands::run_write(&mut session, &input, start, slow)
        }
        Commands::Erase { sector } => commands::run_erase(&mut session, sector),
        Commands::Protect { sector } => commands::run_protect(&mut session, sector),
        Commands::Control { value } => commands::run_control(&mut session, value),
        Commands::Address { addr } => commands::run_address(&mut session, addr),
        Commands::Data { value } => commands::run_data(&mut session, value),
        Commands::Status => commands::run_status(&mut session),
        Commands::Bootloader => commands::run_bootloader(session),
    }
}
