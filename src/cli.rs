//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parse a string as a hex or decimal u32
pub fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

/// Parse a byte value (hex or decimal)
fn parse_hex_u8(s: &str) -> Result<u8, String> {
    let value = parse_hex_u32(s)?;
    u8::try_from(value).map_err(|_| format!("Value out of range for a byte: {}", s))
}

/// Parse a 20-bit flash address (hex or decimal)
fn parse_flash_addr(s: &str) -> Result<u32, String> {
    let value = parse_hex_u32(s)?;
    if value > 0xF_FFFF {
        return Err(format!("Address outside the 1 MiB flash: {}", s));
    }
    Ok(value)
}

#[derive(Parser)]
#[command(name = "cfprog")]
#[command(author, version, about = "27CF840 parallel flash programmer", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Trace every USB transfer
    #[arg(long, global = true)]
    pub debug: bool,

    /// Per-transfer USB timeout in milliseconds
    #[arg(long, default_value_t = 50, global = true)]
    pub timeout_ms: u64,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Read manufacturer and device IDs
    Identify,

    /// Read flash contents in 64-byte blocks
    Read {
        /// Number of 64-byte blocks to read
        #[arg(short, long, value_parser = parse_hex_u32)]
        sectors: u32,

        /// Start address (hex, e.g., 0x10000)
        #[arg(long, default_value = "0", value_parser = parse_flash_addr)]
        start: u32,

        /// Output file path (stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write file to erased flash
    Write {
        /// Input file path
        input: PathBuf,

        /// Start address (hex, e.g., 0x10000)
        #[arg(long, default_value = "0", value_parser = parse_flash_addr)]
        start: u32,

        /// Wait a fixed time per byte instead of polling RY/BY#
        #[arg(long)]
        slow: bool,
    },

    /// Erase the whole chip or a single sector
    Erase {
        /// Sector base address (hex, e.g., 0x10000); whole chip if omitted
        #[arg(long, value_parser = parse_flash_addr)]
        sector: Option<u32>,
    },

    /// Check whether a sector is protected
    Protect {
        /// Sector base address (hex)
        #[arg(value_parser = parse_flash_addr)]
        sector: u32,
    },

    /// Load the control register with a raw value
    Control {
        /// Control byte (hex or decimal)
        #[arg(value_parser = parse_hex_u8)]
        value: u8,
    },

    /// Put an address on the bus
    Address {
        /// 20-bit address (hex or decimal)
        #[arg(value_parser = parse_flash_addr)]
        addr: u32,
    },

    /// Drive a byte on the data bus
    Data {
        /// Data byte (hex or decimal)
        #[arg(value_parser = parse_hex_u8)]
        value: u8,
    },

    /// Show the device's data and status bytes
    Status,

    /// Reboot the programmer into its USB bootloader
    Bootloader,
}
