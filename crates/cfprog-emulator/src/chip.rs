//! Byte-mode NOR flash with the AMD command set
//!
//! The chip sees bus cycles only: [`EmulatedChip::bus_write`] for every
//! latched write and [`EmulatedChip::bus_read`] while CE# and OE# are low.
//! Command sequences are decoded on the low 12 address bits, as real parts
//! do in byte mode.

use std::collections::BTreeSet;

/// Configuration for the emulated chip
#[derive(Debug, Clone)]
pub struct ChipConfig {
    /// Autoselect manufacturer ID
    pub manufacturer_id: u8,
    /// Autoselect device ID
    pub device_id: u8,
    /// Flash size in bytes
    pub size: usize,
    /// Uniform sector size
    pub sector_size: usize,
    /// Time a byte program keeps the chip busy
    pub program_time_us: u64,
    /// Time an erase keeps the chip busy; `None` never completes
    pub erase_time_us: Option<u64>,
    /// Hold RY/BY# low forever
    pub stuck_busy: bool,
}

impl Default for ChipConfig {
    fn default() -> Self {
        Self {
            manufacturer_id: 0x04, // Fujitsu
            device_id: 0xD6,       // MBM29F800TA
            size: 1024 * 1024,
            sector_size: 64 * 1024,
            program_time_us: 7,
            erase_time_us: Some(300_000),
            stuck_busy: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommandState {
    ReadArray,
    Unlocked1,
    Unlocked2,
    ProgramArmed,
    EraseSetup,
    EraseUnlocked1,
    EraseUnlocked2,
    Autoselect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Erase {
    Chip,
    Sector(usize),
}

/// One latched write cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusWrite {
    /// 20-bit address on the bus
    pub addr: u32,
    /// Data byte
    pub data: u8,
}

/// In-memory flash chip
pub struct EmulatedChip {
    config: ChipConfig,
    memory: Vec<u8>,
    state: CommandState,
    protected: BTreeSet<usize>,
    busy_until: u64,
    erase: Option<(Erase, Option<u64>)>,
    toggle: bool,
    writes: Vec<BusWrite>,
    writes_while_busy: usize,
    rejected_sequences: usize,
}

impl EmulatedChip {
    /// Create an erased chip
    pub fn new(config: ChipConfig) -> Self {
        let memory = vec![0xFF; config.size];
        Self {
            config,
            memory,
            state: CommandState::ReadArray,
            protected: BTreeSet::new(),
            busy_until: 0,
            erase: None,
            toggle: false,
            writes: Vec::new(),
            writes_while_busy: 0,
            rejected_sequences: 0,
        }
    }

    /// Flash contents
    pub fn memory(&self) -> &[u8] {
        &self.memory
    }

    /// Mutable flash contents
    pub fn memory_mut(&mut self) -> &mut [u8] {
        &mut self.memory
    }

    /// Every write cycle seen so far
    pub fn writes(&self) -> &[BusWrite] {
        &self.writes
    }

    /// Writes that arrived while a program or erase was still running
    pub fn writes_while_busy(&self) -> usize {
        self.writes_while_busy
    }

    /// Command sequences that fell back to read-array mode
    pub fn rejected_sequences(&self) -> usize {
        self.rejected_sequences
    }

    /// Mark the sector containing `addr` as protected
    pub fn protect_sector(&mut self, addr: u32) {
        let sector = self.sector_of(addr);
        self.protected.insert(sector);
    }

    /// Whether the sector containing `addr` is protected
    pub fn is_protected(&self, addr: u32) -> bool {
        self.protected.contains(&self.sector_of(addr))
    }

    fn sector_of(&self, addr: u32) -> usize {
        addr as usize % self.config.size / self.config.sector_size
    }

    fn offset(&self, addr: u32) -> usize {
        addr as usize % self.config.size
    }

    /// RY/BY# level at time `now_us`
    pub fn is_ready(&mut self, now_us: u64) -> bool {
        if self.config.stuck_busy {
            return false;
        }
        self.finish_erase(now_us);
        self.erase.is_none() && now_us >= self.busy_until
    }

    fn finish_erase(&mut self, now_us: u64) {
        let Some((kind, Some(done_at))) = self.erase else {
            return;
        };
        if now_us < done_at {
            return;
        }
        match kind {
            Erase::Chip => {
                for sector in 0..self.config.size / self.config.sector_size {
                    self.erase_sector(sector);
                }
            }
            Erase::Sector(sector) => self.erase_sector(sector),
        }
        log::debug!("erase {:?} finished at {} us", kind, now_us);
        self.erase = None;
    }

    fn erase_sector(&mut self, sector: usize) {
        if self.protected.contains(&sector) {
            return;
        }
        let start = sector * self.config.sector_size;
        self.memory[start..start + self.config.sector_size].fill(0xFF);
    }

    /// A write cycle latched at time `now_us`
    pub fn bus_write(&mut self, addr: u32, data: u8, now_us: u64) {
        self.writes.push(BusWrite { addr, data });
        if !self.is_ready(now_us) {
            self.writes_while_busy += 1;
            log::trace!("write 0x{:02X}@0x{:05X} ignored while busy", data, addr);
            return;
        }

        if self.state == CommandState::ProgramArmed {
            self.program(addr, data, now_us);
            self.state = CommandState::ReadArray;
            return;
        }
        if data == 0xF0 {
            self.state = CommandState::ReadArray;
            return;
        }

        let cmd_addr = addr & 0xFFF;
        self.state = match (self.state, cmd_addr, data) {
            (CommandState::ReadArray | CommandState::Autoselect, 0xAAA, 0xAA) => {
                CommandState::Unlocked1
            }
            (CommandState::Autoselect, _, _) => CommandState::Autoselect,
            (CommandState::Unlocked1, 0x555, 0x55) => CommandState::Unlocked2,
            (CommandState::Unlocked2, 0xAAA, 0xA0) => CommandState::ProgramArmed,
            (CommandState::Unlocked2, 0xAAA, 0x80) => CommandState::EraseSetup,
            (CommandState::Unlocked2, 0xAAA, 0x90) => CommandState::Autoselect,
            (CommandState::EraseSetup, 0xAAA, 0xAA) => CommandState::EraseUnlocked1,
            (CommandState::EraseUnlocked1, 0x555, 0x55) => CommandState::EraseUnlocked2,
            (CommandState::EraseUnlocked2, 0xAAA, 0x10) => {
                self.start_erase(Erase::Chip, now_us);
                CommandState::ReadArray
            }
            (CommandState::EraseUnlocked2, _, 0x30) => {
                let sector = self.sector_of(addr);
                self.start_erase(Erase::Sector(sector), now_us);
                CommandState::ReadArray
            }
            (state, _, _) => {
                if state != CommandState::ReadArray {
                    self.rejected_sequences += 1;
                    log::trace!(
                        "sequence broken in {:?} by 0x{:02X}@0x{:05X}",
                        state,
                        data,
                        addr
                    );
                }
                CommandState::ReadArray
            }
        };
    }

    fn program(&mut self, addr: u32, data: u8, now_us: u64) {
        if self.is_protected(addr) {
            log::trace!("program 0x{:05X} ignored: sector protected", addr);
            return;
        }
        let offset = self.offset(addr);
        // Programming can only clear bits
        self.memory[offset] &= data;
        self.busy_until = now_us + self.config.program_time_us;
    }

    fn start_erase(&mut self, kind: Erase, now_us: u64) {
        let done_at = self.config.erase_time_us.map(|t| now_us + t);
        log::debug!("erase {:?} started at {} us", kind, now_us);
        self.erase = Some((kind, done_at));
    }

    /// Value driven while CE# and OE# are low
    pub fn bus_read(&mut self, addr: u32, now_us: u64) -> u8 {
        if !self.is_ready(now_us) {
            // DQ7 inverted, DQ6 toggling, DQ3 set during erase
            self.toggle = !self.toggle;
            let toggle = if self.toggle { 0x40 } else { 0x00 };
            let erase = if self.erase.is_some() { 0x08 } else { 0x00 };
            return toggle | erase;
        }

        match self.state {
            CommandState::Autoselect => match addr & 0xFF {
                0x00 => self.config.manufacturer_id,
                0x02 => self.config.device_id,
                0x04 => self.is_protected(addr) as u8,
                _ => 0x00,
            },
            _ => self.memory[self.offset(addr)],
        }
    }
}

impl Default for EmulatedChip {
    fn default() -> Self {
        Self::new(ChipConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program(chip: &mut EmulatedChip, addr: u32, data: u8, now: u64) {
        chip.bus_write(0xAAA, 0xAA, now);
        chip.bus_write(0x555, 0x55, now);
        chip.bus_write(0xAAA, 0xA0, now);
        chip.bus_write(addr, data, now);
    }

    #[test]
    fn test_program_clears_bits_only() {
        let mut chip = EmulatedChip::default();
        program(&mut chip, 0x100, 0x0F, 0);
        assert!(!chip.is_ready(3));
        assert!(chip.is_ready(10));
        program(&mut chip, 0x100, 0xF3, 10);
        assert_eq!(chip.bus_read(0x100, 100), 0x03);
    }

    #[test]
    fn test_write_while_busy_is_ignored() {
        let mut chip = EmulatedChip::default();
        program(&mut chip, 0x0, 0x00, 0);
        program(&mut chip, 0x1, 0x00, 1);
        assert_eq!(chip.writes_while_busy(), 4);
        assert_eq!(chip.memory()[1], 0xFF);
    }

    #[test]
    fn test_autoselect_reads_ids() {
        let mut chip = EmulatedChip::default();
        chip.protect_sector(0x2_0000);
        chip.bus_write(0xAAA, 0xAA, 0);
        chip.bus_write(0x1555, 0x55, 0);
        chip.bus_write(0xAAA, 0x90, 0);
        assert_eq!(chip.bus_read(0x00, 0), 0x04);
        assert_eq!(chip.bus_read(0x02, 0), 0xD6);
        assert_eq!(chip.bus_read(0x2_0004, 0), 0x01);
        assert_eq!(chip.bus_read(0x1_0004, 0), 0x00);
        chip.bus_write(0x0F, 0xF0, 0);
        assert_eq!(chip.bus_read(0x00, 0), 0xFF);
    }

    #[test]
    fn test_sector_erase_skips_protected() {
        let mut chip = EmulatedChip::default();
        chip.memory_mut().fill(0x00);
        chip.protect_sector(0x1_0000);
        for sector in [0x0_0000, 0x1_0000] {
            chip.bus_write(0xAAA, 0xAA, 0);
            chip.bus_write(0x555, 0x55, 0);
            chip.bus_write(0xAAA, 0x80, 0);
            chip.bus_write(0xAAA, 0xAA, 0);
            chip.bus_write(0x555, 0x55, 0);
            chip.bus_write(sector, 0x30, 0);
            assert_ne!(chip.bus_read(sector, 1), 0xFF);
            assert!(chip.is_ready(300_000));
        }
        assert_eq!(chip.memory()[0xFFFF], 0xFF);
        assert_eq!(chip.memory()[0x1_0000], 0x00);
    }
}
