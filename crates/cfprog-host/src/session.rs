//! Host session driver
//!
//! A [`Session`] drives one programmer over a [`Link`]: it primes the bus
//! with setup commands, streams data in 64-byte blocks and polls the
//! device status until each block (or erase) completes.

use cfprog_icd::{Command, SetupMode, Status, ADDRESS_MASK, GET_DATA_LEN, IO_CHUNK};

use crate::error::{HostError, Result};
use crate::link::Link;
use crate::poll::{PollPolicy, SessionConfig};

/// Size of the flash address space
pub const FLASH_SIZE: usize = ADDRESS_MASK as usize + 1;

/// Manufacturer and device ID read in autoselect mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChipId {
    /// JEDEC manufacturer ID
    pub manufacturer: u8,
    /// Device ID
    pub device: u8,
}

impl ChipId {
    /// Known manufacturer name
    pub fn manufacturer_name(&self) -> Option<&'static str> {
        let name = match self.manufacturer {
            0x01 => "AMD/Spansion",
            0x04 => "Fujitsu",
            0x1C => "EON",
            0x1F => "Atmel",
            0x20 => "ST",
            0x37 => "AMIC",
            0x89 => "Intel",
            0x97 => "Texas Instruments",
            0xAD => "Hyundai",
            0xBF => "SST",
            0xC2 => "Macronix",
            0xDA => "Winbond",
            _ => return None,
        };
        Some(name)
    }
}

/// Open session with a programmer
pub struct Session<L> {
    link: L,
    config: SessionConfig,
    last_command: Option<Command>,
    buffer: [u8; IO_CHUNK],
}

fn check_range(start: u32, len: usize) -> Result<()> {
    if start as usize + len > FLASH_SIZE {
        return Err(HostError::OutOfRange { start, len });
    }
    Ok(())
}

impl<L: Link> Session<L> {
    /// Start a session with default timing
    pub fn new(link: L) -> Self {
        Self::with_config(link, SessionConfig::default())
    }

    /// Start a session with custom timing
    pub fn with_config(link: L, config: SessionConfig) -> Self {
        Self {
            link,
            config,
            last_command: None,
            buffer: [0; IO_CHUNK],
        }
    }

    /// Underlying link
    pub fn link(&self) -> &L {
        &self.link
    }

    /// End the session and return the link
    pub fn into_link(self) -> L {
        self.link
    }

    /// Last command sent to the device
    pub fn last_command(&self) -> Option<Command> {
        self.last_command
    }

    fn send(&mut self, command: Command, data: &[u8]) -> Result<()> {
        let request = command.encode();
        log::trace!("-> {:?} ({:?})", command, request);
        self.last_command = Some(command);
        self.link.control_out(&request, data)
    }

    /// Read the device's data and status bytes
    pub fn get_data(&mut self) -> Result<(u8, Status)> {
        let mut resp = [0u8; GET_DATA_LEN];
        let len = self.link.control_in(&Command::GetData.encode(), &mut resp)?;
        if len != GET_DATA_LEN {
            return Err(HostError::ShortTransfer {
                expected: GET_DATA_LEN,
                got: len,
            });
        }
        let status = Status::from_u8(resp[1]).ok_or(HostError::InvalidStatus(resp[1]))?;
        log::trace!("<- data 0x{:02X} status {}", resp[0], status);
        Ok((resp[0], status))
    }

    /// Poll the status until the device is no longer busy
    ///
    /// Returns the data byte published alongside the final status.
    fn wait_idle(&mut self, policy: PollPolicy) -> Result<(u8, Status)> {
        self.link.pause(policy.initial_delay);
        for poll in 1..=policy.max_polls {
            let (data, status) = self.get_data()?;
            if !status.is_busy() {
                return Ok((data, status));
            }
            if poll != policy.max_polls {
                self.link.pause(policy.interval);
            }
        }
        Err(HostError::PollExhausted {
            polls: policy.max_polls,
        })
    }

    /// Send a setup command
    pub fn setup(&mut self, mode: SetupMode, addr: u32) -> Result<()> {
        self.send(Command::Setup { mode, addr }, &[])
    }

    /// Load the control register with a raw value
    pub fn set_control(&mut self, value: u8) -> Result<()> {
        self.send(Command::SetControl(value), &[])
    }

    /// Put a 20-bit address on the bus
    pub fn set_address(&mut self, addr: u32) -> Result<()> {
        self.send(Command::SetAddress(addr & ADDRESS_MASK), &[])
    }

    /// Drive a byte on the data bus
    pub fn set_data(&mut self, value: u8) -> Result<()> {
        self.send(Command::SetData(value), &[])
    }

    fn query(&mut self, mode: SetupMode, addr: u32) -> Result<u8> {
        self.setup(mode, addr)?;
        let (data, _) = self.wait_idle(self.config.query)?;
        Ok(data)
    }

    /// Read the manufacturer and device IDs
    pub fn identify(&mut self) -> Result<ChipId> {
        let manufacturer = self.query(SetupMode::ManufacturerId, 0)?;
        let device = self.query(SetupMode::DeviceId, 0)?;
        self.setup(SetupMode::Ready, 0)?;

        let id = ChipId {
            manufacturer,
            device,
        };
        log::debug!("Chip ID: {:?}", id);
        Ok(id)
    }

    /// Check whether the sector at `addr` is protected
    pub fn sector_protection(&mut self, addr: u32) -> Result<bool> {
        check_range(addr, 1)?;
        let raw = self.query(SetupMode::SectorProtection, addr)?;
        self.setup(SetupMode::Ready, 0)?;
        log::debug!("Sector 0x{:05X} protection byte: 0x{:02X}", addr, raw);
        Ok(raw & 0x01 != 0)
    }

    /// Program `data` starting at `start`
    ///
    /// The flash must be erased. A short final block is padded with 0xFF.
    /// The first failing block aborts the write; the bus is returned to
    /// idle in every case.
    pub fn write_all(
        &mut self,
        start: u32,
        data: &[u8],
        slow: bool,
        mut progress: impl FnMut(usize),
    ) -> Result<()> {
        check_range(start, data.len())?;

        self.setup(SetupMode::BeginWrite, 0)?;
        self.link.pause(self.config.setup_delay);

        let result = self.write_blocks(start, data, slow, &mut progress);
        let ready = self.setup(SetupMode::Ready, 0);
        result.and(ready)
    }

    fn write_blocks(
        &mut self,
        start: u32,
        data: &[u8],
        slow: bool,
        progress: &mut impl FnMut(usize),
    ) -> Result<()> {
        let mut block = [0xFFu8; IO_CHUNK];
        for (i, chunk) in data.chunks(IO_CHUNK).enumerate() {
            let offset = i * IO_CHUNK;
            block.fill(0xFF);
            block[..chunk.len()].copy_from_slice(chunk);

            self.send(
                Command::Write {
                    addr: start + offset as u32,
                    slow,
                },
                &block,
            )?;
            match self.wait_idle(self.config.write)?.1 {
                Status::ProgramFailed => {
                    log::error!("Write failed at 0x{:05X}", start as usize + offset);
                    return Err(HostError::ProgramFailed { offset });
                }
                status => log::trace!("block 0x{:05X}: {}", start as usize + offset, status),
            }
            progress(offset + chunk.len());
        }
        Ok(())
    }

    /// Read `out.len()` bytes starting at `start`
    pub fn read(
        &mut self,
        start: u32,
        out: &mut [u8],
        mut progress: impl FnMut(usize),
    ) -> Result<()> {
        check_range(start, out.len())?;

        self.setup(SetupMode::BeginRead, 0)?;
        self.link.pause(self.config.setup_delay);

        let result = self.read_blocks(start, out, &mut progress);
        let ready = self.setup(SetupMode::Ready, 0);
        result.and(ready)
    }

    fn read_blocks(
        &mut self,
        start: u32,
        out: &mut [u8],
        progress: &mut impl FnMut(usize),
    ) -> Result<()> {
        let mut done = 0;
        for (i, chunk) in out.chunks_mut(IO_CHUNK).enumerate() {
            let addr = start + (i * IO_CHUNK) as u32;
            self.send(Command::ReadArm { addr }, &[])?;
            self.wait_idle(self.config.read)?;

            let len = self
                .link
                .control_in(&Command::ReadFetch.encode(), &mut self.buffer)?;
            if len != IO_CHUNK {
                return Err(HostError::ShortTransfer {
                    expected: IO_CHUNK,
                    got: len,
                });
            }
            log::trace!("0x{:05X}: {:02X?}", addr, self.buffer);

            chunk.copy_from_slice(&self.buffer[..chunk.len()]);
            done += chunk.len();
            progress(done);
        }
        Ok(())
    }

    fn erase(&mut self, mode: SetupMode, addr: u32) -> Result<()> {
        self.setup(mode, addr)?;
        match self.wait_idle(self.config.erase)?.1 {
            Status::EraseFailed => Err(HostError::EraseFailed),
            _ => Ok(()),
        }
    }

    /// Erase the whole chip
    pub fn erase_chip(&mut self) -> Result<()> {
        log::info!("Erasing full chip");
        self.erase(SetupMode::ChipErase, 0)
    }

    /// Erase the sector starting at `addr`
    pub fn erase_sector(&mut self, addr: u32) -> Result<()> {
        check_range(addr, 1)?;
        log::info!("Erasing sector at 0x{:05X}", addr);
        self.erase(SetupMode::SectorErase, addr)
    }

    /// Reboot the programmer into its ROM bootloader
    ///
    /// The device drops off the bus, so a lost reply is not an error.
    pub fn jump_to_bootloader(mut self) -> Result<()> {
        match self.send(Command::Bootloader, &[]) {
            Ok(()) | Err(HostError::Disconnected) | Err(HostError::Timeout) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cfprog_icd::{Opcode, Request, READ_FETCH};
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Link that records requests and replays scripted status bytes
    #[derive(Default)]
    struct ScriptedLink {
        sent: Vec<(Request, Vec<u8>)>,
        statuses: VecDeque<u8>,
        data: u8,
        disconnect_on_send: bool,
        paused: Duration,
    }

    impl ScriptedLink {
        fn commands(&self) -> Vec<Command> {
            self.sent
                .iter()
                .map(|(req, _)| Command::decode(req).unwrap())
                .collect()
        }
    }

    impl Link for ScriptedLink {
        fn control_out(&mut self, request: &Request, data: &[u8]) -> Result<()> {
            if self.disconnect_on_send {
                return Err(HostError::Disconnected);
            }
            self.sent.push((*request, data.to_vec()));
            Ok(())
        }

        fn control_in(&mut self, request: &Request, buf: &mut [u8]) -> Result<usize> {
            if request.request == Opcode::GetData as u8 {
                let status = self.statuses.pop_front().unwrap_or(0);
                let busy = Status::from_u8(status).is_some_and(|s| s.is_busy());
                // Data from the previous command until the device is done
                buf[0] = if busy { !self.data } else { self.data };
                buf[1] = status;
                Ok(2)
            } else if request.request == READ_FETCH {
                let addr = match self.sent.last() {
                    Some((req, _)) => req.value,
                    None => 0,
                };
                for (i, b) in buf.iter_mut().enumerate() {
                    *b = (addr as usize + i) as u8;
                }
                Ok(buf.len())
            } else {
                Err(HostError::Rejected(request.request))
            }
        }

        fn pause(&mut self, duration: Duration) {
            self.paused += duration;
        }
    }

    #[test]
    fn test_write_pads_last_block_and_restores_bus() {
        let mut session = Session::new(ScriptedLink::default());
        let data: Vec<u8> = (0..100u8).collect();
        let mut reported = Vec::new();
        session
            .write_all(0x100, &data, false, |n| reported.push(n))
            .unwrap();
        assert_eq!(reported, vec![64, 100]);

        let link = session.into_link();
        let cmds = link.commands();
        assert_eq!(
            cmds.first(),
            Some(&Command::Setup {
                mode: SetupMode::BeginWrite,
                addr: 0
            })
        );
        assert_eq!(
            cmds[1],
            Command::Write {
                addr: 0x100,
                slow: false
            }
        );
        assert_eq!(
            cmds[2],
            Command::Write {
                addr: 0x140,
                slow: false
            }
        );
        assert_eq!(
            cmds.last(),
            Some(&Command::Setup {
                mode: SetupMode::Ready,
                addr: 0
            })
        );

        let last_block = &link.sent[2].1;
        assert_eq!(&last_block[..36], &data[64..]);
        assert!(last_block[36..].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_write_failure_aborts_and_reports_offset() {
        let link = ScriptedLink {
            // first block ok after one busy poll, second block fails
            statuses: VecDeque::from(vec![3, 0, 4]),
            ..Default::default()
        };
        let mut session = Session::new(link);
        let err = session
            .write_all(0, &[0u8; 256], true, |_| {})
            .unwrap_err();
        assert!(matches!(err, HostError::ProgramFailed { offset: 64 }));

        let cmds = session.into_link().commands();
        let writes = cmds
            .iter()
            .filter(|c| matches!(c, Command::Write { .. }))
            .count();
        assert_eq!(writes, 2);
        assert_eq!(
            cmds.last(),
            Some(&Command::Setup {
                mode: SetupMode::Ready,
                addr: 0
            })
        );
    }

    #[test]
    fn test_poll_budget_is_bounded() {
        let link = ScriptedLink {
            statuses: VecDeque::from(vec![1; 100]),
            ..Default::default()
        };
        let mut config = SessionConfig::default();
        config.erase.max_polls = 5;
        let mut session = Session::with_config(link, config);
        let err = session.erase_chip().unwrap_err();
        assert!(matches!(err, HostError::PollExhausted { polls: 5 }));
        assert_eq!(session.link().paused, config.erase.budget());
    }

    #[test]
    fn test_erase_failure() {
        let link = ScriptedLink {
            statuses: VecDeque::from(vec![1, 1, 2]),
            ..Default::default()
        };
        let mut session = Session::new(link);
        assert!(matches!(
            session.erase_sector(0x1_0000),
            Err(HostError::EraseFailed)
        ));
        assert_eq!(
            session.last_command(),
            Some(Command::Setup {
                mode: SetupMode::SectorErase,
                addr: 0x1_0000
            })
        );
    }

    #[test]
    fn test_read_partial_last_block() {
        let mut session = Session::new(ScriptedLink::default());
        let mut out = vec![0u8; 80];
        session.read(0x40, &mut out, |_| {}).unwrap();
        assert_eq!(out[0], 0x40);
        assert_eq!(out[63], 0x7F);
        assert_eq!(out[64], 0x80);
        assert_eq!(out[79], 0x8F);
    }

    #[test]
    fn test_identify() {
        let link = ScriptedLink {
            data: 0x04,
            ..Default::default()
        };
        let mut session = Session::new(link);
        let id = session.identify().unwrap();
        assert_eq!(id.manufacturer, 0x04);
        assert_eq!(id.manufacturer_name(), Some("Fujitsu"));
    }

    #[test]
    fn test_query_waits_for_published_result() {
        let link = ScriptedLink {
            data: 0x04,
            statuses: VecDeque::from(vec![5, 5, 0, 5, 0]),
            ..Default::default()
        };
        let mut session = Session::new(link);
        let id = session.identify().unwrap();
        assert_eq!(id.manufacturer, 0x04);
        assert_eq!(id.device, 0x04);
        assert!(session.link().statuses.is_empty());
    }

    #[test]
    fn test_out_of_range() {
        let mut session = Session::new(ScriptedLink::default());
        let err = session
            .write_all(0xF_FFC0, &[0u8; 128], false, |_| {})
            .unwrap_err();
        assert!(matches!(err, HostError::OutOfRange { .. }));
        assert!(session.link().sent.is_empty());
    }

    #[test]
    fn test_bootloader_tolerates_disconnect() {
        let link = ScriptedLink {
            disconnect_on_send: true,
            ..Default::default()
        };
        assert!(Session::new(link).jump_to_bootloader().is_ok());
    }

    #[test]
    fn test_invalid_status_byte() {
        let link = ScriptedLink {
            statuses: VecDeque::from(vec![0x50]),
            ..Default::default()
        };
        let mut session = Session::new(link);
        assert!(matches!(
            session.get_data(),
            Err(HostError::InvalidStatus(0x50))
        ));
    }
}
