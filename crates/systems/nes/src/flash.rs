//! SST39SF040 flash chip (512 KB, 4 KB sectors).
//!
//! The chip sits directly on the cartridge's PRG bus, so programming and
//! erasing mutate the live PRG image. The image is passed in on each write
//! instead of being owned here; the mapper keeps sole ownership of it.
//!
//! # Command protocol
//! - Unlock: `$5555=AA`, `$2AAA=55`, then a command byte at `$5555`
//! - `A0`: program the next written byte (bits can only go 1 -> 0)
//! - `80`: erase; needs a second unlock, then `$5555=10` (chip) or `SA=30` (sector)
//! - `90`: software ID entry, `F0`: software ID exit / reset

use cart_core::logging::{log, LogCategory, LogLevel};
use serde::{Deserialize, Serialize};

const SECTOR_SIZE: usize = 0x1000;
const SECTOR_MASK: u32 = 0x7F000;
const MANUFACTURER_ID: u8 = 0xBF;
const DEVICE_ID: u8 = 0xB7;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlashMode {
    #[default]
    WaitingForCommand,
    Program,
    Erase,
}

/// Command sequencer state; this is everything a save state needs.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashState {
    pub mode: FlashMode,
    pub cycle: u8,
    pub software_id: bool,
}

#[derive(Debug, Default, Clone)]
pub struct FlashChip {
    state: FlashState,
}

impl FlashChip {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> FlashState {
        self.state
    }

    pub fn restore(&mut self, state: FlashState) {
        self.state = state;
    }

    /// `Some` while the chip overrides the bus (software ID mode),
    /// `None` when the read should fall through to the PRG image.
    pub fn read(&self, addr: u32) -> Option<u8> {
        if !self.state.software_id {
            return None;
        }
        Some(match addr & 0x1FF {
            0x00 => MANUFACTURER_ID,
            0x01 => DEVICE_ID,
            _ => 0xFF,
        })
    }

    fn reset_sequence(&mut self) {
        self.state.mode = FlashMode::WaitingForCommand;
        self.state.cycle = 0;
    }

    pub fn write(&mut self, addr: u32, value: u8, data: &mut [u8]) {
        let cmd = addr & 0x7FFF;
        match self.state.mode {
            FlashMode::WaitingForCommand => self.write_command(cmd, value),
            FlashMode::Program => {
                if let Some(byte) = data.get_mut(addr as usize) {
                    *byte &= value;
                    log(LogCategory::Flash, LogLevel::Trace, || {
                        format!("Flash: program {:06X} <- {:02X}", addr, value)
                    });
                }
                self.reset_sequence();
            }
            FlashMode::Erase => self.write_erase(addr, cmd, value, data),
        }
    }

    fn write_command(&mut self, cmd: u32, value: u8) {
        match (self.state.cycle, cmd, value) {
            (0, 0x5555, 0xAA) => self.state.cycle = 1,
            (0, _, 0xF0) => {
                self.reset_sequence();
                self.state.software_id = false;
            }
            (1, 0x2AAA, 0x55) => self.state.cycle = 2,
            (2, 0x5555, _) => {
                self.state.cycle = 3;
                match value {
                    0x80 => self.state.mode = FlashMode::Erase,
                    0xA0 => self.state.mode = FlashMode::Program,
                    0x90 => {
                        self.reset_sequence();
                        self.state.software_id = true;
                    }
                    0xF0 => {
                        self.reset_sequence();
                        self.state.software_id = false;
                    }
                    _ => {}
                }
                log(LogCategory::Flash, LogLevel::Debug, || {
                    format!("Flash: command {:02X}", value)
                });
            }
            _ => self.state.cycle = 0,
        }
    }

    fn write_erase(&mut self, addr: u32, cmd: u32, value: u8, data: &mut [u8]) {
        match (self.state.cycle, cmd, value) {
            (3, 0x5555, 0xAA) => self.state.cycle = 4,
            (4, 0x2AAA, 0x55) => self.state.cycle = 5,
            (5, 0x5555, 0x10) => {
                data.fill(0xFF);
                log(LogCategory::Flash, LogLevel::Debug, || {
                    "Flash: chip erase".to_string()
                });
                self.reset_sequence();
            }
            (5, _, 0x30) => {
                let offset = (addr & SECTOR_MASK) as usize;
                if let Some(sector) = data.get_mut(offset..offset + SECTOR_SIZE) {
                    sector.fill(0xFF);
                    log(LogCategory::Flash, LogLevel::Debug, || {
                        format!("Flash: sector erase {:05X}", offset)
                    });
                }
                self.reset_sequence();
            }
            _ => self.reset_sequence(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unlock(flash: &mut FlashChip, data: &mut [u8], command: u8) {
        flash.write(0x5555, 0xAA, data);
        flash.write(0x2AAA, 0x55, data);
        flash.write(0x5555, command, data);
    }

    #[test]
    fn program_clears_bits_only() {
        let mut data = vec![0xFFu8; 0x8000];
        data[0x10] = 0x0F;
        let mut flash = FlashChip::new();

        unlock(&mut flash, &mut data, 0xA0);
        flash.write(0x0010, 0xF1, &mut data);
        assert_eq!(data[0x10], 0x01);
        assert_eq!(flash.state().mode, FlashMode::WaitingForCommand);

        // Plain writes outside a sequence never touch the array
        flash.write(0x0011, 0x00, &mut data);
        assert_eq!(data[0x11], 0xFF);
    }

    #[test]
    fn sector_erase_fills_one_sector() {
        let mut data = vec![0u8; 0x8000];
        let mut flash = FlashChip::new();

        unlock(&mut flash, &mut data, 0x80);
        flash.write(0x5555, 0xAA, &mut data);
        flash.write(0x2AAA, 0x55, &mut data);
        flash.write(0x3456, 0x30, &mut data);

        assert!(data[0x3000..0x4000].iter().all(|&b| b == 0xFF));
        assert_eq!(data[0x2FFF], 0);
        assert_eq!(data[0x4000], 0);
    }

    #[test]
    fn chip_erase_fills_everything() {
        let mut data = vec![0u8; 0x8000];
        let mut flash = FlashChip::new();

        unlock(&mut flash, &mut data, 0x80);
        flash.write(0x5555, 0xAA, &mut data);
        flash.write(0x2AAA, 0x55, &mut data);
        flash.write(0x5555, 0x10, &mut data);

        assert!(data.iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn broken_erase_sequence_aborts() {
        let mut data = vec![0u8; 0x8000];
        let mut flash = FlashChip::new();

        unlock(&mut flash, &mut data, 0x80);
        flash.write(0x1234, 0xAA, &mut data);
        assert_eq!(flash.state(), FlashState::default());
        assert!(data.iter().all(|&b| b == 0));
    }

    #[test]
    fn software_id_overrides_reads() {
        let mut data = vec![0u8; 0x8000];
        let mut flash = FlashChip::new();
        assert_eq!(flash.read(0x8000), None);

        unlock(&mut flash, &mut data, 0x90);
        assert_eq!(flash.read(0x8000), Some(0xBF));
        assert_eq!(flash.read(0x8001), Some(0xB7));
        assert_eq!(flash.read(0x8002), Some(0xFF));

        flash.write(0x0000, 0xF0, &mut data);
        assert_eq!(flash.read(0x8000), None);
    }

    #[test]
    fn program_past_end_is_ignored() {
        let mut data = vec![0xFFu8; 0x4000];
        let mut flash = FlashChip::new();
        unlock(&mut flash, &mut data, 0xA0);
        flash.write(0x7_0000, 0x00, &mut data);
        assert!(data.iter().all(|&b| b == 0xFF));
    }
}
