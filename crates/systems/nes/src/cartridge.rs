use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mirroring {
    Horizontal,
    Vertical,
    FourScreen,
    /// Single-screen, CIRAM page A
    SingleScreenLower,
    /// Single-screen, CIRAM page B
    SingleScreenUpper,
}

impl Mirroring {
    /// Header mirroring from iNES flags 6:
    /// bit 0 = mirroring (0 horizontal, 1 vertical), bit 3 = four-screen VRAM
    pub fn from_flags6(flags6: u8) -> Self {
        if flags6 & 0x08 != 0 {
            Mirroring::FourScreen
        } else if flags6 & 0x01 != 0 {
            Mirroring::Vertical
        } else {
            Mirroring::Horizontal
        }
    }

    pub fn is_single_screen(self) -> bool {
        matches!(
            self,
            Mirroring::SingleScreenLower | Mirroring::SingleScreenUpper
        )
    }
}

/// Cartridge contents as handed over by the ROM container loader.
#[derive(Debug, Clone)]
pub struct Cartridge {
    pub prg_rom: Vec<u8>,
    pub chr_rom: Vec<u8>,
    /// Raw iNES flags 6; some boards reinterpret the mirroring bits.
    pub flags6: u8,
    pub mirroring: Mirroring,
}

impl Cartridge {
    pub fn new(prg_rom: Vec<u8>, chr_rom: Vec<u8>, flags6: u8) -> Self {
        Self {
            prg_rom,
            chr_rom,
            flags6,
            mirroring: Mirroring::from_flags6(flags6),
        }
    }

    pub fn has_battery(&self) -> bool {
        self.flags6 & 0x02 != 0
    }
}
