//! NES cartridge hardware for a homebrew flash board.
//!
//! The board pairs an SST39SF040 PRG flash with 32KB of CHR RAM. It snoops
//! the PPU address bus to serve one attribute byte per 8x8 tile, and saves
//! by reprogramming its own flash, persisted as a patch against the
//! pristine PRG image.

mod cartridge;
pub mod flash;
pub mod mappers;
pub mod persist;

pub use cartridge::{Cartridge, Mirroring};
pub use mappers::{FlashCart, MapperError, VramAccess};
pub use persist::{FlashCartConfig, PatchPersistence};
