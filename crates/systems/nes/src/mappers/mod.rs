//! Cartridge board implementations
//!
//! Generic page-table mechanics live in `banking`; boards layer their own
//! register decoding and bus tricks on top.

mod banking;
mod flash_cart;
mod snoop;

pub use banking::{BankedMemory, PageMapping, CHR_PAGE_SIZE, PRG_PAGE_SIZE};
pub use flash_cart::FlashCart;
pub use snoop::{VideoSnoop, VramFetch};

/// How the PPU is touching VRAM on a given access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VramAccess {
    /// Background or sprite fetch while rendering
    RenderingRead,
    /// CPU-initiated read through $2007
    Read,
    /// Dummy or non-read access; bypasses the board's snoop logic
    Other,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum MapperError {
    #[error("PRG ROM size {0:#X} is not a non-zero multiple of 16KB")]
    InvalidPrgSize(usize),
}
