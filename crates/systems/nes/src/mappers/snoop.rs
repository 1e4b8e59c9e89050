//! PPU address bus snooping for per-8x8 attributes.
//!
//! The board has no dedicated attribute memory. It watches PPU A13 on every
//! fetch and keeps a three-deep delay line of it. During rendering the PPU
//! fetches NT, AT, PT low, PT high for each tile, so an A13-high fetch whose
//! two-and-three-back samples were both low is the attribute fetch following
//! a nametable fetch. Both samples high is the dummy double-NT fetch at the
//! end of a scanline and is routed the same way.
//!
//! Attribute bytes are then served from CHR RAM, indexed by the fine X/Y bits
//! captured from the preceding nametable fetch.

use serde::{Deserialize, Serialize};

/// Offset of the attribute block inside each 4KB CHR RAM window
const ATTRIBUTE_BASE: u16 = 0x0FC0;

/// Where a snooped PPU fetch is served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VramFetch {
    /// Console CIRAM at the unmodified PPU address
    Nametable(u16),
    /// CHR RAM at a synthesized attribute address
    Attribute(u16),
    /// CHR RAM at a remapped pattern address
    Pattern(u16),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoSnoop {
    // A13 delay line: one, two and three fetches back
    a13_d: bool,
    a13_dd: bool,
    a13_ddd: bool,
    attribute_fine_x: u8,
    attribute_fine_y: u8,
    chr_a12: bool,
    chr_a13: bool,
    a14: bool,
    swap_spr_nt: bool,
}

impl VideoSnoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latch the remap lines from a $8000-$BFFF register value.
    pub fn configure(&mut self, value: u8) {
        self.chr_a12 = value & 0x01 != 0;
        self.chr_a13 = value & 0x02 != 0;
        self.a14 = value & 0x04 != 0;
        self.swap_spr_nt = value & 0x10 != 0;
    }

    pub fn a14(&self) -> bool {
        self.a14
    }

    /// A13 history as (one back, two back, three back)
    pub fn history(&self) -> (bool, bool, bool) {
        (self.a13_d, self.a13_dd, self.a13_ddd)
    }

    /// Would an A13-high fetch right now be treated as an attribute fetch?
    pub fn expects_attribute(&self) -> bool {
        let normal = !self.a13_ddd && !self.a13_dd;
        let dummy = self.a13_ddd && self.a13_dd;
        normal || dummy
    }

    /// Classify one read fetch and advance the delay line.
    ///
    /// Must be called for every PPU read fetch, in bus order.
    pub fn observe(&mut self, addr: u16) -> VramFetch {
        let addr = addr & 0x3FFF;
        let ppu_a13 = addr & 0x2000 != 0;
        let ppu_a12 = addr & 0x1000 != 0;
        let spr_or_nt_fetch = ppu_a12 || ppu_a13;

        let vram_a12 = !spr_or_nt_fetch && self.chr_a12;
        let vram_a13 = if spr_or_nt_fetch {
            self.swap_spr_nt
        } else {
            self.chr_a13
        };
        let vram_a14 = if spr_or_nt_fetch { !self.a14 } else { self.a14 };
        let at_read = ppu_a13 && self.expects_attribute();

        let fetch = if ppu_a13 && !at_read {
            self.attribute_fine_x = (addr & 1) as u8;
            self.attribute_fine_y = ((addr >> 5) & 1) as u8;
            VramFetch::Nametable(addr)
        } else if at_read {
            let n_a14 = !self.a14 as u16;
            VramFetch::Attribute(
                (n_a14 << 14)
                    | ((self.attribute_fine_y as u16) << 13)
                    | ((self.attribute_fine_x as u16) << 12)
                    | (addr & 0x3F)
                    | ATTRIBUTE_BASE,
            )
        } else {
            VramFetch::Pattern(
                ((vram_a14 as u16) << 14)
                    | ((vram_a13 as u16) << 13)
                    | ((vram_a12 as u16) << 12)
                    | (addr & 0x0FFF),
            )
        };

        self.a13_ddd = self.a13_dd;
        self.a13_dd = self.a13_d;
        self.a13_d = ppu_a13;

        fetch
    }
}
