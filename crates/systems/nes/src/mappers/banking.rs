use crate::cartridge::Mirroring;

pub const PRG_PAGE_SIZE: usize = 0x4000;
pub const CHR_PAGE_SIZE: usize = 0x1000;

/// Generic page-table mechanics a board builds its own decoding on top of.
pub trait PageMapping {
    /// Map 16KB PRG `page` into CPU slot 0 ($8000) or 1 ($C000)
    fn select_prg_page(&mut self, slot: usize, page: usize);
    /// Map 4KB CHR `page` into PPU slot 0 ($0000) or 1 ($1000)
    fn select_chr_page(&mut self, slot: usize, page: usize);
    fn mirroring(&self) -> Mirroring;
    fn set_mirroring(&mut self, mirroring: Mirroring);
    fn read_prg(&self, addr: u16) -> u8;
    /// Plain PPU read through the page table and nametable mirroring
    fn read_vram(&self, addr: u16) -> u8;
    fn write_vram(&mut self, addr: u16, value: u8);
}

/// PRG ROM + CHR RAM + CIRAM with 2 PRG and 2 CHR slots.
#[derive(Debug)]
pub struct BankedMemory {
    prg_rom: Vec<u8>,
    chr_ram: Vec<u8>,
    /// 2KB on the console; the upper half only exists on four-screen boards.
    ciram: [u8; 0x1000],
    prg_pages: [usize; 2],
    chr_pages: [usize; 2],
    mirroring: Mirroring,
}

impl BankedMemory {
    pub fn new(prg_rom: Vec<u8>, chr_ram_size: usize, mirroring: Mirroring) -> Self {
        Self {
            prg_rom,
            chr_ram: vec![0; chr_ram_size.max(CHR_PAGE_SIZE)],
            ciram: [0; 0x1000],
            prg_pages: [0; 2],
            chr_pages: [0; 2],
            mirroring,
        }
    }

    pub fn prg_page_count(&self) -> usize {
        std::cmp::max(1, self.prg_rom.len() / PRG_PAGE_SIZE)
    }

    fn chr_page_count(&self) -> usize {
        std::cmp::max(1, self.chr_ram.len() / CHR_PAGE_SIZE)
    }

    pub fn prg_rom(&self) -> &[u8] {
        &self.prg_rom
    }

    /// Mutable view; a slice so the image can never change length.
    pub fn prg_rom_mut(&mut self) -> &mut [u8] {
        &mut self.prg_rom
    }

    pub fn chr_ram(&self) -> &[u8] {
        &self.chr_ram
    }

    pub fn chr_ram_mut(&mut self) -> &mut [u8] {
        &mut self.chr_ram
    }

    pub fn prg_pages(&self) -> [usize; 2] {
        self.prg_pages
    }

    pub fn chr_pages(&self) -> [usize; 2] {
        self.chr_pages
    }

    fn map_nametable_addr(&self, addr: u16) -> usize {
        let a = addr & 0x0FFF;
        let table = (a / 0x0400) as usize;
        let offset = (a % 0x0400) as usize;

        let physical_table = match self.mirroring {
            Mirroring::Vertical => table & 1,
            Mirroring::Horizontal => table >> 1,
            Mirroring::SingleScreenLower => 0,
            Mirroring::SingleScreenUpper => 1,
            Mirroring::FourScreen => table,
        };

        physical_table * 0x0400 + offset
    }

    fn map_chr_addr(&self, addr: u16) -> usize {
        let slot = ((addr >> 12) & 1) as usize;
        self.chr_pages[slot] * CHR_PAGE_SIZE + (addr as usize & 0x0FFF)
    }
}

impl PageMapping for BankedMemory {
    fn select_prg_page(&mut self, slot: usize, page: usize) {
        self.prg_pages[slot & 1] = page % self.prg_page_count();
    }

    fn select_chr_page(&mut self, slot: usize, page: usize) {
        self.chr_pages[slot & 1] = page % self.chr_page_count();
    }

    fn mirroring(&self) -> Mirroring {
        self.mirroring
    }

    fn set_mirroring(&mut self, mirroring: Mirroring) {
        self.mirroring = mirroring;
    }

    fn read_prg(&self, addr: u16) -> u8 {
        if addr < 0x8000 {
            return 0;
        }
        let slot = ((addr - 0x8000) as usize) / PRG_PAGE_SIZE;
        let idx = self.prg_pages[slot] * PRG_PAGE_SIZE + (addr as usize & 0x3FFF);
        self.prg_rom.get(idx).copied().unwrap_or(0)
    }

    fn read_vram(&self, addr: u16) -> u8 {
        let addr = addr & 0x3FFF;
        if addr < 0x2000 {
            self.chr_ram[self.map_chr_addr(addr)]
        } else {
            self.ciram[self.map_nametable_addr(addr)]
        }
    }

    fn write_vram(&mut self, addr: u16, value: u8) {
        let addr = addr & 0x3FFF;
        if addr < 0x2000 {
            let idx = self.map_chr_addr(addr);
            self.chr_ram[idx] = value;
        } else {
            let idx = self.map_nametable_addr(addr);
            self.ciram[idx] = value;
        }
    }
}
