use super::banking::{BankedMemory, PageMapping, PRG_PAGE_SIZE};
use super::snoop::{VideoSnoop, VramFetch};
use super::{MapperError, VramAccess};
use crate::cartridge::{Cartridge, Mirroring};
use crate::flash::{FlashChip, FlashState};
use crate::persist::{FlashCartConfig, PatchPersistence};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use cart_core::logging::{log, LogCategory, LogLevel};
use cart_core::{BatteryStore, InterruptLine, IrqSource, SaveState};
use serde::Deserialize;
use serde_json::Value;

const CHR_RAM_SIZE: usize = 0x8000;

/// Homebrew flash board with per-8x8 attributes.
///
/// # Hardware Behavior
/// - **PRG**: SST39SF040 flash, 16KB switchable at $8000, last 16KB fixed at $C000
/// - **CHR**: 32KB RAM, two 4KB windows; rendering fetches are remapped by
///   the snoop logic instead of going through the windows
/// - **$C000-$FFFF** (write): PRG bank, also the upper flash address bits
/// - **$8000-$BFFF** (write): `I..S.BBB`
///   * B: CHR remap lines A12/A13/A14 and the 4KB windows
///   * S: single-screen page, and sprite/NT swap for the remap
///   * I: IRQ enable; any write acknowledges the IRQ
///   * The same write is also a flash command cycle
/// - **IRQ**: raised on every PPU read with A12 high while enabled
#[derive(Debug)]
pub struct FlashCart<I: InterruptLine, B: BatteryStore> {
    mem: BankedMemory,
    flash: FlashChip,
    snoop: VideoSnoop,
    persistence: PatchPersistence,
    config: FlashCartConfig,
    irq: I,
    battery: B,
    prg_bank: u8,
    irq_enabled: bool,
    /// Header requested single-screen mirroring. Informational only: the
    /// $8000 register drives mirroring either way, so this only shows up in
    /// `debug_state`.
    single_screen_wired: bool,
}

#[derive(Deserialize)]
struct FlashCartState {
    flash: FlashState,
    prg_bank: u8,
    #[serde(default)]
    patch: Option<String>,
    chr_pages: [usize; 2],
    mirroring: Mirroring,
    irq_enabled: bool,
    snoop: VideoSnoop,
}

impl<I: InterruptLine, B: BatteryStore> FlashCart<I, B> {
    pub fn new(
        cart: Cartridge,
        config: FlashCartConfig,
        irq: I,
        battery: B,
    ) -> Result<Self, MapperError> {
        let prg_len = cart.prg_rom.len();
        if prg_len == 0 || prg_len % PRG_PAGE_SIZE != 0 {
            return Err(MapperError::InvalidPrgSize(prg_len));
        }
        if !cart.chr_rom.is_empty() {
            log(LogCategory::Mapper, LogLevel::Warn, || {
                format!(
                    "Ignoring {} bytes of CHR ROM, board only has CHR RAM",
                    cart.chr_rom.len()
                )
            });
        }

        if !cart.has_battery() {
            log(LogCategory::Battery, LogLevel::Debug, || {
                "Header has no battery flag; flash saves are kept anyway".to_string()
            });
        }

        let (mirroring, single_screen_wired) = if cart.mirroring.is_single_screen() {
            (Mirroring::SingleScreenLower, true)
        } else {
            match cart.flags6 & 0x09 {
                0 => (Mirroring::Horizontal, false),
                1 => (Mirroring::Vertical, false),
                8 => (Mirroring::SingleScreenLower, true),
                _ => (Mirroring::FourScreen, false),
            }
        };

        let persistence = PatchPersistence::new(&cart.prg_rom);
        let mut mem = BankedMemory::new(cart.prg_rom, CHR_RAM_SIZE, mirroring);
        let last = mem.prg_page_count() - 1;
        mem.select_prg_page(0, 0);
        mem.select_prg_page(1, last);
        // Same windows as a $8000 write of 0
        mem.select_chr_page(0, 0);
        mem.select_chr_page(1, 4);

        let mut m = Self {
            mem,
            flash: FlashChip::new(),
            snoop: VideoSnoop::new(),
            persistence,
            config,
            irq,
            battery,
            prg_bank: 0,
            irq_enabled: true,
            single_screen_wired,
        };
        m.apply_save_data();
        Ok(m)
    }

    /// Reapply a stored flash save on top of the pristine image.
    fn apply_save_data(&mut self) {
        if self.config.disable_flash_saves {
            return;
        }

        let delta = match self.battery.load_battery(&self.config.battery_extension) {
            Ok(delta) => delta,
            Err(e) => {
                log(LogCategory::Battery, LogLevel::Warn, || {
                    format!("Flash save not loaded: {}", e)
                });
                return;
            }
        };
        if delta.is_empty() {
            return;
        }

        if self.persistence.restore_into(&delta, self.mem.prg_rom_mut()) {
            log(LogCategory::Battery, LogLevel::Info, || {
                format!("Applied {} byte flash save", delta.len())
            });
        }
    }

    /// Patch from the pristine PRG image to the live one
    pub fn create_delta(&self) -> Vec<u8> {
        match self.persistence.create_delta(self.mem.prg_rom()) {
            Ok(delta) => delta,
            Err(e) => {
                log(LogCategory::Battery, LogLevel::Warn, || {
                    format!("Could not diff PRG flash: {}", e)
                });
                Vec::new()
            }
        }
    }

    /// Persist the flash contents and return the patch that was computed.
    ///
    /// Only patches longer than `min_patch_len` reach the battery. The host
    /// calls this at power-down, so IRQs stay disabled afterwards.
    pub fn save_battery(&mut self) -> Vec<u8> {
        if self.config.disable_flash_saves {
            return Vec::new();
        }

        let delta = self.create_delta();
        if delta.len() > self.config.min_patch_len {
            if let Err(e) = self
                .battery
                .save_battery(&self.config.battery_extension, &delta)
            {
                log(LogCategory::Battery, LogLevel::Warn, || {
                    format!("Flash save not written: {}", e)
                });
            }
        }

        // TODO: split power-down from save so mid-session saves keep IRQs running
        self.irq_enabled = false;
        delta
    }

    /// CPU read. The flash chip gets first say while it is in ID mode.
    pub fn read_prg(&self, addr: u16) -> u8 {
        if addr >= 0x8000 {
            if let Some(value) = self.flash.read(addr as u32) {
                return value;
            }
        }
        self.mem.read_prg(addr)
    }

    pub fn write_prg(&mut self, addr: u16, val: u8) {
        match addr {
            0xC000..=0xFFFF => {
                self.mem.select_prg_page(0, val as usize);
                self.prg_bank = val;
                log(LogCategory::Mapper, LogLevel::Debug, || {
                    format!("PRG bank {:02X}", val)
                });
            }
            0x8000..=0xBFFF => {
                self.snoop.configure(val);

                // The second window always lands in the upper 16KB
                let page = (val & 0x07) as usize;
                let a14 = self.snoop.a14() as usize;
                self.mem.select_chr_page(0, page);
                self.mem.select_chr_page(1, page ^ 0x04 ^ (a14 << 2));

                self.mem.set_mirroring(if val & 0x10 != 0 {
                    Mirroring::SingleScreenUpper
                } else {
                    Mirroring::SingleScreenLower
                });
                self.irq_enabled = val & 0x80 != 0;
                self.irq.clear_irq_source(IrqSource::External);
                log(LogCategory::Mapper, LogLevel::Debug, || {
                    format!("Config {:02X} chr={:?}", val, self.mem.chr_pages())
                });

                let flash_addr = (addr as u32 & 0x3FFF) | ((self.prg_bank as u32) << 14);
                self.flash.write(flash_addr, val, self.mem.prg_rom_mut());
            }
            _ => {}
        }
    }

    /// PPU read. Every rendering and $2007 read goes through the snoop logic,
    /// in bus order.
    pub fn read_vram(&mut self, addr: u16, kind: VramAccess) -> u8 {
        if kind == VramAccess::Other {
            return self.mem.read_vram(addr);
        }

        let fetch = self.snoop.observe(addr);

        if addr & 0x1000 != 0 && self.irq_enabled {
            self.irq.set_irq_source(IrqSource::External);
            log(LogCategory::Interrupts, LogLevel::Trace, || {
                format!("IRQ on PPU fetch {:04X}", addr)
            });
        }

        match fetch {
            VramFetch::Nametable(a) => self.mem.read_vram(a),
            VramFetch::Attribute(a) => {
                log(LogCategory::PPU, LogLevel::Trace, || {
                    format!("Attribute fetch {:04X} -> CHR {:04X}", addr, a)
                });
                self.mem.chr_ram()[a as usize]
            }
            VramFetch::Pattern(a) => self.mem.chr_ram()[a as usize],
        }
    }

    /// PPU write ($2007 uploads) through the CHR windows and CIRAM
    pub fn write_vram(&mut self, addr: u16, val: u8) {
        self.mem.write_vram(addr, val);
    }

    pub fn mirroring(&self) -> Mirroring {
        self.mem.mirroring()
    }

    pub fn prg_rom(&self) -> &[u8] {
        self.mem.prg_rom()
    }

    pub fn original_prg_rom(&self) -> &[u8] {
        self.persistence.original()
    }

    pub fn chr_ram(&self) -> &[u8] {
        self.mem.chr_ram()
    }

    pub fn chr_pages(&self) -> [usize; 2] {
        self.mem.chr_pages()
    }

    pub fn prg_bank(&self) -> u8 {
        self.prg_bank
    }

    pub fn irq_enabled(&self) -> bool {
        self.irq_enabled
    }

    pub fn snoop(&self) -> &VideoSnoop {
        &self.snoop
    }

    pub fn flash_state(&self) -> FlashState {
        self.flash.state()
    }

    pub fn irq_line(&self) -> &I {
        &self.irq
    }

    pub fn battery(&self) -> &B {
        &self.battery
    }

    pub fn config(&self) -> &FlashCartConfig {
        &self.config
    }

    /// Return debug information useful for inspecting mapper state.
    pub fn debug_state(&self) -> Value {
        let modified = self
            .mem
            .prg_rom()
            .iter()
            .zip(self.persistence.original())
            .filter(|(live, org)| live != org)
            .count();
        let (d, dd, ddd) = self.snoop.history();

        serde_json::json!({
            "prg_bank": self.prg_bank,
            "prg_pages": self.mem.prg_pages(),
            "chr_pages": self.mem.chr_pages(),
            "mirroring": format!("{:?}", self.mem.mirroring()),
            "single_screen_wired": self.single_screen_wired,
            "irq_enabled": self.irq_enabled,
            "flash": self.flash.state(),
            "a13_history": [d, dd, ddd],
            "prg_modified_bytes": modified,
        })
    }
}

impl<I: InterruptLine, B: BatteryStore> SaveState for FlashCart<I, B> {
    fn save_state(&self) -> Value {
        serde_json::json!({
            "flash": self.flash.state(),
            "prg_bank": self.prg_bank,
            "patch": BASE64.encode(self.create_delta()),
            "chr_pages": self.mem.chr_pages(),
            "mirroring": self.mem.mirroring(),
            "irq_enabled": self.irq_enabled,
            "snoop": self.snoop,
        })
    }

    fn load_state(&mut self, v: &Value) -> Result<(), serde_json::Error> {
        let state = FlashCartState::deserialize(v)?;

        self.flash.restore(state.flash);
        self.prg_bank = state.prg_bank;
        self.mem.select_prg_page(0, state.prg_bank as usize);
        self.mem.select_chr_page(0, state.chr_pages[0]);
        self.mem.select_chr_page(1, state.chr_pages[1]);
        self.mem.set_mirroring(state.mirroring);
        self.irq_enabled = state.irq_enabled;
        self.snoop = state.snoop;

        match state.patch.as_deref().map(|p| BASE64.decode(p)) {
            Some(Ok(delta)) => {
                self.persistence.restore_into(&delta, self.mem.prg_rom_mut());
            }
            Some(Err(e)) => log(LogCategory::Battery, LogLevel::Warn, || {
                format!("Save state patch not decoded: {}", e)
            }),
            None => log(LogCategory::Battery, LogLevel::Warn, || {
                "Save state has no PRG patch".to_string()
            }),
        }
        Ok(())
    }
}
