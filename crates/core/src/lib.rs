//! Core cartridge primitives and traits shared by the system crates.

pub mod battery;
pub mod ips;
pub mod logging;

use serde_json::Value;
use std::cell::RefCell;
use std::rc::Rc;

pub use battery::{BatteryError, BatteryStore, FileBattery, MemoryBattery};
pub use ips::{IpsPatcher, PatchCodec, PatchError};

/// Named IRQ inputs of the CPU. Each component only drives its own source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum IrqSource {
    /// Cartridge (mapper) IRQ
    External = 0x01,
    FrameCounter = 0x02,
    Dmc = 0x04,
}

/// The CPU's level-triggered IRQ input as seen by a peripheral.
pub trait InterruptLine {
    fn set_irq_source(&mut self, source: IrqSource);
    fn clear_irq_source(&mut self, source: IrqSource);
}

/// IRQ sources OR-ed together, the way the 6502's /IRQ pin sees them.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IrqFlags {
    bits: u8,
}

impl IrqFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_source(&self, source: IrqSource) -> bool {
        self.bits & source as u8 != 0
    }

    /// Any source asserted
    pub fn pending(&self) -> bool {
        self.bits != 0
    }
}

impl InterruptLine for IrqFlags {
    fn set_irq_source(&mut self, source: IrqSource) {
        self.bits |= source as u8;
    }

    fn clear_irq_source(&mut self, source: IrqSource) {
        self.bits &= !(source as u8);
    }
}

/// Lets the CPU keep ownership of the line while a cartridge holds a handle.
impl<T: InterruptLine> InterruptLine for Rc<RefCell<T>> {
    fn set_irq_source(&mut self, source: IrqSource) {
        self.borrow_mut().set_irq_source(source);
    }

    fn clear_irq_source(&mut self, source: IrqSource) {
        self.borrow_mut().clear_irq_source(source);
    }
}

/// JSON save states for suspend/resume.
/// States never carry the pristine cartridge image, only what changed.
pub trait SaveState {
    fn save_state(&self) -> Value;

    /// Returns an error only when the document is structurally incompatible.
    fn load_state(&mut self, v: &Value) -> Result<(), serde_json::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn irq_sources_are_independent() {
        let mut irq = IrqFlags::new();
        assert!(!irq.pending());

        irq.set_irq_source(IrqSource::External);
        irq.set_irq_source(IrqSource::Dmc);
        irq.clear_irq_source(IrqSource::External);

        assert!(!irq.has_source(IrqSource::External));
        assert!(irq.has_source(IrqSource::Dmc));
        assert!(irq.pending());
    }

    #[test]
    fn shared_line_reaches_owner() {
        let cpu_irq = Rc::new(RefCell::new(IrqFlags::new()));
        let mut handle = Rc::clone(&cpu_irq);

        handle.set_irq_source(IrqSource::External);
        assert!(cpu_irq.borrow().has_source(IrqSource::External));

        handle.clear_irq_source(IrqSource::External);
        assert!(!cpu_irq.borrow().pending());
    }
}
