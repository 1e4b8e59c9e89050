//! Integration tests for flash saves across power cycles
//!
//! Covers:
//! - Battery patches written on save and reapplied at power-up
//! - Save thresholds and disabled saves
//! - Save states carrying the flash contents
//! - Sharing the IRQ line with the CPU side

use cart_core::logging::{LogCategory, LogConfig, LogLevel};
use cart_core::{
    BatteryStore, FileBattery, InterruptLine, IrqFlags, IrqSource, MemoryBattery, SaveState,
};
use cart_nes::{Cartridge, FlashCart, FlashCartConfig, VramAccess};
use std::cell::RefCell;
use std::rc::Rc;

const PRG_SIZE: usize = 0x20000;

fn blank_rom() -> Vec<u8> {
    vec![0xFF; PRG_SIZE]
}

fn power_on<I: InterruptLine, B: BatteryStore>(prg: Vec<u8>, irq: I, battery: B) -> FlashCart<I, B> {
    FlashCart::new(Cartridge::new(prg, vec![], 0x02), FlashCartConfig::default(), irq, battery)
        .expect("valid PRG size")
}

/// Drive one flash bus cycle: bank select supplies A14+, the write supplies A0-A13.
fn flash_cycle<I: InterruptLine, B: BatteryStore>(cart: &mut FlashCart<I, B>, flash_addr: u32, val: u8) {
    cart.write_prg(0xC000, (flash_addr >> 14) as u8);
    cart.write_prg(0x8000 | (flash_addr & 0x3FFF) as u16, val);
}

fn unlock<I: InterruptLine, B: BatteryStore>(cart: &mut FlashCart<I, B>, command: u8) {
    flash_cycle(cart, 0x5555, 0xAA);
    flash_cycle(cart, 0x2AAA, 0x55);
    flash_cycle(cart, 0x5555, command);
}

fn program<I: InterruptLine, B: BatteryStore>(cart: &mut FlashCart<I, B>, flash_addr: u32, val: u8) {
    unlock(cart, 0xA0);
    flash_cycle(cart, flash_addr, val);
}

fn sector_erase<I: InterruptLine, B: BatteryStore>(cart: &mut FlashCart<I, B>, flash_addr: u32) {
    unlock(cart, 0x80);
    flash_cycle(cart, 0x5555, 0xAA);
    flash_cycle(cart, 0x2AAA, 0x55);
    flash_cycle(cart, flash_addr, 0x30);
}

#[test]
fn test_flash_save_survives_power_cycle() {
    let mut cart = power_on(blank_rom(), IrqFlags::new(), MemoryBattery::new());
    program(&mut cart, 0x01234, 0x12);
    program(&mut cart, 0x1C000, 0x00);
    let delta = cart.save_battery();
    assert!(delta.len() > 8);

    let battery = cart.battery().clone();
    let reloaded = power_on(blank_rom(), IrqFlags::new(), battery);

    assert_eq!(reloaded.prg_rom(), cart.prg_rom());
    assert_eq!(reloaded.prg_rom()[0x01234], 0x12);
    assert!(reloaded.original_prg_rom().iter().all(|&b| b == 0xFF));
}

#[test]
fn test_save_after_reload_is_identical() {
    let mut cart = power_on(blank_rom(), IrqFlags::new(), MemoryBattery::new());
    program(&mut cart, 0x00040, 0x5A);
    let first = cart.save_battery();

    let mut reloaded = power_on(blank_rom(), IrqFlags::new(), cart.battery().clone());
    let second = reloaded.save_battery();

    assert_eq!(first, second);
    assert_eq!(reloaded.create_delta(), first);
}

#[test]
fn test_erased_sector_is_saved_compactly() {
    let mut cart = power_on(vec![0x00; PRG_SIZE], IrqFlags::new(), MemoryBattery::new());
    sector_erase(&mut cart, 0x03000);
    assert!(cart.prg_rom()[0x3000..0x4000].iter().all(|&b| b == 0xFF));

    let delta = cart.save_battery();
    // One run-length record for the whole 4KB sector
    assert_eq!(delta.len(), 5 + 3 + 2 + 2 + 1 + 3);
    assert_eq!(cart.battery().save_count(), 1);

    let reloaded = power_on(vec![0x00; PRG_SIZE], IrqFlags::new(), cart.battery().clone());
    assert_eq!(reloaded.prg_rom(), cart.prg_rom());
}

#[test]
fn test_unmodified_flash_is_never_written() {
    let mut cart = power_on(blank_rom(), IrqFlags::new(), MemoryBattery::new());
    for _ in 0..3 {
        assert_eq!(cart.save_battery(), b"PATCHEOF");
    }
    assert_eq!(cart.battery().save_count(), 0);
    assert_eq!(cart.battery().get(".ips"), None);
}

#[test]
fn test_corrupt_battery_patch_is_ignored() {
    let mut battery = MemoryBattery::new();
    battery.insert(".ips", b"PATCH\x00\x00".to_vec());
    let cart = power_on(blank_rom(), IrqFlags::new(), battery);
    assert!(cart.prg_rom().iter().all(|&b| b == 0xFF));

    // A record past the end would grow the image
    let mut battery = MemoryBattery::new();
    battery.insert(".ips", b"PATCH\x02\x00\x00\x00\x01\x00EOF".to_vec());
    let cart = power_on(blank_rom(), IrqFlags::new(), battery);
    assert!(cart.prg_rom().iter().all(|&b| b == 0xFF));
}

#[test]
fn test_disabled_saves_ignore_battery() {
    let mut cart = power_on(blank_rom(), IrqFlags::new(), MemoryBattery::new());
    program(&mut cart, 0x00000, 0x00);
    cart.save_battery();

    let config = FlashCartConfig::from_json(r#"{ "disable_flash_saves": true }"#);
    let mut reloaded = FlashCart::new(
        Cartridge::new(blank_rom(), vec![], 0x02),
        config,
        IrqFlags::new(),
        cart.battery().clone(),
    )
    .expect("valid PRG size");

    assert_eq!(reloaded.prg_rom()[0], 0xFF);
    program(&mut reloaded, 0x00001, 0x00);
    assert!(reloaded.save_battery().is_empty());
    assert_eq!(reloaded.battery().save_count(), 1);
}

#[test]
fn test_file_battery_power_cycle() {
    let root = std::env::temp_dir().join(format!("cart_nes_flash_{}", std::process::id()));
    let rom = blank_rom();

    let mut cart = power_on(rom.clone(), IrqFlags::new(), FileBattery::new(&root, &rom));
    program(&mut cart, 0x10000, 0x77);
    cart.save_battery();
    assert!(cart.battery().path_for(".ips").exists());

    let reloaded = power_on(rom.clone(), IrqFlags::new(), FileBattery::new(&root, &rom));
    assert_eq!(reloaded.prg_rom()[0x10000], 0x77);

    let _ = std::fs::remove_dir_all(&root);
}

#[test]
fn test_save_state_rolls_back_flash() {
    let mut cart = power_on(blank_rom(), IrqFlags::new(), MemoryBattery::new());
    program(&mut cart, 0x00100, 0x01);
    cart.write_prg(0x8000, 0x96);
    let state = cart.save_state();

    program(&mut cart, 0x00200, 0x02);
    cart.write_prg(0xC000, 5);
    cart.write_prg(0x8000, 0x00);
    assert_eq!(cart.prg_rom()[0x200], 0x02);

    cart.load_state(&state).expect("state should load");
    assert_eq!(cart.prg_rom()[0x100], 0x01);
    assert_eq!(cart.prg_rom()[0x200], 0xFF);
    assert!(cart.irq_enabled());
    assert_eq!(cart.chr_pages(), [6, 6]);
    assert_eq!(cart.prg_bank(), 0);
}

#[test]
fn test_shared_interrupt_line() {
    let line = Rc::new(RefCell::new(IrqFlags::new()));
    let mut cart = power_on(blank_rom(), Rc::clone(&line), MemoryBattery::new());

    cart.write_prg(0x8000, 0x80);
    cart.read_vram(0x0000, VramAccess::RenderingRead);
    assert!(!line.borrow().pending());

    cart.read_vram(0x1000, VramAccess::RenderingRead);
    assert!(line.borrow().has_source(IrqSource::External));

    // Other sources on the same line are left alone
    line.borrow_mut().set_irq_source(IrqSource::Dmc);
    cart.write_prg(0x8000, 0x80);
    assert!(!line.borrow().has_source(IrqSource::External));
    assert!(line.borrow().has_source(IrqSource::Dmc));

    // Power-down save stops further IRQs
    cart.save_battery();
    line.borrow_mut().clear_irq_source(IrqSource::Dmc);
    cart.read_vram(0x1000, VramAccess::RenderingRead);
    assert!(!line.borrow().pending());
}

#[test]
fn test_logging_flash_commands() {
    let path = std::env::temp_dir().join(format!("cart_nes_flash_log_{}.txt", std::process::id()));
    let config = LogConfig::global();
    config.set_log_file(path.clone()).expect("log file should open");
    config.set_level(LogCategory::Flash, LogLevel::Debug);

    let mut cart = power_on(blank_rom(), IrqFlags::new(), MemoryBattery::new());
    unlock(&mut cart, 0xA0);

    config.set_level(LogCategory::Flash, LogLevel::Off);
    config.clear_log_file();

    let contents = std::fs::read_to_string(&path).unwrap_or_default();
    assert!(contents.contains("[Flash] Flash: command A0"));
    let _ = std::fs::remove_file(&path);
}
