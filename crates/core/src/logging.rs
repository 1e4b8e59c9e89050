//! Centralized logging for the cartridge hardware.
//!
//! Every component logs through [`log`], which checks a global, atomically
//! stored configuration before the message closure is ever evaluated.
//!
//! # Architecture
//!
//! - **LogConfig**: Thread-safe global configuration using atomic operations
//! - **LogLevel**: Hierarchical log levels (Off < Error < Warn < Info < Debug < Trace)
//! - **LogCategory**: Mapper registers, flash commands, battery I/O, interrupts, PPU snooping
//! - **log()**: Common logging function for all output
//!
//! # Usage
//!
//! ```rust
//! use cart_core::logging::{log, LogCategory, LogLevel};
//!
//! log(LogCategory::Flash, LogLevel::Debug, || {
//!     format!("Flash: sector erase at {:05X}", 0x3000)
//! });
//! ```

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;

/// Log level for controlling verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    /// Parse log level from string (case-insensitive)
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "off" | "0" => Some(LogLevel::Off),
            "error" | "err" | "1" => Some(LogLevel::Error),
            "warn" | "warning" | "2" => Some(LogLevel::Warn),
            "info" | "3" => Some(LogLevel::Info),
            "debug" | "4" => Some(LogLevel::Debug),
            "trace" | "5" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    fn from_u8(val: u8) -> Self {
        match val {
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            5 => LogLevel::Trace,
            _ => LogLevel::Off,
        }
    }
}

/// Log category for the cartridge components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogCategory {
    /// Register writes, bank switching, mirroring
    Mapper,
    /// Flash command sequencing, program/erase
    Flash,
    /// Battery load/save and patch persistence
    Battery,
    /// IRQ assert/clear
    Interrupts,
    /// Video bus snooping
    PPU,
}

impl LogCategory {
    const COUNT: usize = 5;

    fn index(self) -> usize {
        match self {
            LogCategory::Mapper => 0,
            LogCategory::Flash => 1,
            LogCategory::Battery => 2,
            LogCategory::Interrupts => 3,
            LogCategory::PPU => 4,
        }
    }
}

/// Global logging configuration
pub struct LogConfig {
    /// Applies to every category without an explicit level
    global_level: AtomicU8,
    category_levels: [AtomicU8; LogCategory::COUNT],
    /// Optional file sink; stderr when `None`
    log_file: Mutex<Option<File>>,
}

impl LogConfig {
    /// Create a new LogConfig with all logging disabled
    fn new() -> Self {
        Self {
            global_level: AtomicU8::new(LogLevel::Off as u8),
            category_levels: [
                AtomicU8::new(LogLevel::Off as u8),
                AtomicU8::new(LogLevel::Off as u8),
                AtomicU8::new(LogLevel::Off as u8),
                AtomicU8::new(LogLevel::Off as u8),
                AtomicU8::new(LogLevel::Off as u8),
            ],
            log_file: Mutex::new(None),
        }
    }

    /// Get the global singleton instance
    pub fn global() -> &'static Self {
        use std::sync::OnceLock;
        static INSTANCE: OnceLock<LogConfig> = OnceLock::new();
        INSTANCE.get_or_init(LogConfig::new)
    }

    pub fn set_global_level(&self, level: LogLevel) {
        self.global_level.store(level as u8, Ordering::Relaxed);
    }

    pub fn get_global_level(&self) -> LogLevel {
        LogLevel::from_u8(self.global_level.load(Ordering::Relaxed))
    }

    /// Set log level for a specific category
    pub fn set_level(&self, category: LogCategory, level: LogLevel) {
        self.category_levels[category.index()].store(level as u8, Ordering::Relaxed);
    }

    /// Get log level for a specific category
    pub fn get_level(&self, category: LogCategory) -> LogLevel {
        LogLevel::from_u8(self.category_levels[category.index()].load(Ordering::Relaxed))
    }

    /// A category-specific level wins; `Off` falls back to the global level.
    pub fn should_log(&self, category: LogCategory, level: LogLevel) -> bool {
        let category_level = self.get_level(category);
        if category_level != LogLevel::Off {
            level <= category_level
        } else {
            level <= self.get_global_level()
        }
    }

    /// Reset all logging to Off
    pub fn reset(&self) {
        self.set_global_level(LogLevel::Off);
        for slot in &self.category_levels {
            slot.store(LogLevel::Off as u8, Ordering::Relaxed);
        }
    }

    /// Append log output to `path` instead of stderr.
    pub fn set_log_file(&self, path: PathBuf) -> std::io::Result<()> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        if let Ok(mut sink) = self.log_file.lock() {
            *sink = Some(file);
        }
        Ok(())
    }

    /// Close the log file and go back to stderr
    pub fn clear_log_file(&self) {
        if let Ok(mut sink) = self.log_file.lock() {
            *sink = None;
        }
    }

    fn write_message(&self, message: &str) {
        if let Ok(mut sink) = self.log_file.lock() {
            if let Some(file) = sink.as_mut() {
                // Fall through to stderr if the file write fails
                if writeln!(file, "{}", message).is_ok() {
                    return;
                }
            }
        }
        eprintln!("{}", message);
    }
}

/// Log a message with the specified category and level.
///
/// The closure only runs when the category/level pair is enabled, so
/// formatting on hot paths (every PPU fetch) costs nothing when logging is off.
pub fn log<F>(category: LogCategory, level: LogLevel, message_fn: F)
where
    F: FnOnce() -> String,
{
    let config = LogConfig::global();
    if config.should_log(category, level) {
        let message = message_fn();
        config.write_message(&format!("[{:?}] {}", category, message));
    }
}
