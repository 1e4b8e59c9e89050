//! Battery-backed storage for cartridge saves.
//!
//! Saves are keyed by a short extension (e.g. `.ips`, `.sav`) so one
//! cartridge can persist several kinds of data side by side.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use thiserror::Error;

use crate::logging::{log, LogCategory, LogLevel};

#[derive(Error, Debug)]
pub enum BatteryError {
    #[error("battery I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Persistent storage for a single cartridge.
pub trait BatteryStore {
    /// Previously saved bytes for `extension`; empty when nothing was saved.
    fn load_battery(&mut self, extension: &str) -> Result<Vec<u8>, BatteryError>;

    fn save_battery(&mut self, extension: &str, data: &[u8]) -> Result<(), BatteryError>;
}

/// Calculate SHA256 hash of ROM data
pub fn rom_hash(rom_data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(rom_data);
    format!("{:x}", hasher.finalize())
}

/// In-memory store, used by hosts that manage files themselves and by tests.
#[derive(Debug, Default, Clone)]
pub struct MemoryBattery {
    entries: HashMap<String, Vec<u8>>,
    save_count: usize,
}

impl MemoryBattery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, extension: &str) -> Option<&[u8]> {
        self.entries.get(extension).map(Vec::as_slice)
    }

    pub fn insert(&mut self, extension: &str, data: Vec<u8>) {
        self.entries.insert(extension.to_string(), data);
    }

    /// Number of successful `save_battery` calls so far
    pub fn save_count(&self) -> usize {
        self.save_count
    }
}

impl BatteryStore for MemoryBattery {
    fn load_battery(&mut self, extension: &str) -> Result<Vec<u8>, BatteryError> {
        Ok(self.entries.get(extension).cloned().unwrap_or_default())
    }

    fn save_battery(&mut self, extension: &str, data: &[u8]) -> Result<(), BatteryError> {
        self.entries.insert(extension.to_string(), data.to_vec());
        self.save_count += 1;
        Ok(())
    }
}

/// Files under `<root>/<rom sha256>/battery<extension>`.
#[derive(Debug, Clone)]
pub struct FileBattery {
    dir: PathBuf,
}

impl FileBattery {
    pub fn new(root: impl Into<PathBuf>, rom_data: &[u8]) -> Self {
        let mut dir = root.into();
        dir.push(rom_hash(rom_data));
        Self { dir }
    }

    /// Default saves directory next to the executable
    pub fn saves_dir() -> PathBuf {
        let mut path = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."));
        path.push("saves");
        path
    }

    pub fn path_for(&self, extension: &str) -> PathBuf {
        self.dir.join(format!("battery{}", extension))
    }
}

impl BatteryStore for FileBattery {
    fn load_battery(&mut self, extension: &str) -> Result<Vec<u8>, BatteryError> {
        let path = self.path_for(extension);
        match fs::read(&path) {
            Ok(data) => {
                log(LogCategory::Battery, LogLevel::Info, || {
                    format!("Loaded {} bytes from {}", data.len(), path.display())
                });
                Ok(data)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(source) => Err(BatteryError::Io { path, source }),
        }
    }

    fn save_battery(&mut self, extension: &str, data: &[u8]) -> Result<(), BatteryError> {
        let path = self.path_for(extension);
        fs::create_dir_all(&self.dir).map_err(|source| BatteryError::Io {
            path: self.dir.clone(),
            source,
        })?;
        fs::write(&path, data).map_err(|source| BatteryError::Io {
            path: path.clone(),
            source,
        })?;
        log(LogCategory::Battery, LogLevel::Info, || {
            format!("Saved {} bytes to {}", data.len(), path.display())
        });
        Ok(())
    }
}
