//! Flash save persistence.
//!
//! The board has no save RAM: games save by reprogramming their own PRG
//! flash. Instead of writing the whole image back, saves are stored as a
//! patch from the pristine PRG image to the live one, and re-applied to the
//! pristine image on the next power-up.

use cart_core::logging::{log, LogCategory, LogLevel};
use cart_core::{IpsPatcher, PatchCodec, PatchError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Battery extension for flash save patches
pub const PATCH_EXTENSION: &str = ".ips";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlashCartConfig {
    /// Skip both loading and writing flash saves
    pub disable_flash_saves: bool,
    pub battery_extension: String,
    /// Patches this long or shorter carry no records and are not written
    pub min_patch_len: usize,
}

impl Default for FlashCartConfig {
    fn default() -> Self {
        Self {
            disable_flash_saves: false,
            battery_extension: PATCH_EXTENSION.to_string(),
            min_patch_len: IpsPatcher::EMPTY_PATCH_LEN,
        }
    }
}

impl FlashCartConfig {
    /// Parse a JSON config, falling back to defaults on error
    pub fn from_json(contents: &str) -> Self {
        match serde_json::from_str(contents) {
            Ok(config) => config,
            Err(e) => {
                log(LogCategory::Battery, LogLevel::Warn, || {
                    format!("Failed to parse flash cart config: {}. Using defaults.", e)
                });
                Self::default()
            }
        }
    }

    /// Load from a JSON file; a missing file means defaults
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents),
            Err(_) => Self::default(),
        }
    }
}

/// Pristine PRG image plus the codec used to diff against it.
#[derive(Debug, Clone)]
pub struct PatchPersistence<C: PatchCodec = IpsPatcher> {
    original: Vec<u8>,
    codec: C,
}

impl PatchPersistence<IpsPatcher> {
    pub fn new(original: &[u8]) -> Self {
        Self::with_codec(original, IpsPatcher)
    }
}

impl<C: PatchCodec> PatchPersistence<C> {
    pub fn with_codec(original: &[u8], codec: C) -> Self {
        Self {
            original: original.to_vec(),
            codec,
        }
    }

    pub fn original(&self) -> &[u8] {
        &self.original
    }

    pub fn create_delta(&self, live: &[u8]) -> Result<Vec<u8>, PatchError> {
        self.codec.create_patch(&self.original, live)
    }

    /// Rebuild a full image from `delta`; it must come out at the original size.
    pub fn reconstruct(&self, delta: &[u8]) -> Result<Vec<u8>, PatchError> {
        let patched = self.codec.apply_patch(delta, &self.original)?;
        if patched.len() != self.original.len() {
            return Err(PatchError::LengthMismatch {
                expected: self.original.len(),
                actual: patched.len(),
            });
        }
        Ok(patched)
    }

    /// Overwrite `live` with the reconstructed image. On a bad delta `live`
    /// is left untouched and `false` is returned.
    pub fn restore_into(&self, delta: &[u8], live: &mut [u8]) -> bool {
        match self.reconstruct(delta) {
            Ok(image) if image.len() == live.len() => {
                live.copy_from_slice(&image);
                true
            }
            Ok(image) => {
                log(LogCategory::Battery, LogLevel::Warn, || {
                    format!(
                        "Flash save ignored: {} bytes for a {} byte image",
                        image.len(),
                        live.len()
                    )
                });
                false
            }
            Err(e) => {
                log(LogCategory::Battery, LogLevel::Warn, || {
                    format!("Flash save ignored: {}", e)
                });
                false
            }
        }
    }
}
