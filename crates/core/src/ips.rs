//! IPS binary patches.
//!
//! Format: `"PATCH"`, then records of `offset:u24be size:u16be data[size]`
//! (or `offset:u24be 0:u16be run:u16be value:u8` for RLE), then `"EOF"`,
//! optionally followed by a `u24be` truncation length.

use thiserror::Error;

const HEADER: &[u8; 5] = b"PATCH";
const FOOTER: &[u8; 3] = b"EOF";
/// A record starting here would be read back as the footer.
const EOF_OFFSET: usize = 0x45_4F46;
const MAX_OFFSET: usize = 0xFF_FFFF;
const MAX_RECORD_LEN: usize = 0xFFFF;
/// Runs of one repeated byte longer than this are encoded as RLE records.
const RLE_THRESHOLD: usize = 8;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatchError {
    #[error("patch does not start with a PATCH header")]
    InvalidHeader,
    #[error("patch truncated at byte {0}")]
    Truncated(usize),
    #[error("offset {0:#X} does not fit in 24 bits")]
    OffsetOutOfRange(usize),
    #[error("patched image is {actual} bytes, expected {expected}")]
    LengthMismatch { expected: usize, actual: usize },
}

/// Diff/patch algorithm used to persist modified images.
pub trait PatchCodec {
    fn create_patch(&self, original: &[u8], modified: &[u8]) -> Result<Vec<u8>, PatchError>;
    fn apply_patch(&self, patch: &[u8], original: &[u8]) -> Result<Vec<u8>, PatchError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct IpsPatcher;

impl IpsPatcher {
    /// Length of a patch with no records (header + footer).
    pub const EMPTY_PATCH_LEN: usize = HEADER.len() + FOOTER.len();
}

fn push_u24(out: &mut Vec<u8>, v: usize) {
    out.extend_from_slice(&[(v >> 16) as u8, (v >> 8) as u8, v as u8]);
}

fn push_u16(out: &mut Vec<u8>, v: usize) {
    out.extend_from_slice(&[(v >> 8) as u8, v as u8]);
}

fn read_u24(patch: &[u8], pos: usize) -> Result<usize, PatchError> {
    patch
        .get(pos..pos + 3)
        .map(|b| ((b[0] as usize) << 16) | ((b[1] as usize) << 8) | b[2] as usize)
        .ok_or(PatchError::Truncated(pos))
}

fn read_u16(patch: &[u8], pos: usize) -> Result<usize, PatchError> {
    patch
        .get(pos..pos + 2)
        .map(|b| ((b[0] as usize) << 8) | b[1] as usize)
        .ok_or(PatchError::Truncated(pos))
}

impl PatchCodec for IpsPatcher {
    fn create_patch(&self, original: &[u8], modified: &[u8]) -> Result<Vec<u8>, PatchError> {
        let differs = |i: usize| original.get(i) != Some(&modified[i]);

        let mut out = HEADER.to_vec();
        let mut i = 0;
        while i < modified.len() {
            if !differs(i) {
                i += 1;
                continue;
            }

            let start = if i == EOF_OFFSET { i - 1 } else { i };
            if start > MAX_OFFSET {
                return Err(PatchError::OffsetOutOfRange(start));
            }
            let mut end = i;
            while end < modified.len() && end - start < MAX_RECORD_LEN && differs(end) {
                end += 1;
            }

            let chunk = &modified[start..end];
            push_u24(&mut out, start);
            if chunk.len() > RLE_THRESHOLD && chunk.iter().all(|&b| b == chunk[0]) {
                push_u16(&mut out, 0);
                push_u16(&mut out, chunk.len());
                out.push(chunk[0]);
            } else {
                push_u16(&mut out, chunk.len());
                out.extend_from_slice(chunk);
            }
            i = end;
        }
        out.extend_from_slice(FOOTER);

        if modified.len() < original.len() {
            if modified.len() > MAX_OFFSET {
                return Err(PatchError::OffsetOutOfRange(modified.len()));
            }
            push_u24(&mut out, modified.len());
        }
        Ok(out)
    }

    fn apply_patch(&self, patch: &[u8], original: &[u8]) -> Result<Vec<u8>, PatchError> {
        if !patch.starts_with(HEADER) {
            return Err(PatchError::InvalidHeader);
        }

        let mut out = original.to_vec();
        let mut pos = HEADER.len();
        loop {
            let tag = patch.get(pos..pos + 3).ok_or(PatchError::Truncated(pos))?;
            if tag == FOOTER {
                pos += 3;
                if let Ok(len) = read_u24(patch, pos) {
                    out.truncate(len);
                }
                return Ok(out);
            }

            let offset = read_u24(patch, pos)?;
            let size = read_u16(patch, pos + 3)?;
            pos += 5;

            if size == 0 {
                let run = read_u16(patch, pos)?;
                let value = *patch.get(pos + 2).ok_or(PatchError::Truncated(pos + 2))?;
                pos += 3;
                if out.len() < offset + run {
                    out.resize(offset + run, 0);
                }
                out[offset..offset + run].fill(value);
            } else {
                let data = patch.get(pos..pos + size).ok_or(PatchError::Truncated(pos))?;
                pos += size;
                if out.len() < offset + size {
                    out.resize(offset + size, 0);
                }
                out[offset..offset + size].copy_from_slice(data);
            }
        }
    }
}
