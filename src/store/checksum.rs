//! Record digests
//!
//! Each record carries two digests over the canonical JSON encoding of its
//! data:
//!
//! - `checksum`: SHA-256, base64 (URL-safe, unpadded)
//! - `crc32`: CRC32 (IEEE), formatted `crc32:xxxxxxxx`
//!
//! Both detect accidental corruption; neither is a security boundary.
//! Canonical encoding is `serde_json`'s compact form, whose object keys are
//! sorted, so equal values always produce equal digests. Numbers are parsed
//! with serde_json's `float_roundtrip` feature, so a float read back from a
//! record has the exact bits it was written with.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use crc32fast::Hasher;
use serde_json::Value;
use sha2::{Digest as _, Sha256};

/// Checksum pair stored in record metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digest {
    pub checksum: String,
    pub crc32: String,
}

/// Canonical serialized form of a value
pub fn canonical_json(data: &Value) -> String {
    data.to_string()
}

/// SHA-256 of `bytes`, base64 encoded
pub fn compute_checksum(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// CRC32 of `bytes`
pub fn compute_crc32(bytes: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(bytes);
    hasher.finalize()
}

/// Format: `crc32:XXXXXXXX` (lowercase hex, zero-padded)
pub fn format_crc32(crc: u32) -> String {
    format!("crc32:{:08x}", crc)
}

/// Parse a `crc32:XXXXXXXX` string
pub fn parse_crc32(formatted: &str) -> Option<u32> {
    let hex = formatted.strip_prefix("crc32:")?;
    if hex.len() != 8 {
        return None;
    }
    u32::from_str_radix(hex, 16).ok()
}

/// Both digests of a value
pub fn digest(data: &Value) -> Digest {
    let bytes = canonical_json(data);
    Digest {
        checksum: compute_checksum(bytes.as_bytes()),
        crc32: format_crc32(compute_crc32(bytes.as_bytes())),
    }
}

/// Verify `data` against stored digests.
///
/// Returns the reason on mismatch.
pub fn verify(data: &Value, checksum: &str, crc32: &str) -> Result<(), String> {
    let bytes = canonical_json(data);

    let computed = compute_checksum(bytes.as_bytes());
    if computed != checksum {
        return Err(format!(
            "checksum mismatch: computed {}, stored {}",
            computed, checksum
        ));
    }

    let stored_crc = parse_crc32(crc32).ok_or_else(|| format!("malformed crc32 '{}'", crc32))?;
    let computed_crc = compute_crc32(bytes.as_bytes());
    if computed_crc != stored_crc {
        return Err(format!(
            "crc32 mismatch: computed {:08x}, stored {:08x}",
            computed_crc, stored_crc
        ));
    }

    Ok(())
}
