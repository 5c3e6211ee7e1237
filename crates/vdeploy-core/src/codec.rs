//! Compression for manifest text stored inside the status record
//!
//! Text is gzip compressed and base64 encoded so large manifests stay well
//! below the size limits of a single annotation.

use base64::Engine as _;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::io::{Read, Write};

use crate::error::{CoreError, Result};

/// Compress text for storage; empty text stays empty
pub fn compress(text: &str) -> Result<String> {
    if text.is_empty() {
        return Ok(String::new());
    }

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes())?;
    let compressed = encoder.finish()?;
    Ok(base64::engine::general_purpose::STANDARD.encode(compressed))
}

/// Reverse of [`compress`]
pub fn decompress(data: &str) -> Result<String> {
    if data.is_empty() {
        return Ok(String::new());
    }

    let decoded = base64::engine::general_purpose::STANDARD
        .decode(data.trim())
        .map_err(|e| CoreError::Encoding {
            message: format!("base64 decode error: {}", e),
        })?;

    let mut decoder = GzDecoder::new(decoded.as_slice());
    let mut text = String::new();
    decoder
        .read_to_string(&mut text)
        .map_err(|e| CoreError::Encoding {
            message: format!("gzip decode error: {}", e),
        })?;
    Ok(text)
}
