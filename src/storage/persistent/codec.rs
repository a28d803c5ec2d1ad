//! Framing for log entries.
//!
//! Every entry is JSON wrapped in a small binary frame:
//!
//! ```text
//! [version: 1 byte][length: 4 bytes LE][data: N bytes JSON][crc32: 4 bytes LE]
//! ```
//!
//! Files start with `[magic: 4 bytes][version: 1 byte]`.

use std::io::{Error as IoError, ErrorKind, Read, Result as IoResult, Write};

use crc32fast::Hasher;
use serde::{de::DeserializeOwned, Serialize};

/// Current frame version.
pub const CODEC_VERSION: u8 = 1;

/// Magic bytes at the start of every Craftable log file.
pub const MAGIC: [u8; 4] = *b"CRAF";

/// Length of the file header.
pub const HEADER_LEN: u64 = 5;

/// Upper bound on a single entry. Larger lengths mean a corrupt frame.
pub const MAX_ENTRY_SIZE: usize = 64 * 1024 * 1024;

fn invalid(message: String) -> IoError {
    IoError::new(ErrorKind::InvalidData, message)
}

/// Serialize `value` into one frame.
pub fn encode<T: Serialize>(value: &T) -> IoResult<Vec<u8>> {
    let data = serde_json::to_vec(value).map_err(|e| invalid(format!("serialization failed: {e}")))?;
    let len = u32::try_from(data.len())
        .ok()
        .filter(|len| (*len as usize) <= MAX_ENTRY_SIZE)
        .ok_or_else(|| invalid(format!("entry size {} exceeds maximum {MAX_ENTRY_SIZE}", data.len())))?;

    let mut hasher = Hasher::new();
    hasher.update(&data);
    let crc = hasher.finalize();

    let mut out = Vec::with_capacity(1 + 4 + data.len() + 4);
    out.push(CODEC_VERSION);
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&data);
    out.extend_from_slice(&crc.to_le_bytes());
    Ok(out)
}

/// Read one frame and deserialize it, verifying the checksum.
///
/// A clean end of input surfaces as `ErrorKind::UnexpectedEof`.
///
/// # Errors
/// `InvalidData` for an unknown version, an oversized length, a checksum
/// mismatch or undecodable JSON.
pub fn decode<T: DeserializeOwned>(reader: &mut impl Read) -> IoResult<T> {
    let mut version = [0u8; 1];
    reader.read_exact(&mut version)?;
    if version[0] != CODEC_VERSION {
        return Err(invalid(format!(
            "unsupported codec version: {} (expected {CODEC_VERSION})",
            version[0]
        )));
    }

    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes)?;
    let len = u32::from_le_bytes(len_bytes) as usize;
    if len > MAX_ENTRY_SIZE {
        return Err(invalid(format!("entry size {len} exceeds maximum {MAX_ENTRY_SIZE}")));
    }

    let mut data = vec![0u8; len];
    reader.read_exact(&mut data)?;

    let mut crc_bytes = [0u8; 4];
    reader.read_exact(&mut crc_bytes)?;
    let stored_crc = u32::from_le_bytes(crc_bytes);

    let mut hasher = Hasher::new();
    hasher.update(&data);
    let computed_crc = hasher.finalize();
    if stored_crc != computed_crc {
        return Err(invalid(format!(
            "CRC mismatch: stored={stored_crc:08x}, computed={computed_crc:08x}"
        )));
    }

    serde_json::from_slice(&data).map_err(|e| invalid(format!("deserialization failed: {e}")))
}

/// Write the file header.
pub fn write_header(writer: &mut impl Write) -> IoResult<()> {
    writer.write_all(&MAGIC)?;
    writer.write_all(&[CODEC_VERSION])
}

/// Read and check the file header, returning its version byte.
pub fn read_header(reader: &mut impl Read) -> IoResult<u8> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(invalid(format!("invalid magic bytes: expected {MAGIC:?}, got {magic:?}")));
    }

    let mut version = [0u8; 1];
    reader.read_exact(&mut version)?;
    if version[0] != CODEC_VERSION {
        return Err(invalid(format!("unsupported file version: {}", version[0])));
    }
    Ok(version[0])
}
