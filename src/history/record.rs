//! Versioned binary framing for persisted probe results.
//!
//! Each record on disk is `[u32 body_len][u32 crc32(body)][body]` where the
//! body is `[u16 record_version][bincode payload]`. The version tag precedes
//! the payload so older on-disk formats stay readable after the in-memory
//! shape changes; a version this build does not know fails the open with a
//! diagnostic instead of silently dropping data.

use crate::ProbeResult;

use super::error::{HistoryError, HistoryResult};

/// Magic bytes at the start of every history file.
pub const FILE_MAGIC: [u8; 4] = *b"VHIS";

/// Current file header version.
pub const FILE_VERSION: u16 = 1;

/// Current record body version.
pub const RECORD_VERSION: u16 = 1;

/// Size of the per-record frame header (length + checksum).
pub const FRAME_HEADER_LEN: usize = 8;

/// Size of the file header (magic + version).
pub const FILE_HEADER_LEN: usize = 6;

/// Encode a result into a framed record ready for appending.
pub fn encode_record(result: &ProbeResult) -> HistoryResult<Vec<u8>> {
    let payload = bincode::serialize(result)?;

    let mut body = Vec::with_capacity(2 + payload.len());
    body.extend_from_slice(&RECORD_VERSION.to_le_bytes());
    body.extend_from_slice(&payload);

    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
    frame.extend_from_slice(&crc32(&body).to_le_bytes());
    frame.extend_from_slice(&body);

    Ok(frame)
}

/// Decode a record body whose checksum has already been verified.
pub fn decode_record(body: &[u8]) -> HistoryResult<ProbeResult> {
    if body.len() < 2 {
        return Err(HistoryError::Corrupt("record body too short".to_string()));
    }

    let version = u16::from_le_bytes([body[0], body[1]]);
    if version != RECORD_VERSION {
        return Err(HistoryError::UnsupportedVersion(version));
    }

    Ok(bincode::deserialize(&body[2..])?)
}

/// Encode the file header.
pub fn file_header() -> [u8; FILE_HEADER_LEN] {
    let mut header = [0u8; FILE_HEADER_LEN];
    header[..4].copy_from_slice(&FILE_MAGIC);
    header[4..].copy_from_slice(&FILE_VERSION.to_le_bytes());
    header
}

/// Validate a file header, returning the version it carries.
pub fn check_file_header(header: &[u8]) -> HistoryResult<u16> {
    if header.len() < FILE_HEADER_LEN || header[..4] != FILE_MAGIC {
        return Err(HistoryError::Corrupt(
            "missing history file magic".to_string(),
        ));
    }

    let version = u16::from_le_bytes([header[4], header[5]]);
    if version != FILE_VERSION {
        return Err(HistoryError::UnsupportedVersion(version));
    }

    Ok(version)
}

/// CRC32 (IEEE) over a byte slice.
pub fn crc32(data: &[u8]) -> u32 {
    let mut hash: u32 = 0xFFFF_FFFF;
    for byte in data {
        hash ^= *byte as u32;
        for _ in 0..8 {
            if hash & 1 != 0 {
                hash = (hash >> 1) ^ 0xEDB8_8320;
            } else {
                hash >>= 1;
            }
        }
    }
    !hash
}
