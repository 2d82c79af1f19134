//! On-disk record framing. Records are self-describing: the key rides in the
//! header so the access index can be rebuilt by scanning the storage root,
//! and a checksum catches torn or tampered files.
//!
//! Layout, little-endian: `magic u32 | key_len u32 | crc32(key + payload) u32
//! | key bytes | payload bytes`. The payload runs to end of file.

use crate::errors::CacheError;
use std::fs::File;
use std::io::Read;
use std::path::Path;

const MAGIC: u32 = 0x5443_4152; // "TCAR"
const HEADER_LEN: usize = 12;

pub fn encode(key: &str, payload: &[u8]) -> Vec<u8> {
    let key_bytes = key.as_bytes();
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(key_bytes);
    hasher.update(payload);
    let crc = hasher.finalize();

    let mut out = Vec::with_capacity(HEADER_LEN + key_bytes.len() + payload.len());
    out.extend_from_slice(&MAGIC.to_le_bytes());
    out.extend_from_slice(&u32::try_from(key_bytes.len()).unwrap_or(u32::MAX).to_le_bytes());
    out.extend_from_slice(&crc.to_le_bytes());
    out.extend_from_slice(key_bytes);
    out.extend_from_slice(payload);
    out
}

/// Decode a full record into its key and payload, verifying the checksum.
///
/// # Errors
/// Returns `CacheError::Corrupt` when the magic, lengths, key encoding, or
/// checksum do not hold.
pub fn decode(data: &[u8]) -> Result<(String, Vec<u8>), CacheError> {
    if data.len() < HEADER_LEN {
        return Err(CacheError::Corrupt("record shorter than header".into()));
    }
    let magic = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
    if magic != MAGIC {
        return Err(CacheError::Corrupt(format!("bad magic {magic:#010x}")));
    }
    let key_len = u32::from_le_bytes([data[4], data[5], data[6], data[7]]) as usize;
    let crc = u32::from_le_bytes([data[8], data[9], data[10], data[11]]);
    let body = &data[HEADER_LEN..];
    if key_len > body.len() {
        return Err(CacheError::Corrupt(format!("key length {key_len} exceeds record body")));
    }
    let (key_bytes, payload) = body.split_at(key_len);

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(key_bytes);
    hasher.update(payload);
    if hasher.finalize() != crc {
        return Err(CacheError::Corrupt("checksum mismatch".into()));
    }

    let key = String::from_utf8(key_bytes.to_vec())
        .map_err(|_| CacheError::Corrupt("key is not valid UTF-8".into()))?;
    Ok((key, payload.to_vec()))
}

/// Parse only the header and key of the record at `path`. Used by the
/// open-time scan, which does not need the payload.
///
/// # Errors
/// Returns an error on I/O failure or an unparsable header; the checksum is
/// not verified here, a later read does that.
pub fn read_key(path: &Path) -> Result<String, CacheError> {
    let mut file = File::open(path)?;
    let mut header = [0u8; HEADER_LEN];
    file.read_exact(&mut header)
        .map_err(|_| CacheError::Corrupt("record shorter than header".into()))?;
    let magic = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    if magic != MAGIC {
        return Err(CacheError::Corrupt(format!("bad magic {magic:#010x}")));
    }
    let key_len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
    let file_len = file.metadata()?.len();
    if (key_len as u64) > file_len.saturating_sub(HEADER_LEN as u64) {
        return Err(CacheError::Corrupt(format!("key length {key_len} exceeds record body")));
    }
    let mut key_bytes = vec![0u8; key_len];
    file.read_exact(&mut key_bytes)
        .map_err(|_| CacheError::Corrupt("record truncated inside key".into()))?;
    String::from_utf8(key_bytes).map_err(|_| CacheError::Corrupt("key is not valid UTF-8".into()))
}
