//! Minimal binary glTF (GLB) container.
//!
//! Only the JSON chunk is produced, which is enough for a structurally valid
//! asset that records document statistics. Layout (little-endian):
//!
//! ```text
//! +-------+---------+--------+   +--------------+------------+-------------+
//! | magic | version | length |   | chunk length | chunk type | JSON (pad)  |
//! | glTF  |    2    |  u32   |   |     u32      |   "JSON"   | space-padded|
//! +-------+---------+--------+   +--------------+------------+-------------+
//! ```

use serde_json::Value;
use std::io::{self, Write};

const MAGIC: &[u8; 4] = b"glTF";
const VERSION: u32 = 2;
const CHUNK_JSON: &[u8; 4] = b"JSON";
const HEADER_LEN: usize = 12;
const CHUNK_HEADER_LEN: usize = 8;

/// Encodes `document` as a single-chunk GLB.
pub fn encode(document: &Value) -> Result<Vec<u8>, serde_json::Error> {
    let mut json = serde_json::to_vec(document)?;
    while json.len() % 4 != 0 {
        json.push(b' ');
    }

    let total = HEADER_LEN + CHUNK_HEADER_LEN + json.len();
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.extend_from_slice(&(total as u32).to_le_bytes());
    out.extend_from_slice(&(json.len() as u32).to_le_bytes());
    out.extend_from_slice(CHUNK_JSON);
    out.extend_from_slice(&json);
    Ok(out)
}

/// Writes `document` as a GLB to `writer`.
pub fn write<W: Write>(writer: &mut W, document: &Value) -> io::Result<()> {
    let bytes = encode(document).map_err(io::Error::other)?;
    writer.write_all(&bytes)
}

/// Extracts the JSON chunk from a GLB, or `None` if the bytes are not one.
pub fn decode_json(bytes: &[u8]) -> Option<Value> {
    if bytes.len() < HEADER_LEN + CHUNK_HEADER_LEN || &bytes[0..4] != MAGIC {
        return None;
    }
    let declared = u32::from_le_bytes(bytes[8..12].try_into().ok()?) as usize;
    if declared != bytes.len() {
        return None;
    }
    let chunk_len = u32::from_le_bytes(bytes[12..16].try_into().ok()?) as usize;
    if &bytes[16..20] != CHUNK_JSON {
        return None;
    }
    let chunk = bytes.get(20..20 + chunk_len)?;
    serde_json::from_slice(chunk).ok()
}
