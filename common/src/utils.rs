use anyhow::{Context, Result};
use bytes::Bytes;

/// Decode UTF-8 bytes into an owned string.
pub fn string_from_bytes(bytes: Bytes) -> Result<String> {
    String::from_utf8(bytes.to_vec()).context("bytes are not valid UTF-8")
}
