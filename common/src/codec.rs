//! Line codec for intermediate key-value blobs.
//!
//! One pair per line, key and value each URL-safe base64 so that spaces,
//! newlines and arbitrary bytes in either side survive the round trip.

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use bytes::Bytes;

use crate::KeyValue;

/// Encode a single pair as one line (no trailing newline).
pub fn encode_pair(kv: &KeyValue) -> String {
    format!("{} {}", URL_SAFE.encode(&kv.key), URL_SAFE.encode(&kv.value))
}

/// Encode a batch of pairs as a newline-terminated blob.
pub fn encode_pairs<'a>(pairs: impl IntoIterator<Item = &'a KeyValue>) -> String {
    let mut blob = String::new();
    for kv in pairs {
        blob.push_str(&encode_pair(kv));
        blob.push('\n');
    }
    blob
}

/// Decode one line produced by [`encode_pair`].
pub fn decode_pair(line: &str) -> Result<KeyValue> {
    let (key, value) = line
        .split_once(' ')
        .ok_or_else(|| anyhow!("malformed pair line: {line:?}"))?;
    let key = URL_SAFE
        .decode(key)
        .with_context(|| format!("bad key encoding in line {line:?}"))?;
    let value = URL_SAFE
        .decode(value)
        .with_context(|| format!("bad value encoding in line {line:?}"))?;
    Ok(KeyValue::new(Bytes::from(key), Bytes::from(value)))
}

/// Decode a whole blob, skipping blank lines.
pub fn decode_pairs(blob: &str) -> Result<Vec<KeyValue>> {
    blob.lines()
        .filter(|line| !line.is_empty())
        .map(decode_pair)
        .collect()
}
