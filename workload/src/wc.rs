//! Word count: the canonical MapReduce application.
//!
//! Map splits the input into alphabetic words and emits `(word, "1")`;
//! reduce sums the ones.

use anyhow::Result;
use bytes::Bytes;

use common::utils::string_from_bytes;
use common::{KeyValue, MapOutput};

pub fn map(kv: KeyValue, _aux: Bytes) -> MapOutput {
    let contents = string_from_bytes(kv.value)?;

    let words: Vec<String> = contents
        .split(|c: char| !c.is_alphabetic())
        .filter(|word| !word.is_empty())
        .map(str::to_owned)
        .collect();

    let iter = words
        .into_iter()
        .map(|word| Ok(KeyValue::new(Bytes::from(word), Bytes::from("1"))));
    Ok(Box::new(iter))
}

pub fn reduce(
    _key: Bytes,
    values: Box<dyn Iterator<Item = Bytes> + '_>,
    _aux: Bytes,
) -> Result<Bytes> {
    let mut count = 0u64;
    for value in values {
        count += string_from_bytes(value)?.parse::<u64>()?;
    }
    Ok(Bytes::from(count.to_string()))
}
