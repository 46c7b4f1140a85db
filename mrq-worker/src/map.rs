//! Map task execution.

use std::fs;

use anyhow::{Context, Result};
use bytes::Bytes;
use tracing::{debug, info};

use common::store::Store;
use common::task::TaskDescriptor;
use common::{bucket_of, codec, KeyValue, Workload};

/// Run one map task: read the input split, apply the map function,
/// partition the pairs into reduce buckets by key hash, and publish one
/// intermediate blob per non-empty bucket.
///
/// An unreadable input is fatal to this worker; the task itself is
/// recovered by the coordinator reassigning it once the lease lapses.
pub fn perform_map(
    descriptor: &TaskDescriptor,
    store: &Store,
    workload: &Workload,
    aux: &Bytes,
) -> Result<()> {
    info!(task = %descriptor, "starting map task");

    let contents = fs::read_to_string(&descriptor.input)
        .with_context(|| format!("cannot read map input {}", descriptor.input))?;
    let input = KeyValue::new(
        Bytes::from(descriptor.input.clone()),
        Bytes::from(contents),
    );

    let pairs = (workload.map_fn)(input, aux.clone())?;

    let mut buckets: Vec<Vec<KeyValue>> = vec![Vec::new(); descriptor.n_reduce as usize];
    for pair in pairs {
        let pair = pair?;
        buckets[bucket_of(&pair.key, descriptor.n_reduce) as usize].push(pair);
    }

    for (bucket, pairs) in buckets.iter().enumerate() {
        if pairs.is_empty() {
            continue;
        }
        let blob = codec::encode_pairs(pairs);
        store.put_intermediate(descriptor.map_index, bucket as u32, blob.as_bytes())?;
        debug!(bucket, pairs = pairs.len(), "intermediate blob published");
    }

    Ok(())
}
