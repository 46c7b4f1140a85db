//! Reduce task execution.

use std::collections::BTreeMap;

use anyhow::Result;
use bytes::Bytes;
use tracing::{debug, info};

use common::store::Store;
use common::task::TaskDescriptor;
use common::utils::string_from_bytes;
use common::{codec, Workload};

/// Run one reduce task: pull every mapper's blob for this bucket, group
/// values by key, apply the reduce function once per distinct key, and
/// publish the bucket's output file in a single atomic step.
pub fn perform_reduce(
    descriptor: &TaskDescriptor,
    store: &Store,
    workload: &Workload,
    aux: &Bytes,
) -> Result<()> {
    info!(task = %descriptor, "starting reduce task");

    let bucket = descriptor.reduce_bucket;
    let mut groups: BTreeMap<Bytes, Vec<Bytes>> = BTreeMap::new();

    for map_index in 1..=descriptor.n_map {
        // A mapper that produced nothing for this bucket wrote no blob.
        let Some(blob) = store.read_intermediate(map_index, bucket)? else {
            continue;
        };
        for pair in codec::decode_pairs(&blob)? {
            groups.entry(pair.key).or_default().push(pair.value);
        }
    }
    debug!(bucket, keys = groups.len(), "intermediate pairs grouped");

    let mut output = String::new();
    for (key, values) in &groups {
        let reduced = (workload.reduce_fn)(
            key.clone(),
            Box::new(values.iter().cloned()),
            aux.clone(),
        )?;
        output.push_str(&format!(
            "{} {}\n",
            string_from_bytes(key.clone())?,
            string_from_bytes(reduced)?
        ));
    }

    store.publish_output(bucket, output.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;

    use tempfile::tempdir;

    use common::{bucket_of, KeyValue};

    use crate::map::perform_map;

    fn wc() -> Workload {
        workload::try_named("wc").unwrap()
    }

    fn pairs(entries: &[(&str, &str)]) -> String {
        let pairs: Vec<KeyValue> = entries
            .iter()
            .map(|(k, v)| KeyValue::new(Bytes::from(k.to_string()), Bytes::from(v.to_string())))
            .collect();
        codec::encode_pairs(&pairs)
    }

    fn read_output(store_dir: &std::path::Path, bucket: u32) -> HashMap<String, u64> {
        let contents = fs::read_to_string(store_dir.join(Store::output_name(bucket))).unwrap();
        contents
            .lines()
            .map(|line| {
                let (key, value) = line.split_once(' ').unwrap();
                (key.to_owned(), value.parse().unwrap())
            })
            .collect()
    }

    #[test]
    fn groups_across_mappers_and_tolerates_missing_blobs() {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path());

        // Mappers 1 and 3 contributed to bucket 0; mapper 2 produced
        // nothing for it.
        store
            .put_intermediate(1, 0, pairs(&[("a", "1"), ("b", "1")]).as_bytes())
            .unwrap();
        store
            .put_intermediate(3, 0, pairs(&[("a", "1")]).as_bytes())
            .unwrap();

        let descriptor = TaskDescriptor::reduce(0, 1, 3);
        perform_reduce(&descriptor, &store, &wc(), &Bytes::new()).unwrap();

        let output = read_output(dir.path(), 0);
        assert_eq!(output, HashMap::from([("a".into(), 2), ("b".into(), 1)]));
    }

    #[test]
    fn republishing_overwrites_instead_of_appending() {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path());
        store
            .put_intermediate(1, 0, pairs(&[("a", "1")]).as_bytes())
            .unwrap();

        let descriptor = TaskDescriptor::reduce(0, 1, 1);
        // A duplicate in-flight execution after a false lease expiry runs
        // the same task twice; the output must stay byte-identical.
        perform_reduce(&descriptor, &store, &wc(), &Bytes::new()).unwrap();
        perform_reduce(&descriptor, &store, &wc(), &Bytes::new()).unwrap();

        assert_eq!(read_output(dir.path(), 0), HashMap::from([("a".into(), 1)]));
    }

    #[test]
    fn wordcount_end_to_end_two_mappers_two_buckets() {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path());

        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        fs::write(&a, "the quick brown fox").unwrap();
        fs::write(&b, "the lazy dog the end").unwrap();

        for (map_index, input) in [(1u32, &a), (2u32, &b)] {
            let descriptor =
                TaskDescriptor::map(map_index, input.to_string_lossy().into_owned(), 2, 2);
            perform_map(&descriptor, &store, &wc(), &Bytes::new()).unwrap();
        }
        for bucket in 0..2 {
            let descriptor = TaskDescriptor::reduce(bucket, 2, 2);
            perform_reduce(&descriptor, &store, &wc(), &Bytes::new()).unwrap();
        }

        let out0 = read_output(dir.path(), 0);
        let out1 = read_output(dir.path(), 1);

        // No word appears in both outputs, and every word sits in the
        // output of the bucket its key hashes to.
        for key in out0.keys() {
            assert!(!out1.contains_key(key));
            assert_eq!(bucket_of(key.as_bytes(), 2), 0);
        }
        for key in out1.keys() {
            assert_eq!(bucket_of(key.as_bytes(), 2), 1);
        }

        let mut combined = out0;
        combined.extend(out1);
        let expected = HashMap::from([
            ("the".to_string(), 3),
            ("quick".to_string(), 1),
            ("brown".to_string(), 1),
            ("fox".to_string(), 1),
            ("lazy".to_string(), 1),
            ("dog".to_string(), 1),
            ("end".to_string(), 1),
        ]);
        assert_eq!(combined, expected);
    }
}
