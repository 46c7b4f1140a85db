//! The intermediate exchange: a blob store over a directory on shared
//! storage that every worker can reach.
//!
//! This is the only mutable resource crossing worker boundaries. There is
//! no lock on it: a task re-executed after a false lease expiry produces
//! byte-identical blobs, every publish is write-to-scratch-then-rename, and
//! whichever rename lands last wins.
//!
//! Naming is fixed for interop: intermediate blobs are `mr-{map}-{bucket}`,
//! final outputs are `mr-out-{bucket}`.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use tracing::debug;

static SCRATCH_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Name of the intermediate blob mapper `map_index` writes for `bucket`.
    pub fn intermediate_name(map_index: u32, bucket: u32) -> String {
        format!("mr-{map_index}-{bucket}")
    }

    /// Name of the final output file for `bucket`.
    pub fn output_name(bucket: u32) -> String {
        format!("mr-out-{bucket}")
    }

    /// Atomically publish one mapper's pairs for one bucket.
    pub fn put_intermediate(&self, map_index: u32, bucket: u32, contents: &[u8]) -> Result<()> {
        self.publish(&Self::intermediate_name(map_index, bucket), contents)
    }

    /// Read one mapper's blob for one bucket. `None` means that mapper
    /// produced nothing for the bucket, which is not an error.
    pub fn read_intermediate(&self, map_index: u32, bucket: u32) -> Result<Option<String>> {
        let path = self.root.join(Self::intermediate_name(map_index, bucket));
        match fs::read_to_string(&path) {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("cannot read {}", path.display())),
        }
    }

    /// Atomically publish the final output file for one bucket.
    pub fn publish_output(&self, bucket: u32, contents: &[u8]) -> Result<()> {
        self.publish(&Self::output_name(bucket), contents)
    }

    /// Write under a scratch name, then rename into place. A concurrent
    /// reader either sees the previous complete blob or the new complete
    /// blob, never a partial write. The scratch name embeds pid + sequence
    /// so two workers never collide on it.
    fn publish(&self, name: &str, contents: &[u8]) -> Result<()> {
        let scratch = self.root.join(format!(
            ".{name}.tmp-{}-{}",
            process::id(),
            SCRATCH_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        let path = self.root.join(name);

        fs::write(&scratch, contents)
            .with_context(|| format!("cannot write scratch file {}", scratch.display()))?;
        fs::rename(&scratch, &path)
            .with_context(|| format!("cannot publish {}", path.display()))?;

        debug!(blob = name, bytes = contents.len(), "published");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn naming_is_bit_exact() {
        assert_eq!(Store::intermediate_name(3, 1), "mr-3-1");
        assert_eq!(Store::intermediate_name(12, 0), "mr-12-0");
        assert_eq!(Store::output_name(2), "mr-out-2");
    }

    #[test]
    fn absent_blob_reads_as_none() {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path());
        assert_eq!(store.read_intermediate(1, 0).unwrap(), None);
    }

    #[test]
    fn publish_leaves_no_scratch_files_and_overwrites_cleanly() {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path());

        store.put_intermediate(1, 0, b"first").unwrap();
        store.put_intermediate(1, 0, b"second").unwrap();
        assert_eq!(
            store.read_intermediate(1, 0).unwrap().as_deref(),
            Some("second")
        );

        let entries: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(entries, vec!["mr-1-0".to_string()]);
    }

    #[test]
    fn outputs_and_intermediates_do_not_collide() {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path());
        store.put_intermediate(1, 0, b"pairs").unwrap();
        store.publish_output(0, b"lines").unwrap();
        assert_eq!(
            store.read_intermediate(1, 0).unwrap().as_deref(),
            Some("pairs")
        );
        assert_eq!(
            fs::read_to_string(dir.path().join(Store::output_name(0))).unwrap(),
            "lines"
        );
    }
}
