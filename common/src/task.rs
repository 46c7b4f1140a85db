//! Task descriptors shared by the coordinator and workers.

use std::fmt;

/// The two kinds of work a worker can be handed.
///
/// Closed set: every dispatch site matches exhaustively, so a new kind is a
/// compile-time-visible change on both sides of the RPC surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Map,
    Reduce,
}

/// Everything a worker needs to execute one unit of work.
///
/// Immutable once issued; the worker echoes it back verbatim when it
/// reports completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDescriptor {
    pub kind: TaskKind,

    /// 1-based index of the input split. Names the intermediate blobs a map
    /// task writes; zero for reduce tasks.
    pub map_index: u32,

    /// The partition a reduce task consumes, in `0..n_reduce`. Zero for map
    /// tasks.
    pub reduce_bucket: u32,

    /// Source file path for a map task. Empty for reduce tasks, whose input
    /// is implied by `reduce_bucket` and `n_map`.
    pub input: String,

    /// Total reduce buckets (R): the fan-out of every map task.
    pub n_reduce: u32,

    /// Total map tasks (M): the fan-in of every reduce task.
    pub n_map: u32,
}

impl TaskDescriptor {
    /// Descriptor for the map task over the `map_index`-th input split.
    pub fn map(map_index: u32, input: String, n_reduce: u32, n_map: u32) -> Self {
        Self {
            kind: TaskKind::Map,
            map_index,
            reduce_bucket: 0,
            input,
            n_reduce,
            n_map,
        }
    }

    /// Descriptor for the reduce task over one bucket.
    pub fn reduce(reduce_bucket: u32, n_reduce: u32, n_map: u32) -> Self {
        Self {
            kind: TaskKind::Reduce,
            map_index: 0,
            reduce_bucket,
            input: String::new(),
            n_reduce,
            n_map,
        }
    }
}

impl fmt::Display for TaskDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TaskKind::Map => write!(f, "map #{} ({})", self.map_index, self.input),
            TaskKind::Reduce => write!(f, "reduce #{}", self.reduce_bucket),
        }
    }
}
