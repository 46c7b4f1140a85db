//! Named MapReduce applications a worker can execute.

use common::Workload;

pub mod vertex_degree;
pub mod wc;

/// Look up a workload by the name given on the worker command line.
pub fn try_named(name: &str) -> Option<Workload> {
    match name {
        "wc" => Some(Workload {
            map_fn: wc::map,
            reduce_fn: wc::reduce,
        }),
        "vertex-degree" => Some(Workload {
            map_fn: vertex_degree::map,
            reduce_fn: vertex_degree::reduce,
        }),
        _ => None,
    }
}
