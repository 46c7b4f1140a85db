//! The worker execution loop.
//!
//! Workers are stateless between tasks: request, execute, report, repeat.
//! Recovery from a crashed or stalled worker is the coordinator's job
//! (lease expiry), never this loop's, so any transport failure here is
//! fatal to the process.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use bytes::Bytes;
use rand::Rng;
use tonic::Request;
use tracing::{debug, info};

//
// Import gRPC stubs/definitions.
//
pub use coordinator::coordinator_client::CoordinatorClient;
use coordinator::{request_task_response, ReportCompletionRequest, RequestTaskRequest};
pub mod coordinator {
    tonic::include_proto!("coordinator");
}

use common::store::Store;
use common::task::{TaskDescriptor, TaskKind};
use common::Workload;

use crate::args::Args;
use crate::{map, reduce};

/// Base delay before asking again after a "no task available" reply.
const WAIT_BACKOFF: Duration = Duration::from_millis(500);

pub async fn run(args: Args) -> Result<()> {
    let workload = workload::try_named(&args.workload)
        .ok_or_else(|| anyhow!("`{}` is not a known workload", args.workload))?;
    let aux = Bytes::from(args.args.join(" "));
    let store = Store::new(&args.store);

    let mut client = CoordinatorClient::connect(args.address.clone())
        .await
        .with_context(|| format!("cannot reach coordinator at {}", args.address))?;
    info!("worker joined coordinator at {}", args.address);

    loop {
        let response = client
            .request_task(Request::new(RequestTaskRequest {}))
            .await
            .context("task request failed")?
            .into_inner();

        match response.assignment {
            Some(request_task_response::Assignment::Task(task)) => {
                let descriptor = descriptor_from_wire(task)?;
                execute(&descriptor, &store, &workload, &aux)?;
                client
                    .report_completion(Request::new(ReportCompletionRequest {
                        task: Some(descriptor_to_wire(&descriptor)),
                    }))
                    .await
                    .context("completion report failed")?;
            }
            Some(request_task_response::Assignment::Wait(_)) => {
                // Jittered so a fleet of idle workers does not poll in
                // lockstep.
                let jitter = rand::thread_rng().gen_range(0..WAIT_BACKOFF.as_millis() as u64);
                debug!("no task available; backing off");
                tokio::time::sleep(WAIT_BACKOFF + Duration::from_millis(jitter)).await;
            }
            Some(request_task_response::Assignment::Exit(_)) => {
                info!("job done; worker exiting");
                return Ok(());
            }
            None => bail!("coordinator reply carried no assignment"),
        }
    }
}

fn execute(
    descriptor: &TaskDescriptor,
    store: &Store,
    workload: &Workload,
    aux: &Bytes,
) -> Result<()> {
    match descriptor.kind {
        TaskKind::Map => map::perform_map(descriptor, store, workload, aux),
        TaskKind::Reduce => reduce::perform_reduce(descriptor, store, workload, aux),
    }
}

fn descriptor_from_wire(task: coordinator::TaskDescriptor) -> Result<TaskDescriptor> {
    let kind = match coordinator::TaskKind::try_from(task.kind) {
        Ok(coordinator::TaskKind::Map) => TaskKind::Map,
        Ok(coordinator::TaskKind::Reduce) => TaskKind::Reduce,
        // A kind this worker does not know about means the coordinator is
        // from a different era; executing anyway could corrupt outputs.
        Err(_) => bail!("coordinator sent unknown task kind {}", task.kind),
    };
    Ok(TaskDescriptor {
        kind,
        map_index: task.map_index,
        reduce_bucket: task.reduce_bucket,
        input: task.input,
        n_reduce: task.n_reduce,
        n_map: task.n_map,
    })
}

fn descriptor_to_wire(descriptor: &TaskDescriptor) -> coordinator::TaskDescriptor {
    coordinator::TaskDescriptor {
        kind: match descriptor.kind {
            TaskKind::Map => coordinator::TaskKind::Map,
            TaskKind::Reduce => coordinator::TaskKind::Reduce,
        } as i32,
        map_index: descriptor.map_index,
        reduce_bucket: descriptor.reduce_bucket,
        input: descriptor.input.clone(),
        n_reduce: descriptor.n_reduce,
        n_map: descriptor.n_map,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_round_trip_preserves_the_descriptor() {
        let map = TaskDescriptor::map(2, "b.txt".into(), 4, 3);
        assert_eq!(descriptor_from_wire(descriptor_to_wire(&map)).unwrap(), map);

        let reduce = TaskDescriptor::reduce(3, 4, 3);
        assert_eq!(
            descriptor_from_wire(descriptor_to_wire(&reduce)).unwrap(),
            reduce
        );
    }

    #[test]
    fn unknown_wire_kind_is_rejected() {
        let mut wire = descriptor_to_wire(&TaskDescriptor::map(1, "a.txt".into(), 1, 1));
        wire.kind = 42;
        assert!(descriptor_from_wire(wire).is_err());
    }
}
