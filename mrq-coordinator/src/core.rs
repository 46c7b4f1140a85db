//! gRPC surface of the coordinator.
//!
//! One registry behind one mutex is the whole concurrency story: every
//! worker call and every lease-timer firing serializes through it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tonic::{Request, Response, Status};
use tracing::{debug, warn};

//
// Import gRPC stubs/definitions.
//
pub use coordinator::coordinator_server::{Coordinator, CoordinatorServer};
use coordinator::{
    request_task_response, ReportCompletionRequest, ReportCompletionResponse, RequestTaskRequest,
    RequestTaskResponse,
};
pub mod coordinator {
    tonic::include_proto!("coordinator");
}

use common::task::{TaskDescriptor, TaskKind};

use crate::registry::{Assignment, Completion, Registry};

#[derive(Debug, Clone)]
pub struct MRCoordinator {
    registry: Arc<Mutex<Registry>>,
    lease: Duration,
}

impl MRCoordinator {
    pub fn new(registry: Registry) -> Self {
        let lease = registry.lease();
        Self {
            registry: Arc::new(Mutex::new(registry)),
            lease,
        }
    }

    /// Non-blocking poll for the driver loop.
    pub async fn is_done(&self) -> bool {
        self.registry.lock().await.is_done()
    }

    /// Arm the lease timer for a freshly dispatched task. The timer only
    /// requeues the task if it is still in progress with a lapsed deadline
    /// when it fires; completed or re-leased tasks make it a no-op.
    fn arm_lease_timer(&self, descriptor: TaskDescriptor) {
        let registry = Arc::clone(&self.registry);
        let lease = self.lease;
        tokio::spawn(async move {
            tokio::time::sleep(lease).await;
            registry.lock().await.reclaim(&descriptor, Instant::now());
        });
    }
}

#[tonic::async_trait]
impl Coordinator for MRCoordinator {
    async fn request_task(
        &self,
        request: Request<RequestTaskRequest>,
    ) -> Result<Response<RequestTaskResponse>, Status> {
        debug!("task request from {:?}", request.remote_addr());

        let assignment = {
            let mut registry = self.registry.lock().await;
            registry.assign(Instant::now())
        };

        let assignment = match assignment {
            Assignment::Task(descriptor) => {
                self.arm_lease_timer(descriptor.clone());
                request_task_response::Assignment::Task(descriptor_to_wire(&descriptor))
            }
            Assignment::Wait => {
                request_task_response::Assignment::Wait(coordinator::NoTaskAvailable {})
            }
            Assignment::Exit => request_task_response::Assignment::Exit(coordinator::JobDone {}),
        };

        Ok(Response::new(RequestTaskResponse {
            assignment: Some(assignment),
        }))
    }

    async fn report_completion(
        &self,
        request: Request<ReportCompletionRequest>,
    ) -> Result<Response<ReportCompletionResponse>, Status> {
        let task = request
            .into_inner()
            .task
            .ok_or_else(|| Status::invalid_argument("completion carried no task descriptor"))?;
        let descriptor = descriptor_from_wire(task)?;

        let outcome = {
            let mut registry = self.registry.lock().await;
            registry
                .complete(&descriptor)
                .map_err(|e| Status::invalid_argument(e.to_string()))?
        };
        match outcome {
            Completion::Recorded => debug!(task = %descriptor, "completion recorded"),
            Completion::Duplicate => debug!(task = %descriptor, "duplicate completion ignored"),
            Completion::Stale => warn!(task = %descriptor, "completion for an already-passed phase"),
        }

        Ok(Response::new(ReportCompletionResponse {}))
    }
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

fn descriptor_from_wire(task: coordinator::TaskDescriptor) -> Result<TaskDescriptor, Status> {
    let kind = match coordinator::TaskKind::try_from(task.kind) {
        Ok(coordinator::TaskKind::Map) => TaskKind::Map,
        Ok(coordinator::TaskKind::Reduce) => TaskKind::Reduce,
        Err(_) => {
            return Err(Status::invalid_argument(format!(
                "unknown task kind {}",
                task.kind
            )))
        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;

    const LEASE: Duration = Duration::from_secs(10);

    fn coordinator(files: &[&str], n_reduce: u32) -> MRCoordinator {
        MRCoordinator::new(Registry::new(
            files.iter().map(|f| f.to_string()).collect(),
            n_reduce,
            LEASE,
        ))
    }

    async fn request(c: &MRCoordinator) -> request_task_response::Assignment {
        c.request_task(Request::new(RequestTaskRequest {}))
            .await
            .unwrap()
            .into_inner()
            .assignment
            .unwrap()
    }

    async fn take_task(c: &MRCoordinator) -> coordinator::TaskDescriptor {
        match request(c).await {
            request_task_response::Assignment::Task(task) => task,
            other => panic!("expected a task, got {other:?}"),
        }
    }

    async fn report(c: &MRCoordinator, task: coordinator::TaskDescriptor) {
        c.report_completion(Request::new(ReportCompletionRequest { task: Some(task) }))
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn deserted_task_is_reissued_and_the_job_still_finishes() {
        let c = coordinator(&["a.txt"], 1);

        // Worker A takes the only map task and is never heard from again.
        let deserted = take_task(&c).await;
        assert!(matches!(
            request(&c).await,
            request_task_response::Assignment::Wait(_)
        ));

        // Once the lease lapses the timer hands the task back.
        tokio::time::sleep(LEASE + Duration::from_secs(1)).await;
        let reissued = take_task(&c).await;
        assert_eq!(reissued, deserted);

        // Worker B finishes both phases.
        report(&c, reissued).await;
        let reduce = take_task(&c).await;
        report(&c, reduce).await;

        assert!(c.is_done().await);
        assert!(matches!(
            request(&c).await,
            request_task_response::Assignment::Exit(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn completed_task_is_not_reissued_by_its_timer() {
        let c = coordinator(&["a.txt", "b.txt"], 1);

        let first = take_task(&c).await;
        report(&c, first).await;

        // Long past the deserters' window, only the second map task is left.
        tokio::time::sleep(LEASE * 3).await;
        let second = take_task(&c).await;
        assert_eq!(second.map_index, 2);
        assert!(matches!(
            request(&c).await,
            request_task_response::Assignment::Wait(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_phase_reports_no_task_available() {
        let c = coordinator(&["a.txt"], 1);
        let _held = take_task(&c).await;
        // Not an error and not a hang, just a retry-later sentinel.
        assert!(matches!(
            request(&c).await,
            request_task_response::Assignment::Wait(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_completion_is_rejected_loudly() {
        let c = coordinator(&["a.txt"], 1);

        let missing = c
            .report_completion(Request::new(ReportCompletionRequest { task: None }))
            .await;
        assert_eq!(missing.unwrap_err().code(), tonic::Code::InvalidArgument);

        let unknown_kind = coordinator::TaskDescriptor {
            kind: 7,
            map_index: 1,
            reduce_bucket: 0,
            input: "a.txt".into(),
            n_reduce: 1,
            n_map: 1,
        };
        let status = c
            .report_completion(Request::new(ReportCompletionRequest {
                task: Some(unknown_kind),
            }))
            .await;
        assert_eq!(status.unwrap_err().code(), tonic::Code::InvalidArgument);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_completion_is_acknowledged_without_phase_damage() {
        let c = coordinator(&["a.txt"], 2);

        let map = take_task(&c).await;
        report(&c, map.clone()).await;
        report(&c, map).await;

        // Exactly the two reduce tasks exist; the duplicate did not
        // re-trigger the phase transition.
        let r0 = take_task(&c).await;
        let r1 = take_task(&c).await;
        let mut buckets = vec![r0.reduce_bucket, r1.reduce_bucket];
        buckets.sort_unstable();
        assert_eq!(buckets, vec![0, 1]);
        assert!(matches!(
            request(&c).await,
            request_task_response::Assignment::Wait(_)
        ));
    }
}
