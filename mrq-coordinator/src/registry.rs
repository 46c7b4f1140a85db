//! The authoritative record of every task's lifecycle state, and the
//! scheduling decisions made over it.
//!
//! The registry is a plain synchronous state machine: every operation takes
//! the current `Instant` as a parameter and nothing in here sleeps or
//! spawns. The gRPC layer owns exactly one of these behind a mutex, so all
//! worker calls and lease-timer firings serialize through it.

use std::time::Duration;

use anyhow::{ensure, Result};
use tokio::time::Instant;
use tracing::{debug, info};

use common::task::{TaskDescriptor, TaskKind};

/// Job-wide stage gating which task kind may be dispatched.
///
/// Monotonic: Mapping -> Reducing -> Done, never backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Mapping,
    Reducing,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskState {
    Idle,
    InProgress { deadline: Instant },
    Completed,
}

#[derive(Debug)]
struct TaskRecord {
    descriptor: TaskDescriptor,
    state: TaskState,
}

impl TaskRecord {
    fn idle(descriptor: TaskDescriptor) -> Self {
        Self {
            descriptor,
            state: TaskState::Idle,
        }
    }

    /// Idle, or in progress with a lapsed lease.
    fn dispatchable(&self, now: Instant) -> bool {
        match self.state {
            TaskState::Idle => true,
            TaskState::InProgress { deadline } => deadline <= now,
            TaskState::Completed => false,
        }
    }

    fn matches(&self, descriptor: &TaskDescriptor) -> bool {
        self.descriptor.kind == descriptor.kind
            && match descriptor.kind {
                TaskKind::Map => self.descriptor.map_index == descriptor.map_index,
                TaskKind::Reduce => self.descriptor.reduce_bucket == descriptor.reduce_bucket,
            }
    }
}

/// What the scheduler tells a requesting worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assignment {
    /// Execute this task.
    Task(TaskDescriptor),
    /// Nothing dispatchable right now; retry after a short backoff.
    Wait,
    /// The job is finished; terminate.
    Exit,
}

/// Outcome of recording a completion. All three are acknowledged to the
/// worker; they differ only in what the registry did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// First completion for this task; recorded.
    Recorded,
    /// The task was already completed; nothing changed.
    Duplicate,
    /// The task belongs to a phase that has already passed; nothing changed.
    Stale,
}

/// Task registry plus job state for one job.
#[derive(Debug)]
pub struct Registry {
    phase: Phase,
    records: Vec<TaskRecord>,
    n_map: u32,
    n_reduce: u32,
    lease: Duration,
}

impl Registry {
    /// Build the M map records from the input file list. Reduce records do
    /// not exist yet; they are synthesized at the phase transition.
    pub fn new(input_files: Vec<String>, n_reduce: u32, lease: Duration) -> Self {
        let n_map = input_files.len() as u32;
        let records = input_files
            .into_iter()
            .enumerate()
            .map(|(i, input)| {
                TaskRecord::idle(TaskDescriptor::map(i as u32 + 1, input, n_reduce, n_map))
            })
            .collect();

        info!(n_map, n_reduce, "job registered");
        let mut registry = Self {
            phase: Phase::Mapping,
            records,
            n_map,
            n_reduce,
            lease,
        };
        // Degenerate shapes (no inputs, or no reduce buckets) settle
        // through the same transition path as everything else.
        registry.advance_if_phase_complete();
        registry
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }

    pub fn lease(&self) -> Duration {
        self.lease
    }

    /// Hand out a unit of work, FIFO over records of the current phase that
    /// are idle or whose lease has lapsed. Never blocks: if everything is
    /// in flight the caller is told to retry later.
    pub fn assign(&mut self, now: Instant) -> Assignment {
        if self.phase == Phase::Done {
            return Assignment::Exit;
        }

        let lease = self.lease;
        match self.records.iter_mut().find(|r| r.dispatchable(now)) {
            Some(record) => {
                record.state = TaskState::InProgress {
                    deadline: now + lease,
                };
                debug!(task = %record.descriptor, "task dispatched");
                Assignment::Task(record.descriptor.clone())
            }
            None => Assignment::Wait,
        }
    }

    /// Record a completion reported by a worker.
    ///
    /// Idempotent, and accepts completions whose lease has long expired: a
    /// stalled worker that eventually finishes did real, durable work. A
    /// descriptor naming a record of an already-passed phase is a stale
    /// no-op; a descriptor that cannot belong to this job is an error.
    pub fn complete(&mut self, descriptor: &TaskDescriptor) -> Result<Completion> {
        self.validate(descriptor)?;

        let Some(record) = self.records.iter_mut().find(|r| r.matches(descriptor)) else {
            return Ok(Completion::Stale);
        };
        if record.state == TaskState::Completed {
            return Ok(Completion::Duplicate);
        }

        record.state = TaskState::Completed;
        debug!(task = %descriptor, "task completed");
        self.advance_if_phase_complete();
        Ok(Completion::Recorded)
    }

    /// Put a task whose lease has lapsed back on the queue. Called when a
    /// lease timer fires; the state must be re-checked here because the
    /// task may have completed, or been re-dispatched under a fresh lease,
    /// since the timer was armed. A stale firing is a no-op.
    pub fn reclaim(&mut self, descriptor: &TaskDescriptor, now: Instant) {
        let Some(record) = self.records.iter_mut().find(|r| r.matches(descriptor)) else {
            return;
        };
        if let TaskState::InProgress { deadline } = record.state {
            if deadline <= now {
                info!(task = %record.descriptor, "lease expired; task requeued");
                record.state = TaskState::Idle;
            }
        }
    }

    /// Reject descriptors that cannot have been issued for this job: shape
    /// mismatches indicate a coordinator/worker version skew and fail
    /// loudly rather than being absorbed.
    fn validate(&self, descriptor: &TaskDescriptor) -> Result<()> {
        ensure!(
            descriptor.n_map == self.n_map && descriptor.n_reduce == self.n_reduce,
            "descriptor {descriptor} does not belong to this job (M={}, R={})",
            self.n_map,
            self.n_reduce
        );
        match descriptor.kind {
            TaskKind::Map => ensure!(
                (1..=self.n_map).contains(&descriptor.map_index),
                "map index {} out of range 1..={}",
                descriptor.map_index,
                self.n_map
            ),
            TaskKind::Reduce => {
                ensure!(
                    descriptor.reduce_bucket < self.n_reduce,
                    "reduce bucket {} out of range 0..{}",
                    descriptor.reduce_bucket,
                    self.n_reduce
                );
                ensure!(
                    self.phase != Phase::Mapping,
                    "reduce task {descriptor} reported while the map phase is still running"
                );
            }
        }
        Ok(())
    }

    fn advance_if_phase_complete(&mut self) {
        while self.phase != Phase::Done
            && self.records.iter().all(|r| r.state == TaskState::Completed)
        {
            match self.phase {
                Phase::Mapping => {
                    self.records = (0..self.n_reduce)
                        .map(|bucket| {
                            TaskRecord::idle(TaskDescriptor::reduce(
                                bucket,
                                self.n_reduce,
                                self.n_map,
                            ))
                        })
                        .collect();
                    self.phase = Phase::Reducing;
                    info!(n_reduce = self.n_reduce, "map phase complete; reduce tasks queued");
                }
                Phase::Reducing => {
                    self.phase = Phase::Done;
                    info!("all reduce tasks complete; job done");
                }
                Phase::Done => break,
            }
        }
    }
}
