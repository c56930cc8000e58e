//! Job queue. Admits report analysis requests whose snapshot fetch
//! is expected to exceed the fast-return threshold, tracks FIFO queue
//! position while a job waits for a worker permit, and retains
//! terminal results for a bounded time so a polling consumer can
//! collect them after the triggering request has already returned.

use crate::error::{EngineError, Result};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Completed,
    Failed,
    Canceled,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub id: Uuid,
    pub state: JobState,
    /// Index in the queue: `0` once running, `1`-based among still-queued
    /// jobs while queued, `None` once terminal.
    pub queue_position: Option<usize>,
}

struct JobRecord<T> {
    state: JobState,
    result: Option<std::result::Result<T, String>>,
    completed_at: Option<Instant>,
    cancel: CancellationToken,
}

/// Bounded-concurrency FIFO job queue. `T` is whatever an admitted
/// unit of work ultimately produces (a [`crate::merger`] output, in
/// the orchestrator's case).
pub struct JobQueue<T> {
    permits: Arc<Semaphore>,
    records: Arc<DashMap<Uuid, JobRecord<T>>>,
    admission_order: Arc<DashMap<Uuid, u64>>,
    next_admission: AtomicUsize,
    completed_ttl: Duration,
    job_timeout: Duration,
}

impl<T: Clone + Send + 'static> JobQueue<T> {
    pub fn new(max_concurrent: usize, completed_ttl: Duration, job_timeout: Duration) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            records: Arc::new(DashMap::new()),
            admission_order: Arc::new(DashMap::new()),
            next_admission: AtomicUsize::new(0),
            completed_ttl,
            job_timeout,
        }
    }

    /// Admits `work` as a new job and spawns it immediately on the
    /// tokio runtime. The job waits on the semaphore internally, so
    /// admission order (not spawn order) determines FIFO queue
    /// position.
    #[instrument(skip(self, work))]
    pub fn submit<F, Fut>(&self, work: F) -> Uuid
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = std::result::Result<T, EngineError>> + Send + 'static,
    {
        let id = Uuid::new_v4();
        let admission_index = self.next_admission.fetch_add(1, Ordering::SeqCst) as u64;
        self.admission_order.insert(id, admission_index);

        let cancel = CancellationToken::new();
        self.records.insert(
            id,
            JobRecord {
                state: JobState::Queued,
                result: None,
                completed_at: None,
                cancel: cancel.clone(),
            },
        );

        let permits = self.permits.clone();
        let records = self.records.clone();
        let admission_order = self.admission_order.clone();
        let job_cancel = cancel.clone();
        let admitted_at = Instant::now();
        let job_timeout = self.job_timeout;
        crate::metrics::set_queue_depth(self.queue_depth());

        tokio::spawn(async move {
            let permit = tokio::select! {
                biased;
                _ = job_cancel.cancelled() => {
                    if let Some(mut record) = records.get_mut(&id) {
                        record.state = JobState::Canceled;
                        record.completed_at = Some(Instant::now());
                    }
                    admission_order.remove(&id);
                    crate::metrics::record_job_terminal("canceled", admitted_at.elapsed().as_millis() as f64);
                    return;
                }
                permit = permits.acquire_owned() => permit,
            };
            let Ok(_permit) = permit else { return };

            admission_order.remove(&id);
            if let Some(mut record) = records.get_mut(&id) {
                if record.state == JobState::Canceled {
                    return;
                }
                record.state = JobState::Running;
            }

            let outcome = tokio::select! {
                biased;
                _ = job_cancel.cancelled() => Err(EngineError::Canceled),
                _ = tokio::time::sleep(job_timeout) => Err(EngineError::Timeout(job_timeout)),
                outcome = work(job_cancel.clone()) => outcome,
            };

            let mut terminal_outcome = "completed";
            if let Some(mut record) = records.get_mut(&id) {
                match outcome {
                    Ok(value) => {
                        record.state = JobState::Completed;
                        record.result = Some(Ok(value));
                    }
                    Err(EngineError::Canceled) => {
                        record.state = JobState::Canceled;
                        terminal_outcome = "canceled";
                    }
                    Err(e) => {
                        record.state = JobState::Failed;
                        record.result = Some(Err(e.to_string()));
                        terminal_outcome = "failed";
                    }
                }
                record.completed_at = Some(Instant::now());
            }
            crate::metrics::record_job_terminal(terminal_outcome, admitted_at.elapsed().as_millis() as f64);
            info!(job_id = %id, "job reached terminal state");
        });

        id
    }

    /// Current status of `id`, including its index in the queue: `0` while
    /// running, a 1-based FIFO position while queued, `None` once terminal.
    pub fn status(&self, id: Uuid) -> Option<JobStatus> {
        let record = self.records.get(&id)?;
        let queue_position = match record.state {
            JobState::Queued => Some(self.fifo_position(id)),
            JobState::Running => Some(0),
            JobState::Completed | JobState::Failed | JobState::Canceled => None,
        };
        Some(JobStatus {
            id,
            state: record.state,
            queue_position,
        })
    }

    fn fifo_position(&self, id: Uuid) -> usize {
        let Some(my_index) = self.admission_order.get(&id).map(|v| *v) else {
            return 0;
        };
        self.admission_order
            .iter()
            .filter(|entry| *entry.value() <= my_index)
            .count()
    }

    /// Requests cooperative cancellation. A job already past its last
    /// cancellation check point still runs to completion; its state
    /// simply won't change to `Canceled`.
    pub fn cancel(&self, id: Uuid) {
        if let Some(record) = self.records.get(&id) {
            record.cancel.cancel();
        }
    }

    /// Returns the terminal result for `id` if the job has completed,
    /// without removing it — callers may poll repeatedly until the
    /// completed-job TTL sweep reclaims it.
    pub fn result(&self, id: Uuid) -> Option<Result<T>> {
        let record = self.records.get(&id)?;
        match &record.result {
            Some(Ok(value)) => Some(Ok(value.clone())),
            Some(Err(message)) => Some(Err(EngineError::Other(anyhow::anyhow!(message.clone())))),
            None => None,
        }
    }

    /// Removes completed/failed/canceled jobs whose `completed_at` is
    /// older than `completed_ttl`. Intended to run on a periodic
    /// background tick owned by the orchestrator.
    pub fn sweep_expired(&self) {
        let ttl = self.completed_ttl;
        self.records.retain(|_, record| match record.completed_at {
            Some(completed_at) => completed_at.elapsed() < ttl,
            None => true,
        });
    }

    /// Number of jobs currently awaiting a worker permit.
    pub fn queue_depth(&self) -> usize {
        self.admission_order.len()
    }
}
