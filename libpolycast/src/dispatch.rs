//! Job dispatch
//!
//! Publish jobs are handed to a [`JobQueue`]. The shipped [`TaskQueue`] runs
//! every job on its own tokio task in the current process: nothing survives a
//! restart and jobs never wait on each other. The trait is the seam for a
//! durable queue.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tracing::{debug, error};

use crate::error::{PolycastError, Result};
use crate::types::Platform;

/// Per-request platform errors, shared by every job of one request
pub type ErrorMap = Arc<Mutex<HashMap<Platform, String>>>;

/// One (post, platform) publish attempt
#[derive(Debug, Clone)]
pub struct Job {
    pub post_id: String,
    pub user_id: i64,
    pub platform: Platform,
    pub errors: ErrorMap,
}

/// Executes jobs taken off the queue
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(&self, job: Job);
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Hand a job over. Returns once the job is accepted, not when it is done.
    fn submit(&self, job: Job) -> Result<()>;

    /// Number of accepted jobs that have not finished
    fn in_flight(&self) -> usize;

    /// Resolve once no job is in flight
    async fn wait_idle(&self);
}

/// Decrements the in-flight count even if the job panics
struct InFlightGuard {
    in_flight: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// In-memory queue: one spawned task per job
#[derive(Clone)]
pub struct TaskQueue {
    handler: Arc<dyn JobHandler>,
    in_flight: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl TaskQueue {
    pub fn new(handler: Arc<dyn JobHandler>) -> Self {
        Self {
            handler,
            in_flight: Arc::new(AtomicUsize::new(0)),
            idle: Arc::new(Notify::new()),
        }
    }
}

#[async_trait]
impl JobQueue for TaskQueue {
    fn submit(&self, job: Job) -> Result<()> {
        let runtime = Handle::try_current()
            .map_err(|e| PolycastError::Queue(format!("no async runtime to run jobs on: {}", e)))?;

        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let guard = InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
            idle: Arc::clone(&self.idle),
        };
        let handler = Arc::clone(&self.handler);

        debug!(post_id = %job.post_id, platform = %job.platform, "Spawning publish job");
        let task = runtime.spawn(async move {
            let _guard = guard;
            handler.run(job).await;
        });

        // Surface panics in the log; the guard has already released the slot
        runtime.spawn(async move {
            if let Err(e) = task.await {
                if e.is_panic() {
                    error!("Publish job panicked");
                }
            }
        });

        Ok(())
    }

    fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    async fn wait_idle(&self) {
        loop {
            // Registered before the check so a wake-up between the two is not lost
            let notified = self.idle.notified();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl JobHandler for Recorder {
        async fn run(&self, job: Job) {
            if job.post_id == "slow" {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            if job.post_id == "boom" {
                panic!("job blew up");
            }
            self.seen.lock().unwrap().push(job.post_id);
        }
    }

    fn job(id: &str) -> Job {
        Job {
            post_id: id.to_string(),
            user_id: 1,
            platform: Platform::X,
            errors: ErrorMap::default(),
        }
    }

    #[tokio::test]
    async fn test_jobs_run_and_queue_drains() {
        let recorder = Arc::new(Recorder::default());
        let queue = TaskQueue::new(recorder.clone());

        queue.submit(job("slow")).unwrap();
        queue.submit(job("fast")).unwrap();
        queue.wait_idle().await;

        assert_eq!(queue.in_flight(), 0);
        let seen = recorder.seen.lock().unwrap().clone();
        // The fast job is not held up by the slow one
        assert_eq!(seen, vec!["fast".to_string(), "slow".to_string()]);
    }

    #[tokio::test]
    async fn test_wait_idle_returns_immediately_when_empty() {
        let queue = TaskQueue::new(Arc::new(Recorder::default()));
        queue.wait_idle().await;
        assert_eq!(queue.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_panicking_job_releases_its_slot() {
        let recorder = Arc::new(Recorder::default());
        let queue = TaskQueue::new(recorder.clone());

        queue.submit(job("boom")).unwrap();
        queue.submit(job("ok")).unwrap();
        queue.wait_idle().await;

        assert_eq!(queue.in_flight(), 0);
        assert_eq!(*recorder.seen.lock().unwrap(), vec!["ok".to_string()]);
    }

    #[test]
    fn test_submit_outside_runtime_is_an_error() {
        let queue = TaskQueue::new(Arc::new(Recorder::default()));
        let err = queue.submit(job("orphan")).unwrap_err();
        assert!(matches!(err, PolycastError::Queue(_)));
        assert_eq!(queue.in_flight(), 0);
    }
}
