//! Fixed-size worker pool.
//!
//! Jobs run on a dedicated rayon pool; each submission returns a
//! [`JobHandle`] that any number of callers may clone and wait on. A job is
//! never cancelled: waiting with a timeout only stops the waiter.
//!
//! A job's time budget starts when a worker picks it up, so time spent queued
//! behind other jobs is never charged to it.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use futures::channel::oneshot;
use futures::future::{self, Either, FutureExt, Shared};
use futures_timer::Delay;

pub struct WorkerPool {
    pool: rayon::ThreadPool,
    size: usize,
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool").field("size", &self.size).finish()
    }
}

impl WorkerPool {
    /// Start `workers` threads (at least one).
    pub fn new(workers: usize) -> Result<Self> {
        let size = workers.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(size)
            .thread_name(|i| format!("mtm-worker-{i}"))
            .panic_handler(|_| log::error!("A compiler worker job panicked"))
            .build()
            .context("Could not start the compiler worker pool")?;
        Ok(Self { pool, size })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Queue `job`. A panicking job resolves its handle as [`JobError::Lost`].
    pub fn spawn<T, F>(&self, job: F) -> JobHandle<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (started_tx, started_rx) = oneshot::channel();
        let (tx, rx) = oneshot::channel();
        self.pool.spawn(move || {
            // The receivers may be gone if every waiter gave up.
            let _ = started_tx.send(Instant::now());
            let _ = tx.send(Arc::new(job()));
        });
        JobHandle {
            started: started_rx.shared(),
            result: rx.shared(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobError {
    /// The job did not finish within the wait budget.
    Timeout,
    /// The job ended without producing a result.
    Lost,
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobError::Timeout => write!(f, "job timed out"),
            JobError::Lost => write!(f, "job ended without a result"),
        }
    }
}

impl std::error::Error for JobError {}

/// A pending job result shared by every clone.
pub struct JobHandle<T> {
    started: Shared<oneshot::Receiver<Instant>>,
    result: Shared<oneshot::Receiver<Arc<T>>>,
}

impl<T> Clone for JobHandle<T> {
    fn clone(&self) -> Self {
        Self {
            started: self.started.clone(),
            result: self.result.clone(),
        }
    }
}

impl<T> fmt::Debug for JobHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobHandle")
            .field("started", &self.started.peek().is_some())
            .field("ready", &self.result.peek().is_some())
            .finish()
    }
}

impl<T: Send + Sync + 'static> JobHandle<T> {
    /// The result, if the job has already finished.
    pub fn try_result(&self) -> Option<Result<Arc<T>, JobError>> {
        self.result
            .peek()
            .map(|r| r.clone().map_err(|_| JobError::Lost))
    }

    /// When a worker picked the job up, if it has.
    pub fn started_at(&self) -> Option<Instant> {
        self.started.peek().and_then(|r| r.as_ref().ok().copied())
    }

    /// Block until the job finishes or has run for `timeout`. Waiting for a
    /// free worker does not count against `timeout`.
    pub fn wait(&self, timeout: Duration) -> Result<Arc<T>, JobError> {
        if let Some(done) = self.try_result() {
            return done;
        }
        let started = match futures::executor::block_on(self.started.clone()) {
            Ok(started) => started,
            // The job was dropped before a worker ran it.
            Err(_) => return self.try_result().unwrap_or(Err(JobError::Lost)),
        };
        let remaining = match started.checked_add(timeout) {
            Some(deadline) => deadline.saturating_duration_since(Instant::now()),
            None => timeout,
        };
        let pending = self.result.clone();
        match futures::executor::block_on(future::select(pending, Delay::new(remaining))) {
            Either::Left((Ok(value), _)) => Ok(value),
            Either::Left((Err(_), _)) => Err(JobError::Lost),
            Either::Right(_) => Err(JobError::Timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    #[test]
    fn test_jobs_run_on_named_workers() {
        let pool = WorkerPool::new(2).unwrap();
        let handle = pool.spawn(|| std::thread::current().name().map(str::to_string));
        let name = handle.wait(Duration::from_secs(5)).unwrap();
        assert!(name.as_deref().unwrap().starts_with("mtm-worker-"));
        assert_eq!(pool.size(), 2);
    }

    #[test]
    fn test_clones_share_one_run() {
        let pool = WorkerPool::new(1).unwrap();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let handle = pool.spawn(move || counter.fetch_add(1, Ordering::SeqCst) + 41);
        let other = handle.clone();
        assert_eq!(*handle.wait(Duration::from_secs(5)).unwrap(), 41);
        assert_eq!(*other.wait(Duration::from_secs(5)).unwrap(), 41);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_timeout_does_not_poison_the_handle() {
        let pool = WorkerPool::new(1).unwrap();
        let (release, gate) = mpsc::channel::<()>();
        let handle = pool.spawn(move || {
            let _ = gate.recv();
            7
        });
        assert_eq!(handle.wait(Duration::from_millis(20)), Err(JobError::Timeout));
        release.send(()).unwrap();
        assert_eq!(*handle.wait(Duration::from_secs(5)).unwrap(), 7);
        assert!(handle.try_result().is_some());
    }

    #[test]
    fn test_budget_starts_when_a_worker_picks_the_job_up() {
        let pool = WorkerPool::new(1).unwrap();
        let (release, gate) = mpsc::channel::<()>();
        let slow = pool.spawn(move || {
            let _ = gate.recv();
            1
        });
        let fast = pool.spawn(|| 2);
        assert_eq!(slow.wait(Duration::from_millis(20)), Err(JobError::Timeout));
        assert!(fast.started_at().is_none());

        let releaser = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            release.send(()).unwrap();
        });
        // Queued for about 100ms, but only the run time counts.
        assert_eq!(*fast.wait(Duration::from_millis(50)).unwrap(), 2);
        assert!(fast.started_at().is_some());
        releaser.join().unwrap();
    }

    #[test]
    fn test_panicking_job_is_lost() {
        let pool = WorkerPool::new(1).unwrap();
        let handle = pool.spawn(|| -> u8 { panic!("boom") });
        assert_eq!(handle.wait(Duration::from_secs(5)), Err(JobError::Lost));
    }

    #[test]
    fn test_zero_workers_means_one() {
        assert_eq!(WorkerPool::new(0).unwrap().size(), 1);
    }
}
