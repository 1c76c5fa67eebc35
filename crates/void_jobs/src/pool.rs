//! Worker Pool - fixed set of threads pulling jobs from a shared queue
//!
//! Each worker blocks on the request channel. Shutdown drops the only
//! sender, so workers keep receiving until the queue is empty and then
//! exit on their own. Every caller of `shutdown` outside the pool waits
//! for the last worker to exit.

use crate::scheduler::{run_contained, Job, ScheduleError, Scheduler};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{JoinHandle, ThreadId};

/// Worker pool configuration
#[derive(Clone, Debug)]
pub struct WorkerPoolConfig {
    /// Number of worker threads
    pub worker_count: usize,
    /// Prefix for worker thread names (`{prefix}-{index}`)
    pub thread_name: String,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        let worker_count = std::thread::available_parallelism()
            .map(|n| n.get().saturating_sub(1).max(1))
            .unwrap_or(2);

        Self {
            worker_count,
            thread_name: "void-worker".to_string(),
        }
    }
}

impl WorkerPoolConfig {
    /// Config with an explicit worker count
    pub fn with_workers(worker_count: usize) -> Self {
        Self {
            worker_count,
            ..Self::default()
        }
    }
}

/// Count of workers still running, signalled when it reaches zero
struct LiveWorkers {
    count: Mutex<usize>,
    all_exited: Condvar,
}

impl LiveWorkers {
    fn new(count: usize) -> Self {
        Self {
            count: Mutex::new(count),
            all_exited: Condvar::new(),
        }
    }

    fn exited(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.all_exited.notify_all();
        }
    }

    fn wait(&self) {
        let mut count = self.count.lock();
        while *count > 0 {
            self.all_exited.wait(&mut count);
        }
    }
}

struct WorkerThread {
    join_handle: JoinHandle<()>,
}

impl WorkerThread {
    fn spawn(
        name: String,
        request_rx: Receiver<Job>,
        active_jobs: Arc<AtomicUsize>,
        completed_jobs: Arc<AtomicU64>,
        live: Arc<LiveWorkers>,
    ) -> std::io::Result<Self> {
        let join_handle = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                log::debug!("Worker {} started", name);
                // recv() only fails once the queue is closed *and* empty
                while let Ok(job) = request_rx.recv() {
                    run_contained(job, &name);
                    completed_jobs.fetch_add(1, Ordering::Relaxed);
                    active_jobs.fetch_sub(1, Ordering::Release);
                }
                log::debug!("Worker {} exiting", name);
                live.exited();
            })?;

        Ok(Self { join_handle })
    }
}

/// Fixed-size pool of worker threads
pub struct WorkerPool {
    request_tx: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<WorkerThread>>,
    worker_ids: Vec<ThreadId>,
    live: Arc<LiveWorkers>,
    active_jobs: Arc<AtomicUsize>,
    completed_jobs: Arc<AtomicU64>,
    worker_count: usize,
}

impl WorkerPool {
    /// Spawn the worker threads
    pub fn new(config: WorkerPoolConfig) -> std::io::Result<Self> {
        let worker_count = config.worker_count.max(1);
        let (request_tx, request_rx) = crossbeam_channel::unbounded::<Job>();
        let active_jobs = Arc::new(AtomicUsize::new(0));
        let completed_jobs = Arc::new(AtomicU64::new(0));
        let live = Arc::new(LiveWorkers::new(worker_count));

        let mut workers = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            let worker = WorkerThread::spawn(
                format!("{}-{}", config.thread_name, index),
                request_rx.clone(),
                active_jobs.clone(),
                completed_jobs.clone(),
                live.clone(),
            );

            match worker {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    // Let the threads that did start wind down before bailing
                    drop(request_tx);
                    for worker in workers {
                        let _ = worker.join_handle.join();
                    }
                    return Err(e);
                }
            }
        }

        log::info!("Worker pool started with {} threads", worker_count);

        let worker_ids = workers
            .iter()
            .map(|worker| worker.join_handle.thread().id())
            .collect();

        Ok(Self {
            request_tx: Mutex::new(Some(request_tx)),
            workers: Mutex::new(workers),
            worker_ids,
            live,
            active_jobs,
            completed_jobs,
            worker_count,
        })
    }

    /// Number of worker threads
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Jobs queued or running
    pub fn active_jobs(&self) -> usize {
        self.active_jobs.load(Ordering::Acquire)
    }

    /// Jobs that have finished (including ones that panicked)
    pub fn completed_jobs(&self) -> u64 {
        self.completed_jobs.load(Ordering::Relaxed)
    }

    /// True when nothing is queued or running
    pub fn is_idle(&self) -> bool {
        self.active_jobs() == 0
    }

    /// True once shutdown has begun
    pub fn is_shut_down(&self) -> bool {
        self.request_tx.lock().is_none()
    }
}

impl Scheduler for WorkerPool {
    fn schedule(&self, job: Job) -> Result<(), ScheduleError> {
        let request_tx = self.request_tx.lock();
        let tx = request_tx.as_ref().ok_or(ScheduleError::ShutDown)?;

        self.active_jobs.fetch_add(1, Ordering::AcqRel);
        if tx.send(job).is_err() {
            self.active_jobs.fetch_sub(1, Ordering::AcqRel);
            return Err(ScheduleError::ShutDown);
        }
        Ok(())
    }

    fn shutdown(&self) {
        // Dropping the sender closes the queue; the lock must not be held
        // while waiting since running jobs may still call schedule().
        drop(self.request_tx.lock().take());

        if self.worker_ids.contains(&std::thread::current().id()) {
            // Called from inside a job; waiting here would wait on ourselves
            return;
        }
        self.live.wait();

        let workers = std::mem::take(&mut *self.workers.lock());
        if workers.is_empty() {
            return;
        }
        for worker in workers {
            if worker.join_handle.join().is_err() {
                log::error!("Worker thread terminated abnormally");
            }
        }

        log::info!(
            "Worker pool shut down after {} jobs",
            self.completed_jobs()
        );
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl core::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("worker_count", &self.worker_count)
            .field("active_jobs", &self.active_jobs())
            .field("completed_jobs", &self.completed_jobs())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    fn pool(workers: usize) -> WorkerPool {
        WorkerPool::new(WorkerPoolConfig {
            worker_count: workers,
            thread_name: "test-worker".to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_runs_all_jobs() {
        let pool = pool(4);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..64 {
            let c = counter.clone();
            pool.schedule(Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        }

        pool.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 64);
        assert_eq!(pool.completed_jobs(), 64);
        assert!(pool.is_idle());
    }

    #[test]
    fn test_shutdown_drains_queue() {
        let pool = pool(1);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..10 {
            let c = counter.clone();
            pool.schedule(Box::new(move || {
                std::thread::sleep(Duration::from_millis(2));
                c.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        }

        // Most of these are still queued when shutdown starts
        pool.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_schedule_after_shutdown_fails() {
        let pool = pool(2);
        pool.shutdown();

        assert!(pool.is_shut_down());
        assert_eq!(pool.schedule(Box::new(|| {})), Err(ScheduleError::ShutDown));

        // Idempotent
        pool.shutdown();
    }

    #[test]
    fn test_panicking_job_keeps_worker_alive() {
        let pool = pool(1);
        let counter = Arc::new(AtomicUsize::new(0));

        pool.schedule(Box::new(|| panic!("job failure"))).unwrap();
        let c = counter.clone();
        pool.schedule(Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();

        pool.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(pool.completed_jobs(), 2);
    }

    #[test]
    fn test_jobs_run_on_named_workers() {
        let pool = pool(3);
        let names = Arc::new(Mutex::new(HashSet::new()));

        for _ in 0..30 {
            let names = names.clone();
            pool.schedule(Box::new(move || {
                let name = std::thread::current().name().map(str::to_string);
                names.lock().insert(name);
                std::thread::sleep(Duration::from_millis(1));
            }))
            .unwrap();
        }
        pool.shutdown();

        let names = names.lock();
        assert!(!names.is_empty());
        for name in names.iter() {
            let name = name.as_deref().unwrap();
            assert!(name.starts_with("test-worker-"));
        }
    }

    #[test]
    fn test_nested_schedule_from_job() {
        let pool = Arc::new(pool(2));
        let counter = Arc::new(AtomicUsize::new(0));

        let inner_pool = pool.clone();
        let c = counter.clone();
        pool.schedule(Box::new(move || {
            let c2 = c.clone();
            inner_pool
                .schedule(Box::new(move || {
                    c2.fetch_add(1, Ordering::SeqCst);
                }))
                .unwrap();
            c.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();

        // Wait for both units without a blocking primitive
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while counter.load(Ordering::SeqCst) < 2 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }

        pool.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_every_shutdown_caller_waits_for_drain() {
        let pool = Arc::new(pool(1));
        let started = Arc::new(AtomicBool::new(false));
        let done = Arc::new(AtomicBool::new(false));

        let (s, d) = (started.clone(), done.clone());
        pool.schedule(Box::new(move || {
            s.store(true, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(200));
            d.store(true, Ordering::SeqCst);
        }))
        .unwrap();
        while !started.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(1));
        }

        let first = {
            let pool = pool.clone();
            std::thread::spawn(move || pool.shutdown())
        };
        while !pool.is_shut_down() {
            std::thread::sleep(Duration::from_millis(1));
        }

        // The queue is already closed; this call must still wait for the job
        pool.shutdown();
        assert!(done.load(Ordering::SeqCst));
        first.join().unwrap();
        assert!(pool.is_idle());
    }

    #[test]
    fn test_shutdown_from_inside_job() {
        let pool = Arc::new(pool(2));
        let counter = Arc::new(AtomicUsize::new(0));

        let inner_pool = pool.clone();
        let c = counter.clone();
        pool.schedule(Box::new(move || {
            inner_pool.shutdown();
            c.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();

        pool.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(pool.schedule(Box::new(|| {})), Err(ScheduleError::ShutDown));
    }
}
