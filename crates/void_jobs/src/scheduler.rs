//! Scheduler contract
//!
//! The streaming subsystem only needs two things from an executor:
//! accept a unit of work without a return channel, and shut down cleanly.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// A unit of work. Runs exactly once, on whichever thread picks it up.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Errors returned when submitting work
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("Scheduler has been shut down")]
    ShutDown,
}

/// Fire-and-forget executor
pub trait Scheduler: Send + Sync {
    /// Submit a unit of work.
    ///
    /// Fails once shutdown has begun; the job is dropped without running.
    fn schedule(&self, job: Job) -> Result<(), ScheduleError>;

    /// Stop accepting work and block until every queued and in-flight unit
    /// has completed.
    fn shutdown(&self);
}

/// Runs every unit immediately on the calling thread.
///
/// Useful for tools and tests that want deterministic completion.
#[derive(Debug, Default)]
pub struct InlineScheduler {
    shut_down: AtomicBool,
}

impl InlineScheduler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Scheduler for InlineScheduler {
    fn schedule(&self, job: Job) -> Result<(), ScheduleError> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(ScheduleError::ShutDown);
        }
        run_contained(job, "inline");
        Ok(())
    }

    fn shutdown(&self) {
        self.shut_down.store(true, Ordering::Release);
    }
}

/// Run a job, logging instead of unwinding if it panics
pub(crate) fn run_contained(job: Job, thread_name: &str) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(job)) {
        log::error!("Job panicked on {}: {}", thread_name, panic_message(&*payload));
    }
}

/// Best-effort text of a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_inline_runs_immediately() {
        let scheduler = InlineScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let c = counter.clone();
        scheduler
            .schedule(Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_inline_rejects_after_shutdown() {
        let scheduler = InlineScheduler::new();
        scheduler.shutdown();

        let result = scheduler.schedule(Box::new(|| {}));
        assert_eq!(result, Err(ScheduleError::ShutDown));
    }

    #[test]
    fn test_inline_contains_panics() {
        let scheduler = InlineScheduler::new();
        let result = scheduler.schedule(Box::new(|| panic!("boom")));
        assert!(result.is_ok());
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(panic_message(&*payload), "static str");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(&*payload), "owned");

        let payload: Box<dyn Any + Send> = Box::new(42u32);
        assert_eq!(panic_message(&*payload), "unknown panic");
    }
}
