//! # void_jobs - Worker Pool
//!
//! Fire-and-forget execution of opaque work units:
//! - `Scheduler` trait: the contract the streaming subsystem depends on
//! - `WorkerPool`: fixed number of named worker threads fed by a channel
//! - `InlineScheduler`: runs units on the calling thread
//!
//! No ordering is guaranteed between units. Shutdown closes the queue,
//! lets the workers drain everything already queued and joins them.
//!
//! ## Example
//!
//! ```ignore
//! use void_jobs::prelude::*;
//!
//! let pool = WorkerPool::new(WorkerPoolConfig::default())?;
//! pool.schedule(Box::new(|| println!("hello from a worker")))?;
//! pool.shutdown();
//! ```

pub mod pool;
pub mod scheduler;

pub use pool::{WorkerPool, WorkerPoolConfig};
pub use scheduler::{panic_message, InlineScheduler, Job, ScheduleError, Scheduler};

/// Prelude - commonly used types
pub mod prelude {
    pub use crate::pool::{WorkerPool, WorkerPoolConfig};
    pub use crate::scheduler::{InlineScheduler, Job, ScheduleError, Scheduler};
}
