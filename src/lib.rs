#![deny(missing_docs)]

//! A fixed-size worker thread pool.
//!
//! Units of work implement [`Task`] and are queued on a [`ThreadPool`],
//! either one at a time or as an ordered batch. Workers are sized to hardware
//! concurrency and run tasks in FIFO order. Shutting a pool down lets running
//! tasks finish and abandons the ones still queued.

mod error;
/// Stress harness used by the `pool-stress` binary.
pub mod stress;
mod sync;
mod task;
mod task_set;
/// Thread pool implementations.
pub mod thread_pool;

pub use error::{PoolError, Result};
pub use sync::Semaphore;
pub use task::{run_task, FnTask, Task, TaskOutcome};
pub use task_set::{parallel_for, TaskSet};
pub use thread_pool::{
    hardware_concurrency, Builder, RayonThreadPool, SharedQueueThreadPool, ThreadPool,
};
