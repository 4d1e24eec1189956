use std::sync::Arc;

use crate::task::{FnTask, Task};
use crate::Result;

/// A fixed-size pool of worker threads that runs [`Task`]s.
///
/// Implementors keep their worker count fixed for their whole lifetime,
/// abandon whatever is still queued when they shut down, and silently drop
/// submissions that arrive after shutdown has begun.
pub trait ThreadPool {
    /// Creates a new thread pool with the given number of threads.
    ///
    /// # Errors
    ///
    /// Returns an error if `threads` is zero or a worker cannot be spawned.
    fn new(threads: u32) -> Result<Self>
    where
        Self: Sized;

    /// Creates a pool with one worker per logical CPU (at least one).
    fn with_hardware_concurrency() -> Result<Self>
    where
        Self: Sized,
    {
        Self::new(hardware_concurrency() as u32)
    }

    /// Returns the number of worker threads.
    fn size(&self) -> usize;

    /// Queues a single task; one idle worker is woken.
    ///
    /// The task is dropped without running if the pool is shutting down.
    fn execute(&self, task: Arc<dyn Task>);

    /// Queues a batch of tasks under a single lock acquisition, preserving
    /// their relative order; all idle workers are woken.
    fn execute_batch(&self, tasks: Vec<Arc<dyn Task>>);

    /// Spawns a closure into the pool.
    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.execute(Arc::new(FnTask::new(job)));
    }

    /// Stops the pool and waits for every worker to exit.
    ///
    /// Tasks already running finish; queued ones are abandoned. Calling this
    /// more than once is harmless.
    fn shutdown(&self);

    /// Returns true once shutdown has begun.
    fn is_shutdown(&self) -> bool;
}

/// Number of logical CPUs, never less than one.
pub fn hardware_concurrency() -> usize {
    num_cpus::get().max(1)
}

mod rayon_pool;
mod shared_queue;

pub use self::rayon_pool::RayonThreadPool;
pub use self::shared_queue::{Builder, SharedQueueThreadPool};
