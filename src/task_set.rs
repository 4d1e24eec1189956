use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::debug;

use crate::sync::Semaphore;
use crate::task::Task;
use crate::thread_pool::ThreadPool;
use crate::{PoolError, Result};

/// A group of tasks submitted as one batch whose completion can be awaited.
///
/// Every member is wrapped so that it releases one permit on a shared
/// [`Semaphore`] when the pool lets go of it, whether or not it ran;
/// [`wait`](TaskSet::wait) takes one permit per task submitted since the
/// last wait and reports members the pool abandoned on shutdown.
pub struct TaskSet<'a, P: ThreadPool> {
    pool: &'a P,
    completion: Arc<Completion>,
    tasks: Vec<Arc<dyn Task>>,
    outstanding: usize,
}

struct Completion {
    semaphore: Semaphore,
    abandoned: AtomicUsize,
}

impl<'a, P: ThreadPool> TaskSet<'a, P> {
    /// Creates an empty set that submits to `pool`.
    pub fn new(pool: &'a P) -> Self {
        TaskSet {
            pool,
            completion: Arc::new(Completion {
                semaphore: Semaphore::new(0),
                abandoned: AtomicUsize::new(0),
            }),
            tasks: Vec::new(),
            outstanding: 0,
        }
    }

    /// Adds a task to the next batch.
    pub fn push(&mut self, task: Arc<dyn Task>) {
        self.tasks.push(Arc::new(Tracked {
            inner: task,
            ran: AtomicBool::new(false),
            completion: Arc::clone(&self.completion),
        }));
    }

    /// Number of tasks waiting to be submitted.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns true if no task is waiting to be submitted.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Submits every pushed task as a single batch.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::ShutDown`] if the pool is already shutting down;
    /// the pushed tasks are kept for another pool.
    pub fn execute(&mut self) -> Result<()> {
        if self.pool.is_shutdown() {
            return Err(PoolError::ShutDown);
        }
        let batch = std::mem::take(&mut self.tasks);
        self.outstanding += batch.len();
        debug!("Submitting task set of {} tasks", batch.len());
        self.pool.execute_batch(batch);
        Ok(())
    }

    /// Blocks until the pool has finished with every submitted task.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::ShutDown`] if the pool shut down before running
    /// some of them.
    pub fn wait(&mut self) -> Result<()> {
        self.completion.semaphore.wait(self.outstanding);
        self.outstanding = 0;
        self.take_abandoned()
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`.
    ///
    /// Returns `Ok(false)` if some task has not finished in time.
    pub fn wait_timeout(&mut self, timeout: Duration) -> Result<bool> {
        if !self
            .completion
            .semaphore
            .wait_timeout(self.outstanding, timeout)
        {
            return Ok(false);
        }
        self.outstanding = 0;
        self.take_abandoned().map(|()| true)
    }

    fn take_abandoned(&self) -> Result<()> {
        match self.completion.abandoned.swap(0, Ordering::AcqRel) {
            0 => Ok(()),
            n => {
                debug!("{n} tasks of the set were abandoned by the pool");
                Err(PoolError::ShutDown)
            }
        }
    }
}

/// Wraps a member; the permit is released when the pool drops it, so a
/// member dropped from the queue on shutdown still wakes the waiter.
struct Tracked {
    inner: Arc<dyn Task>,
    ran: AtomicBool,
    completion: Arc<Completion>,
}

impl Task for Tracked {
    fn execute(&self) {
        self.ran.store(true, Ordering::Release);
        self.inner.execute();
    }

    fn done(&self) {
        self.inner.done();
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        if !self.ran.load(Ordering::Acquire) {
            self.completion.abandoned.fetch_add(1, Ordering::AcqRel);
        }
        self.completion.semaphore.release(1);
    }
}

struct ChunkTask<F> {
    range: Range<usize>,
    f: Arc<F>,
}

impl<F> Task for ChunkTask<F>
where
    F: Fn(Range<usize>) + Send + Sync + 'static,
{
    fn execute(&self) {
        (self.f)(self.range.clone());
    }
}

/// Splits `0..len` into at most `pool.size()` contiguous chunks, runs `f` on
/// each chunk in the pool and blocks until all of them are done.
///
/// A panic inside `f` is contained by the worker; the remaining chunks still
/// run and this call still returns.
///
/// # Errors
///
/// Returns [`PoolError::ShutDown`] if the pool shuts down before every chunk
/// has run.
pub fn parallel_for<P, F>(pool: &P, len: usize, f: F) -> Result<()>
where
    P: ThreadPool,
    F: Fn(Range<usize>) + Send + Sync + 'static,
{
    if len == 0 {
        return Ok(());
    }
    let chunks = pool.size().min(len).max(1);
    let chunk_len = len.div_ceil(chunks);
    let f = Arc::new(f);

    let mut set = TaskSet::new(pool);
    let mut start = 0;
    while start < len {
        let end = (start + chunk_len).min(len);
        set.push(Arc::new(ChunkTask {
            range: start..end,
            f: Arc::clone(&f),
        }));
        start = end;
    }
    set.execute()?;
    set.wait()
}
