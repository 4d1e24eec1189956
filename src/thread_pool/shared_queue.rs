use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};

use log::{debug, error, info};

use super::{hardware_concurrency, ThreadPool};
use crate::task::{run_task, Task};
use crate::{PoolError, Result};

const DEFAULT_NAME_PREFIX: &str = "pool-worker";

/// Queue and abort flag, only ever touched under `Shared::state`.
struct State {
    queue: VecDeque<Arc<dyn Task>>,
    abort: bool,
}

struct Shared {
    state: Mutex<State>,
    cv: Condvar,
}

impl Shared {
    /// Task panics are contained outside the lock, so poisoning can only come
    /// from a bug in the pool itself; the state is still consistent then.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A thread pool using a shared FIFO queue guarded by a mutex and a
/// condition variable.
///
/// All workers are spawned up front and block on the condition variable
/// until either work arrives or the abort flag is raised. Abort takes
/// priority over pending work: on shutdown, tasks still in the queue are
/// dropped without running, while tasks already picked up by a worker run
/// to completion.
pub struct SharedQueueThreadPool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_ids: Vec<ThreadId>,
}

/// Configures and builds a [`SharedQueueThreadPool`].
#[derive(Debug, Clone)]
pub struct Builder {
    threads: Option<usize>,
    name_prefix: String,
}

impl Default for Builder {
    fn default() -> Self {
        Builder {
            threads: None,
            name_prefix: DEFAULT_NAME_PREFIX.to_owned(),
        }
    }
}

impl Builder {
    /// Creates a builder sized to hardware concurrency.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the exact number of workers.
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    /// Sets the worker thread name prefix; workers are named `{prefix}-{id}`.
    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    /// Spawns every worker and returns the running pool.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidSize`] for a zero thread count and
    /// [`PoolError::Spawn`] if any worker cannot be started, in which case
    /// the workers spawned so far are stopped and joined.
    pub fn build(self) -> Result<SharedQueueThreadPool> {
        let size = self.threads.unwrap_or_else(hardware_concurrency);
        if size == 0 {
            return Err(PoolError::InvalidSize);
        }

        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                queue: VecDeque::new(),
                abort: false,
            }),
            cv: Condvar::new(),
        });

        let mut workers = Vec::with_capacity(size);
        for id in 0..size {
            let worker_shared = Arc::clone(&shared);
            let spawned = thread::Builder::new()
                .name(format!("{}-{id}", self.name_prefix))
                .spawn(move || worker_loop(id, &worker_shared));

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    error!("Failed to spawn worker {id}: {e}");
                    shared.lock().abort = true;
                    shared.cv.notify_all();
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(PoolError::Spawn(e));
                }
            }
        }

        info!("Started thread pool with {size} workers");
        let worker_ids = workers.iter().map(|h| h.thread().id()).collect();
        Ok(SharedQueueThreadPool {
            shared,
            workers: Mutex::new(workers),
            worker_ids,
        })
    }
}

impl SharedQueueThreadPool {
    /// Returns a [`Builder`] for configuring a pool.
    pub fn builder() -> Builder {
        Builder::new()
    }

    /// Number of tasks waiting in the queue.
    pub fn pending(&self) -> usize {
        self.shared.lock().queue.len()
    }
}

impl ThreadPool for SharedQueueThreadPool {
    fn new(threads: u32) -> Result<Self> {
        Builder::new().threads(threads as usize).build()
    }

    fn size(&self) -> usize {
        self.worker_ids.len()
    }

    fn execute(&self, task: Arc<dyn Task>) {
        {
            let mut state = self.shared.lock();
            if state.abort {
                debug!("Dropping task submitted after shutdown");
                return;
            }
            state.queue.push_back(task);
        }
        self.shared.cv.notify_one();
    }

    fn execute_batch(&self, tasks: Vec<Arc<dyn Task>>) {
        if tasks.is_empty() {
            return;
        }
        {
            let mut state = self.shared.lock();
            if state.abort {
                debug!("Dropping batch of {} tasks submitted after shutdown", tasks.len());
                return;
            }
            state.queue.extend(tasks);
        }
        self.shared.cv.notify_all();
    }

    fn shutdown(&self) {
        let abandoned: Vec<Arc<dyn Task>> = {
            let mut state = self.shared.lock();
            state.abort = true;
            state.queue.drain(..).collect()
        };
        self.shared.cv.notify_all();

        if !abandoned.is_empty() {
            debug!("Abandoning {} queued tasks", abandoned.len());
        }
        // Dropped outside the lock; a task's destructor may do anything.
        drop(abandoned);

        // A worker cannot join itself, nor wait on a caller that is joining it.
        if self.worker_ids.contains(&thread::current().id()) {
            debug!("Shutdown requested from a worker thread, not joining");
            return;
        }

        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        if workers.is_empty() {
            return;
        }
        for handle in workers.drain(..) {
            if handle.join().is_err() {
                error!("Worker thread terminated abnormally");
            }
        }
        info!("Thread pool shut down");
    }

    fn is_shutdown(&self) -> bool {
        self.shared.lock().abort
    }
}

impl Drop for SharedQueueThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Worker main loop. The condition-variable wait is the only place a worker
/// blocks; tasks run with the lock released.
fn worker_loop(id: usize, shared: &Shared) {
    debug!("Worker {id} started");
    loop {
        let task = {
            let state = shared.lock();
            let mut state = shared
                .cv
                .wait_while(state, |s| !s.abort && s.queue.is_empty())
                .unwrap_or_else(PoisonError::into_inner);
            if state.abort {
                break;
            }
            match state.queue.pop_front() {
                Some(task) => task,
                None => continue,
            }
        };
        run_task(task.as_ref());
    }
    debug!("Worker {id} exiting");
}
