use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, ThreadId};

use crossbeam::channel::{self, Receiver};
use log::{debug, info};

use super::ThreadPool;
use crate::task::{run_task, Task};
use crate::{PoolError, Result};

/// A thread pool backed by the `rayon` library.
///
/// Kept as a baseline for the shared-queue pool. It honours the same
/// shutdown contract through an abort flag that every queued closure checks
/// before running its task. Tasks go through `spawn_fifo`, so a batch keeps
/// its order even when submitted from inside a worker. Unlike
/// [`SharedQueueThreadPool`], a batch is spawned task by task and may
/// interleave with a concurrent submitter.
///
/// [`SharedQueueThreadPool`]: super::SharedQueueThreadPool
pub struct RayonThreadPool {
    pool: RwLock<Option<rayon::ThreadPool>>,
    abort: Arc<AtomicBool>,
    exited: Receiver<()>,
    /// Set once some caller outside the pool has seen every worker exit.
    drained: Mutex<bool>,
    worker_ids: Arc<Mutex<Vec<ThreadId>>>,
    size: usize,
}

impl RayonThreadPool {
    fn spawn_task(&self, pool: &rayon::ThreadPool, task: Arc<dyn Task>) {
        let abort = Arc::clone(&self.abort);
        pool.spawn_fifo(move || {
            if abort.load(Ordering::Acquire) {
                return;
            }
            run_task(task.as_ref());
        });
    }

    fn on_worker_thread(&self) -> bool {
        let current = thread::current().id();
        self.worker_ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&current)
    }
}

impl ThreadPool for RayonThreadPool {
    fn new(threads: u32) -> Result<Self> {
        if threads == 0 {
            return Err(PoolError::InvalidSize);
        }

        let (tx, exited) = channel::unbounded();
        let worker_ids = Arc::new(Mutex::new(Vec::with_capacity(threads as usize)));
        let started = Arc::clone(&worker_ids);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads as usize)
            .thread_name(|id| format!("rayon-pool-worker-{id}"))
            .start_handler(move |id| {
                debug!("Worker {id} started");
                started
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(thread::current().id());
            })
            .exit_handler(move |id| {
                debug!("Worker {id} exiting");
                let _ = tx.send(());
            })
            .build()
            .map_err(|e| PoolError::Build(e.to_string()))?;

        info!("Started rayon thread pool with {threads} workers");
        Ok(RayonThreadPool {
            pool: RwLock::new(Some(pool)),
            abort: Arc::new(AtomicBool::new(false)),
            exited,
            drained: Mutex::new(false),
            worker_ids,
            size: threads as usize,
        })
    }

    fn size(&self) -> usize {
        self.size
    }

    fn execute(&self, task: Arc<dyn Task>) {
        let pool = self.pool.read().unwrap_or_else(PoisonError::into_inner);
        match pool.as_ref() {
            Some(pool) if !self.is_shutdown() => self.spawn_task(pool, task),
            _ => debug!("Dropping task submitted after shutdown"),
        }
    }

    fn execute_batch(&self, tasks: Vec<Arc<dyn Task>>) {
        let pool = self.pool.read().unwrap_or_else(PoisonError::into_inner);
        match pool.as_ref() {
            Some(pool) if !self.is_shutdown() => {
                for task in tasks {
                    self.spawn_task(pool, task);
                }
            }
            _ => debug!("Dropping batch of {} tasks submitted after shutdown", tasks.len()),
        }
    }

    fn shutdown(&self) {
        self.abort.store(true, Ordering::Release);

        // Workers leave once the pool is dropped and every spawned closure
        // has returned; closures still queued see the abort flag and skip.
        let pool = self
            .pool
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(pool);

        if self.on_worker_thread() {
            debug!("Shutdown requested from a worker thread, not waiting");
            return;
        }

        let mut drained = self.drained.lock().unwrap_or_else(PoisonError::into_inner);
        if *drained {
            return;
        }
        for _ in 0..self.size {
            if self.exited.recv().is_err() {
                break;
            }
        }
        *drained = true;
        info!("Rayon thread pool shut down");
    }

    fn is_shutdown(&self) -> bool {
        self.abort.load(Ordering::Acquire)
    }
}

impl Drop for RayonThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
