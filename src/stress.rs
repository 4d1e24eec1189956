use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::sync::Semaphore;
use crate::task::Task;
use crate::thread_pool::{RayonThreadPool, SharedQueueThreadPool, ThreadPool};
use crate::{PoolError, Result};

/// Which pool implementation a stress run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// [`SharedQueueThreadPool`].
    Shared,
    /// [`RayonThreadPool`].
    Rayon,
}

impl FromStr for Backend {
    type Err = PoolError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "shared" => Ok(Backend::Shared),
            "rayon" => Ok(Backend::Rayon),
            _ => Err(PoolError::StringError(format!(
                "Invalid backend: {s}. Must be 'shared' or 'rayon'."
            ))),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Shared => f.write_str("shared"),
            Backend::Rayon => f.write_str("rayon"),
        }
    }
}

/// Parameters of a stress run.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Pool implementation.
    pub backend: Backend,
    /// Worker count.
    pub threads: u32,
    /// Tasks submitted per iteration.
    pub tasks: usize,
    /// Concurrent submitting threads.
    pub producers: usize,
    /// Number of pools created and torn down.
    pub iterations: usize,
}

/// Result of a stress run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StressReport {
    /// Pool implementation.
    pub backend: Backend,
    /// Worker count.
    pub threads: u32,
    /// Tasks submitted per iteration.
    pub tasks: usize,
    /// Concurrent submitting threads.
    pub producers: usize,
    /// Number of iterations run.
    pub iterations: usize,
    /// Total increments observed across all iterations.
    pub completed: usize,
    /// Wall-clock time of the whole run.
    pub elapsed_ms: u64,
}

impl StressReport {
    /// True if every submitted task ran exactly once.
    pub fn is_exact(&self) -> bool {
        self.completed == self.tasks * self.iterations
    }
}

struct Increment {
    counter: Arc<AtomicUsize>,
    finished: Arc<Semaphore>,
}

impl Task for Increment {
    fn execute(&self) {
        self.counter.fetch_add(1, Ordering::Relaxed);
    }

    fn done(&self) {
        self.finished.release(1);
    }
}

/// Runs the configured stress workload and reports what was counted.
pub fn run(config: &StressConfig) -> Result<StressReport> {
    if config.producers == 0 {
        return Err(PoolError::StringError(
            "At least one producer is required".to_owned(),
        ));
    }

    let counter = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();
    for iteration in 0..config.iterations {
        match config.backend {
            Backend::Shared => {
                run_iteration(&SharedQueueThreadPool::new(config.threads)?, config, &counter)?
            }
            Backend::Rayon => {
                run_iteration(&RayonThreadPool::new(config.threads)?, config, &counter)?
            }
        }
        debug!("Iteration {iteration} finished");
    }

    let report = StressReport {
        backend: config.backend,
        threads: config.threads,
        tasks: config.tasks,
        producers: config.producers,
        iterations: config.iterations,
        completed: counter.load(Ordering::SeqCst),
        elapsed_ms: start.elapsed().as_millis() as u64,
    };
    info!(
        "Completed {} tasks in {} ms",
        report.completed, report.elapsed_ms
    );
    Ok(report)
}

fn run_iteration<P>(pool: &P, config: &StressConfig, counter: &Arc<AtomicUsize>) -> Result<()>
where
    P: ThreadPool + Sync,
{
    let finished = Arc::new(Semaphore::new(0));
    let per_producer = config.tasks / config.producers;
    let remainder = config.tasks % config.producers;

    crossbeam::scope(|scope| {
        for producer in 0..config.producers {
            let count = per_producer + usize::from(producer < remainder);
            let counter = Arc::clone(counter);
            let finished = Arc::clone(&finished);
            scope.spawn(move |_| {
                for _ in 0..count {
                    pool.execute(Arc::new(Increment {
                        counter: Arc::clone(&counter),
                        finished: Arc::clone(&finished),
                    }));
                }
            });
        }
    })
    .map_err(|_| PoolError::StringError("Producer thread panicked".to_owned()))?;

    finished.wait(config.tasks);
    Ok(())
}
