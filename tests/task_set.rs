use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{self, Sender};
use taskpool::{
    parallel_for, PoolError, RayonThreadPool, Result, SharedQueueThreadPool, Task, TaskSet,
    ThreadPool,
};

struct Slot {
    executed: AtomicUsize,
    done: AtomicUsize,
    delay: Duration,
}

impl Slot {
    fn new(delay_ms: u64) -> Arc<Self> {
        Arc::new(Slot {
            executed: AtomicUsize::new(0),
            done: AtomicUsize::new(0),
            delay: Duration::from_millis(delay_ms),
        })
    }
}

impl Task for Slot {
    fn execute(&self) {
        thread::sleep(self.delay);
        self.executed.fetch_add(1, Ordering::SeqCst);
    }

    fn done(&self) {
        self.done.fetch_add(1, Ordering::SeqCst);
    }
}

fn wait_sees_every_done<P: ThreadPool>() -> Result<()> {
    let pool = P::new(3)?;
    let slots: Vec<Arc<Slot>> = (0..12u64).map(|i| Slot::new(i % 4)).collect();

    let mut set = TaskSet::new(&pool);
    for slot in &slots {
        set.push(slot.clone());
    }
    assert_eq!(set.len(), 12);
    set.execute()?;
    assert!(set.is_empty());
    set.wait()?;

    for slot in &slots {
        assert_eq!(slot.executed.load(Ordering::SeqCst), 1);
        assert_eq!(slot.done.load(Ordering::SeqCst), 1);
    }
    Ok(())
}

fn parallel_for_covers_range<P: ThreadPool>() -> Result<()> {
    const LEN: usize = 10_007;

    let pool = P::new(4)?;
    let hits: Arc<Vec<AtomicUsize>> = Arc::new((0..LEN).map(|_| AtomicUsize::new(0)).collect());
    let sum = Arc::new(AtomicU64::new(0));

    let hits2 = Arc::clone(&hits);
    let sum2 = Arc::clone(&sum);
    parallel_for(&pool, LEN, move |range| {
        for i in range {
            hits2[i].fetch_add(1, Ordering::Relaxed);
            sum2.fetch_add(i as u64, Ordering::Relaxed);
        }
    })?;

    assert!(hits.iter().all(|h| h.load(Ordering::SeqCst) == 1));
    assert_eq!(sum.load(Ordering::SeqCst), (LEN as u64 - 1) * LEN as u64 / 2);
    Ok(())
}

/// Occupies the pool's only worker until the returned sender fires.
fn block_single_worker<P: ThreadPool>(pool: &P) -> Sender<()> {
    let (started_tx, started_rx) = channel::bounded(1);
    let (release_tx, release_rx) = channel::bounded::<()>(1);
    pool.spawn(move || {
        started_tx.send(()).unwrap();
        release_rx.recv().unwrap();
    });
    started_rx.recv().unwrap();
    release_tx
}

fn wait_reports_shutdown_while_queued<P: ThreadPool + Sync>() -> Result<()> {
    let pool = P::new(1)?;
    let release = block_single_worker(&pool);

    let slots: Vec<Arc<Slot>> = (0..4).map(|_| Slot::new(0)).collect();
    let mut set = TaskSet::new(&pool);
    for slot in &slots {
        set.push(slot.clone());
    }
    set.execute()?;

    crossbeam_utils::thread::scope(|s| {
        s.spawn(|_| pool.shutdown());
        while !pool.is_shutdown() {
            thread::yield_now();
        }
        release.send(()).unwrap();
    })
    .unwrap();

    assert!(matches!(set.wait(), Err(PoolError::ShutDown)));
    assert!(slots.iter().all(|s| s.executed.load(Ordering::SeqCst) == 0));
    Ok(())
}

#[test]
fn shared_queue_task_set_shutdown_while_queued() -> Result<()> {
    wait_reports_shutdown_while_queued::<SharedQueueThreadPool>()
}

#[test]
fn rayon_task_set_shutdown_while_queued() -> Result<()> {
    wait_reports_shutdown_while_queued::<RayonThreadPool>()
}

#[test]
fn parallel_for_returns_when_pool_shuts_down() -> Result<()> {
    let pool = SharedQueueThreadPool::new(1)?;
    let release = block_single_worker(&pool);
    let visited = Arc::new(AtomicUsize::new(0));

    crossbeam_utils::thread::scope(|s| {
        let visited2 = Arc::clone(&visited);
        let chunks = s.spawn(|_| {
            parallel_for(&pool, 4, move |_| {
                visited2.fetch_add(1, Ordering::SeqCst);
            })
        });
        while pool.pending() == 0 {
            thread::yield_now();
        }

        let stopper = s.spawn(|_| pool.shutdown());
        while !pool.is_shutdown() {
            thread::yield_now();
        }
        release.send(()).unwrap();
        stopper.join().unwrap();

        assert!(matches!(chunks.join().unwrap(), Err(PoolError::ShutDown)));
    })
    .unwrap();

    assert_eq!(visited.load(Ordering::SeqCst), 0);
    Ok(())
}

#[test]
fn shared_queue_task_set_wait() -> Result<()> {
    wait_sees_every_done::<SharedQueueThreadPool>()
}

#[test]
fn rayon_task_set_wait() -> Result<()> {
    wait_sees_every_done::<RayonThreadPool>()
}

#[test]
fn shared_queue_parallel_for() -> Result<()> {
    parallel_for_covers_range::<SharedQueueThreadPool>()
}

#[test]
fn rayon_parallel_for() -> Result<()> {
    parallel_for_covers_range::<RayonThreadPool>()
}

#[test]
fn parallel_for_shorter_than_pool() -> Result<()> {
    let pool = SharedQueueThreadPool::new(8)?;
    let calls = Arc::new(AtomicUsize::new(0));
    let widest = Arc::new(AtomicUsize::new(0));
    let calls2 = Arc::clone(&calls);
    let widest2 = Arc::clone(&widest);
    parallel_for(&pool, 3, move |range| {
        widest2.fetch_max(range.len(), Ordering::SeqCst);
        calls2.fetch_add(1, Ordering::SeqCst);
    })?;
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(widest.load(Ordering::SeqCst), 1);

    let calls3 = Arc::clone(&calls);
    parallel_for(&pool, 0, move |_| {
        calls3.fetch_add(1, Ordering::SeqCst);
    })?;
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    Ok(())
}

#[test]
fn task_set_survives_panicking_member() -> Result<()> {
    struct Panicky;

    impl Task for Panicky {
        fn execute(&self) {
            panic_control::disable_hook_in_current_thread();
            panic!("member failed");
        }
    }

    let pool = SharedQueueThreadPool::new(2)?;
    let slot = Slot::new(0);
    let mut set = TaskSet::new(&pool);
    set.push(Arc::new(Panicky));
    set.push(slot.clone());
    set.execute()?;
    assert!(set.wait_timeout(Duration::from_secs(5))?);
    assert_eq!(slot.done.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn task_set_on_shut_down_pool() -> Result<()> {
    let pool = SharedQueueThreadPool::new(2)?;
    pool.shutdown();

    let mut set = TaskSet::new(&pool);
    set.push(Slot::new(0));
    assert!(matches!(set.execute(), Err(PoolError::ShutDown)));
    assert_eq!(set.len(), 1);
    Ok(())
}

#[test]
fn task_set_wait_timeout_expires() -> Result<()> {
    let pool = SharedQueueThreadPool::new(1)?;
    let slow = Slot::new(300);
    let mut set = TaskSet::new(&pool);
    set.push(slow.clone());
    set.execute()?;

    assert!(!set.wait_timeout(Duration::from_millis(10))?);
    assert!(set.wait_timeout(Duration::from_secs(5))?);
    assert_eq!(slow.done.load(Ordering::SeqCst), 1);
    Ok(())
}
