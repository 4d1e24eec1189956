use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// A counting semaphore.
///
/// Task completion hooks `release` permits; a coordinator `wait`s for as
/// many permits as it submitted tasks.
#[derive(Debug, Default)]
pub struct Semaphore {
    count: Mutex<usize>,
    cv: Condvar,
}

impl Semaphore {
    /// Creates a semaphore holding `permits` permits.
    pub fn new(permits: usize) -> Self {
        Semaphore {
            count: Mutex::new(permits),
            cv: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        self.count.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds `n` permits and wakes waiters.
    pub fn release(&self, n: usize) {
        if n == 0 {
            return;
        }
        *self.lock() += n;
        self.cv.notify_all();
    }

    /// Blocks until `n` permits are available, then takes them.
    pub fn wait(&self, n: usize) {
        let count = self.lock();
        let mut count = self
            .cv
            .wait_while(count, |c| *c < n)
            .unwrap_or_else(PoisonError::into_inner);
        *count -= n;
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`.
    ///
    /// Returns false, taking nothing, if the permits did not show up in time.
    pub fn wait_timeout(&self, n: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.lock();
        while *count < n {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            count = self
                .cv
                .wait_timeout(count, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        *count -= n;
        true
    }

    /// Permits currently available.
    pub fn available(&self) -> usize {
        *self.lock()
    }
}
