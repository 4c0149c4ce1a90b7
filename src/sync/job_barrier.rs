use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::Thread;

use parking_lot::Mutex;

struct SharedData {
    count: AtomicUsize,
    waiter: Mutex<Option<Thread>>,
}

/// Held by a fanned-out job for as long as it runs. The last guard to drop
/// wakes the barrier.
pub struct JobGuard {
    data: Arc<SharedData>,
}

impl Clone for JobGuard {
    fn clone(&self) -> Self {
        self.data.count.fetch_add(1, Ordering::AcqRel);
        Self {
            data: self.data.clone(),
        }
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        let count = self.data.count.fetch_sub(1, Ordering::AcqRel);
        if count == 1 {
            if let Some(waiter) = self.data.waiter.lock().take() {
                waiter.unpark();
            }
        }
    }
}

/// Completion latch for a batch of jobs handed to the pool: take one
/// [`JobGuard`] per job, then [`wait`](Self::wait) for every guard to drop.
pub struct JobBarrier {
    data: Arc<SharedData>,
}

impl JobBarrier {
    pub fn new() -> Self {
        Self {
            data: Arc::new(SharedData {
                count: AtomicUsize::new(0),
                waiter: Mutex::new(None),
            }),
        }
    }

    pub fn dependency(&self) -> JobGuard {
        self.data.count.fetch_add(1, Ordering::AcqRel);
        JobGuard {
            data: self.data.clone(),
        }
    }

    /// Parks the calling thread until all outstanding guards are gone.
    pub fn wait(self) {
        *self.data.waiter.lock() = Some(std::thread::current());
        while self.data.count.load(Ordering::Acquire) != 0 {
            std::thread::park();
        }
    }
}

impl Default for JobBarrier {
    fn default() -> Self {
        Self::new()
    }
}
