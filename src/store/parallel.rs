use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::slot_store::{SlotIndex, SlotStore};
use crate::sync::{JobBarrier, Priority, WorkerPool};

impl<T: Sync> SlotStore<T> {
    /// Visits every live slot from a bounded set of pool workers. The live
    /// range is split into `chunk_size` chunks which the workers pull via
    /// a shared cursor, so an uneven workload cannot strand one worker
    /// with all the slow elements.
    ///
    /// `f` runs concurrently for distinct indices but never twice for the
    /// same index. Ordering across indices is unspecified. Small stores
    /// degrade to the serial walk.
    ///
    /// The store must not be mutated while this runs; the caller owns that
    /// phase separation.
    pub fn parallel_for_each_alive<F>(&self, pool: &WorkerPool, chunk_size: usize, f: F)
    where
        F: Fn(SlotIndex, &T) + Send + Sync,
    {
        assert!(chunk_size > 0);
        let len = self.len();
        if self.live_count() == 0 {
            return;
        }
        if len <= chunk_size || pool.worker_count() < 2 {
            self.for_each_alive(|index, value| f(index, value));
            return;
        }

        profiling::scope!("parallel_for_each_alive");

        let chunk_count = len.div_ceil(chunk_size);
        let worker_count = usize::min(pool.worker_count(), chunk_count);
        let cursor = Arc::new(AtomicUsize::new(0));
        let barrier = JobBarrier::new();

        // Each job borrows `self` and `f`; the barrier outlives every job,
        // so those borrows stay valid: wait() below does not return before
        // the last job dropped its guard.
        let store = self;
        let func = &f;

        for _ in 0..worker_count {
            let dep = barrier.dependency();
            let cursor = cursor.clone();
            let job: Box<dyn FnOnce() + Send + '_> = Box::new(move || {
                let _d = dep;
                loop {
                    let chunk = cursor.fetch_add(1, Ordering::Relaxed);
                    let start = chunk * chunk_size;
                    if start >= len {
                        break;
                    }
                    store.for_each_alive_in_range(start, start + chunk_size, func);
                }
            });
            // SAFETY: the pool's queue is 'static-bounded, but barrier.wait()
            // below joins every job before this function returns, so the
            // borrowed captures outlive all jobs. Launder the job's lifetime
            // into the 'static queue.
            let job: Box<dyn FnOnce() + Send + 'static> =
                unsafe { std::mem::transmute(job) };
            pool.exec_prioritised(move || job(), Priority::High);
        }

        barrier.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    #[test]
    fn visits_every_live_slot_exactly_once() {
        let pool = WorkerPool::new(4);
        let mut store = SlotStore::new();
        for i in 0..1000u64 {
            store.insert(i);
        }
        for i in (0..1000).step_by(7) {
            store.release(i);
        }

        let sum = AtomicU64::new(0);
        let visits = AtomicU64::new(0);
        store.parallel_for_each_alive(&pool, 32, |index, value| {
            assert_eq!(index as u64, *value);
            sum.fetch_add(*value, Ordering::Relaxed);
            visits.fetch_add(1, Ordering::Relaxed);
        });

        let mut expect_sum = 0;
        let mut expect_visits = 0;
        store.for_each_alive(|_, value| {
            expect_sum += *value;
            expect_visits += 1;
        });
        assert_eq!(sum.load(Ordering::Relaxed), expect_sum);
        assert_eq!(visits.load(Ordering::Relaxed), expect_visits);
        pool.stop();
    }

    #[test]
    fn small_store_degrades_to_serial() {
        let pool = WorkerPool::new(4);
        let mut store = SlotStore::new();
        for i in 0..10u64 {
            store.insert(i);
        }
        let visits = AtomicU64::new(0);
        store.parallel_for_each_alive(&pool, 64, |_, _| {
            visits.fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(visits.load(Ordering::Relaxed), 10);
        pool.stop();
    }
}
