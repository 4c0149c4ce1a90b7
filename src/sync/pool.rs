use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

type Job = Box<dyn FnOnce() + Send>;

#[derive(Clone, Copy)]
pub enum Priority {
    High,
    Normal,
    Low,
}

pub(crate) enum PoolSignal {
    WakeUp,
}

struct PoolMeta {
    worker_count: AtomicU64,
    job_sender_low: crossbeam_channel::Sender<Job>,
    job_sender_normal: crossbeam_channel::Sender<Job>,
    job_sender_high: crossbeam_channel::Sender<Job>,
    job_reciever_low: crossbeam_channel::Receiver<Job>,
    job_reciever_normal: crossbeam_channel::Receiver<Job>,
    job_reciever_high: crossbeam_channel::Receiver<Job>,
    signal_sender: crossbeam_channel::Sender<PoolSignal>,
    signal_reciever: crossbeam_channel::Receiver<PoolSignal>,
    end_pool: AtomicBool,
    open_jobs: AtomicU64,
}

fn worker(meta: Arc<PoolMeta>, _worker_index: usize) {
    'outer: while !meta.end_pool.load(Ordering::Relaxed) || meta.open_jobs.load(Ordering::Acquire) > 0
    {
        // block until any queue has work, preferring the most urgent one
        let order = crossbeam_channel::select! {
            recv(meta.job_reciever_low) -> job => job.unwrap(),
            recv(meta.job_reciever_normal) -> job => job.unwrap(),
            recv(meta.job_reciever_high) -> job => job.unwrap(),
            recv(meta.signal_reciever) -> info => {
                match info.unwrap() {
                    PoolSignal::WakeUp => continue 'outer,
                }
            },
        };

        let mut order = Some(order);

        while let Some(job) = order.take() {
            {
                profiling::scope!("pool worker job");
                job();
            }
            meta.open_jobs.fetch_sub(1, Ordering::AcqRel);

            // drain directly available work before blocking again
            if let Ok(job) = meta.job_reciever_high.try_recv() {
                order = Some(job);
            } else if let Ok(job) = meta.job_reciever_normal.try_recv() {
                order = Some(job);
            } else if let Ok(job) = meta.job_reciever_low.try_recv() {
                order = Some(job);
            }
        }
    }
    meta.worker_count.fetch_sub(1, Ordering::Relaxed);
    for _ in 0..meta.worker_count.load(Ordering::Relaxed) {
        let _ = meta.signal_sender.send(PoolSignal::WakeUp);
    }
    log::debug!("pool worker ended");
}

/// Bounded pool of closure-executing worker threads with three priority
/// queues. Workers drain open jobs before shutting down.
pub struct WorkerPool {
    meta: Arc<PoolMeta>,
    worker_joins: Mutex<Option<Vec<std::thread::JoinHandle<()>>>>,
}

impl WorkerPool {
    /// `worker_count` of 0 picks `physical cores - 1`, at least 1.
    pub fn new(worker_count: usize) -> Self {
        let (s_low, r_low) = crossbeam_channel::unbounded();
        let (s_normal, r_normal) = crossbeam_channel::unbounded();
        let (s_high, r_high) = crossbeam_channel::unbounded();
        let (signal_snd, signal_rcv) = crossbeam_channel::unbounded();

        let worker_count = if worker_count == 0 {
            usize::max(1, num_cpus::get_physical() - 1)
        } else {
            worker_count
        };
        log::info!("worker pool started with {} threads", worker_count);

        let meta = Arc::new(PoolMeta {
            worker_count: AtomicU64::from(worker_count as u64),
            job_sender_low: s_low,
            job_sender_normal: s_normal,
            job_sender_high: s_high,
            job_reciever_low: r_low,
            job_reciever_normal: r_normal,
            job_reciever_high: r_high,
            signal_sender: signal_snd,
            signal_reciever: signal_rcv,
            end_pool: AtomicBool::from(false),
            open_jobs: AtomicU64::from(0),
        });

        let worker_joins = (0..worker_count)
            .map(|index| {
                let meta = meta.clone();
                std::thread::Builder::new()
                    .name(std::format!("pool worker {}", index))
                    .spawn(move || {
                        profiling::register_thread!(
                            std::format!("pool worker {}", index).as_str()
                        );
                        worker(meta, index);
                    })
                    .unwrap()
            })
            .collect::<Vec<_>>();

        Self {
            meta,
            worker_joins: Mutex::new(Some(worker_joins)),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.meta.worker_count.load(Ordering::Relaxed) as usize
    }

    /// Submitted closures should not block and should have a short runtime.
    pub fn exec_prioritised(&self, closure: impl FnOnce() + Send + 'static, priority: Priority) {
        let sender = match priority {
            Priority::Low => &self.meta.job_sender_low,
            Priority::Normal => &self.meta.job_sender_normal,
            Priority::High => &self.meta.job_sender_high,
        };
        self.meta.open_jobs.fetch_add(1, Ordering::AcqRel);
        sender.send(Box::new(closure)).unwrap();
    }

    pub fn exec(&self, closure: impl FnOnce() + Send + 'static) {
        self.exec_prioritised(closure, Priority::Normal);
    }

    /// Workers terminate after all open jobs are completed. Looping jobs
    /// must be notified before calling this.
    pub fn stop(&self) {
        if let Some(mut worker_joins) = self.worker_joins.lock().take() {
            self.meta.end_pool.store(true, Ordering::Release);

            for _ in 0..self.meta.worker_count.load(Ordering::Relaxed) {
                let _ = self.meta.signal_sender.send(PoolSignal::WakeUp);
            }

            while let Some(join_handle) = worker_joins.pop() {
                join_handle.join().unwrap();
            }

            log::info!("worker pool shut down");
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn executes_all_jobs_before_stop() {
        let pool = WorkerPool::new(3);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..300 {
            let counter = counter.clone();
            pool.exec(move || {
                counter.fetch_add(1, Ordering::Relaxed);
            });
        }
        pool.stop();
        assert_eq!(counter.load(Ordering::Relaxed), 300);
    }

    #[test]
    fn priorities_are_all_drained() {
        let pool = WorkerPool::new(2);
        let counter = Arc::new(AtomicUsize::new(0));
        for i in 0..90 {
            let counter = counter.clone();
            let priority = match i % 3 {
                0 => Priority::High,
                1 => Priority::Normal,
                _ => Priority::Low,
            };
            pool.exec_prioritised(
                move || {
                    counter.fetch_add(1, Ordering::Relaxed);
                },
                priority,
            );
        }
        pool.stop();
        assert_eq!(counter.load(Ordering::Relaxed), 90);
    }
}
