pub mod pool;
pub mod job_barrier;
pub mod triple_buffer;

#[allow(unused)]
pub use pool::{WorkerPool, Priority};
#[allow(unused)]
pub use job_barrier::{JobBarrier, JobGuard};
#[allow(unused)]
pub use triple_buffer::TripleCell;
