pub mod job;
pub mod pool;

pub use job::{classify_failure, JobOutcome};
pub use pool::WorkerPool;
