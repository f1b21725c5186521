use thiserror::Error;

use crate::error::AcquireError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Text acquisition failed: {0}")]
    Acquire(#[from] AcquireError),
}

impl PipelineError {
    /// True when retrying the job cannot help (unsupported or corrupt
    /// input). Everything else is treated as transient.
    pub fn is_permanent(&self) -> bool {
        match self {
            PipelineError::Acquire(e) => e.is_permanent(),
        }
    }
}
