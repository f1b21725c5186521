use crate::pipeline::PipelineError;
use crate::queue::{FailureKind, Job};

/// What a worker reports back for one processed job.
#[derive(Debug)]
pub struct JobOutcome {
    pub job_id: String,
    pub session_id: String,
    pub success: bool,
    pub record_id: Option<String>,
    pub flagged: Option<bool>,
    pub error: Option<String>,
}

impl JobOutcome {
    pub fn success(job: &Job, record_id: String, flagged: bool) -> Self {
        Self {
            job_id: job.id.clone(),
            session_id: job.session_id.clone(),
            success: true,
            record_id: Some(record_id),
            flagged: Some(flagged),
            error: None,
        }
    }

    pub fn failure(job: &Job, error: String) -> Self {
        Self {
            job_id: job.id.clone(),
            session_id: job.session_id.clone(),
            success: false,
            record_id: None,
            flagged: None,
            error: Some(error),
        }
    }
}

/// Maps a pipeline failure onto the queue's retry policy.
pub fn classify_failure(error: &PipelineError) -> FailureKind {
    if error.is_permanent() {
        FailureKind::Permanent
    } else {
        FailureKind::Transient
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquire::DocumentFormat;
    use crate::error::AcquireError;
    use std::path::PathBuf;

    fn test_job() -> Job {
        Job {
            id: "j1".to_string(),
            session_id: "s1".to_string(),
            document_path: PathBuf::from("/tmp/doc.pdf"),
            format: DocumentFormat::Pdf,
            attempt_count: 1,
            max_retries: 3,
        }
    }

    #[test]
    fn test_outcome_success() {
        let outcome = JobOutcome::success(&test_job(), "rec-1".to_string(), true);
        assert!(outcome.success);
        assert_eq!(outcome.record_id.as_deref(), Some("rec-1"));
        assert_eq!(outcome.flagged, Some(true));
        assert!(outcome.error.is_none());
    }

    #[test]
    fn test_outcome_failure() {
        let outcome = JobOutcome::failure(&test_job(), "boom".to_string());
        assert!(!outcome.success);
        assert!(outcome.record_id.is_none());
        assert_eq!(outcome.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_corrupt_input_is_permanent() {
        let error = PipelineError::Acquire(AcquireError::CorruptInput("bad".to_string()));
        assert_eq!(classify_failure(&error), FailureKind::Permanent);
    }

    #[test]
    fn test_ocr_failure_is_transient() {
        let error = PipelineError::Acquire(AcquireError::Ocr("engine unavailable".to_string()));
        assert_eq!(classify_failure(&error), FailureKind::Transient);
    }
}
