use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

/// Phases a job moves through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Queued,
    Acquiring,
    Extracting,
    Scoring,
    Validating,
    Assembling,
    Completed,
    Failed,
}

impl JobPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobPhase::Queued => "queued",
            JobPhase::Acquiring => "acquiring",
            JobPhase::Extracting => "extracting",
            JobPhase::Scoring => "scoring",
            JobPhase::Validating => "validating",
            JobPhase::Assembling => "assembling",
            JobPhase::Completed => "completed",
            JobPhase::Failed => "failed",
        }
    }
}

/// Events emitted by the pipeline during processing.
pub enum ProgressEvent {
    Phase {
        phase: JobPhase,
        message: String,
    },
    Completed {
        record_id: String,
        flagged: bool,
    },
    Failed {
        error: String,
    },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// One broadcast frame, consumable by any status view at the presentation
/// boundary.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgressEvent {
    pub job_id: String,
    pub session_id: String,
    pub phase: JobPhase,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flagged: Option<bool>,
    pub timestamp: DateTime<Utc>,
}

/// Bridges pipeline events onto a tokio broadcast channel.
pub struct BroadcastProgress {
    job_id: String,
    session_id: String,
    sender: Arc<broadcast::Sender<JobProgressEvent>>,
}

impl BroadcastProgress {
    pub fn new(
        job_id: &str,
        session_id: &str,
        sender: Arc<broadcast::Sender<JobProgressEvent>>,
    ) -> Self {
        Self {
            job_id: job_id.to_string(),
            session_id: session_id.to_string(),
            sender,
        }
    }

    fn send(&self, phase: JobPhase, message: String, record_id: Option<String>, flagged: Option<bool>) {
        // A send without subscribers is not an error.
        let _ = self.sender.send(JobProgressEvent {
            job_id: self.job_id.clone(),
            session_id: self.session_id.clone(),
            phase,
            message,
            record_id,
            flagged,
            timestamp: Utc::now(),
        });
    }
}

impl ProgressReporter for BroadcastProgress {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Phase { phase, message } => self.send(phase, message, None, None),
            ProgressEvent::Completed { record_id, flagged } => self.send(
                JobPhase::Completed,
                "Record assembled".to_string(),
                Some(record_id),
                Some(flagged),
            ),
            ProgressEvent::Failed { error } => self.send(JobPhase::Failed, error, None, None),
        }
    }
}
