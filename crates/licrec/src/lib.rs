pub mod acquire;
pub mod assemble;
pub mod audit;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod extract;
pub mod model;
pub mod pipeline;
pub mod queue;
pub mod schema;
pub mod score;
pub mod storage;
pub mod validate;
pub mod worker;

pub use acquire::{AcquirerRegistry, DocumentFormat, OcrEngine, TextSpan};
pub use audit::{auto_accept_if_eligible, AuditError, AuditWorkflow};
pub use config::{load_config, Config, QueueConfig, ReviewConfig, ScoringConfig};
pub use db::Database;
pub use error::{AcquireError, ConfigError, LicrecError, Result, StorageError};
pub use export::{ColumnMapping, CsvExporter, ExportError, ExportFilter};
pub use model::{AuditEvent, ProcessingSession, ReviewStatus, SessionStatus, StructuredRecord};
pub use pipeline::{Pipeline, PipelineConfig, PipelineContext};
pub use queue::{FailureKind, Job, JobQueue, QueueError};
pub use schema::{FieldKind, FieldSchema};
pub use storage::DocumentStore;
pub use worker::WorkerPool;
