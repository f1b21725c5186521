//! End-to-end flows: upload through worker pool, review workflow, export.

use std::sync::Arc;
use std::time::Duration;

use licrec::config::{QueueConfig, ReviewConfig};
use licrec::db::{record_repo, session_repo, Database};
use licrec::export::{ColumnMapping, CsvExporter, ExportFilter};
use licrec::model::{ReviewStatus, SessionStatus};
use licrec::pipeline::PipelineConfig;
use licrec::queue::JobQueue;
use licrec::schema::FieldSchema;
use licrec::storage::DocumentStore;
use licrec::worker::WorkerPool;
use licrec::{AuditWorkflow, DocumentFormat};

const CLEAN_DOCUMENT: &str = "\
Dacorum Borough Council
Licence reference: HMO/12345
Property address: 12 High Street, Hemel Hempstead, HP1 1AB
Licence start: 2023-01-15
Expiry date: 2026-01-14
Maximum occupancy: 6
HMO Manager: John Smith
Licence holder: Jane Doe
";

const INVERTED_DATES_DOCUMENT: &str = "\
Fife Council
Licence reference: HMO/4242
Property address: 3 Harbour Road, Anstruther, KY10 3AB
Licence start: 2023-01-15
Expiry date: 2021-01-14
Maximum occupancy: 5
";

struct Harness {
    queue: JobQueue,
    store: DocumentStore,
    pool: WorkerPool,
    _tmp: tempfile::TempDir,
}

impl Harness {
    fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();
        let queue = JobQueue::new(
            db,
            QueueConfig {
                max_retries: 3,
                lease_seconds: 300,
                backoff_base_seconds: 0,
                poll_interval_ms: 5,
            },
        );
        let mut config = PipelineConfig::default();
        config.ocr.enabled = false;
        let pool = WorkerPool::new(queue.clone(), Arc::new(config), 2);
        let store = DocumentStore::new(tmp.path());
        Self {
            queue,
            store,
            pool,
            _tmp: tmp,
        }
    }

    fn process(&self, name: &str, content: &str) -> String {
        let (session, _job) = self
            .queue
            .submit_document(&self.store, name, content.as_bytes(), DocumentFormat::Text)
            .unwrap();
        let outcome = self
            .pool
            .recv_outcome_timeout(Duration::from_secs(10))
            .expect("worker should report an outcome");
        assert_eq!(outcome.session_id, session.session_id);
        session.session_id
    }

    fn workflow(&self) -> AuditWorkflow {
        AuditWorkflow::new(
            self.queue.database().clone(),
            FieldSchema::licensing(),
            ReviewConfig::default(),
        )
    }

    fn finish(self) {
        self.pool.shutdown();
        self.pool.wait();
    }
}

#[test]
fn test_clean_document_flows_to_export() {
    let harness = Harness::new();
    let session_id = harness.process("register.txt", CLEAN_DOCUMENT);

    let session = session_repo::find_by_id(harness.queue.database(), &session_id)
        .unwrap()
        .unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.metrics.total_records, 1);
    assert_eq!(session.metrics.flagged_records, 0);

    let records = record_repo::list_by_session(harness.queue.database(), &session_id).unwrap();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert!(!record.flagged);
    assert_eq!(record.field("licence_start").unwrap().value, "2023-01-15");
    assert_eq!(record.field("max_occupancy").unwrap().value, "6");

    let schema = FieldSchema::licensing();
    let exporter = CsvExporter::new(ColumnMapping::default_for(&schema));
    let csv = exporter
        .export_to_string(&records, &ExportFilter::default())
        .unwrap();
    assert!(csv.contains("HMO/12345"));
    assert!(csv.contains("\"12 High Street, Hemel Hempstead, HP1 1AB\""));

    harness.finish();
}

#[test]
fn test_flagged_document_reviewed_and_exported() {
    let harness = Harness::new();
    let session_id = harness.process("register.txt", INVERTED_DATES_DOCUMENT);

    let records = record_repo::list_by_session(harness.queue.database(), &session_id).unwrap();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert!(record.flagged, "inverted dates must flag the record");
    assert!(!record.field("licence_expiry").unwrap().validity.is_valid());

    // Nothing reviewed yet: reviewed-only export is empty.
    let schema = FieldSchema::licensing();
    let exporter = CsvExporter::new(ColumnMapping::default_for(&schema));
    let csv = exporter
        .export_to_string(&records, &ExportFilter::reviewed_only())
        .unwrap();
    assert_eq!(csv.lines().count(), 1, "header only");

    // A reviewer fixes the expiry date.
    let workflow = harness.workflow();
    let flagged = workflow.flagged_records(Some(session_id.as_str())).unwrap();
    assert_eq!(flagged.len(), 1);
    let record_id = flagged[0].record_id.clone();

    workflow.open_review(&record_id, "alice").unwrap();
    let corrected = workflow
        .commit_correction(&record_id, "licence_expiry", "2026-01-14", "alice")
        .unwrap();

    assert_eq!(corrected.review_status, ReviewStatus::Reviewed);
    let expiry = corrected.field("licence_expiry").unwrap();
    assert_eq!(expiry.value, "2026-01-14");
    assert_eq!(expiry.confidence, 1.0);
    assert!(expiry.validity.is_valid());

    let history = workflow.history(&record_id).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].new_value, "2026-01-14");

    // The corrected record now passes the reviewed-only export.
    let records = record_repo::list_by_session(harness.queue.database(), &session_id).unwrap();
    let csv = exporter
        .export_to_string(&records, &ExportFilter::reviewed_only())
        .unwrap();
    assert!(csv.contains("2026-01-14"));
    assert!(csv.contains("HMO/4242"));

    harness.finish();
}

#[test]
fn test_queue_stats_reflect_processing() {
    let harness = Harness::new();
    harness.process("a.txt", CLEAN_DOCUMENT);
    harness.process("b.txt", CLEAN_DOCUMENT);

    let stats = harness.queue.stats().unwrap();
    assert_eq!(stats.get("succeeded").copied().unwrap_or(0), 2);

    harness.finish();
}
