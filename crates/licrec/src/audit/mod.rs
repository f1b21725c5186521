//! Audit workflow engine: human review of flagged records.
//!
//! Reviewers take an exclusive, time-bounded reservation before they can
//! change anything; commits re-validate the corrected value, append exactly
//! one audit event, lift the field's confidence to 1.0 and recompute the
//! record's quality score. A commit without a live reservation is rejected
//! as stale — last-writer-wins is not an option here.

use chrono::{Duration, Utc};
use thiserror::Error;

use crate::config::ReviewConfig;
use crate::db::{audit_repo, record_repo, Database, DatabaseError};
use crate::model::{AuditEvent, ReviewStatus, StructuredRecord};
use crate::schema::FieldSchema;
use crate::validate::{InvalidReason, Validator, Validity};

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("record {record_id} is already reserved by {reviewer}")]
    ReservationHeld { record_id: String, reviewer: String },

    #[error("reservation expired, reopen record")]
    StaleReservation,

    #[error("record {0} is rejected and closed to review")]
    RecordRejected(String),

    #[error("unknown field: {0}")]
    UnknownField(String),

    #[error("correction for '{field}' is invalid: {reason}")]
    InvalidCorrection {
        field: String,
        reason: InvalidReason,
    },

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

pub struct AuditWorkflow {
    db: Database,
    schema: FieldSchema,
    validator: Validator,
    review: ReviewConfig,
}

impl AuditWorkflow {
    pub fn new(db: Database, schema: FieldSchema, review: ReviewConfig) -> Self {
        Self {
            db,
            schema,
            validator: Validator::new(),
            review,
        }
    }

    /// Opens a record for review, taking the exclusive reservation.
    pub fn open_review(
        &self,
        record_id: &str,
        reviewer: &str,
    ) -> Result<StructuredRecord, AuditError> {
        let record = self.load(record_id)?;
        if record.review_status == ReviewStatus::Rejected {
            return Err(AuditError::RecordRejected(record_id.to_string()));
        }

        let expires_at = Utc::now() + Duration::seconds(self.review.reservation_seconds as i64);
        if !record_repo::try_reserve(&self.db, record_id, reviewer, expires_at)? {
            let holder = record
                .reviewer
                .clone()
                .unwrap_or_else(|| "unknown".to_string());
            return Err(AuditError::ReservationHeld {
                record_id: record_id.to_string(),
                reviewer: holder,
            });
        }

        log::info!("Record {} opened for review by {}", record_id, reviewer);
        self.load(record_id)
    }

    /// Commits one corrected field value under the caller's reservation.
    ///
    /// The value passes the validator's rules for that field, an audit
    /// event is appended (identical re-commits append again — the log
    /// never dedupes), the field's confidence becomes 1.0, and the record
    /// moves to `reviewed`.
    pub fn commit_correction(
        &self,
        record_id: &str,
        field: &str,
        value: &str,
        reviewer: &str,
    ) -> Result<StructuredRecord, AuditError> {
        let mut record = self.load(record_id)?;
        self.check_holder(&record, reviewer)?;

        let spec = self
            .schema
            .field(field)
            .ok_or_else(|| AuditError::UnknownField(field.to_string()))?;

        let normalized = match self.validator.validate_field(spec, value) {
            Validity::Valid { normalized } => normalized,
            Validity::Invalid { reason } => {
                return Err(AuditError::InvalidCorrection {
                    field: field.to_string(),
                    reason,
                })
            }
        };

        let old_value = record
            .fields
            .get(field)
            .map(|f| f.value.clone())
            .unwrap_or_default();

        // Apply the correction, then re-run validation across the record so
        // cross-field verdicts (e.g. date ordering) reflect the new value.
        {
            let state = record
                .fields
                .get_mut(field)
                .ok_or_else(|| AuditError::UnknownField(field.to_string()))?;
            state.value = normalized.clone();
            state.confidence = 1.0;
        }
        self.revalidate(&mut record);

        record.overall_quality_score =
            StructuredRecord::compute_quality_score(&self.schema, &record.fields);
        record.flagged = StructuredRecord::compute_flagged(
            &self.schema,
            &record.fields,
            self.review.review_threshold,
        );

        if !record_repo::commit_with_status(&self.db, &record, reviewer, ReviewStatus::Reviewed)? {
            return Err(AuditError::StaleReservation);
        }

        audit_repo::append(
            &self.db,
            &AuditEvent {
                event_id: uuid::Uuid::new_v4().to_string(),
                record_id: record_id.to_string(),
                field: field.to_string(),
                old_value,
                new_value: normalized,
                reviewer_id: reviewer.to_string(),
                created_at: Utc::now(),
            },
        )?;

        log::info!(
            "Correction committed on {}.{} by {}",
            record_id,
            field,
            reviewer
        );
        self.load(record_id)
    }

    /// Releases the reservation and returns the record to `pending`.
    pub fn defer(&self, record_id: &str, reviewer: &str) -> Result<(), AuditError> {
        let record = self.load(record_id)?;
        self.check_holder(&record, reviewer)?;

        if !record_repo::commit_with_status(&self.db, &record, reviewer, ReviewStatus::Pending)? {
            return Err(AuditError::StaleReservation);
        }
        Ok(())
    }

    /// Terminally rejects the record, excluding it from export.
    pub fn reject(&self, record_id: &str, reviewer: &str) -> Result<(), AuditError> {
        let record = self.load(record_id)?;
        self.check_holder(&record, reviewer)?;

        if !record_repo::commit_with_status(&self.db, &record, reviewer, ReviewStatus::Rejected)? {
            return Err(AuditError::StaleReservation);
        }
        log::info!("Record {} rejected by {}", record_id, reviewer);
        Ok(())
    }

    /// Flagged records awaiting review.
    pub fn flagged_records(
        &self,
        session_id: Option<&str>,
    ) -> Result<Vec<StructuredRecord>, AuditError> {
        Ok(record_repo::list_flagged(&self.db, session_id)?)
    }

    /// Full correction history of one record, in append order.
    pub fn history(&self, record_id: &str) -> Result<Vec<AuditEvent>, AuditError> {
        Ok(audit_repo::list_by_record(&self.db, record_id)?)
    }

    fn load(&self, record_id: &str) -> Result<StructuredRecord, AuditError> {
        record_repo::find_by_id(&self.db, record_id)?
            .ok_or_else(|| AuditError::NotFound(record_id.to_string()))
    }

    fn check_holder(&self, record: &StructuredRecord, reviewer: &str) -> Result<(), AuditError> {
        let holds = record.review_status == ReviewStatus::InReview
            && record.reviewer.as_deref() == Some(reviewer)
            && record
                .reservation_expires_at
                .map(|t| t >= Utc::now())
                .unwrap_or(false);
        if holds {
            Ok(())
        } else {
            Err(AuditError::StaleReservation)
        }
    }

    fn revalidate(&self, record: &mut StructuredRecord) {
        let values: std::collections::BTreeMap<String, String> = record
            .fields
            .iter()
            .map(|(name, state)| (name.clone(), state.value.clone()))
            .collect();
        let verdicts = self.validator.validate_record(&self.schema, &values);
        for (name, verdict) in verdicts {
            if let Some(state) = record.fields.get_mut(&name) {
                if let Validity::Valid { normalized } = &verdict {
                    if !normalized.is_empty() {
                        state.value = normalized.clone();
                    }
                }
                state.validity = verdict;
            }
        }
    }
}

/// Machine fast path: accepts a record without human review when its
/// overall quality clears the auto-accept bar and nothing is invalid.
pub fn auto_accept_if_eligible(
    db: &Database,
    review: &ReviewConfig,
    record: &StructuredRecord,
) -> Result<bool, DatabaseError> {
    let no_invalid = record.fields.values().all(|f| f.validity.is_valid());
    if no_invalid && record.overall_quality_score >= review.auto_accept_threshold {
        record_repo::auto_accept(db, &record.record_id)
    } else {
        Ok(false)
    }
}
