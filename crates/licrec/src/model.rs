//! Core persisted entities: structured records, processing sessions and
//! audit events.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::schema::FieldSchema;
use crate::validate::Validity;

/// Review lifecycle of a structured record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewStatus {
    Pending,
    InReview,
    Reviewed,
    Rejected,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::InReview => "in_review",
            ReviewStatus::Reviewed => "reviewed",
            ReviewStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ReviewStatus::Pending),
            "in_review" => Some(ReviewStatus::InReview),
            "reviewed" => Some(ReviewStatus::Reviewed),
            "rejected" => Some(ReviewStatus::Rejected),
            _ => None,
        }
    }
}

/// Processing lifecycle of an upload session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Queued => "queued",
            SessionStatus::Processing => "processing",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(SessionStatus::Queued),
            "processing" => Some(SessionStatus::Processing),
            "completed" => Some(SessionStatus::Completed),
            "failed" => Some(SessionStatus::Failed),
            _ => None,
        }
    }
}

/// One field of a structured record: extracted value, trust score and
/// validation verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldState {
    pub value: String,
    pub confidence: f64,
    pub validity: Validity,
}

/// One output row of the pipeline. Created once by the assembler; after
/// that, mutated only through audit-workflow corrections.
#[derive(Debug, Clone)]
pub struct StructuredRecord {
    pub record_id: String,
    pub session_id: String,
    pub fields: BTreeMap<String, FieldState>,
    pub overall_quality_score: f64,
    pub flagged: bool,
    pub review_status: ReviewStatus,
    pub reviewer: Option<String>,
    pub reservation_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StructuredRecord {
    pub fn field(&self, name: &str) -> Option<&FieldState> {
        self.fields.get(name)
    }

    /// Criticality-weighted mean of field confidences over the whole
    /// schema. Fields absent from the record contribute zero.
    pub fn compute_quality_score(schema: &FieldSchema, fields: &BTreeMap<String, FieldState>) -> f64 {
        let total_weight = schema.total_weight();
        if total_weight == 0.0 {
            return 0.0;
        }

        let weighted_sum: f64 = schema
            .fields()
            .iter()
            .map(|spec| {
                let confidence = fields.get(spec.name).map(|f| f.confidence).unwrap_or(0.0);
                confidence * spec.criticality.weight()
            })
            .sum();

        weighted_sum / total_weight
    }

    /// The flag invariant: a record needs review iff the minimum relevant
    /// field confidence falls below the threshold or any field is invalid.
    ///
    /// The minimum is taken over fields that are required or carry a value;
    /// an absent optional field is absence, not distrust.
    pub fn compute_flagged(
        schema: &FieldSchema,
        fields: &BTreeMap<String, FieldState>,
        review_threshold: f64,
    ) -> bool {
        let any_invalid = fields.values().any(|f| !f.validity.is_valid());
        if any_invalid {
            return true;
        }

        schema
            .fields()
            .iter()
            .filter_map(|spec| fields.get(spec.name).map(|f| (spec, f)))
            .filter(|(spec, f)| spec.required || !f.value.is_empty())
            .any(|(_, f)| f.confidence < review_threshold)
    }
}

/// Aggregate quality metrics for a session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub total_records: u64,
    pub flagged_records: u64,
    pub mean_confidence: f64,
    /// Fraction of records (0-1) in which each field carried a value.
    pub field_extraction_rates: BTreeMap<String, f64>,
    pub processing_seconds: f64,
}

impl SessionMetrics {
    pub fn from_records(records: &[StructuredRecord], processing_seconds: f64) -> Self {
        if records.is_empty() {
            return Self {
                processing_seconds,
                ..Default::default()
            };
        }

        let total = records.len() as u64;
        let flagged = records.iter().filter(|r| r.flagged).count() as u64;
        let mean_confidence = records
            .iter()
            .map(|r| r.overall_quality_score)
            .sum::<f64>()
            / total as f64;

        let mut extracted: BTreeMap<String, u64> = BTreeMap::new();
        for record in records {
            for (name, field) in &record.fields {
                if !field.value.is_empty() {
                    *extracted.entry(name.clone()).or_default() += 1;
                }
            }
        }
        let field_extraction_rates = extracted
            .into_iter()
            .map(|(name, count)| (name, count as f64 / total as f64))
            .collect();

        Self {
            total_records: total,
            flagged_records: flagged,
            mean_confidence,
            field_extraction_rates,
            processing_seconds,
        }
    }
}

/// Groups every record produced from one upload.
#[derive(Debug, Clone)]
pub struct ProcessingSession {
    pub session_id: String,
    pub file_name: String,
    pub file_size: u64,
    pub status: SessionStatus,
    pub attempt_count: u32,
    pub error: Option<String>,
    pub metrics: SessionMetrics,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only correction log entry. Never mutated or deleted.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEvent {
    pub event_id: String,
    pub record_id: String,
    pub field: String,
    pub old_value: String,
    pub new_value: String,
    pub reviewer_id: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::{InvalidReason, Validity};

    fn field(value: &str, confidence: f64, validity: Validity) -> FieldState {
        FieldState {
            value: value.to_string(),
            confidence,
            validity,
        }
    }

    fn valid_field(value: &str, confidence: f64) -> FieldState {
        field(value, confidence, Validity::valid(value))
    }

    fn full_fields(confidence: f64) -> BTreeMap<String, FieldState> {
        FieldSchema::licensing()
            .field_names()
            .map(|name| (name.to_string(), valid_field("x", confidence)))
            .collect()
    }

    #[test]
    fn test_quality_score_weighted_by_criticality() {
        let schema = FieldSchema::licensing();
        let mut fields = BTreeMap::new();
        // Only the three critical fields at full confidence.
        for name in ["council", "reference", "hmo_address"] {
            fields.insert(name.to_string(), valid_field("x", 1.0));
        }

        let score = StructuredRecord::compute_quality_score(&schema, &fields);
        // 3 fields * weight 3.0 out of total weight 24.
        assert!((score - 9.0 / 24.0).abs() < 1e-12);
    }

    #[test]
    fn test_quality_score_uniform() {
        let schema = FieldSchema::licensing();
        let score = StructuredRecord::compute_quality_score(&schema, &full_fields(0.8));
        assert!((score - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_flagged_by_low_confidence() {
        let schema = FieldSchema::licensing();
        let mut fields = full_fields(0.9);
        fields.get_mut("reference").unwrap().confidence = 0.2;

        assert!(StructuredRecord::compute_flagged(&schema, &fields, 0.7));
    }

    #[test]
    fn test_flagged_by_invalid_field() {
        let schema = FieldSchema::licensing();
        let mut fields = full_fields(0.95);
        fields.insert(
            "licence_expiry".to_string(),
            field("2021-01-14", 0.95, Validity::invalid(InvalidReason::ExpiryBeforeStart)),
        );

        // High confidence everywhere, still flagged.
        assert!(StructuredRecord::compute_flagged(&schema, &fields, 0.7));
    }

    #[test]
    fn test_not_flagged_when_clean() {
        let schema = FieldSchema::licensing();
        assert!(!StructuredRecord::compute_flagged(&schema, &full_fields(0.9), 0.7));
    }

    #[test]
    fn test_absent_optional_field_does_not_flag() {
        let schema = FieldSchema::licensing();
        let mut fields = full_fields(0.9);
        // An optional field that simply was not present in the document.
        fields.insert(
            "hmo_manager_name".to_string(),
            valid_field("", 0.0),
        );

        assert!(!StructuredRecord::compute_flagged(&schema, &fields, 0.7));
    }

    #[test]
    fn test_absent_required_field_flags() {
        let schema = FieldSchema::licensing();
        let mut fields = full_fields(0.9);
        fields.insert("hmo_address".to_string(), valid_field("", 0.0));

        assert!(StructuredRecord::compute_flagged(&schema, &fields, 0.7));
    }

    #[test]
    fn test_session_metrics_aggregation() {
        let schema = FieldSchema::licensing();
        let make_record = |confidence: f64, flagged: bool| StructuredRecord {
            record_id: "r".to_string(),
            session_id: "s".to_string(),
            fields: full_fields(confidence),
            overall_quality_score: confidence,
            flagged,
            review_status: ReviewStatus::Pending,
            reviewer: None,
            reservation_expires_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let records = vec![make_record(0.9, false), make_record(0.5, true)];
        let metrics = SessionMetrics::from_records(&records, 1.5);

        assert_eq!(metrics.total_records, 2);
        assert_eq!(metrics.flagged_records, 1);
        assert!((metrics.mean_confidence - 0.7).abs() < 1e-12);
        assert_eq!(metrics.processing_seconds, 1.5);
        assert_eq!(
            metrics.field_extraction_rates.len(),
            schema.fields().len()
        );
        assert_eq!(metrics.field_extraction_rates["council"], 1.0);
    }

    #[test]
    fn test_empty_session_metrics() {
        let metrics = SessionMetrics::from_records(&[], 0.2);
        assert_eq!(metrics.total_records, 0);
        assert_eq!(metrics.mean_confidence, 0.0);
    }

    #[test]
    fn test_status_round_trips() {
        for status in ["pending", "in_review", "reviewed", "rejected"] {
            assert_eq!(ReviewStatus::parse(status).unwrap().as_str(), status);
        }
        for status in ["queued", "processing", "completed", "failed"] {
            assert_eq!(SessionStatus::parse(status).unwrap().as_str(), status);
        }
        assert!(ReviewStatus::parse("bogus").is_none());
        assert!(SessionStatus::parse("bogus").is_none());
    }
}
