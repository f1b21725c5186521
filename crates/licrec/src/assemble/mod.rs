//! Record assembly: merges scored values and validation verdicts into one
//! `StructuredRecord`, the first point at which pipeline output takes its
//! persisted shape.

use std::collections::BTreeMap;

use chrono::Utc;

use crate::model::{FieldState, ReviewStatus, StructuredRecord};
use crate::schema::FieldSchema;
use crate::score::ScoredField;
use crate::validate::Validity;

pub struct RecordAssembler {
    review_threshold: f64,
}

impl RecordAssembler {
    pub fn new(review_threshold: f64) -> Self {
        Self { review_threshold }
    }

    pub fn assemble(
        &self,
        schema: &FieldSchema,
        session_id: &str,
        scored: &BTreeMap<String, ScoredField>,
        verdicts: &BTreeMap<String, Validity>,
    ) -> StructuredRecord {
        let fields: BTreeMap<String, FieldState> = schema
            .fields()
            .iter()
            .map(|spec| {
                let score = scored.get(spec.name);
                let validity = verdicts
                    .get(spec.name)
                    .cloned()
                    .unwrap_or_else(|| Validity::valid(""));

                // A valid verdict carries the canonical form of the value;
                // an invalid one keeps the extracted value visible for the
                // reviewer.
                let value = match &validity {
                    Validity::Valid { normalized } => normalized.clone(),
                    Validity::Invalid { .. } => {
                        score.map(|s| s.value.clone()).unwrap_or_default()
                    }
                };

                let state = FieldState {
                    value,
                    confidence: score.map(|s| s.confidence).unwrap_or(0.0),
                    validity,
                };
                (spec.name.to_string(), state)
            })
            .collect();

        let overall_quality_score = StructuredRecord::compute_quality_score(schema, &fields);
        let flagged =
            StructuredRecord::compute_flagged(schema, &fields, self.review_threshold);
        let now = Utc::now();

        StructuredRecord {
            record_id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            fields,
            overall_quality_score,
            flagged,
            review_status: ReviewStatus::Pending,
            reviewer: None,
            reservation_expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}
