pub mod dates;
pub mod entities;
pub mod patterns;

use std::collections::BTreeMap;

use crate::acquire::TextSpan;
use crate::schema::{FieldSchema, FieldSpec};

pub use dates::{parse_date, ParsedDate};
pub use entities::EntityRecognizer;
pub use patterns::PatternRecognizer;

/// Where a candidate value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    pub recognizer_id: String,
    pub span_ordinal: usize,
}

/// Recognizer capability class, ordered by precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognizerKind {
    /// Label-anchored pattern matching. High precision.
    Pattern,
    /// Statistical/heuristic entity recognition. Lower precision.
    Entity,
}

impl RecognizerKind {
    pub fn precision_rank(self) -> u8 {
        match self {
            RecognizerKind::Pattern => 2,
            RecognizerKind::Entity => 1,
        }
    }
}

/// An unreconciled proposed value for one field.
///
/// Candidates are never mutated after creation, only superseded by the
/// scorer's selection.
#[derive(Debug, Clone)]
pub struct FieldCandidate {
    pub field: String,
    pub raw_value: String,
    pub normalized_value: String,
    pub raw_confidence: f64,
    /// Region confidence inherited from the source span (OCR only).
    pub region_confidence: Option<f64>,
    pub kind: RecognizerKind,
    pub provenance: Provenance,
}

impl FieldCandidate {
    pub fn new(
        field: &str,
        raw_value: impl Into<String>,
        normalized_value: impl Into<String>,
        raw_confidence: f64,
        kind: RecognizerKind,
        recognizer_id: &str,
        span: &TextSpan,
    ) -> Self {
        Self {
            field: field.to_string(),
            raw_value: raw_value.into(),
            normalized_value: normalized_value.into(),
            raw_confidence: raw_confidence.clamp(0.0, 1.0),
            region_confidence: span.region_confidence,
            kind,
            provenance: Provenance {
                recognizer_id: recognizer_id.to_string(),
                span_ordinal: span.ordinal,
            },
        }
    }
}

/// One member of the closed recognizer capability set.
pub trait Recognizer: Send + Sync {
    fn id(&self) -> &str;
    fn kind(&self) -> RecognizerKind;
    fn recognize(&self, spec: &FieldSpec, span: &TextSpan) -> Vec<FieldCandidate>;
}

/// Runs every recognizer over every span for every schema field.
///
/// Pure: same spans and schema always produce the same candidate lists.
/// A field nobody recognized keeps an empty list — absence is data here,
/// not an error.
pub struct CandidateExtractor {
    recognizers: Vec<Box<dyn Recognizer>>,
}

impl CandidateExtractor {
    pub fn new() -> Self {
        Self {
            recognizers: vec![
                Box::new(PatternRecognizer::new()),
                Box::new(EntityRecognizer::new()),
            ],
        }
    }

    #[cfg(test)]
    pub fn with_recognizers(recognizers: Vec<Box<dyn Recognizer>>) -> Self {
        Self { recognizers }
    }

    pub fn extract(
        &self,
        schema: &FieldSchema,
        spans: &[TextSpan],
    ) -> BTreeMap<String, Vec<FieldCandidate>> {
        let mut candidates: BTreeMap<String, Vec<FieldCandidate>> = schema
            .field_names()
            .map(|name| (name.to_string(), Vec::new()))
            .collect();

        for spec in schema.fields() {
            let list = candidates
                .get_mut(spec.name)
                .expect("candidate list initialized for every schema field");
            for span in spans {
                for recognizer in &self.recognizers {
                    list.extend(recognizer.recognize(spec, span));
                }
            }
        }

        candidates
    }
}

impl Default for CandidateExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_field_gets_a_candidate_list() {
        let schema = FieldSchema::licensing();
        let extractor = CandidateExtractor::new();
        let spans = vec![TextSpan::new(0, 1, "nothing recognizable here")];

        let candidates = extractor.extract(&schema, &spans);

        assert_eq!(candidates.len(), schema.fields().len());
        // Absence is represented as an empty list, not a missing key.
        assert!(candidates["hmo_address"].is_empty());
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let schema = FieldSchema::licensing();
        let extractor = CandidateExtractor::new();
        let spans = vec![
            TextSpan::new(0, 1, "Fife Council"),
            TextSpan::new(1, 1, "Licence reference: HMO/12345"),
            TextSpan::new(2, 1, "Maximum occupancy: 6"),
        ];

        let first = extractor.extract(&schema, &spans);
        let second = extractor.extract(&schema, &spans);

        for (field, list) in &first {
            let other = &second[field];
            assert_eq!(list.len(), other.len(), "field {}", field);
            for (a, b) in list.iter().zip(other.iter()) {
                assert_eq!(a.normalized_value, b.normalized_value);
                assert_eq!(a.raw_confidence, b.raw_confidence);
                assert_eq!(a.provenance, b.provenance);
            }
        }
    }

    #[test]
    fn test_multiple_recognizers_all_retained() {
        let schema = FieldSchema::licensing();
        let extractor = CandidateExtractor::new();
        // Both the pattern recognizer (labelled) and the entity recognizer
        // (council keyword) should fire on this span.
        let spans = vec![TextSpan::new(0, 1, "Council: Dacorum Borough Council")];

        let candidates = extractor.extract(&schema, &spans);
        let council = &candidates["council"];
        let kinds: Vec<RecognizerKind> = council.iter().map(|c| c.kind).collect();
        assert!(kinds.contains(&RecognizerKind::Pattern), "got {:?}", council);
        assert!(kinds.contains(&RecognizerKind::Entity), "got {:?}", council);
    }

    #[test]
    fn test_precision_rank_ordering() {
        assert!(RecognizerKind::Pattern.precision_rank() > RecognizerKind::Entity.precision_rank());
    }
}
