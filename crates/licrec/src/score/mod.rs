//! Confidence scoring: reconciles a field's candidate list into one
//! `(value, confidence)` pair.
//!
//! The stages are deliberately separate and individually testable:
//! floor filter, fusion, selection, cross-field adjustment. Scoring is
//! deterministic — identical candidate lists always produce identical
//! output, which reproducible audits depend on.

use std::collections::BTreeMap;

use crate::config::ScoringConfig;
use crate::extract::FieldCandidate;
use crate::schema::FieldSchema;

/// The scorer's verdict for one field.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredField {
    pub value: String,
    pub confidence: f64,
}

impl ScoredField {
    fn empty() -> Self {
        Self {
            value: String::new(),
            confidence: 0.0,
        }
    }
}

pub struct Scorer {
    config: ScoringConfig,
}

impl Scorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    /// Scores every schema field. Fields with no surviving candidate get an
    /// empty value with confidence 0.
    pub fn score(
        &self,
        schema: &FieldSchema,
        candidates: &BTreeMap<String, Vec<FieldCandidate>>,
    ) -> BTreeMap<String, ScoredField> {
        let mut scored: BTreeMap<String, ScoredField> = schema
            .field_names()
            .map(|name| {
                let list = candidates.get(name).map(Vec::as_slice).unwrap_or(&[]);
                (name.to_string(), self.score_field(list))
            })
            .collect();

        self.cross_field_adjust(&mut scored);
        scored
    }

    fn score_field(&self, candidates: &[FieldCandidate]) -> ScoredField {
        let survivors = self.floor_filter(candidates);
        match self.select(&survivors) {
            Some((candidate, confidence)) => ScoredField {
                value: candidate.normalized_value.clone(),
                confidence,
            },
            None => ScoredField::empty(),
        }
    }

    /// Stage (a): discard candidates below the absolute confidence floor.
    pub fn floor_filter<'a>(&self, candidates: &'a [FieldCandidate]) -> Vec<&'a FieldCandidate> {
        candidates
            .iter()
            .filter(|c| c.raw_confidence >= self.config.floor)
            .collect()
    }

    /// Stage (c): weighted geometric mean of OCR region confidence and
    /// recognizer confidence. Digital candidates have no region signal and
    /// keep their recognizer confidence.
    pub fn fuse(&self, candidate: &FieldCandidate) -> f64 {
        let fused = match candidate.region_confidence {
            Some(region) => {
                let total = self.config.region_weight + self.config.recognizer_weight;
                region.clamp(0.0, 1.0).powf(self.config.region_weight / total)
                    * candidate
                        .raw_confidence
                        .powf(self.config.recognizer_weight / total)
            }
            None => candidate.raw_confidence,
        };
        fused.clamp(0.0, 1.0)
    }

    /// Stage (b)+(c): pick the best surviving candidate. Fused confidence
    /// decides; ties fall to recognizer precision, then source order, then
    /// the value itself so the outcome never depends on iteration order.
    fn select<'a>(
        &self,
        survivors: &[&'a FieldCandidate],
    ) -> Option<(&'a FieldCandidate, f64)> {
        survivors
            .iter()
            .map(|c| (*c, self.fuse(c)))
            .max_by(|(a, fa), (b, fb)| {
                fa.partial_cmp(fb)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.kind.precision_rank().cmp(&b.kind.precision_rank()))
                    .then_with(|| b.provenance.span_ordinal.cmp(&a.provenance.span_ordinal))
                    .then_with(|| b.normalized_value.cmp(&a.normalized_value))
            })
    }

    /// Stage (d): cross-field consistency. A failed check penalizes the
    /// side with less corroborating confidence; a passed check grants both
    /// sides a small bonus.
    fn cross_field_adjust(&self, fields: &mut BTreeMap<String, ScoredField>) {
        self.adjust_pair(fields, "licence_start", "licence_expiry", |start, expiry| {
            // ISO dates compare lexicographically.
            expiry > start
        });
        self.adjust_pair(
            fields,
            "max_occupancy",
            "number_of_households",
            |occupancy, households| match (occupancy.parse::<u32>(), households.parse::<u32>()) {
                (Ok(o), Ok(h)) => h <= o,
                _ => false,
            },
        );
    }

    fn adjust_pair(
        &self,
        fields: &mut BTreeMap<String, ScoredField>,
        first: &str,
        second: &str,
        consistent: impl Fn(&str, &str) -> bool,
    ) {
        let (Some(a), Some(b)) = (fields.get(first), fields.get(second)) else {
            return;
        };
        if a.value.is_empty() || b.value.is_empty() {
            return;
        }

        if consistent(&a.value, &b.value) {
            let bonus = 1.0 + self.config.cross_field_bonus;
            for name in [first, second] {
                let field = fields.get_mut(name).expect("field present");
                field.confidence = (field.confidence * bonus).clamp(0.0, 1.0);
            }
        } else {
            // The field with less corroboration takes the penalty; on a
            // dead tie the second of the pair does (the derived/dependent
            // side of every shipped rule).
            let target = if a.confidence < b.confidence { first } else { second };
            let field = fields.get_mut(target).expect("field present");
            field.confidence =
                (field.confidence * (1.0 - self.config.cross_field_penalty)).clamp(0.0, 1.0);
        }
    }
}
