//! Heuristic entity recognizer.
//!
//! Lower-precision fallback that fires without label anchors: capitalized
//! word runs for person names, keyword presence for councils, street-shape
//! heuristics for addresses. Candidates from this recognizer lose precision
//! tie-breaks against pattern candidates during scoring.

use regex::Regex;

use crate::acquire::TextSpan;
use crate::extract::{FieldCandidate, Recognizer, RecognizerKind};
use crate::schema::{FieldKind, FieldSpec};

const RECOGNIZER_ID: &str = "entity";

/// Words that disqualify a capitalized run from being a person name.
const SKIP_WORDS: &[&str] = &[
    "street", "road", "avenue", "lane", "drive", "close", "way", "council", "borough", "district",
    "city", "town", "county", "house", "flat", "apartment", "building", "centre", "center",
    "office", "department", "service", "authority", "committee", "licence", "license",
];

pub struct EntityRecognizer {
    name_run: Regex,
    street_suffix: Regex,
    postcode: Regex,
    label_prefix: Regex,
    council_keyword: Regex,
}

impl EntityRecognizer {
    pub fn new() -> Self {
        let re = |p: &str| Regex::new(p).expect("built-in pattern must compile");
        Self {
            name_run: re(r"\b[A-Z][a-z]+\s+[A-Z][a-z]+(?:\s+[A-Z][a-z]+)?\b"),
            street_suffix: re(
                r"(?i)\b(?:street|road|avenue|lane|drive|close|way|place|court|crescent|gardens|square|terrace|grove|mews|walk|hill|view)\b",
            ),
            postcode: re(r"\b[A-Z]{1,2}\d[A-Z\d]?\s*\d[A-Z]{2}\b"),
            label_prefix: re(r"^[A-Za-z' ]{1,30}[:\-]\s*"),
            council_keyword: re(r"(?i)\b(?:council|borough|district|authority)\b"),
        }
    }

    /// Strips a leading "Some Label:" prefix, if present.
    fn strip_label<'a>(&self, text: &'a str) -> &'a str {
        match self.label_prefix.find(text) {
            Some(m) => text[m.end()..].trim(),
            None => text.trim(),
        }
    }

    fn recognize_council(&self, spec: &FieldSpec, span: &TextSpan) -> Vec<FieldCandidate> {
        let value = self.strip_label(&span.text);
        if value.len() < 3 || value.len() > 80 || !self.council_keyword.is_match(value) {
            return Vec::new();
        }

        vec![FieldCandidate::new(
            spec.name,
            value,
            collapse_whitespace(value),
            0.65,
            RecognizerKind::Entity,
            RECOGNIZER_ID,
            span,
        )]
    }

    fn recognize_person(&self, spec: &FieldSpec, span: &TextSpan) -> Vec<FieldCandidate> {
        self.name_run
            .find_iter(&span.text)
            .filter(|m| is_plausible_name(m.as_str()))
            .map(|m| {
                FieldCandidate::new(
                    spec.name,
                    m.as_str(),
                    collapse_whitespace(m.as_str()),
                    0.6,
                    RecognizerKind::Entity,
                    RECOGNIZER_ID,
                    span,
                )
            })
            .collect()
    }

    fn recognize_address(&self, spec: &FieldSpec, span: &TextSpan) -> Vec<FieldCandidate> {
        let value = self.strip_label(&span.text);
        if value.len() < 10 {
            return Vec::new();
        }

        let has_number = value.chars().any(|c| c.is_ascii_digit());
        if !has_number || !self.street_suffix.is_match(value) {
            return Vec::new();
        }

        let confidence = if self.postcode.is_match(&value.to_ascii_uppercase()) {
            0.75
        } else {
            0.6
        };

        vec![FieldCandidate::new(
            spec.name,
            value,
            collapse_whitespace(value),
            confidence,
            RecognizerKind::Entity,
            RECOGNIZER_ID,
            span,
        )]
    }
}

impl Default for EntityRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Recognizer for EntityRecognizer {
    fn id(&self) -> &str {
        RECOGNIZER_ID
    }

    fn kind(&self) -> RecognizerKind {
        RecognizerKind::Entity
    }

    fn recognize(&self, spec: &FieldSpec, span: &TextSpan) -> Vec<FieldCandidate> {
        match spec.kind {
            FieldKind::Council => self.recognize_council(spec, span),
            FieldKind::PersonName => self.recognize_person(spec, span),
            FieldKind::Address => self.recognize_address(spec, span),
            // Dates, references and counts need anchors to be worth
            // proposing; those stay with the pattern recognizer.
            FieldKind::Date | FieldKind::Reference | FieldKind::Count => Vec::new(),
        }
    }
}

fn is_plausible_name(candidate: &str) -> bool {
    let lower = candidate.to_lowercase();
    !SKIP_WORDS.iter().any(|w| lower.contains(w))
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldSchema;

    fn recognize(field: &str, text: &str) -> Vec<FieldCandidate> {
        let schema = FieldSchema::licensing();
        let spec = schema.field(field).unwrap();
        EntityRecognizer::new().recognize(spec, &TextSpan::new(0, 1, text))
    }

    #[test]
    fn test_unlabelled_person_name() {
        let candidates = recognize("hmo_manager_name", "managed by John Smith since 2019");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].normalized_value, "John Smith");
        assert_eq!(candidates[0].raw_confidence, 0.6);
        assert_eq!(candidates[0].kind, RecognizerKind::Entity);
    }

    #[test]
    fn test_street_names_not_mistaken_for_people() {
        let candidates = recognize("hmo_manager_name", "Located on Baker Street nearby");
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_council_line_without_label_shape() {
        let candidates = recognize("council", "East Lindsey District Council");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].normalized_value, "East Lindsey District Council");
    }

    #[test]
    fn test_council_label_prefix_stripped() {
        let candidates = recognize("council", "Issuing authority: Fife Council");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].normalized_value, "Fife Council");
    }

    #[test]
    fn test_address_shape_heuristic() {
        let candidates = recognize("hmo_address", "12 High Street, Hemel Hempstead");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].raw_confidence, 0.6);
    }

    #[test]
    fn test_address_with_postcode_scores_higher() {
        let candidates = recognize("hmo_address", "12 High Street, Hemel Hempstead HP1 1AB");
        assert_eq!(candidates[0].raw_confidence, 0.75);
    }

    #[test]
    fn test_short_or_numberless_lines_are_not_addresses() {
        assert!(recognize("hmo_address", "High Street").is_empty());
        assert!(recognize("hmo_address", "The Old Manor House, High Street").is_empty());
    }

    #[test]
    fn test_no_candidates_for_anchored_kinds() {
        assert!(recognize("reference", "HMO/12345").is_empty());
        assert!(recognize("licence_start", "2023-01-15").is_empty());
        assert!(recognize("max_occupancy", "6 persons").is_empty());
    }
}
