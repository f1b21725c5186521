//! Label-anchored pattern recognizer.
//!
//! Pattern tables and their specificity scores follow the reference and
//! date shapes seen in UK licensing registers. All regexes are compiled
//! once at construction.

use std::collections::HashMap;

use regex::Regex;

use crate::acquire::TextSpan;
use crate::extract::dates::parse_date;
use crate::extract::{FieldCandidate, Recognizer, RecognizerKind};
use crate::schema::{FieldKind, FieldSpec};

const RECOGNIZER_ID: &str = "pattern";

/// Specificity applied to reference tokens found without a nearby label.
const UNLABELLED_REFERENCE_FACTOR: f64 = 0.85;

/// Specificity for the date token nearest its label, and for the rest.
const DATE_NEAR_LABEL: f64 = 0.9;
const DATE_FAR_FROM_LABEL: f64 = 0.75;

pub struct PatternRecognizer {
    reference_label: Regex,
    reference_token: Regex,
    reference_patterns: Vec<(Regex, f64)>,
    date_token: Regex,
    date_labels: HashMap<&'static str, Regex>,
    council: Regex,
    postcode: Regex,
    address_labels: HashMap<&'static str, Regex>,
    name_labels: HashMap<&'static str, Regex>,
    name_capture: Regex,
    count_labels: HashMap<&'static str, Vec<(Regex, f64)>>,
}

impl PatternRecognizer {
    pub fn new() -> Self {
        let re = |p: &str| Regex::new(p).expect("built-in pattern must compile");

        let mut date_labels = HashMap::new();
        date_labels.insert(
            "licence_start",
            re(r"(?i)\b(?:start|commence\w*|issued?|valid\s+from)\b"),
        );
        date_labels.insert(
            "licence_expiry",
            re(r"(?i)\b(?:expir\w*|valid\s+(?:to|until)|until|end\s+date)\b"),
        );

        let mut address_labels = HashMap::new();
        address_labels.insert(
            "hmo_address",
            re(r"(?i)(?:\b(?:property|premises|hmo)\s+address\b|^\s*address\b)"),
        );
        address_labels.insert(
            "hmo_manager_address",
            re(r"(?i)\bmanager(?:'s)?\s+address\b"),
        );
        address_labels.insert(
            "licence_holder_address",
            re(r"(?i)\bholder(?:'s)?\s+address\b"),
        );

        let mut name_labels = HashMap::new();
        name_labels.insert(
            "hmo_manager_name",
            re(r"(?i)\bmanager(?:\s+name)?\s*[:\-]"),
        );
        name_labels.insert(
            "licence_holder_name",
            re(r"(?i)(?:\b(?:licence|license)\s+holder(?:\s+name)?|\blicensee)\s*[:\-]"),
        );

        let mut count_labels: HashMap<&'static str, Vec<(Regex, f64)>> = HashMap::new();
        count_labels.insert(
            "max_occupancy",
            vec![
                (re(r"(?i)\b(?:max(?:imum)?\s+)?occupancy\b\D{0,15}?(\d{1,4})"), 0.9),
                (re(r"(?i)(\d{1,4})\s+(?:persons|occupants)\b"), 0.85),
            ],
        );
        count_labels.insert(
            "number_of_households",
            vec![(re(r"(?i)\bhouseholds?\b\D{0,15}?(\d{1,4})"), 0.9)],
        );
        count_labels.insert(
            "number_of_shared_kitchens",
            vec![(re(r"(?i)\bkitchens?\b\D{0,15}?(\d{1,4})"), 0.9)],
        );
        count_labels.insert(
            "number_of_shared_bathrooms",
            vec![(re(r"(?i)\bbathrooms?\b\D{0,15}?(\d{1,4})"), 0.9)],
        );
        count_labels.insert(
            "number_of_shared_toilets",
            vec![(re(r"(?i)\btoilets?\b\D{0,15}?(\d{1,4})"), 0.9)],
        );
        count_labels.insert(
            "number_of_storeys",
            vec![(re(r"(?i)\b(?:storeys?|stories|floors)\b\D{0,15}?(\d{1,4})"), 0.9)],
        );

        Self {
            reference_label: re(r"(?i)\b(?:ref(?:erence)?|licen[cs]e\s*(?:no|number)?)\b"),
            reference_token: re(r"\b[A-Z0-9][A-Z0-9/-]{2,14}\b"),
            reference_patterns: vec![
                (re(r"^[A-Z]{2,4}/\d{4,8}$"), 0.95),
                (re(r"^HMO/\d{4,8}$"), 0.90),
                (re(r"^[A-Z]{1,3}\d{4,8}$"), 0.85),
                (re(r"^\d{6,8}$"), 0.75),
            ],
            date_token: re(
                r"\b\d{4}-\d{2}-\d{2}\b|\b\d{1,2}[/.-]\d{1,2}[/.-]\d{4}\b|\b\d{1,2}\s+(?:Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)[a-z]*\s+\d{4}\b",
            ),
            date_labels,
            council: re(r"\b((?:[A-Z][\w'&-]*\s+){1,5}(?:Council|Authority))\b"),
            postcode: re(r"\b[A-Z]{1,2}\d[A-Z\d]?\s*\d[A-Z]{2}\b"),
            address_labels,
            name_labels,
            name_capture: re(r"([A-Z][A-Za-z'.-]+(?:\s+[A-Z][A-Za-z'.-]+)+)"),
            count_labels,
        }
    }

    fn recognize_council(&self, spec: &FieldSpec, span: &TextSpan) -> Vec<FieldCandidate> {
        self.council
            .captures_iter(&span.text)
            .map(|caps| {
                let raw = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
                FieldCandidate::new(
                    spec.name,
                    raw,
                    collapse_whitespace(raw),
                    0.9,
                    RecognizerKind::Pattern,
                    RECOGNIZER_ID,
                    span,
                )
            })
            .collect()
    }

    fn recognize_reference(&self, spec: &FieldSpec, span: &TextSpan) -> Vec<FieldCandidate> {
        let labelled = self.reference_label.is_match(&span.text);
        let mut out = Vec::new();

        for token in self.reference_token.find_iter(&span.text) {
            let upper = token.as_str().to_ascii_uppercase();
            for (pattern, specificity) in &self.reference_patterns {
                if pattern.is_match(&upper) {
                    let confidence = if labelled {
                        *specificity
                    } else {
                        specificity * UNLABELLED_REFERENCE_FACTOR
                    };
                    out.push(FieldCandidate::new(
                        spec.name,
                        token.as_str(),
                        upper.clone(),
                        confidence,
                        RecognizerKind::Pattern,
                        RECOGNIZER_ID,
                        span,
                    ));
                    break;
                }
            }
        }

        out
    }

    fn recognize_date(&self, spec: &FieldSpec, span: &TextSpan) -> Vec<FieldCandidate> {
        let Some(label) = self.date_labels.get(spec.name) else {
            return Vec::new();
        };
        let Some(label_match) = label.find(&span.text) else {
            return Vec::new();
        };

        // When one line carries several dates ("valid from X until Y"), the
        // token nearest its label is the likeliest reading for this field.
        let tokens: Vec<_> = self.date_token.find_iter(&span.text).collect();
        let nearest = tokens
            .iter()
            .min_by_key(|t| label_distance(t.start(), t.end(), label_match.start(), label_match.end()))
            .map(|t| t.start());

        tokens
            .iter()
            .filter_map(|token| {
                let parsed = parse_date(token.as_str())?;
                let specificity = if Some(token.start()) == nearest {
                    DATE_NEAR_LABEL
                } else {
                    DATE_FAR_FROM_LABEL
                };
                // Ambiguous day/month ordering halves the confidence.
                let confidence = if parsed.ambiguous_day_month {
                    specificity * 0.5
                } else {
                    specificity
                };
                Some(FieldCandidate::new(
                    spec.name,
                    token.as_str(),
                    parsed.iso,
                    confidence,
                    RecognizerKind::Pattern,
                    RECOGNIZER_ID,
                    span,
                ))
            })
            .collect()
    }

    fn recognize_address(&self, spec: &FieldSpec, span: &TextSpan) -> Vec<FieldCandidate> {
        let Some(label) = self.address_labels.get(spec.name) else {
            return Vec::new();
        };
        let Some(label_match) = label.find(&span.text) else {
            return Vec::new();
        };

        let remainder = span.text[label_match.end()..]
            .trim_start_matches([':', '-', ' '])
            .trim();
        if remainder.len() < 10 {
            return Vec::new();
        }

        let confidence = if self.postcode.is_match(&remainder.to_ascii_uppercase()) {
            0.9
        } else {
            0.75
        };

        vec![FieldCandidate::new(
            spec.name,
            remainder,
            normalize_address(remainder),
            confidence,
            RecognizerKind::Pattern,
            RECOGNIZER_ID,
            span,
        )]
    }

    fn recognize_name(&self, spec: &FieldSpec, span: &TextSpan) -> Vec<FieldCandidate> {
        let Some(label) = self.name_labels.get(spec.name) else {
            return Vec::new();
        };
        let Some(label_match) = label.find(&span.text) else {
            return Vec::new();
        };

        let remainder = &span.text[label_match.end()..];
        self.name_capture
            .captures(remainder)
            .and_then(|caps| caps.get(1))
            .map(|m| {
                vec![FieldCandidate::new(
                    spec.name,
                    m.as_str(),
                    collapse_whitespace(m.as_str()),
                    0.85,
                    RecognizerKind::Pattern,
                    RECOGNIZER_ID,
                    span,
                )]
            })
            .unwrap_or_default()
    }

    fn recognize_count(&self, spec: &FieldSpec, span: &TextSpan) -> Vec<FieldCandidate> {
        let Some(rules) = self.count_labels.get(spec.name) else {
            return Vec::new();
        };

        let mut out = Vec::new();
        for (pattern, specificity) in rules {
            for caps in pattern.captures_iter(&span.text) {
                let Some(m) = caps.get(1) else { continue };
                let Ok(value) = m.as_str().parse::<u32>() else {
                    continue;
                };
                out.push(FieldCandidate::new(
                    spec.name,
                    m.as_str(),
                    value.to_string(),
                    *specificity,
                    RecognizerKind::Pattern,
                    RECOGNIZER_ID,
                    span,
                ));
            }
        }

        out
    }
}

impl Default for PatternRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Recognizer for PatternRecognizer {
    fn id(&self) -> &str {
        RECOGNIZER_ID
    }

    fn kind(&self) -> RecognizerKind {
        RecognizerKind::Pattern
    }

    fn recognize(&self, spec: &FieldSpec, span: &TextSpan) -> Vec<FieldCandidate> {
        match spec.kind {
            FieldKind::Council => self.recognize_council(spec, span),
            FieldKind::Reference => self.recognize_reference(spec, span),
            FieldKind::Date => self.recognize_date(spec, span),
            FieldKind::Address => self.recognize_address(spec, span),
            FieldKind::PersonName => self.recognize_name(spec, span),
            FieldKind::Count => self.recognize_count(spec, span),
        }
    }
}

/// Distance from a label to a value token. A label binds forward ("until
/// 14/01/2026"), so tokens before the label read as slightly farther away
/// than tokens the same distance after it.
fn label_distance(tok_start: usize, tok_end: usize, label_start: usize, label_end: usize) -> usize {
    if tok_start >= label_end {
        tok_start - label_end
    } else if label_start >= tok_end {
        label_start - tok_end + 1
    } else {
        0
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Expands common street-suffix abbreviations and collapses whitespace.
fn normalize_address(address: &str) -> String {
    let collapsed = collapse_whitespace(address);
    let mut out = Vec::new();
    for word in collapsed.split(' ') {
        let bare = word.trim_end_matches(['.', ',']);
        let expanded = match bare {
            "St" => Some("Street"),
            "Rd" => Some("Road"),
            "Ave" => Some("Avenue"),
            "Ln" => Some("Lane"),
            "Dr" => Some("Drive"),
            "Cl" => Some("Close"),
            "Pl" => Some("Place"),
            "Ct" => Some("Court"),
            "Cres" => Some("Crescent"),
            "Gdns" => Some("Gardens"),
            "Sq" => Some("Square"),
            "Ter" => Some("Terrace"),
            _ => None,
        };
        match expanded {
            Some(full) => out.push(format!("{}{}", full, &word[bare.len()..])),
            None => out.push(word.to_string()),
        }
    }
    out.join(" ")
}
