//! Record validation: per-field format rules plus cross-field consistency.
//!
//! Validation never fails on malformed input — every outcome is a
//! [`Validity`] verdict carrying either a normalized value or the most
//! specific rejection reason available.

use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::extract::dates::parse_date;
use crate::schema::{FieldKind, FieldSchema, FieldSpec};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Validity {
    Valid { normalized: String },
    Invalid { reason: InvalidReason },
}

impl Validity {
    pub fn valid(normalized: impl Into<String>) -> Self {
        Validity::Valid {
            normalized: normalized.into(),
        }
    }

    pub fn invalid(reason: InvalidReason) -> Self {
        Validity::Invalid { reason }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Validity::Valid { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReason {
    Missing,
    MalformedDate,
    MalformedReference,
    MalformedName,
    MalformedCount,
    CouncilTooShort,
    AddressTooShort,
    ZeroOccupancy,
    ZeroStoreys,
    ExpiryBeforeStart,
    HouseholdsExceedOccupancy,
}

impl InvalidReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvalidReason::Missing => "missing",
            InvalidReason::MalformedDate => "malformed_date",
            InvalidReason::MalformedReference => "malformed_reference",
            InvalidReason::MalformedName => "malformed_name",
            InvalidReason::MalformedCount => "malformed_count",
            InvalidReason::CouncilTooShort => "council_too_short",
            InvalidReason::AddressTooShort => "address_too_short",
            InvalidReason::ZeroOccupancy => "zero_occupancy",
            InvalidReason::ZeroStoreys => "zero_storeys",
            InvalidReason::ExpiryBeforeStart => "expiry_before_start",
            InvalidReason::HouseholdsExceedOccupancy => "households_exceed_occupancy",
        }
    }
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct Validator {
    reference_patterns: Vec<Regex>,
    name_shape: Regex,
}

impl Validator {
    pub fn new() -> Self {
        let re = |p: &str| Regex::new(p).expect("built-in pattern must compile");
        Self {
            reference_patterns: vec![
                re(r"^[A-Z]{2,5}\d+$"),
                re(r"^\d{2,4}[/-]\w+[/-]?\d*$"),
                re(r"^[A-Z]+[/-]\d+[/-]?\d*$"),
                re(r"^\d{3,}$"),
                re(r"^[A-Z0-9/-]{3,}$"),
            ],
            name_shape: re(r"^[A-Za-z\s\-'.]+$"),
        }
    }

    /// Validates one field value against its declared format rules.
    pub fn validate_field(&self, spec: &FieldSpec, value: &str) -> Validity {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return if spec.required {
                Validity::invalid(InvalidReason::Missing)
            } else {
                Validity::valid("")
            };
        }

        match spec.kind {
            FieldKind::Council => {
                if trimmed.len() < 3 {
                    Validity::invalid(InvalidReason::CouncilTooShort)
                } else {
                    Validity::valid(collapse_whitespace(trimmed))
                }
            }
            FieldKind::Reference => {
                let upper = collapse_whitespace(trimmed).to_ascii_uppercase();
                if self.reference_patterns.iter().any(|p| p.is_match(&upper)) {
                    Validity::valid(upper)
                } else {
                    Validity::invalid(InvalidReason::MalformedReference)
                }
            }
            FieldKind::Address => {
                if trimmed.len() < 10 {
                    Validity::invalid(InvalidReason::AddressTooShort)
                } else {
                    Validity::valid(collapse_whitespace(trimmed))
                }
            }
            FieldKind::Date => match parse_date(trimmed) {
                Some(parsed) => Validity::valid(parsed.iso),
                None => Validity::invalid(InvalidReason::MalformedDate),
            },
            FieldKind::PersonName => {
                if trimmed.len() >= 2 && self.name_shape.is_match(trimmed) {
                    Validity::valid(collapse_whitespace(trimmed))
                } else {
                    Validity::invalid(InvalidReason::MalformedName)
                }
            }
            FieldKind::Count => match trimmed.parse::<u32>() {
                Ok(0) if spec.name == "max_occupancy" => {
                    Validity::invalid(InvalidReason::ZeroOccupancy)
                }
                Ok(0) if spec.name == "number_of_storeys" => {
                    Validity::invalid(InvalidReason::ZeroStoreys)
                }
                Ok(n) => Validity::valid(n.to_string()),
                Err(_) => Validity::invalid(InvalidReason::MalformedCount),
            },
        }
    }

    /// Validates a full record: per-field rules, then cross-field business
    /// rules on the surviving normalized values.
    pub fn validate_record(
        &self,
        schema: &FieldSchema,
        values: &BTreeMap<String, String>,
    ) -> BTreeMap<String, Validity> {
        let mut verdicts: BTreeMap<String, Validity> = schema
            .fields()
            .iter()
            .map(|spec| {
                let value = values.get(spec.name).map(String::as_str).unwrap_or("");
                (spec.name.to_string(), self.validate_field(spec, value))
            })
            .collect();

        self.apply_cross_field_rules(&mut verdicts);
        verdicts
    }

    fn apply_cross_field_rules(&self, verdicts: &mut BTreeMap<String, Validity>) {
        // Expiry must fall strictly after start. ISO dates compare
        // lexicographically.
        if let (Some(start), Some(expiry)) = (
            valid_value(verdicts, "licence_start"),
            valid_value(verdicts, "licence_expiry"),
        ) {
            if !start.is_empty() && !expiry.is_empty() && expiry <= start {
                verdicts.insert(
                    "licence_expiry".to_string(),
                    Validity::invalid(InvalidReason::ExpiryBeforeStart),
                );
            }
        }

        // A household count above the occupancy cap is self-contradictory;
        // the sub-count carries the blame.
        if let (Some(occupancy), Some(households)) = (
            valid_count(verdicts, "max_occupancy"),
            valid_count(verdicts, "number_of_households"),
        ) {
            if households > occupancy {
                verdicts.insert(
                    "number_of_households".to_string(),
                    Validity::invalid(InvalidReason::HouseholdsExceedOccupancy),
                );
            }
        }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

fn valid_value(verdicts: &BTreeMap<String, Validity>, field: &str) -> Option<String> {
    match verdicts.get(field) {
        Some(Validity::Valid { normalized }) => Some(normalized.clone()),
        _ => None,
    }
}

fn valid_count(verdicts: &BTreeMap<String, Validity>, field: &str) -> Option<u32> {
    valid_value(verdicts, field).and_then(|v| v.parse().ok())
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
