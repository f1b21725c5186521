//! Date sub-parser for candidate normalization.
//!
//! Dates are normalized to ISO `YYYY-MM-DD`. Day-first parsing is assumed
//! for slash/dash forms (UK documents), but when both leading components
//! could be a month the reading is ambiguous and the caller is told so.

use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDate {
    pub iso: String,
    /// True when the day/month ordering could not be determined from the
    /// value alone (e.g. "04/05/2023").
    pub ambiguous_day_month: bool,
}

const NUMERIC_FORMATS: &[&str] = &["%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y"];
const TEXTUAL_FORMATS: &[&str] = &["%d %B %Y", "%d %b %Y", "%B %d, %Y", "%b %d, %Y"];

pub fn parse_date(raw: &str) -> Option<ParsedDate> {
    let trimmed = raw.trim();

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return in_plausible_range(date).then(|| ParsedDate {
            iso: date.format("%Y-%m-%d").to_string(),
            ambiguous_day_month: false,
        });
    }

    for format in NUMERIC_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            if !in_plausible_range(date) {
                return None;
            }
            use chrono::Datelike;
            // Both leading components fit a month and differ: the same text
            // parses to two different dates under day-first vs month-first.
            let ambiguous = date.day() <= 12 && date.day() != date.month();
            return Some(ParsedDate {
                iso: date.format("%Y-%m-%d").to_string(),
                ambiguous_day_month: ambiguous,
            });
        }
    }

    for format in TEXTUAL_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return in_plausible_range(date).then(|| ParsedDate {
                iso: date.format("%Y-%m-%d").to_string(),
                ambiguous_day_month: false,
            });
        }
    }

    None
}

fn in_plausible_range(date: NaiveDate) -> bool {
    use chrono::Datelike;
    (1900..=2100).contains(&date.year())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iso_format_is_unambiguous() {
        let parsed = parse_date("2023-01-15").unwrap();
        assert_eq!(parsed.iso, "2023-01-15");
        assert!(!parsed.ambiguous_day_month);
    }

    #[test]
    fn test_uk_slash_format_day_first() {
        let parsed = parse_date("15/01/2023").unwrap();
        assert_eq!(parsed.iso, "2023-01-15");
        // Day 15 cannot be a month, so the reading is certain.
        assert!(!parsed.ambiguous_day_month);
    }

    #[test]
    fn test_low_day_and_month_is_ambiguous() {
        let parsed = parse_date("04/05/2023").unwrap();
        assert_eq!(parsed.iso, "2023-05-04");
        assert!(parsed.ambiguous_day_month);
    }

    #[test]
    fn test_equal_day_and_month_is_unambiguous() {
        let parsed = parse_date("05/05/2023").unwrap();
        assert!(!parsed.ambiguous_day_month);
    }

    #[test]
    fn test_textual_formats() {
        assert_eq!(parse_date("15 January 2023").unwrap().iso, "2023-01-15");
        assert_eq!(parse_date("15 Jan 2023").unwrap().iso, "2023-01-15");
        assert_eq!(parse_date("January 15, 2023").unwrap().iso, "2023-01-15");
    }

    #[test]
    fn test_dash_format() {
        assert_eq!(parse_date("15-01-2023").unwrap().iso, "2023-01-15");
    }

    #[test]
    fn test_implausible_year_rejected() {
        assert!(parse_date("15/01/1666").is_none());
        assert!(parse_date("2200-01-15").is_none());
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(parse_date("not a date").is_none());
        assert!(parse_date("99/99/2023").is_none());
        assert!(parse_date("").is_none());
    }
}
