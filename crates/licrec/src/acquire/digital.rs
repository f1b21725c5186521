use crate::acquire::{spans_from_lines, DocumentFormat, TextAcquirer, TextSpan};
use crate::error::AcquireError;

/// Acquirer for plain digital text.
pub struct DigitalTextAcquirer;

impl DigitalTextAcquirer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DigitalTextAcquirer {
    fn default() -> Self {
        Self::new()
    }
}

impl TextAcquirer for DigitalTextAcquirer {
    fn extract(&self, bytes: &[u8]) -> Result<Vec<TextSpan>, AcquireError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| AcquireError::CorruptInput(format!("invalid UTF-8: {}", e)))?;

        let mut ordinal = 0;
        Ok(spans_from_lines(text, 1, &mut ordinal, None))
    }

    fn supports(&self, format: DocumentFormat) -> bool {
        matches!(format, DocumentFormat::Text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_lines_in_order() {
        let acquirer = DigitalTextAcquirer::new();
        let spans = acquirer
            .extract(b"Council: Fife Council\nReference: HMO/12345\n")
            .unwrap();

        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].ordinal, 0);
        assert_eq!(spans[0].text, "Council: Fife Council");
        assert_eq!(spans[1].ordinal, 1);
        // Digital text never carries region confidence.
        assert!(spans.iter().all(|s| s.region_confidence.is_none()));
    }

    #[test]
    fn test_invalid_utf8_is_corrupt_input() {
        let acquirer = DigitalTextAcquirer::new();
        let result = acquirer.extract(&[0xff, 0xfe, 0x00]);
        assert!(matches!(result, Err(AcquireError::CorruptInput(_))));
    }

    #[test]
    fn test_empty_document_yields_no_spans() {
        let acquirer = DigitalTextAcquirer::new();
        let spans = acquirer.extract(b"").unwrap();
        assert!(spans.is_empty());
    }

    #[test]
    fn test_supports_only_text() {
        let acquirer = DigitalTextAcquirer::new();
        assert!(acquirer.supports(DocumentFormat::Text));
        assert!(!acquirer.supports(DocumentFormat::Pdf));
        assert!(!acquirer.supports(DocumentFormat::Image));
    }
}
