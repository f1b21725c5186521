use crate::acquire::{spans_from_lines, DocumentFormat, TextAcquirer, TextSpan};
use crate::error::AcquireError;

/// Acquirer for PDFs with embedded (digital) text.
///
/// Scanned pages without a text layer are expected to arrive as image
/// documents; a PDF from which no text can be extracted is corrupt input.
pub struct PdfAcquirer;

impl PdfAcquirer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PdfAcquirer {
    fn default() -> Self {
        Self::new()
    }
}

impl TextAcquirer for PdfAcquirer {
    fn extract(&self, bytes: &[u8]) -> Result<Vec<TextSpan>, AcquireError> {
        let _span = tracing::info_span!("acquire.pdf").entered();

        let doc = lopdf::Document::load_mem(bytes)
            .map_err(|e| AcquireError::CorruptInput(format!("failed to load PDF: {}", e)))?;

        let mut spans = Vec::new();
        let mut ordinal = 0;

        for (page_num, _) in doc.get_pages() {
            if let Ok(page_text) = doc.extract_text(&[page_num]) {
                spans.extend(spans_from_lines(&page_text, page_num, &mut ordinal, None));
            }
        }

        if !has_usable_text(&spans) {
            return Err(AcquireError::CorruptInput(
                "PDF contains no extractable text".to_string(),
            ));
        }

        Ok(spans)
    }

    fn supports(&self, format: DocumentFormat) -> bool {
        matches!(format, DocumentFormat::Pdf)
    }
}

fn has_usable_text(spans: &[TextSpan]) -> bool {
    spans
        .iter()
        .any(|s| s.text.chars().any(|c| c.is_alphanumeric()))
}
