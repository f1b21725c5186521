pub mod digital;
pub mod docx;
pub mod ocr;
pub mod pdf;

use std::path::Path;
use std::sync::Arc;

use crate::error::AcquireError;

pub use ocr::{OcrEngine, OcrRegion, TesseractEngine};

/// Declared format of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Text,
    Image,
}

impl DocumentFormat {
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "pdf" => Some(DocumentFormat::Pdf),
            "docx" => Some(DocumentFormat::Docx),
            "txt" | "md" => Some(DocumentFormat::Text),
            "png" | "jpg" | "jpeg" | "tif" | "tiff" | "bmp" => Some(DocumentFormat::Image),
            _ => None,
        }
    }

    /// Detects the format from a filename, preferring the MIME type guess
    /// and falling back to the raw extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        if let Some(mime) = mime_guess::from_path(path).first() {
            match (mime.type_().as_str(), mime.subtype().as_str()) {
                ("application", "pdf") => return Some(DocumentFormat::Pdf),
                ("application", "vnd.openxmlformats-officedocument.wordprocessingml.document") => {
                    return Some(DocumentFormat::Docx)
                }
                ("text", _) => return Some(DocumentFormat::Text),
                ("image", _) => return Some(DocumentFormat::Image),
                _ => {}
            }
        }
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Docx => "docx",
            DocumentFormat::Text => "text",
            DocumentFormat::Image => "image",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pdf" => Some(DocumentFormat::Pdf),
            "docx" => Some(DocumentFormat::Docx),
            "text" => Some(DocumentFormat::Text),
            "image" => Some(DocumentFormat::Image),
            _ => None,
        }
    }
}

/// One ordered run of text from a document.
///
/// `region_confidence` is present only when optical recognition produced the
/// span; digitally-extracted text carries `None`.
#[derive(Debug, Clone)]
pub struct TextSpan {
    pub ordinal: usize,
    pub page: u32,
    pub text: String,
    pub region_confidence: Option<f64>,
}

impl TextSpan {
    pub fn new(ordinal: usize, page: u32, text: impl Into<String>) -> Self {
        Self {
            ordinal,
            page,
            text: text.into(),
            region_confidence: None,
        }
    }

    pub fn with_confidence(ordinal: usize, page: u32, text: impl Into<String>, conf: f64) -> Self {
        Self {
            ordinal,
            page,
            text: text.into(),
            region_confidence: Some(conf),
        }
    }
}

pub trait TextAcquirer: Send + Sync {
    fn extract(&self, bytes: &[u8]) -> Result<Vec<TextSpan>, AcquireError>;
    fn supports(&self, format: DocumentFormat) -> bool;
}

/// Routes document bytes to the acquirer for their declared format.
pub struct AcquirerRegistry {
    acquirers: Vec<Box<dyn TextAcquirer>>,
}

impl AcquirerRegistry {
    pub fn new(ocr_engine: Option<Arc<dyn OcrEngine>>) -> Self {
        let mut acquirers: Vec<Box<dyn TextAcquirer>> = vec![
            Box::new(digital::DigitalTextAcquirer::new()),
            Box::new(pdf::PdfAcquirer::new()),
            Box::new(docx::DocxAcquirer::new()),
        ];

        if let Some(engine) = ocr_engine {
            acquirers.push(Box::new(ocr::ImageAcquirer::new(engine)));
        }

        Self { acquirers }
    }

    pub fn extract(
        &self,
        bytes: &[u8],
        format: DocumentFormat,
    ) -> Result<Vec<TextSpan>, AcquireError> {
        for acquirer in &self.acquirers {
            if acquirer.supports(format) {
                return acquirer.extract(bytes);
            }
        }

        Err(AcquireError::UnsupportedFormat(format.as_str().to_string()))
    }
}

/// Splits a block of text into one span per non-empty line, continuing the
/// ordinal sequence from `next_ordinal`.
pub(crate) fn spans_from_lines(
    text: &str,
    page: u32,
    next_ordinal: &mut usize,
    region_confidence: Option<f64>,
) -> Vec<TextSpan> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|line| {
            let ordinal = *next_ordinal;
            *next_ordinal += 1;
            TextSpan {
                ordinal,
                page,
                text: line.to_string(),
                region_confidence,
            }
        })
        .collect()
}
