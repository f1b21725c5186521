use std::io::Cursor;
use std::sync::Arc;

use crate::acquire::{DocumentFormat, TextAcquirer, TextSpan};
use crate::error::AcquireError;

/// One recognized text region with its recognition confidence in [0, 1].
#[derive(Debug, Clone)]
pub struct OcrRegion {
    pub text: String,
    pub confidence: f64,
}

/// External optical-recognition capability.
///
/// The production engine shells into Tesseract via leptess; tests substitute
/// a deterministic fake. Engine failures are transient — the engine may be
/// temporarily unavailable while the image itself is fine.
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, image_bytes: &[u8]) -> Result<Vec<OcrRegion>, AcquireError>;
}

/// Tesseract-backed engine.
pub struct TesseractEngine {
    languages: String,
}

impl TesseractEngine {
    pub fn new(languages: &[String]) -> Self {
        let languages = if languages.is_empty() {
            "eng".to_string()
        } else {
            languages.join("+")
        };
        Self { languages }
    }
}

impl OcrEngine for TesseractEngine {
    fn recognize(&self, image_bytes: &[u8]) -> Result<Vec<OcrRegion>, AcquireError> {
        let _span = tracing::info_span!("acquire.ocr").entered();

        let img = image::load_from_memory(image_bytes)
            .map_err(|e| AcquireError::CorruptInput(format!("failed to load image: {}", e)))?;

        // Convert to PNG in memory for leptess
        let mut png_data = Vec::new();
        let mut cursor = Cursor::new(&mut png_data);
        img.write_to(&mut cursor, image::ImageFormat::Png)
            .map_err(|e| AcquireError::Ocr(format!("failed to convert image: {}", e)))?;

        let mut lt = leptess::LepTess::new(None, &self.languages)
            .map_err(|e| AcquireError::Ocr(format!("failed to initialize Tesseract: {}", e)))?;

        lt.set_image_from_mem(&png_data)
            .map_err(|e| AcquireError::Ocr(format!("failed to set image for OCR: {}", e)))?;

        let text = lt
            .get_utf8_text()
            .map_err(|e| AcquireError::Ocr(format!("OCR failed: {}", e)))?;

        // Tesseract reports a mean confidence for the page as 0-100.
        let confidence = (lt.mean_text_conf().clamp(0, 100) as f64) / 100.0;

        Ok(text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(|line| OcrRegion {
                text: line.to_string(),
                confidence,
            })
            .collect())
    }
}

/// Acquirer for scanned images, backed by an [`OcrEngine`].
pub struct ImageAcquirer {
    engine: Arc<dyn OcrEngine>,
}

impl ImageAcquirer {
    pub fn new(engine: Arc<dyn OcrEngine>) -> Self {
        Self { engine }
    }
}

impl TextAcquirer for ImageAcquirer {
    fn extract(&self, bytes: &[u8]) -> Result<Vec<TextSpan>, AcquireError> {
        let regions = self.engine.recognize(bytes)?;

        Ok(regions
            .into_iter()
            .enumerate()
            .map(|(ordinal, region)| {
                TextSpan::with_confidence(ordinal, 1, region.text, region.confidence.clamp(0.0, 1.0))
            })
            .collect())
    }

    fn supports(&self, format: DocumentFormat) -> bool {
        matches!(format, DocumentFormat::Image)
    }
}
