use std::io::{Cursor, Read};

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::acquire::{DocumentFormat, TextAcquirer, TextSpan};
use crate::error::AcquireError;

/// Acquirer for DOCX documents. Emits one span per paragraph.
pub struct DocxAcquirer;

impl DocxAcquirer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DocxAcquirer {
    fn default() -> Self {
        Self::new()
    }
}

impl TextAcquirer for DocxAcquirer {
    fn extract(&self, bytes: &[u8]) -> Result<Vec<TextSpan>, AcquireError> {
        let _span = tracing::info_span!("acquire.docx").entered();

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| AcquireError::CorruptInput(format!("not a DOCX archive: {}", e)))?;

        let mut xml = String::new();
        archive
            .by_name("word/document.xml")
            .map_err(|e| AcquireError::CorruptInput(format!("missing word/document.xml: {}", e)))?
            .read_to_string(&mut xml)
            .map_err(|e| AcquireError::CorruptInput(format!("unreadable document.xml: {}", e)))?;

        parse_document_xml(&xml)
    }

    fn supports(&self, format: DocumentFormat) -> bool {
        matches!(format, DocumentFormat::Docx)
    }
}

fn parse_document_xml(xml: &str) -> Result<Vec<TextSpan>, AcquireError> {
    let mut reader = Reader::from_str(xml);
    let mut spans = Vec::new();
    let mut ordinal = 0;
    let mut in_text = false;
    let mut paragraph = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"w:t" => in_text = true,
            Ok(Event::End(ref e)) if e.name().as_ref() == b"w:t" => in_text = false,
            Ok(Event::End(ref e)) if e.name().as_ref() == b"w:p" => {
                let text = paragraph.trim();
                if !text.is_empty() {
                    spans.push(TextSpan::new(ordinal, 1, text));
                    ordinal += 1;
                }
                paragraph.clear();
            }
            Ok(Event::Text(ref t)) if in_text => {
                let text = t
                    .unescape()
                    .map_err(|e| AcquireError::CorruptInput(format!("bad XML text: {}", e)))?;
                paragraph.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(AcquireError::CorruptInput(format!(
                    "malformed document.xml: {}",
                    e
                )))
            }
        }
    }

    Ok(spans)
}
