//! Document kind detection and text-layer extraction (PDF, DOCX).

use std::io::{Cursor, Read};
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::{debug, info};

use crate::error::DocumentError;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_JPEG: &str = "image/jpeg";
pub const MIME_PNG: &str = "image/png";
pub const MIME_DOCX: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Upload MIME types accepted by the HTTP layer.
pub const ALLOWED_MIME_TYPES: &[&str] = &[MIME_PDF, MIME_JPEG, MIME_PNG, MIME_DOCX];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Image,
    Pdf,
    Docx,
    Unknown,
}

impl DocumentKind {
    /// Classify by MIME type, falling back to the filename extension when the
    /// MIME type is missing or generic.
    pub fn detect(mime_type: &str, filename: &str) -> Self {
        match mime_type {
            MIME_PDF => return Self::Pdf,
            MIME_DOCX => return Self::Docx,
            m if m.starts_with("image/") => return Self::Image,
            _ => {}
        }

        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "pdf" => Self::Pdf,
            "docx" => Self::Docx,
            "png" | "jpg" | "jpeg" => Self::Image,
            _ => Self::Unknown,
        }
    }

    /// Whether the document carries a text layer to read instead of OCR.
    pub fn has_text_layer(&self) -> bool {
        matches!(self, Self::Pdf | Self::Docx)
    }
}

/// MIME type for an image path, by extension. Defaults to PNG.
pub fn image_mime_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => MIME_JPEG,
        _ => MIME_PNG,
    }
}

/// Read the text layer of a PDF or DOCX file. Images have none.
pub async fn read_text_layer(path: &Path, kind: DocumentKind) -> Result<Option<String>, DocumentError> {
    if !kind.has_text_layer() {
        return Ok(None);
    }

    let data = tokio::fs::read(path).await?;
    info!("Reading {:?} text layer from {:?} ({} bytes)", kind, path, data.len());

    let text = tokio::task::spawn_blocking(move || match kind {
        DocumentKind::Pdf => extract_pdf_text(&data),
        DocumentKind::Docx => extract_docx_text(&data),
        DocumentKind::Image | DocumentKind::Unknown => Ok(String::new()),
    })
    .await
    .map_err(|e| DocumentError::Io(std::io::Error::other(e)))??;

    debug!("Text layer: {} chars", text.len());
    Ok(Some(text))
}

/// Extract text from a PDF using lopdf, one page per line group.
pub fn extract_pdf_text(data: &[u8]) -> Result<String, DocumentError> {
    let doc = lopdf::Document::load_from(Cursor::new(data)).map_err(|e| DocumentError::Pdf(e.to_string()))?;

    let mut text = String::new();
    for (page_num, _) in doc.get_pages() {
        match doc.extract_text(&[page_num]) {
            Ok(content) => {
                text.push_str(&content);
                text.push('\n');
            }
            Err(e) => debug!("Skipping PDF page {}: {}", page_num, e),
        }
    }
    Ok(text)
}

/// Extract raw text from `word/document.xml`. Paragraphs and `w:br` become
/// newlines, `w:tab` a tab. Only `w:t` runs contribute characters.
pub fn extract_docx_text(data: &[u8]) -> Result<String, DocumentError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data)).map_err(|e| DocumentError::Docx(e.to_string()))?;

    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| DocumentError::Docx(e.to_string()))?
        .read_to_string(&mut xml)?;

    let mut reader = Reader::from_str(&xml);
    let mut text = String::new();
    let mut in_run_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if e.name().as_ref() == b"w:t" {
                    in_run_text = true;
                }
            }
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"w:tab" => text.push('\t'),
                b"w:br" | b"w:cr" => text.push('\n'),
                _ => {}
            },
            Ok(Event::Text(e)) if in_run_text => {
                let chunk = e.unescape().map_err(|e| DocumentError::Docx(e.to_string()))?;
                text.push_str(&chunk);
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:t" => in_run_text = false,
                b"w:p" => text.push('\n'),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(DocumentError::Docx(e.to_string())),
            _ => {}
        }
    }

    Ok(text)
}
