//! Turns uploaded bytes into plain text.
//!
//! Dispatch is by file extension only. PDF and DOCX decoding are CPU-bound and run on the
//! blocking pool; images go through the external `tesseract` binary.

use std::fmt;
use std::io::{Cursor, Read, Write};
use std::path::Path;

use bytes::Bytes;
use quick_xml::{events::Event, Reader};
use thiserror::Error;
use tokio::task;
use tracing::{error, info};
use zip::ZipArchive;

use crate::documents::models::DocumentType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Image,
    Text,
}

impl DocumentFormat {
    /// Resolves the format from a filename's extension, case-insensitively.
    pub fn from_filename(filename: &str) -> Result<Self, ParseError> {
        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "pdf" => Ok(DocumentFormat::Pdf),
            // Legacy .doc goes to the DOCX reader and fails there on the container check.
            "docx" | "doc" => Ok(DocumentFormat::Docx),
            "png" | "jpg" | "jpeg" | "tiff" | "bmp" => Ok(DocumentFormat::Image),
            "txt" => Ok(DocumentFormat::Text),
            "" => Err(ParseError::UnsupportedFormat("(no extension)".to_string())),
            other => Err(ParseError::UnsupportedFormat(format!(".{other}"))),
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DocumentFormat::Pdf => "PDF",
            DocumentFormat::Docx => "DOCX",
            DocumentFormat::Image => "image",
            DocumentFormat::Text => "text file",
        })
    }
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Unsupported file type: {0}")]
    UnsupportedFormat(String),

    #[error("No text could be extracted from {0}")]
    NoText(DocumentFormat),

    #[error("PDF parsing error: {0}")]
    Pdf(String),

    #[error("DOCX parsing error: {0}")]
    Docx(String),

    #[error("Tesseract OCR not installed. OCR functionality unavailable.")]
    OcrUnavailable,

    #[error("Image OCR error: {0}")]
    Ocr(String),
}

#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub format: DocumentFormat,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct DocumentParser {
    tesseract_bin: String,
}

impl DocumentParser {
    pub fn new(tesseract_bin: impl Into<String>) -> Self {
        Self {
            tesseract_bin: tesseract_bin.into(),
        }
    }

    /// Extracts plain text from `bytes`, choosing the extractor from `filename`'s extension.
    pub async fn parse(
        &self,
        bytes: Bytes,
        filename: &str,
        document_type: DocumentType,
    ) -> Result<ParsedDocument, ParseError> {
        let format = DocumentFormat::from_filename(filename)?;
        info!(
            filename,
            document_type = document_type.as_str(),
            format = %format,
            "Parsing document"
        );

        let text = match format {
            DocumentFormat::Pdf => task::spawn_blocking(move || extract_pdf_text(&bytes))
                .await
                .map_err(|e| ParseError::Pdf(format!("extractor aborted: {e}")))??,
            DocumentFormat::Docx => task::spawn_blocking(move || extract_docx_text(&bytes))
                .await
                .map_err(|e| ParseError::Docx(format!("extractor aborted: {e}")))??,
            DocumentFormat::Image => self.ocr_image(&bytes, filename).await?,
            DocumentFormat::Text => decode_text(&bytes),
        };

        // An empty .txt upload is still a successful read.
        if format != DocumentFormat::Text && text.trim().is_empty() {
            return Err(ParseError::NoText(format));
        }

        info!(
            "Successfully parsed document. Extracted {} characters.",
            text.chars().count()
        );
        Ok(ParsedDocument { format, text })
    }

    async fn ocr_image(&self, bytes: &[u8], filename: &str) -> Result<String, ParseError> {
        let suffix = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{e}"))
            .unwrap_or_default();

        let mut image_file = tempfile::Builder::new()
            .prefix("trackly-ocr-")
            .suffix(&suffix)
            .tempfile()
            .map_err(|e| ParseError::Ocr(format!("could not stage image: {e}")))?;
        image_file
            .write_all(bytes)
            .and_then(|_| image_file.flush())
            .map_err(|e| ParseError::Ocr(format!("could not stage image: {e}")))?;

        let output = tokio::process::Command::new(&self.tesseract_bin)
            .arg(image_file.path())
            .arg("stdout")
            .output()
            .await;

        let output = match output {
            Ok(output) => output,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                error!("Tesseract OCR not installed or not in PATH");
                return Err(ParseError::OcrUnavailable);
            }
            Err(e) => return Err(ParseError::Ocr(e.to_string())),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ParseError::Ocr(stderr.trim().to_string()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn extract_pdf_text(bytes: &[u8]) -> Result<String, ParseError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ParseError::Pdf(e.to_string()))
}

fn extract_docx_text(bytes: &[u8]) -> Result<String, ParseError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ParseError::Docx(format!("invalid DOCX container: {e}")))?;

    let mut document_xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| ParseError::Docx(format!("missing word/document.xml: {e}")))?
        .read_to_string(&mut document_xml)
        .map_err(|e| ParseError::Docx(format!("unreadable word/document.xml: {e}")))?;

    docx_xml_to_text(&document_xml)
}

/// One output line per non-empty `w:p`, in document order. Table cells hold their own
/// paragraphs, so table text comes out line by line as well.
fn docx_xml_to_text(xml: &str) -> Result<String, ParseError> {
    let mut reader = Reader::from_str(xml);
    let mut lines: Vec<String> = Vec::new();
    let mut paragraph = String::new();
    let mut in_text_run = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == b"w:t" => in_text_run = true,
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:t" => in_text_run = false,
                b"w:p" => flush_paragraph(&mut paragraph, &mut lines),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"w:tab" => paragraph.push('\t'),
                b"w:br" | b"w:cr" => paragraph.push('\n'),
                _ => {}
            },
            Ok(Event::Text(t)) if in_text_run => {
                let decoded = t
                    .unescape()
                    .map_err(|e| ParseError::Docx(format!("bad text node: {e}")))?;
                paragraph.push_str(&decoded);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(ParseError::Docx(format!(
                    "malformed document XML at byte {}: {e}",
                    reader.buffer_position()
                )))
            }
        }
    }
    flush_paragraph(&mut paragraph, &mut lines);

    Ok(lines.join("\n"))
}

fn flush_paragraph(paragraph: &mut String, lines: &mut Vec<String>) {
    let line = paragraph.trim();
    if !line.is_empty() {
        lines.push(line.to_string());
    }
    paragraph.clear();
}

/// UTF-8 first (BOM stripped), Latin-1 otherwise. Latin-1 maps every byte, so this never fails.
fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.strip_prefix('\u{feff}').unwrap_or(s).to_string(),
        Err(_) => bytes.iter().map(|&b| char::from(b)).collect(),
    }
}
