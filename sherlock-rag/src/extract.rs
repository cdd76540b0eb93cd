//! Text extraction from uploaded files.
//!
//! Plain text and markdown are decoded as UTF-8. PDFs go through
//! `pdf-extract`, which only reads from a path, so the bytes are spooled to
//! a temporary file that is removed when the guard drops. DOCX files are zip
//! containers; the paragraphs of `word/document.xml` are joined with `\n`.

use std::io::{Cursor, Read, Write};
use std::path::Path;

use tracing::{debug, warn};

use crate::document::{Document, DocumentFormat, Upload};
use crate::error::{RagError, Result};

/// Extract the text of an upload.
///
/// An upload with no extractable text yields a document with empty text;
/// that is not an error.
///
/// # Errors
///
/// Returns [`RagError::CorruptDocument`] if the bytes cannot be parsed in
/// the upload's declared format.
pub fn extract(upload: &Upload) -> Result<Document> {
    let text = match upload.format {
        DocumentFormat::Text | DocumentFormat::Markdown => decode_utf8(&upload.name, &upload.bytes)?,
        DocumentFormat::Pdf => extract_pdf(&upload.name, &upload.bytes, &std::env::temp_dir())?,
        DocumentFormat::Docx => extract_docx(&upload.name, &upload.bytes)?,
    };

    debug!(
        document.name = %upload.name,
        format = %upload.format,
        chars = text.chars().count(),
        "extracted text"
    );
    Ok(Document { id: upload.id.clone(), name: upload.name.clone(), text })
}

fn decode_utf8(name: &str, bytes: &[u8]) -> Result<String> {
    let text = std::str::from_utf8(bytes).map_err(|e| {
        RagError::corrupt(name, format!("invalid UTF-8 at byte {}", e.valid_up_to()))
    })?;
    Ok(text.strip_prefix('\u{feff}').unwrap_or(text).to_string())
}

fn extract_pdf(name: &str, bytes: &[u8], spool_dir: &Path) -> Result<String> {
    // Removed on drop, including when the parser panics.
    let mut spool = tempfile::Builder::new()
        .prefix("sherlock-")
        .suffix(".pdf")
        .tempfile_in(spool_dir)
        .map_err(|e| RagError::corrupt(name, format!("failed to spool PDF: {e}")))?;
    spool
        .write_all(bytes)
        .and_then(|()| spool.flush())
        .map_err(|e| RagError::corrupt(name, format!("failed to spool PDF: {e}")))?;

    let path = spool.path().to_path_buf();
    let pages = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        pdf_extract::extract_text_by_pages(&path)
    }));

    match pages {
        Ok(Ok(pages)) => Ok(pages.join("\n")),
        Ok(Err(e)) => Err(RagError::corrupt(name, format!("unreadable PDF: {e}"))),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            warn!(document.name = %name, %message, "PDF parser panicked");
            Err(RagError::corrupt(name, format!("PDF parser failed: {message}")))
        }
    }
}

fn extract_docx(name: &str, bytes: &[u8]) -> Result<String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| RagError::corrupt(name, format!("invalid DOCX archive: {e}")))?;
    let mut part = archive
        .by_name("word/document.xml")
        .map_err(|_| RagError::corrupt(name, "no word/document.xml in DOCX"))?;

    let mut xml = String::new();
    part.read_to_string(&mut xml)
        .map_err(|e| RagError::corrupt(name, format!("failed to read word/document.xml: {e}")))?;

    docx_text(&xml).map_err(|message| RagError::corrupt(name, message))
}

/// Concatenate the `<w:t>` runs of every `<w:p>` paragraph.
fn docx_text(xml: &str) -> std::result::Result<String, String> {
    if !xml.contains("<w:body") {
        return Err("word/document.xml has no <w:body>".to_string());
    }

    let mut paragraphs: Vec<String> = Vec::new();
    let mut current: Option<String> = None;
    let mut in_text = false;
    // Tabs and breaks count only inside runs; <w:pPr> holds tab-stop definitions.
    let mut in_run = false;
    let mut rest = xml;

    while let Some(lt) = rest.find('<') {
        let (before, after) = rest.split_at(lt);
        if in_text {
            if let Some(paragraph) = current.as_mut() {
                paragraph.push_str(&decode_entities(before));
            }
        }

        let gt = after.find('>').ok_or_else(|| "unterminated XML tag".to_string())?;
        let tag = &after[1..gt];
        rest = &after[gt + 1..];

        let closing = tag.starts_with('/');
        let self_closing = tag.ends_with('/');
        let tag_name = tag
            .trim_start_matches('/')
            .split(|c: char| c.is_whitespace() || c == '/')
            .next()
            .unwrap_or("");

        match (tag_name, closing) {
            ("w:p", false) if self_closing => paragraphs.push(String::new()),
            ("w:p", false) => current = Some(String::new()),
            ("w:p", true) => {
                if let Some(paragraph) = current.take() {
                    paragraphs.push(paragraph);
                }
            }
            ("w:r", false) => in_run = !self_closing,
            ("w:r", true) => in_run = false,
            ("w:t", false) => in_text = !self_closing,
            ("w:t", true) => in_text = false,
            ("w:tab", false) if in_run => {
                if let Some(paragraph) = current.as_mut() {
                    paragraph.push('\t');
                }
            }
            ("w:br" | "w:cr", false) if in_run => {
                if let Some(paragraph) = current.as_mut() {
                    paragraph.push('\n');
                }
            }
            _ => {}
        }
    }

    if current.is_some() {
        return Err("unclosed <w:p> paragraph".to_string());
    }
    Ok(paragraphs.join("\n"))
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let Some(semi) = tail.find(';') else {
            out.push_str(tail);
            return out;
        };
        let entity = &tail[1..semi];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                .and_then(char::from_u32),
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
