//! Page-ordered text extraction for PDF documents.
//!
//! The extractor receives the raw bytes of an accepted [`SourceDocument`] and
//! returns a single [`ExtractedText`]. Pages are visited in ascending order;
//! the text fragments of one page are joined with single spaces and every page
//! is followed by a blank line (`"\n\n"`), so a two-page document reading
//! `Hello world` / `Goodbye` extracts to `"Hello world\n\nGoodbye\n\n"`.
//!
//! Extraction is all-or-nothing. Output is deterministic for the same bytes
//! and parser version, but may change when `lopdf` is upgraded.

use std::collections::BTreeMap;

use lopdf::content::Content;
use lopdf::{Document, Encoding, Object, ObjectId};
use thiserror::Error;

use crate::models::{ExtractedText, SourceDocument};

/// MIME type of the only document format the pipeline accepts by default.
pub const MIME_PDF: &str = "application/pdf";

/// Separator appended after every page.
pub const PAGE_SEPARATOR: &str = "\n\n";

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("document could not be parsed as PDF: {0}")]
    Parse(String),
    #[error("document contains no pages")]
    NoPages,
    #[error("failed to extract text from page {page}: {message}")]
    Page { page: u32, message: String },
    #[error("document contains no extractable text")]
    NoText,
}

/// Converts a binary document into plain text.
///
/// Implementations are synchronous and CPU-bound; the processor runs them on
/// the blocking pool.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, document: &SourceDocument) -> Result<ExtractedText, ExtractionError>;
}

/// [`TextExtractor`] backed by `lopdf`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtractor;

impl TextExtractor for PdfExtractor {
    fn extract(&self, document: &SourceDocument) -> Result<ExtractedText, ExtractionError> {
        extract_pdf(&document.bytes)
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<ExtractedText, ExtractionError> {
    let doc = Document::load_mem(bytes).map_err(|e| ExtractionError::Parse(e.to_string()))?;

    // BTreeMap keyed by 1-based page number, so iteration is ascending.
    let pages = doc.get_pages();
    if pages.is_empty() {
        return Err(ExtractionError::NoPages);
    }

    let mut full_text = String::new();
    for (&page_number, &page_id) in &pages {
        let fragments = page_fragments(&doc, page_id).map_err(|e| ExtractionError::Page {
            page: page_number,
            message: e.to_string(),
        })?;
        full_text.push_str(&join_fragments(&fragments));
        full_text.push_str(PAGE_SEPARATOR);
    }

    tracing::debug!(
        pages = pages.len(),
        chars = full_text.chars().count(),
        "extracted pdf text"
    );

    ExtractedText::new(full_text, pages.len()).ok_or(ExtractionError::NoText)
}

/// One string per text-showing operator on the page, decoded with the font
/// selected at that point of the content stream.
fn page_fragments(doc: &Document, page_id: ObjectId) -> lopdf::Result<Vec<String>> {
    let encodings: BTreeMap<Vec<u8>, Encoding<'_>> = doc
        .get_page_fonts(page_id)?
        .into_iter()
        .filter_map(|(name, font)| font.get_font_encoding(doc).ok().map(|enc| (name, enc)))
        .collect();
    let content = Content::decode(&doc.get_page_content(page_id)?)?;

    let mut encoding: Option<&Encoding<'_>> = None;
    let mut fragments = Vec::new();
    for operation in &content.operations {
        match operation.operator.as_str() {
            "Tf" => {
                encoding = operation
                    .operands
                    .first()
                    .and_then(|font| font.as_name().ok())
                    .and_then(|name| encodings.get(name));
            }
            // `'` and `"` carry their string as the last operand.
            "Tj" | "'" | "\"" => {
                if let Some(Object::String(bytes, _)) = operation.operands.last() {
                    fragments.push(decode(encoding, bytes)?);
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = operation.operands.first() {
                    let mut fragment = String::new();
                    for item in items {
                        match item {
                            Object::String(bytes, _) => fragment.push_str(&decode(encoding, bytes)?),
                            // A wide negative adjustment is a word gap.
                            Object::Integer(offset) if *offset < -100 => fragment.push(' '),
                            Object::Real(offset) if *offset < -100.0 => fragment.push(' '),
                            _ => {}
                        }
                    }
                    fragments.push(fragment);
                }
            }
            _ => {}
        }
    }
    Ok(fragments)
}

fn decode(encoding: Option<&Encoding<'_>>, bytes: &[u8]) -> lopdf::Result<String> {
    match encoding {
        Some(encoding) => Document::decode_text(encoding, bytes),
        None => Ok(String::from_utf8_lossy(bytes).into_owned()),
    }
}

/// Joins the fragments of one page with single spaces, dropping blank ones.
fn join_fragments<S: AsRef<str>>(fragments: &[S]) -> String {
    fragments
        .iter()
        .map(|fragment| fragment.as_ref().trim())
        .filter(|fragment| !fragment.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_pdf_returns_parse_error() {
        let doc = SourceDocument::new(b"not a pdf".to_vec(), MIME_PDF);
        let err = PdfExtractor.extract(&doc).unwrap_err();
        assert!(matches!(err, ExtractionError::Parse(_)));
    }

    #[test]
    fn empty_bytes_return_parse_error() {
        let doc = SourceDocument::new(Vec::new(), MIME_PDF);
        assert!(PdfExtractor.extract(&doc).is_err());
    }

    #[test]
    fn fragments_are_joined_with_single_spaces() {
        assert_eq!(join_fragments(&["Hello", "  world "]), "Hello world");
        assert_eq!(join_fragments(&["", " ", "one"]), "one");
        assert_eq!(join_fragments::<&str>(&[]), "");
    }
}
