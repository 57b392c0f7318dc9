//! Accept/reject contract for incoming documents.
//!
//! A document becomes the active [`SourceDocument`] only if its MIME type is
//! in `upload.accepted_types` and its declared size does not exceed
//! `upload.max_size_bytes`.

use thiserror::Error;

use crate::config::UploadConfig;
use crate::models::SourceDocument;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("file size {size_bytes} bytes exceeds the {max_bytes} byte limit")]
    TooLarge { size_bytes: u64, max_bytes: u64 },
    #[error("unsupported document type: {0}")]
    UnsupportedType(String),
}

pub fn validate_document(
    document: &SourceDocument,
    upload: &UploadConfig,
) -> Result<(), ValidationError> {
    if !is_accepted_type(&document.mime_type, &upload.accepted_types) {
        return Err(ValidationError::UnsupportedType(document.mime_type.clone()));
    }
    if document.size_bytes > upload.max_size_bytes {
        return Err(ValidationError::TooLarge {
            size_bytes: document.size_bytes,
            max_bytes: upload.max_size_bytes,
        });
    }
    Ok(())
}

/// Compares the MIME essence (type/subtype), ignoring case and parameters.
fn is_accepted_type(mime_type: &str, accepted: &[String]) -> bool {
    let essence = mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    accepted
        .iter()
        .any(|a| a.trim().eq_ignore_ascii_case(&essence))
}
