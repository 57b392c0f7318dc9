//! Core data models used throughout the PDF processor.
//!
//! These types represent the uploaded document, the text extracted from it,
//! the artifacts derived from that text, and the turns of a document chat.

use bytes::Bytes;
use serde::Serialize;

/// A document as supplied by the upload surface, before acceptance.
///
/// Replaced wholesale on every new selection; never mutated in place.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub name: Option<String>,
    pub bytes: Bytes,
    pub mime_type: String,
    pub size_bytes: u64,
}

impl SourceDocument {
    /// Builds a document whose declared size is the length of `bytes`.
    pub fn new(bytes: impl Into<Bytes>, mime_type: impl Into<String>) -> Self {
        let bytes = bytes.into();
        Self {
            name: None,
            size_bytes: bytes.len() as u64,
            bytes,
            mime_type: mime_type.into(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Plain text extracted from exactly one [`SourceDocument`].
///
/// Never empty: extraction that yields no text is an error, not an empty value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    text: String,
    page_count: usize,
}

impl ExtractedText {
    /// Returns `None` when `text` has no non-whitespace content.
    pub fn new(text: String, page_count: usize) -> Option<Self> {
        if text.trim().is_empty() {
            None
        } else {
            Some(Self { text, page_count })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

/// The two derived outputs a document can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Summary,
    Translation,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Summary => "summary",
            ArtifactKind::Translation => "translation",
        }
    }

    /// Verb used in user notices ("Failed to summarize the document").
    pub fn verb(&self) -> &'static str {
        match self {
            ArtifactKind::Summary => "summarize",
            ArtifactKind::Translation => "translate",
        }
    }

    /// Noun used in user notices ("Summary completed successfully!").
    pub fn noun(&self) -> &'static str {
        match self {
            ArtifactKind::Summary => "Summary",
            ArtifactKind::Translation => "Translation",
        }
    }
}

impl std::str::FromStr for ArtifactKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "summary" | "summarize" => Ok(ArtifactKind::Summary),
            "translation" | "translate" => Ok(ArtifactKind::Translation),
            other => Err(format!("unknown operation: {}", other)),
        }
    }
}

/// Output of one completed summary or translation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub content: String,
}

/// Author of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single entry of a document chat transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracted_text_rejects_blank() {
        assert!(ExtractedText::new(String::new(), 1).is_none());
        assert!(ExtractedText::new(" \n\n ".to_string(), 3).is_none());
        let text = ExtractedText::new("Hello\n\n".to_string(), 1).unwrap();
        assert_eq!(text.as_str(), "Hello\n\n");
        assert_eq!(text.page_count(), 1);
    }

    #[test]
    fn source_document_size_matches_bytes() {
        let doc = SourceDocument::new(vec![1u8, 2, 3], "application/pdf").with_name("a.pdf");
        assert_eq!(doc.size_bytes, 3);
        assert_eq!(doc.name.as_deref(), Some("a.pdf"));
    }

    #[test]
    fn artifact_kind_parses_both_forms() {
        assert_eq!("summary".parse::<ArtifactKind>(), Ok(ArtifactKind::Summary));
        assert_eq!("translate".parse::<ArtifactKind>(), Ok(ArtifactKind::Translation));
        assert!("chat".parse::<ArtifactKind>().is_err());
    }
}
