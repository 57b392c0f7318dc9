//! Processing stage of the active document and its display mapping.
//!
//! The state machine only ever stores a [`ProcessingStage`]; labels, icon
//! names, and status messages come from the pure [`display`] lookup.

use serde::Serialize;

use crate::models::ArtifactKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStage {
    #[default]
    Idle,
    Extracting,
    Summarizing,
    Translating,
    Completed,
    Failed,
}

impl ProcessingStage {
    /// Stage entered while an operation of `kind` is running.
    pub fn running(kind: ArtifactKind) -> Self {
        match kind {
            ArtifactKind::Summary => ProcessingStage::Summarizing,
            ArtifactKind::Translation => ProcessingStage::Translating,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStage::Idle => "idle",
            ProcessingStage::Extracting => "extracting",
            ProcessingStage::Summarizing => "summarizing",
            ProcessingStage::Translating => "translating",
            ProcessingStage::Completed => "completed",
            ProcessingStage::Failed => "failed",
        }
    }

    /// True while an extraction or completion call is outstanding.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            ProcessingStage::Extracting | ProcessingStage::Summarizing | ProcessingStage::Translating
        )
    }
}

impl std::fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a stage is presented to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageDisplay {
    pub label: &'static str,
    pub icon: &'static str,
    pub message: String,
}

/// Display entry for `stage`; `None` for [`ProcessingStage::Idle`].
///
/// `language` is the target language named in the summarizing and
/// translating messages.
pub fn display(stage: ProcessingStage, language: &str) -> Option<StageDisplay> {
    let (label, icon, message) = match stage {
        ProcessingStage::Idle => return None,
        ProcessingStage::Extracting => (
            "Extracting Text",
            "document",
            "Extracting text from your PDF file...".to_string(),
        ),
        ProcessingStage::Summarizing => (
            "Generating Summary",
            "list",
            format!("Creating a concise summary in {}...", language),
        ),
        ProcessingStage::Translating => (
            "Translating Content",
            "languages",
            format!("Translating the document into {}...", language),
        ),
        ProcessingStage::Completed => (
            "Processing Complete",
            "check",
            "Your document has been processed successfully!".to_string(),
        ),
        ProcessingStage::Failed => (
            "Processing Failed",
            "error",
            "We encountered an error while processing your document. Please try again."
                .to_string(),
        ),
    };
    Some(StageDisplay {
        label,
        icon,
        message,
    })
}

/// Every stage that has a display entry, in pipeline order.
pub const DISPLAYED_STAGES: [ProcessingStage; 5] = [
    ProcessingStage::Extracting,
    ProcessingStage::Summarizing,
    ProcessingStage::Translating,
    ProcessingStage::Completed,
    ProcessingStage::Failed,
];
