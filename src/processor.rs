//! The document processing state machine.
//!
//! [`DocumentProcessor`] is the single writer of the "current document"
//! aggregate: the accepted [`SourceDocument`], its [`ExtractedText`], the
//! summary and translation [`Artifact`]s, the [`ProcessingStage`], and the
//! [`ConversationSession`] over the text.
//!
//! ```text
//! idle ──▶ extracting ──▶ completed ──▶ summarizing | translating ──▶ completed
//!              │                               │
//!              └──────────▶ failed ◀───────────┘
//! ```
//!
//! # Concurrency
//!
//! State lives behind a mutex that is never held across an `.await`. Every
//! long call follows the same shape: lock, check and mark the stage, capture
//! the document generation, unlock, await, lock again, and apply the result
//! only if the generation is unchanged. [`submit`](DocumentProcessor::submit)
//! and [`clear`](DocumentProcessor::clear) bump the generation, so a result
//! that resolves after its document was replaced is discarded with
//! [`ProcessError::Superseded`].
//!
//! At most one extraction or operation runs per processor; a second one is
//! rejected with [`ProcessError::Busy`]. Chat questions are serialized per
//! session instead.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use thiserror::Error;

use crate::completion::{truncate_chars, CompletionClient, CompletionError};
use crate::config::{Config, PromptsConfig, UploadConfig};
use crate::extract::{ExtractionError, PdfExtractor, TextExtractor};
use crate::models::{Artifact, ArtifactKind, ConversationTurn, ExtractedText, SourceDocument};
use crate::progress::{NoProgress, PipelineEvent, PipelineReporter};
use crate::prompts::operation_prompt;
use crate::session::{ChatError, ConversationSession};
use crate::stage::{display, ProcessingStage, StageDisplay};
use crate::validate::{validate_document, ValidationError};

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error(transparent)]
    Completion(#[from] CompletionError),
    #[error("no document available for this step")]
    NoDocument,
    #[error("another step is already running for this document")]
    Busy,
    #[error("the document was replaced before the result arrived")]
    Superseded,
}

/// The current-document aggregate. Replaced wholesale on submit and clear.
#[derive(Default)]
struct DocumentState {
    generation: u64,
    source: Option<SourceDocument>,
    text: Option<ExtractedText>,
    summary: Option<Artifact>,
    translation: Option<Artifact>,
    stage: ProcessingStage,
    session: Option<ConversationSession>,
    in_flight: bool,
}

impl DocumentState {
    fn artifact_slot(&mut self, kind: ArtifactKind) -> &mut Option<Artifact> {
        match kind {
            ArtifactKind::Summary => &mut self.summary,
            ArtifactKind::Translation => &mut self.translation,
        }
    }
}

fn rejection_notice(err: &ValidationError) -> String {
    match err {
        ValidationError::TooLarge { max_bytes, .. } => format!(
            "File size exceeds the {} limit. Please select a smaller file.",
            format_size(*max_bytes)
        ),
        ValidationError::UnsupportedType(_) => {
            "Only PDF files are supported. Please select a PDF file.".to_string()
        }
    }
}

/// "10MB", "500KB", or "100 bytes": the largest unit that divides evenly.
fn format_size(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * 1024;
    if bytes >= MIB && bytes % MIB == 0 {
        format!("{}MB", bytes / MIB)
    } else if bytes >= KIB && bytes % KIB == 0 {
        format!("{}KB", bytes / KIB)
    } else {
        format!("{} bytes", bytes)
    }
}

/// Marks the running extraction or operation as failed if its future is
/// dropped before the result is applied.
struct StepGuard<'a> {
    processor: &'a DocumentProcessor,
    generation: u64,
    armed: bool,
}

impl<'a> StepGuard<'a> {
    fn new(processor: &'a DocumentProcessor, generation: u64) -> Self {
        Self {
            processor,
            generation,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for StepGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let released = {
            let mut state = self.processor.state();
            if state.generation == self.generation && state.in_flight {
                state.in_flight = false;
                if state.stage.is_busy() {
                    state.stage = ProcessingStage::Failed;
                }
                true
            } else {
                false
            }
        };
        if released {
            tracing::warn!(generation = self.generation, "step cancelled before its result arrived");
            self.processor
                .emit(vec![PipelineEvent::Stage(ProcessingStage::Failed)]);
        }
    }
}

/// Closes the pending chat question with the fallback turn if the `ask`
/// future is dropped before the reply is resolved.
struct ChatGuard<'a> {
    processor: &'a DocumentProcessor,
    generation: u64,
    armed: bool,
}

impl Drop for ChatGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let abandoned = {
            let mut state = self.processor.state();
            let current = state.generation == self.generation;
            match state.session.as_mut() {
                Some(session) if current && session.is_pending() => {
                    session.abandon();
                    true
                }
                _ => false,
            }
        };
        if abandoned {
            tracing::warn!(generation = self.generation, "chat question cancelled before its reply arrived");
            self.processor.emit(vec![PipelineEvent::error(
                "Failed to get a response. Please try again.",
            )]);
        }
    }
}

/// Read-only view of the current document, for display and the HTTP API.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSnapshot {
    pub name: Option<String>,
    pub mime_type: Option<String>,
    pub size_bytes: Option<u64>,
    pub stage: ProcessingStage,
    pub stage_display: Option<StageDisplay>,
    pub has_text: bool,
    pub page_count: Option<usize>,
    pub summary: Option<String>,
    pub translation: Option<String>,
    pub transcript: Vec<ConversationTurn>,
    pub chat_pending: bool,
}

pub struct DocumentProcessor {
    state: Mutex<DocumentState>,
    extractor: Arc<dyn TextExtractor>,
    client: Arc<dyn CompletionClient>,
    reporter: Arc<dyn PipelineReporter>,
    upload: UploadConfig,
    prompts: PromptsConfig,
    context_chars: usize,
}

impl DocumentProcessor {
    /// Creates an idle processor with the PDF extractor and no reporting.
    pub fn new(config: &Config, client: Arc<dyn CompletionClient>) -> Self {
        Self {
            state: Mutex::new(DocumentState::default()),
            extractor: Arc::new(PdfExtractor),
            client,
            reporter: Arc::new(NoProgress),
            upload: config.upload.clone(),
            prompts: config.prompts.clone(),
            context_chars: config.completion.context_chars,
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn PipelineReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    fn state(&self) -> MutexGuard<'_, DocumentState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, events: Vec<PipelineEvent>) {
        for event in events {
            self.reporter.report(event);
        }
    }

    /// Drops all derived state and starts a new generation.
    fn reset(state: &mut DocumentState) -> Vec<PipelineEvent> {
        let previous = state.stage;
        *state = DocumentState {
            generation: state.generation + 1,
            ..DocumentState::default()
        };
        if previous != ProcessingStage::Idle {
            vec![PipelineEvent::Stage(ProcessingStage::Idle)]
        } else {
            Vec::new()
        }
    }

    // ============ Document lifecycle ============

    /// Replaces the current document.
    ///
    /// All derived state is cleared first, so a rejected document leaves the
    /// processor idle with no active document.
    pub fn submit(&self, document: SourceDocument) -> Result<(), ProcessError> {
        let (result, mut events) = {
            let mut state = self.state();
            let events = Self::reset(&mut state);
            match validate_document(&document, &self.upload) {
                Ok(()) => {
                    tracing::info!(
                        name = document.name.as_deref().unwrap_or("<unnamed>"),
                        size_bytes = document.size_bytes,
                        generation = state.generation,
                        "document accepted"
                    );
                    state.source = Some(document);
                    (Ok(()), events)
                }
                Err(e) => {
                    tracing::info!(error = %e, "document rejected");
                    (Err(e), events)
                }
            }
        };

        if let Err(e) = &result {
            events.push(PipelineEvent::error(rejection_notice(e)));
        }
        self.emit(events);
        result.map_err(ProcessError::from)
    }

    /// Records a rejection decided outside [`submit`](Self::submit), such as
    /// an upload body cut off at the transport's size limit. The current
    /// document is dropped exactly as for a rejected submit.
    pub fn reject(&self, err: ValidationError) -> ProcessError {
        let mut events = {
            let mut state = self.state();
            tracing::info!(error = %err, "document rejected");
            Self::reset(&mut state)
        };
        events.push(PipelineEvent::error(rejection_notice(&err)));
        self.emit(events);
        ProcessError::from(err)
    }

    /// Drops the current document and everything derived from it.
    pub fn clear(&self) {
        let events = {
            let mut state = self.state();
            tracing::info!(generation = state.generation, "document cleared");
            Self::reset(&mut state)
        };
        self.emit(events);
    }

    // ============ Extraction ============

    /// Extracts the text of the accepted document.
    ///
    /// On success the text replaces any earlier extraction, drops the stored
    /// artifacts, and opens a fresh chat session over it.
    pub async fn run_extraction(&self) -> Result<ExtractedText, ProcessError> {
        self.extract_current().await.map(|(_, text)| text)
    }

    /// Extraction body; also returns the generation the text belongs to.
    async fn extract_current(&self) -> Result<(u64, ExtractedText), ProcessError> {
        let (generation, document) = {
            let mut state = self.state();
            if state.in_flight {
                return Err(ProcessError::Busy);
            }
            let document = match state.source.clone() {
                Some(document) => document,
                None => {
                    drop(state);
                    self.emit(vec![PipelineEvent::error("Please upload a PDF file first.")]);
                    return Err(ProcessError::NoDocument);
                }
            };
            state.in_flight = true;
            state.stage = ProcessingStage::Extracting;
            (state.generation, document)
        };
        let mut guard = StepGuard::new(self, generation);
        self.emit(vec![PipelineEvent::Stage(ProcessingStage::Extracting)]);

        let extractor = self.extractor.clone();
        let result = tokio::task::spawn_blocking(move || extractor.extract(&document))
            .await
            .unwrap_or_else(|e| {
                Err(ExtractionError::Parse(format!("extraction task failed: {}", e)))
            });
        guard.disarm();

        let (outcome, events) = {
            let mut state = self.state();
            if state.generation != generation {
                tracing::debug!(generation, "discarding stale extraction result");
                return Err(ProcessError::Superseded);
            }
            state.in_flight = false;
            match result {
                Ok(text) => {
                    tracing::info!(pages = text.page_count(), chars = text.char_count(), "text extracted");
                    state.summary = None;
                    state.translation = None;
                    state.session = Some(ConversationSession::new(&text, self.context_chars));
                    state.stage = ProcessingStage::Completed;
                    let notice = format!("Extracted text from {} page(s).", text.page_count());
                    state.text = Some(text.clone());
                    (
                        Ok((generation, text)),
                        vec![
                            PipelineEvent::Stage(ProcessingStage::Completed),
                            PipelineEvent::success(notice),
                        ],
                    )
                }
                Err(e) => {
                    tracing::warn!(error = %e, "text extraction failed");
                    state.stage = ProcessingStage::Failed;
                    (
                        Err(ProcessError::Extraction(e)),
                        vec![
                            PipelineEvent::Stage(ProcessingStage::Failed),
                            PipelineEvent::error("Failed to extract text from the PDF."),
                        ],
                    )
                }
            }
        };
        self.emit(events);
        outcome
    }

    // ============ Operations ============

    /// Runs a summary or translation over the extracted text.
    ///
    /// The operation's fixed prompt is the system message and the first
    /// `context_chars` characters of the text are the only user message.
    pub async fn run_operation(&self, kind: ArtifactKind) -> Result<Artifact, ProcessError> {
        self.run_operation_at(kind, None).await
    }

    /// Extracts the text if needed, then runs `kind`.
    ///
    /// If the document is replaced between the two steps the result is
    /// [`ProcessError::Superseded`].
    pub async fn process(&self, kind: ArtifactKind) -> Result<Artifact, ProcessError> {
        let cached = {
            let state = self.state();
            state.text.as_ref().map(|_| state.generation)
        };
        let generation = match cached {
            Some(generation) => generation,
            None => self.extract_current().await?.0,
        };
        self.run_operation_at(kind, Some(generation)).await
    }

    async fn run_operation_at(
        &self,
        kind: ArtifactKind,
        expected_generation: Option<u64>,
    ) -> Result<Artifact, ProcessError> {
        let stage = ProcessingStage::running(kind);
        let (generation, excerpt) = {
            let mut state = self.state();
            if expected_generation.is_some_and(|g| g != state.generation) {
                return Err(ProcessError::Superseded);
            }
            if state.in_flight {
                return Err(ProcessError::Busy);
            }
            let excerpt = match state.text.as_ref() {
                Some(text) => truncate_chars(text.as_str(), self.context_chars).to_string(),
                None => {
                    drop(state);
                    self.emit(vec![PipelineEvent::error("Please upload a PDF file first.")]);
                    return Err(ProcessError::NoDocument);
                }
            };
            state.in_flight = true;
            state.stage = stage;
            (state.generation, excerpt)
        };
        let mut guard = StepGuard::new(self, generation);
        self.emit(vec![PipelineEvent::Stage(stage)]);

        let system_prompt = operation_prompt(kind, &self.prompts);
        let result = self.client.complete(&system_prompt, &[], &excerpt).await;
        guard.disarm();

        let (outcome, events) = {
            let mut state = self.state();
            if state.generation != generation {
                tracing::debug!(generation, kind = kind.as_str(), "discarding stale operation result");
                return Err(ProcessError::Superseded);
            }
            state.in_flight = false;
            match result {
                Ok(content) => {
                    tracing::info!(kind = kind.as_str(), chars = content.chars().count(), "operation completed");
                    let artifact = Artifact { kind, content };
                    *state.artifact_slot(kind) = Some(artifact.clone());
                    state.stage = ProcessingStage::Completed;
                    (
                        Ok(artifact),
                        vec![
                            PipelineEvent::Stage(ProcessingStage::Completed),
                            PipelineEvent::success(format!("{} completed successfully!", kind.noun())),
                        ],
                    )
                }
                Err(e) => {
                    tracing::warn!(kind = kind.as_str(), error = %e, "operation failed");
                    state.stage = ProcessingStage::Failed;
                    (
                        Err(ProcessError::Completion(e)),
                        vec![
                            PipelineEvent::Stage(ProcessingStage::Failed),
                            PipelineEvent::error(format!(
                                "Failed to {} the document. Please try again.",
                                kind.verb()
                            )),
                        ],
                    )
                }
            }
        };
        self.emit(events);
        outcome
    }

    // ============ Chat ============

    /// Asks a question about the current document.
    ///
    /// See [`ConversationSession`] for transcript semantics. The reply is
    /// discarded if the document is replaced while it is being generated.
    pub async fn ask(&self, message: &str) -> Result<ConversationTurn, ChatError> {
        if message.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let (generation, pending) = {
            let mut state = self.state();
            let generation = state.generation;
            if state.session.is_none() {
                drop(state);
                self.emit(vec![PipelineEvent::error(
                    "Please upload a document first to chat about it.",
                )]);
                return Err(ChatError::NoDocument);
            }
            match state.session.as_mut() {
                Some(session) => (generation, session.begin(message)?),
                None => return Err(ChatError::NoDocument),
            }
        };

        let mut guard = ChatGuard {
            processor: self,
            generation,
            armed: true,
        };
        let reply = pending.send(self.client.as_ref()).await;
        guard.armed = false;

        let outcome = {
            let mut state = self.state();
            if state.generation != generation {
                tracing::debug!(generation, "discarding stale chat reply");
                return Err(ChatError::Superseded);
            }
            match state.session.as_mut() {
                Some(session) => session.resolve(pending, reply),
                None => return Err(ChatError::Superseded),
            }
        };
        if outcome.is_err() {
            self.emit(vec![PipelineEvent::error(
                "Failed to get a response. Please try again.",
            )]);
        }
        outcome
    }

    // ============ Readers ============

    pub fn stage(&self) -> ProcessingStage {
        self.state().stage
    }

    pub fn extracted_text(&self) -> Option<ExtractedText> {
        self.state().text.clone()
    }

    pub fn artifact(&self, kind: ArtifactKind) -> Option<Artifact> {
        self.state().artifact_slot(kind).clone()
    }

    pub fn transcript(&self) -> Vec<ConversationTurn> {
        self.state()
            .session
            .as_ref()
            .map(|s| s.transcript().to_vec())
            .unwrap_or_default()
    }

    pub fn has_document(&self) -> bool {
        self.state().source.is_some()
    }

    pub fn prompts(&self) -> &PromptsConfig {
        &self.prompts
    }

    pub fn snapshot(&self) -> DocumentSnapshot {
        let state = self.state();
        let source = state.source.as_ref();
        DocumentSnapshot {
            name: source.and_then(|s| s.name.clone()),
            mime_type: source.map(|s| s.mime_type.clone()),
            size_bytes: source.map(|s| s.size_bytes),
            stage: state.stage,
            stage_display: display(state.stage, &self.prompts.language),
            has_text: state.text.is_some(),
            page_count: state.text.as_ref().map(|t| t.page_count()),
            summary: state.summary.as_ref().map(|a| a.content.clone()),
            translation: state.translation.as_ref().map(|a| a.content.clone()),
            transcript: state
                .session
                .as_ref()
                .map(|s| s.transcript().to_vec())
                .unwrap_or_default(),
            chat_pending: state.session.as_ref().is_some_and(|s| s.is_pending()),
        }
    }
}
