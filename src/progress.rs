//! Stage and notice reporting.
//!
//! Reports the observable pipeline surface: every stage transition of the
//! active document and every user-facing notice (success and failure
//! messages). Output goes to **stderr** so stdout stays parseable for scripts
//! (`pdfp extract doc.pdf > doc.txt`).

use std::io::Write;
use std::sync::Mutex;

use serde::Serialize;

use crate::stage::{display, ProcessingStage};

/// Severity of a user notice.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Error,
}

/// A single observable pipeline event.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PipelineEvent {
    /// The active document moved to a new stage.
    Stage(ProcessingStage),
    /// A message meant for the user.
    Notice { level: NoticeLevel, message: String },
}

impl PipelineEvent {
    pub fn success(message: impl Into<String>) -> Self {
        PipelineEvent::Notice {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        PipelineEvent::Notice {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

/// Receives pipeline events. Called by the processor while it holds no lock.
pub trait PipelineReporter: Send + Sync {
    fn report(&self, event: PipelineEvent);
}

/// Human-friendly lines on stderr: "[extracting] Extracting Text: Extracting text from your PDF file...".
pub struct StderrProgress {
    language: String,
}

impl StderrProgress {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
        }
    }
}

impl PipelineReporter for StderrProgress {
    fn report(&self, event: PipelineEvent) {
        let line = match &event {
            PipelineEvent::Stage(stage) => match display(*stage, &self.language) {
                Some(d) => format!("[{}] {}: {}\n", stage, d.label, d.message),
                None => format!("[{}]\n", stage),
            },
            PipelineEvent::Notice { level, message } => match level {
                NoticeLevel::Success => format!("ok: {}\n", message),
                NoticeLevel::Error => format!("error: {}\n", message),
            },
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl PipelineReporter for JsonProgress {
    fn report(&self, event: PipelineEvent) {
        let obj = match &event {
            PipelineEvent::Stage(stage) => serde_json::json!({
                "event": "stage",
                "stage": stage,
            }),
            PipelineEvent::Notice { level, message } => serde_json::json!({
                "event": "notice",
                "level": level,
                "message": message,
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// Forwards events to `tracing`; used by the HTTP server, where notices
/// also travel back in responses.
pub struct TracingProgress;

impl PipelineReporter for TracingProgress {
    fn report(&self, event: PipelineEvent) {
        match event {
            PipelineEvent::Stage(stage) => tracing::info!(%stage, "stage changed"),
            PipelineEvent::Notice {
                level: NoticeLevel::Success,
                message,
            } => tracing::info!(%message, "notice"),
            PipelineEvent::Notice {
                level: NoticeLevel::Error,
                message,
            } => tracing::warn!(%message, "notice"),
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl PipelineReporter for NoProgress {
    fn report(&self, _event: PipelineEvent) {}
}

/// Keeps every event in memory, in order.
#[derive(Default)]
pub struct MemoryProgress {
    events: Mutex<Vec<PipelineEvent>>,
}

impl MemoryProgress {
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Only the stage transitions, in order.
    pub fn stages(&self) -> Vec<ProcessingStage> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                PipelineEvent::Stage(stage) => Some(stage),
                PipelineEvent::Notice { .. } => None,
            })
            .collect()
    }
}

impl PipelineReporter for MemoryProgress {
    fn report(&self, event: PipelineEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Parses `auto`, `off`, `human`, or `json`.
    pub fn parse(s: &str) -> Result<Self, String> {
        match s {
            "auto" => Ok(Self::default_for_tty()),
            "off" => Ok(ProgressMode::Off),
            "human" => Ok(ProgressMode::Human),
            "json" => Ok(ProgressMode::Json),
            other => Err(format!(
                "invalid progress mode '{}': expected auto, off, human, or json",
                other
            )),
        }
    }

    /// Build a reporter for this mode.
    pub fn reporter(&self, language: &str) -> Box<dyn PipelineReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress::new(language)),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
