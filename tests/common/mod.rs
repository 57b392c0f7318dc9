//! Shared fixtures for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::sync::Mutex;

use pdf_processor::completion::{CompletionClient, CompletionError};
use pdf_processor::models::ConversationTurn;

/// Builds a PDF with one page per entry of `pages`, each drawing its text
/// with a single `Tj`. An empty string yields a page with no text operators.
pub fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
    let pages: Vec<Vec<&str>> = pages
        .iter()
        .map(|text| if text.is_empty() { Vec::new() } else { vec![*text] })
        .collect();
    pdf_with_runs(&pages)
}

/// Builds a PDF whose pages each draw their runs as consecutive `Tj`
/// operators inside one `BT`/`ET` block, moving down a line between runs.
pub fn pdf_with_runs(pages: &[Vec<&str>]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::new();
    for runs in pages {
        let mut operations = Vec::new();
        if !runs.is_empty() {
            operations.push(Operation::new("BT", vec![]));
            operations.push(Operation::new("Tf", vec!["F1".into(), 24.into()]));
            operations.push(Operation::new("Td", vec![72.into(), 700.into()]));
            for (i, run) in runs.iter().enumerate() {
                if i > 0 {
                    operations.push(Operation::new("Td", vec![0.into(), (-30).into()]));
                }
                operations.push(Operation::new("Tj", vec![Object::string_literal(*run)]));
            }
            operations.push(Operation::new("ET", vec![]));
        }
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

/// A recorded call to [`RecordingClient`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub system_prompt: String,
    pub turns: Vec<ConversationTurn>,
    pub user_message: String,
}

/// Answers from a script (first entry first) and records every request.
/// Once the script is exhausted every call fails with a transport error.
pub struct RecordingClient {
    replies: Mutex<Vec<Result<String, CompletionError>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl RecordingClient {
    pub fn new(mut replies: Vec<Result<String, CompletionError>>) -> Self {
        replies.reverse();
        Self {
            replies: Mutex::new(replies),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(reply: &str) -> Self {
        Self::new(vec![Ok(reply.to_string())])
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionClient for RecordingClient {
    async fn complete(
        &self,
        system_prompt: &str,
        turns: &[ConversationTurn],
        user_message: &str,
    ) -> Result<String, CompletionError> {
        self.calls.lock().unwrap().push(RecordedCall {
            system_prompt: system_prompt.to_string(),
            turns: turns.to_vec(),
            user_message: user_message.to_string(),
        });
        self.replies
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| Err(CompletionError::Transport("no scripted reply".into())))
    }
}
