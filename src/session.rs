//! Multi-turn question answering over one document.
//!
//! A [`ConversationSession`] owns the transcript for exactly one
//! [`ExtractedText`]. Each question goes through two synchronous steps around
//! the backend call:
//!
//! 1. [`begin`](ConversationSession::begin) validates the question, appends
//!    the user turn immediately, and snapshots the request to send.
//! 2. [`resolve`](ConversationSession::resolve) appends the assistant reply,
//!    or the fixed fallback turn when the call failed.
//!
//! Between the two, the caller may suspend on the network without holding
//! the session. After every resolved question the transcript holds as many
//! assistant turns as user turns.

use std::sync::Arc;

use thiserror::Error;

use crate::completion::{CompletionClient, CompletionError};
use crate::models::{ConversationTurn, ExtractedText, Role};
use crate::prompts::{chat_prompt, CHAT_FALLBACK};

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("message must not be empty")]
    EmptyMessage,
    #[error("no document text is available; upload and extract a document first")]
    NoDocument,
    #[error("a reply is already being generated for this conversation")]
    Busy,
    #[error("the document was replaced before the reply arrived")]
    Superseded,
    #[error(transparent)]
    Completion(#[from] CompletionError),
}

/// A question that has been recorded and is waiting for its reply.
#[derive(Debug)]
pub struct PendingTurn {
    system_prompt: Arc<str>,
    history: Vec<ConversationTurn>,
    message: String,
}

impl PendingTurn {
    /// Performs the backend call for this question.
    pub async fn send(&self, client: &dyn CompletionClient) -> Result<String, CompletionError> {
        client
            .complete(&self.system_prompt, &self.history, &self.message)
            .await
    }
}

#[derive(Debug, Clone)]
pub struct ConversationSession {
    system_prompt: Arc<str>,
    transcript: Vec<ConversationTurn>,
    pending: bool,
}

impl ConversationSession {
    /// Opens an empty session whose system prompt embeds the first
    /// `context_chars` characters of `document`.
    pub fn new(document: &ExtractedText, context_chars: usize) -> Self {
        let system_prompt: Arc<str> = chat_prompt(document.as_str(), context_chars).into();
        Self {
            system_prompt,
            transcript: Vec::new(),
            pending: false,
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn transcript(&self) -> &[ConversationTurn] {
        &self.transcript
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Records `message` as a user turn and returns the request to send.
    ///
    /// Blank messages are rejected without touching the transcript.
    pub fn begin(&mut self, message: &str) -> Result<PendingTurn, ChatError> {
        if message.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if self.pending {
            return Err(ChatError::Busy);
        }

        let pending = PendingTurn {
            system_prompt: self.system_prompt.clone(),
            history: self.transcript.clone(),
            message: message.to_string(),
        };
        self.transcript.push(ConversationTurn::user(message));
        self.pending = true;
        Ok(pending)
    }

    /// Appends the assistant turn answering `pending`.
    ///
    /// On failure the fallback turn is appended and the error is returned.
    pub fn resolve(
        &mut self,
        pending: PendingTurn,
        reply: Result<String, CompletionError>,
    ) -> Result<ConversationTurn, ChatError> {
        debug_assert_eq!(
            self.transcript.last().map(|t| (t.role, t.content.as_str())),
            Some((Role::User, pending.message.as_str()))
        );
        self.pending = false;
        match reply {
            Ok(content) => {
                let turn = ConversationTurn::assistant(content);
                self.transcript.push(turn.clone());
                Ok(turn)
            }
            Err(e) => {
                tracing::warn!(error = %e, "chat completion failed");
                self.transcript.push(ConversationTurn::assistant(CHAT_FALLBACK));
                Err(ChatError::Completion(e))
            }
        }
    }

    /// Closes a question whose reply will never be resolved, appending the
    /// fallback turn. No-op when nothing is pending.
    pub fn abandon(&mut self) {
        if self.pending {
            self.pending = false;
            self.transcript.push(ConversationTurn::assistant(CHAT_FALLBACK));
        }
    }

    /// Asks one question and waits for the reply.
    ///
    /// Dropping the returned future midway leaves the session pending until
    /// [`abandon`](Self::abandon) is called.
    pub async fn ask(
        &mut self,
        client: &dyn CompletionClient,
        message: &str,
    ) -> Result<ConversationTurn, ChatError> {
        let pending = self.begin(message)?;
        let reply = pending.send(client).await;
        self.resolve(pending, reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replies from a script and records every request it receives.
    struct ScriptedClient {
        replies: Mutex<Vec<Result<String, CompletionError>>>,
        calls: Mutex<Vec<(String, Vec<ConversationTurn>, String)>>,
    }

    impl ScriptedClient {
        fn new(mut replies: Vec<Result<String, CompletionError>>) -> Self {
            replies.reverse();
            Self {
                replies: Mutex::new(replies),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<(String, Vec<ConversationTurn>, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        async fn complete(
            &self,
            system_prompt: &str,
            turns: &[ConversationTurn],
            user_message: &str,
        ) -> Result<String, CompletionError> {
            self.calls.lock().unwrap().push((
                system_prompt.to_string(),
                turns.to_vec(),
                user_message.to_string(),
            ));
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(CompletionError::Transport("script exhausted".into())))
        }
    }

    fn session() -> ConversationSession {
        let text = ExtractedText::new("Rust was first released in 2015.\n\n".to_string(), 1).unwrap();
        ConversationSession::new(&text, 8000)
    }

    fn balanced(session: &ConversationSession) -> bool {
        let users = session
            .transcript()
            .iter()
            .filter(|t| t.role == Role::User)
            .count();
        let assistants = session.transcript().len() - users;
        users == assistants
    }

    #[tokio::test]
    async fn successful_turns_carry_history() {
        let client = ScriptedClient::new(vec![Ok("2015.".into()), Ok("Mozilla.".into())]);
        let mut session = session();

        let first = session.ask(&client, "When was Rust released?").await.unwrap();
        assert_eq!(first, ConversationTurn::assistant("2015."));
        session.ask(&client, "Who sponsored it?").await.unwrap();

        let calls = client.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].1.is_empty());
        assert_eq!(calls[0].2, "When was Rust released?");
        assert_eq!(
            calls[1].1,
            vec![
                ConversationTurn::user("When was Rust released?"),
                ConversationTurn::assistant("2015."),
            ]
        );
        assert_eq!(calls[1].2, "Who sponsored it?");
        assert!(calls[0].0.contains("Rust was first released in 2015."));
        assert_eq!(session.transcript().len(), 4);
        assert!(balanced(&session));
    }

    #[tokio::test]
    async fn failure_appends_fallback_and_surfaces_error() {
        let client = ScriptedClient::new(vec![Err(CompletionError::HttpStatus {
            status: 500,
            body: "boom".into(),
        })]);
        let mut session = session();

        let err = session.ask(&client, "Anything?").await.unwrap_err();
        assert!(matches!(
            err,
            ChatError::Completion(CompletionError::HttpStatus { status: 500, .. })
        ));
        assert_eq!(
            session.transcript(),
            &[
                ConversationTurn::user("Anything?"),
                ConversationTurn::assistant(CHAT_FALLBACK),
            ]
        );
        assert!(!session.is_pending());
    }

    #[tokio::test]
    async fn blank_message_is_rejected_without_a_call() {
        let client = ScriptedClient::new(vec![]);
        let mut session = session();

        for blank in ["", "   ", "\n\t"] {
            let err = session.ask(&client, blank).await.unwrap_err();
            assert!(matches!(err, ChatError::EmptyMessage));
        }
        assert!(client.calls().is_empty());
        assert!(session.transcript().is_empty());
    }

    #[tokio::test]
    async fn mixed_outcomes_keep_turns_balanced() {
        let client = ScriptedClient::new(vec![
            Ok("a".into()),
            Err(CompletionError::Transport("reset".into())),
            Err(CompletionError::MalformedResponse("no choices".into())),
            Ok("d".into()),
        ]);
        let mut session = session();
        for q in ["q1", "q2", "", "q3", "q4"] {
            let _ = session.ask(&client, q).await;
            assert!(balanced(&session));
        }
        assert_eq!(session.transcript().len(), 8);
        // The failed turn stays in history and is sent with later questions.
        let calls = client.calls();
        assert_eq!(calls[3].1[3], ConversationTurn::assistant(CHAT_FALLBACK));
    }

    #[test]
    fn second_begin_while_pending_is_busy() {
        let mut session = session();
        let pending = session.begin("first").unwrap();
        assert!(matches!(session.begin("second"), Err(ChatError::Busy)));
        assert_eq!(session.transcript().len(), 1);
        session.resolve(pending, Ok("reply".into())).unwrap();
        assert!(session.begin("second").is_ok());
    }

    #[test]
    fn abandoned_question_gets_the_fallback_turn() {
        let mut session = session();
        let _pending = session.begin("lost?").unwrap();
        session.abandon();
        assert!(!session.is_pending());
        assert!(balanced(&session));
        assert_eq!(session.transcript()[1], ConversationTurn::assistant(CHAT_FALLBACK));

        session.abandon();
        assert_eq!(session.transcript().len(), 2);
        assert!(session.begin("next").is_ok());
    }

    #[test]
    fn system_prompt_uses_truncated_excerpt() {
        let text = ExtractedText::new("0123456789".repeat(3), 1).unwrap();
        let session = ConversationSession::new(&text, 12);
        assert!(session.system_prompt().contains("\n\n012345678901\n\n"));
    }
}
