//! Fixed prompts and canned texts for the three document operations.

use crate::completion::truncate_chars;
use crate::config::PromptsConfig;
use crate::models::ArtifactKind;

/// Assistant turn appended when a chat completion fails.
pub const CHAT_FALLBACK: &str =
    "I'm sorry, I encountered an error processing your request. Please try again.";

/// Greeting shown when a chat opens. Display only; never part of a transcript.
pub const CHAT_GREETING: &str =
    "Hello! I can answer questions about the document you've uploaded. What would you like to know?";

/// System prompt for a summary or translation run.
pub fn operation_prompt(kind: ArtifactKind, prompts: &PromptsConfig) -> String {
    let language = &prompts.language;
    match kind {
        ArtifactKind::Summary => format!(
            "You are a professional summarizer. Your task is to extract the key points from the \
             provided text and present them as bullet points in {language}. Kindly summarize this \
             document and give me summary in bullet points and make summary in detail also. Focus \
             on capturing the essential information in a concise format. Each bullet point should \
             be on a new line starting with a \"•\" symbol."
        ),
        ArtifactKind::Translation => format!(
            "You are a professional translator. Your task is to translate the provided text into \
             {language}. Maintain the original meaning, tone, and structure of the text. Ensure \
             the translation is natural and fluent in {language}."
        ),
    }
}

/// System prompt for document chat, embedding the first `context_chars`
/// characters of the document.
pub fn chat_prompt(document_text: &str, context_chars: usize) -> String {
    format!(
        "You are a helpful assistant that helps users understand their document. Here is the \
         document text:\n\n{}\n\nAnswer questions based on this document. Be concise and accurate.",
        truncate_chars(document_text, context_chars)
    )
}

/// Heading shown above a stored artifact.
pub fn artifact_title(kind: ArtifactKind, prompts: &PromptsConfig) -> String {
    format!("{} in {}", kind.noun(), prompts.language)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_prompts_name_the_language() {
        let prompts = PromptsConfig {
            language: "French".to_string(),
        };
        let summary = operation_prompt(ArtifactKind::Summary, &prompts);
        assert!(summary.contains("bullet points in French"));
        assert!(summary.contains('•'));
        let translation = operation_prompt(ArtifactKind::Translation, &prompts);
        assert!(translation.contains("into French"));
        assert!(translation.contains("meaning, tone, and structure"));
    }

    #[test]
    fn chat_prompt_embeds_exact_prefix() {
        let text = "abcdefghij".repeat(10);
        let prompt = chat_prompt(&text, 15);
        assert!(prompt.contains("document text:\n\nabcdefghijabcde\n\nAnswer questions"));
    }

    #[test]
    fn artifact_titles() {
        let prompts = PromptsConfig::default();
        assert_eq!(
            artifact_title(ArtifactKind::Summary, &prompts),
            "Summary in Roman Urdu"
        );
        assert_eq!(
            artifact_title(ArtifactKind::Translation, &prompts),
            "Translation in Roman Urdu"
        );
    }
}
