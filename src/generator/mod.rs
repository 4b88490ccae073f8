//! Reply generation boundary — turns a borrower email into reply text.
//!
//! Generation has its own latency but is never gated by the send rate
//! limiter.

mod openai;
pub mod prompts;

pub use openai::OpenAiGenerator;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::GenerationError;

/// Input for one reply generation.
#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    pub email_body: String,
    pub subject: String,
    /// Borrower's name; falls back to context or a generic salutation.
    pub borrower_name: Option<String>,
    /// Free-form business context surfaced to the model (loan amount,
    /// due date, ...).
    pub context: HashMap<String, serde_json::Value>,
}

/// A generated reply plus the model that produced it.
#[derive(Debug, Clone)]
pub struct GeneratedReply {
    pub reply: String,
    pub model: String,
}

impl GeneratedReply {
    /// Minimal HTML rendering of the plain-text reply for providers that
    /// accept an HTML body alongside the text one.
    pub fn html_body(&self) -> String {
        format!("<p>{}</p>", self.reply.replace('\n', "<br>"))
    }
}

/// Drafts a reply for one borrower email.
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    async fn generate(&self, request: &GenerateRequest) -> Result<GeneratedReply, GenerationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_body_converts_newlines() {
        let reply = GeneratedReply {
            reply: "Hello\nWorld".into(),
            model: "gpt-4o".into(),
        };
        assert_eq!(reply.html_body(), "<p>Hello<br>World</p>");
    }
}
