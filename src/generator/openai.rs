//! OpenAI-backed reply generator (chat completions API).

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::debug;

use crate::config::OpenAiConfig;
use crate::error::GenerationError;

use super::{GenerateRequest, GeneratedReply, ReplyGenerator, prompts};

const COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Warm-but-consistent replies.
const TEMPERATURE: f32 = 0.7;

/// Replies are 3-5 lines; this is plenty.
const MAX_TOKENS: u32 = 500;

/// Reply generator backed by the OpenAI chat-completions API.
pub struct OpenAiGenerator {
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiGenerator {
    pub fn new(config: OpenAiConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl ReplyGenerator for OpenAiGenerator {
    async fn generate(&self, request: &GenerateRequest) -> Result<GeneratedReply, GenerationError> {
        let payload = serde_json::json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": prompts::build_system_prompt() },
                { "role": "user", "content": prompts::build_user_prompt(request) },
            ],
            "temperature": TEMPERATURE,
            "max_tokens": MAX_TOKENS,
        });

        let resp = self
            .client
            .post(COMPLETIONS_URL)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&payload)
            .send()
            .await
            .map_err(|e| GenerationError::RequestFailed {
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GenerationError::RequestFailed {
                reason: format!("status {status}: {body}"),
            });
        }

        let completion: CompletionResponse = resp.json().await.map_err(|e| {
            GenerationError::InvalidResponse {
                model: self.config.model.clone(),
                reason: e.to_string(),
            }
        })?;

        let reply = completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| GenerationError::InvalidResponse {
                model: self.config.model.clone(),
                reason: "completion contained no choices".into(),
            })?;

        debug!(model = %self.config.model, chars = reply.len(), "Generated reply");
        Ok(GeneratedReply {
            reply,
            model: self.config.model.clone(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_response_parses() {
        let raw = serde_json::json!({
            "choices": [
                { "message": { "role": "assistant", "content": "  Warm reply here.  " } }
            ]
        });
        let parsed: CompletionResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(parsed.choices.len(), 1);
        assert_eq!(parsed.choices[0].message.content.trim(), "Warm reply here.");
    }

    #[test]
    fn empty_choices_default() {
        let parsed: CompletionResponse = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(parsed.choices.is_empty());
    }
}
