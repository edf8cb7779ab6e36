// src/ai.rs
//
// Proxy for the assistant chat: forwards a prompt (plus optional horse
// context assembled by the route) to the external LLM API and returns
// its text verbatim. The model never sees credentials or other riders'
// data; the route controls exactly what goes into the context block.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ApiError;

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("assistant API returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("assistant returned no choices")]
    Empty,
}

impl From<AssistantError> for ApiError {
    fn from(e: AssistantError) -> Self {
        ApiError::Upstream("CONNECTION_ERROR", e.to_string())
    }
}

const SYSTEM_PROMPT: &str = "You are the EquiBook assistant. You help horse owners and \
equestrian professionals with care questions, scheduling advice, and using the platform. \
Answer briefly and in the user's language. You are not a veterinarian; for health concerns \
always recommend booking a vet visit.";

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

pub struct AssistantClient {
    http: reqwest::Client,
    base: String,
    api_key: String,
    model: String,
}

impl AssistantClient {
    pub fn new(base: &str, api_key: &str, model: &str) -> Result<Self, AssistantError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            http,
            base: base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    pub async fn chat(&self, prompt: &str, context: Option<&str>) -> Result<String, AssistantError> {
        let system = match context {
            Some(ctx) => format!("{SYSTEM_PROMPT}\n\nContext about the user's horses:\n{ctx}"),
            None => SYSTEM_PROMPT.to_string(),
        };

        let req = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        };

        let resp = self
            .http
            .post(format!("{}/v1/chat/completions", self.base))
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AssistantError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = resp.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(AssistantError::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_response_parsing() {
        let body = r#"{
            "choices": [
                { "message": { "role": "assistant", "content": "Feed little and often." } }
            ]
        }"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.choices[0].message.content, "Feed little and often.");
    }

    #[test]
    fn test_empty_choices_is_an_error() {
        let parsed: ChatResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(parsed.choices.is_empty());
    }
}
