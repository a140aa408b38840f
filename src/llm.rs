//! Client for an OpenAI-compatible chat completions API.

use log::{debug, error};
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::error::{AppError, Result};
use crate::twitter::sanitize_for_logging;

// Replies must fit in a tweet; 100 tokens is comfortably above 280 characters.
const MAX_TOKENS: u32 = 100;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct LlmClient {
    client: reqwest::Client,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Sends the system prompt plus `user_message` and returns the reply text.
    ///
    /// # Errors
    ///
    /// [`AppError::Llm`] on transport failures, non-2xx statuses, unparsable
    /// bodies, and completions without text.
    pub async fn complete(&self, user_message: &str) -> Result<String> {
        debug!(
            "Sending completion request to {} (model {})",
            self.config.api_url, self.config.model
        );

        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &self.config.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_message,
                },
            ],
            max_tokens: MAX_TOKENS,
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Llm {
                status: None,
                message: format!("request error: {}", e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("Failed to read error response: {}", e));
            error!("LLM request failed - Status: {}", status);
            return Err(AppError::Llm {
                status: Some(status.as_u16()),
                message: sanitize_for_logging(&body, 200),
            });
        }

        let body: ChatResponse = response.json().await.map_err(|e| AppError::Llm {
            status: None,
            message: format!("invalid response body: {}", e),
        })?;

        extract_text(body)
    }
}

fn extract_text(body: ChatResponse) -> Result<String> {
    let text = body
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .unwrap_or_default();

    if text.is_empty() {
        return Err(AppError::Llm {
            status: None,
            message: "completion contained no text".to_string(),
        });
    }
    debug!("Received {} characters from LLM", text.chars().count());
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: &str) -> Result<String> {
        extract_text(serde_json::from_str(body).unwrap())
    }

    #[test]
    fn test_extract_text_takes_first_choice() {
        let body = r#"{"choices": [
            {"index": 0, "message": {"role": "assistant", "content": "  Hello there!  "}},
            {"index": 1, "message": {"role": "assistant", "content": "ignored"}}
        ]}"#;
        assert_eq!(parse(body).unwrap(), "Hello there!");
    }

    #[test]
    fn test_extract_text_rejects_empty_completions() {
        assert!(matches!(parse(r#"{"choices": []}"#), Err(AppError::Llm { .. })));
        assert!(matches!(
            parse(r#"{"choices": [{"message": {"role": "assistant", "content": null}}]}"#),
            Err(AppError::Llm { .. })
        ));
        assert!(matches!(
            parse(r#"{"choices": [{"message": {"content": "   "}}]}"#),
            Err(AppError::Llm { .. })
        ));
    }

    #[test]
    fn test_request_serialization() {
        let request = ChatRequest {
            model: "gpt-4o-mini",
            messages: vec![ChatMessage {
                role: "user",
                content: "hi",
            }],
            max_tokens: MAX_TOKENS,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["model"], "gpt-4o-mini");
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["max_tokens"], 100);
    }
}
