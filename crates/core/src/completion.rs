use crate::error::CompletionError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

pub const DEFAULT_COMPLETION_MODEL: &str = "gpt-4o-mini";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[async_trait]
pub trait ChatModel {
    /// Sends one system + user exchange and returns the trimmed reply.
    async fn complete(
        &self,
        system: &str,
        user: &str,
        max_tokens: u32,
    ) -> Result<String, CompletionError>;
}

#[derive(Clone)]
pub struct OpenAiChatModel {
    endpoint: String,
    api_key: String,
    model: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl OpenAiChatModel {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
            client: Client::new(),
        }
    }
}

fn answer_from_response(payload: ChatResponse) -> Result<String, CompletionError> {
    let content = payload
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .unwrap_or_default();

    if content.is_empty() {
        return Err(CompletionError::MalformedResponse(
            "no message content in first choice".to_string(),
        ));
    }

    Ok(content)
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn complete(
        &self,
        system: &str,
        user: &str,
        max_tokens: u32,
    ) -> Result<String, CompletionError> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.endpoint))
            .bearer_auth(&self.api_key)
            .timeout(REQUEST_TIMEOUT)
            .json(&json!({
                "model": self.model,
                "messages": [
                    { "role": "system", "content": system },
                    { "role": "user", "content": user },
                ],
                "temperature": 0,
                "max_tokens": max_tokens,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(CompletionError::Api {
                status: status.as_u16(),
                details,
            });
        }

        let payload: ChatResponse = response
            .json()
            .await
            .map_err(|error| CompletionError::MalformedResponse(error.to_string()))?;

        answer_from_response(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_with(content: Option<&str>) -> ChatResponse {
        ChatResponse {
            choices: vec![ChatChoice {
                message: ChatMessage {
                    content: content.map(str::to_string),
                },
            }],
        }
    }

    #[test]
    fn answer_is_trimmed() {
        let answer = answer_from_response(response_with(Some("  Alice works at Acme.  \n")))
            .expect("valid response");
        assert_eq!(answer, "Alice works at Acme.");
    }

    #[test]
    fn missing_content_is_malformed() {
        let result = answer_from_response(response_with(None));
        assert!(matches!(result, Err(CompletionError::MalformedResponse(_))));
    }

    #[test]
    fn empty_choices_is_malformed() {
        let result = answer_from_response(ChatResponse { choices: Vec::new() });
        assert!(matches!(result, Err(CompletionError::MalformedResponse(_))));
    }
}
