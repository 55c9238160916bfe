//! LLM collaborator: free text in, free text out.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::FareError;

/// Anything that can turn a prompt into completion text.
#[async_trait]
pub trait Collaborator: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, FareError>;
}

/// Settings for an OpenAI-compatible chat-completions endpoint.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub api_base: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
}

/// HTTP client for OpenAI-compatible chat-completions APIs.
pub struct ChatClient {
    config: ChatConfig,
    client: reqwest::Client,
}

impl ChatClient {
    // No client-side timeout; the transport's own limits apply.
    pub fn new(config: ChatConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.api_base.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl Collaborator for ChatClient {
    async fn complete(&self, prompt: &str) -> Result<String, FareError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| FareError::Collaborator("no API key configured".to_string()))?;

        let payload = json!({
            "model": self.config.model,
            "messages": [
                {
                    "role": "user",
                    "content": prompt
                }
            ],
            "temperature": self.config.temperature,
        });

        debug!("Calling {} with a {} byte prompt", self.endpoint(), prompt.len());
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(FareError::Collaborator(format!(
                "API request failed: {} - {}",
                status, error_text
            )));
        }

        let body: Value = response.json().await?;
        completion_text(&body)
    }
}

/// `choices[0].message.content` of a chat-completions response.
pub fn completion_text(body: &Value) -> Result<String, FareError> {
    body["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| FareError::Collaborator("no content in response".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_first_choice_content() {
        let body = json!({
            "choices": [
                {"message": {"role": "assistant", "content": "{\"ok\":1}"}, "finish_reason": "stop"}
            ]
        });
        assert_eq!(completion_text(&body).unwrap(), "{\"ok\":1}");
    }

    #[test]
    fn missing_content_is_a_collaborator_error() {
        for body in [json!({}), json!({"choices": []}), json!({"choices": [{"message": {}}]})] {
            assert!(matches!(
                completion_text(&body),
                Err(FareError::Collaborator(_))
            ));
        }
    }

    #[tokio::test]
    async fn missing_key_fails_without_network() {
        let client = ChatClient::new(ChatConfig {
            api_base: "http://127.0.0.1:9/v1/".into(),
            api_key: None,
            model: "test".into(),
            temperature: 0.2,
        });
        assert_eq!(client.endpoint(), "http://127.0.0.1:9/v1/chat/completions");
        let err = client.complete("hi").await.unwrap_err();
        assert!(matches!(err, FareError::Collaborator(_)));
    }
}
