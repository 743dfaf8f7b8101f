//! Text-generation client (OpenAI-compatible chat completions API).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_LLM_MODEL: &str = "gpt-4-turbo-preview";

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("LLM API key is not configured")]
    NotConfigured,
    #[error("LLM request failed: {0}")]
    RequestFailed(String),
    #[error("LLM returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Invalid LLM response: {0}")]
    InvalidResponse(String),
}

/// One chat completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmRequest {
    pub system_prompt: Option<String>,
    pub user_message: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Ask the provider for a JSON object response.
    pub json_response: bool,
}

impl LlmRequest {
    pub fn new(user_message: impl Into<String>) -> Self {
        Self {
            system_prompt: None,
            user_message: user_message.into(),
            temperature: 0.7,
            max_tokens: 500,
            json_response: false,
        }
    }

    pub fn with_system(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn json(mut self) -> Self {
        self.json_response = true;
        self
    }
}

/// Anything that can turn a prompt into text.
#[async_trait]
pub trait LlmPort: Send + Sync {
    async fn complete(&self, request: LlmRequest) -> Result<String, LlmError>;
}

#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiClient {
    pub fn new(base_url: &str, model: &str, api_key: Option<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl LlmPort for OpenAiClient {
    async fn complete(&self, request: LlmRequest) -> Result<String, LlmError> {
        let api_key = self.api_key.as_deref().ok_or(LlmError::NotConfigured)?;
        let body = build_chat_request(&self.model, &request);

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .map_err(|e| LlmError::RequestFailed(e.to_string()))?;
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let api_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        first_choice_content(api_response)
    }
}

fn build_chat_request(model: &str, request: &LlmRequest) -> ChatRequest {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = &request.system_prompt {
        messages.push(ChatMessage {
            role: "system".to_string(),
            content: Some(system.clone()),
        });
    }
    messages.push(ChatMessage {
        role: "user".to_string(),
        content: Some(request.user_message.clone()),
    });

    ChatRequest {
        model: model.to_string(),
        messages,
        temperature: request.temperature,
        max_tokens: request.max_tokens,
        response_format: request.json_response.then(|| ResponseFormat {
            r#type: "json_object".to_string(),
        }),
    }
}

fn first_choice_content(response: ChatResponse) -> Result<String, LlmError> {
    let content = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::InvalidResponse("No choices in LLM response".to_string()))?
        .message
        .content
        .unwrap_or_default();

    if content.trim().is_empty() {
        return Err(LlmError::InvalidResponse("Empty completion".to_string()));
    }
    Ok(content)
}

// ── Wire types ───────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let req = LlmRequest::new("Generate a counter move.")
            .with_system("You are opposing counsel.")
            .max_tokens(150)
            .json();
        let body = serde_json::to_value(build_chat_request("test-model", &req)).unwrap();

        assert_eq!(body["model"], "test-model");
        assert_eq!(body["max_tokens"], 150);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "Generate a counter move.");
        assert_eq!(body["response_format"]["type"], "json_object");
    }

    #[test]
    fn test_plain_request_omits_response_format() {
        let body = serde_json::to_value(build_chat_request("m", &LlmRequest::new("hi"))).unwrap();
        assert!(body.get("response_format").is_none());
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_first_choice_content() {
        let resp: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"Objection!"}}]}"#,
        )
        .unwrap();
        assert_eq!(first_choice_content(resp).unwrap(), "Objection!");
    }

    #[test]
    fn test_empty_completion_is_invalid() {
        let resp: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"role":"assistant","content":"  "}}]}"#)
                .unwrap();
        assert!(matches!(
            first_choice_content(resp),
            Err(LlmError::InvalidResponse(_))
        ));

        let resp: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(first_choice_content(resp).is_err());
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let client = OpenAiClient::new(DEFAULT_LLM_BASE_URL, DEFAULT_LLM_MODEL, None, Duration::from_secs(1));
        let err = client.complete(LlmRequest::new("hi")).await.unwrap_err();
        assert!(matches!(err, LlmError::NotConfigured));
    }
}
