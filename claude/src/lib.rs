//! Minimal Anthropic Claude API client.
//!
//! Text-only, non-streaming access to the Messages API: a conversation goes in,
//! the concatenated text of the reply comes out.

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const API_BASE: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Errors that can occur when using the Claude client.
#[derive(Debug, Error)]
pub enum Error {
    #[error("API key not configured")]
    NoApiKey,

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Claude API client.
#[derive(Clone)]
pub struct Claude {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl Claude {
    /// Create a new Claude client with the given API key.
    pub fn new(api_key: impl Into<String>) -> Result<Self, Error> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::NoApiKey);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Config(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            model: DEFAULT_MODEL.to_string(),
            base_url: API_BASE.to_string(),
        })
    }

    /// Set the default model for this client.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Point the client at a different API root (proxies, gateways).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// The model every request is sent to.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send a completion request and return the full response.
    pub async fn complete(&self, request: Request) -> Result<Response, Error> {
        let api_request = self.build_api_request(&request);
        let headers = self.build_headers()?;

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .headers(headers)
            .json(&api_request)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status,
                message: body,
            });
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| Error::Parse(e.to_string()))?;

        Ok(api_response.into())
    }

    fn build_headers(&self) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.api_key)
                .map_err(|e| Error::Config(format!("Invalid API key: {e}")))?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));
        Ok(headers)
    }

    fn build_api_request<'a>(&'a self, request: &'a Request) -> ApiRequest<'a> {
        ApiRequest {
            model: &self.model,
            max_tokens: request.max_tokens,
            system: request.system.as_deref(),
            messages: request
                .messages
                .iter()
                .map(|m| ApiMessage {
                    role: m.role.as_str(),
                    content: &m.text,
                })
                .collect(),
            temperature: request.temperature,
        }
    }
}

// ============================================================================
// Public types
// ============================================================================

/// A completion request to send to Claude.
#[derive(Debug, Clone)]
pub struct Request {
    pub max_tokens: usize,
    pub system: Option<String>,
    pub messages: Vec<Message>,
    pub temperature: Option<f32>,
}

impl Request {
    /// Create a new request with the given messages.
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            max_tokens: 4096,
            system: None,
            messages,
            temperature: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// A text message in the conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub text: String,
}

impl Message {
    /// Create a user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    /// Create an assistant message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

/// The role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A completion response from Claude.
#[derive(Debug, Clone)]
pub struct Response {
    /// Concatenated text blocks of the reply.
    pub text: String,
}

// ============================================================================
// Internal API types
// ============================================================================

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<ApiMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ApiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Vec<ApiContent>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiContent {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

impl From<ApiResponse> for Response {
    fn from(api: ApiResponse) -> Self {
        let text = api
            .content
            .into_iter()
            .filter_map(|block| match block {
                ApiContent::Text { text } => Some(text),
                ApiContent::Other => None,
            })
            .collect::<Vec<_>>()
            .join("");

        Self { text }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = Claude::new("test-key").unwrap();
        assert_eq!(client.model(), DEFAULT_MODEL);
    }

    #[test]
    fn test_blank_key_rejected() {
        assert!(matches!(Claude::new("   "), Err(Error::NoApiKey)));
    }

    #[test]
    fn test_client_with_model_and_base_url() {
        let client = Claude::new("test-key")
            .unwrap()
            .with_model("claude-3-opus")
            .with_base_url("http://localhost:8080/v1/");
        assert_eq!(client.model(), "claude-3-opus");
        assert_eq!(client.base_url, "http://localhost:8080/v1");
    }

    #[test]
    fn test_api_request_shape() {
        let client = Claude::new("test-key").unwrap();
        let request = Request::new(vec![Message::user("Hello"), Message::assistant("Hi")])
            .with_system("Be brief")
            .with_max_tokens(256);

        let json = serde_json::to_value(client.build_api_request(&request)).unwrap();
        assert_eq!(json["model"], DEFAULT_MODEL);
        assert_eq!(json["max_tokens"], 256);
        assert_eq!(json["system"], "Be brief");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][1]["content"], "Hi");
        assert!(json.get("temperature").is_none());
    }

    #[test]
    fn test_response_text_skips_non_text_blocks() {
        let api: ApiResponse = serde_json::from_value(serde_json::json!({
            "id": "msg_1",
            "model": "claude",
            "content": [
                {"type": "thinking", "thinking": "hmm"},
                {"type": "text", "text": "Hello "},
                {"type": "text", "text": "there"}
            ],
            "stop_reason": "max_tokens",
            "usage": {"input_tokens": 3, "output_tokens": 2}
        }))
        .unwrap();

        assert_eq!(Response::from(api).text, "Hello there");
    }
}
