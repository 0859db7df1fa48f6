//! Language-model client abstraction.
//!
//! Typed chat client for OpenAI-compatible endpoints with tool-call support.
//! Ships a real HTTP implementation and a scripted fake so the orchestration
//! loop can be tested without a network.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;

use crate::config::LlmConfig;

/// LLM errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("model returned an empty response")]
    EmptyResponse,

    #[error("request timeout after {0} seconds")]
    Timeout(u64),
}

/// One message on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,

    /// Set on `tool` role messages to correlate with the request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain("assistant", content)
    }

    /// Assistant turn that requested tool calls.
    pub fn assistant_tool_calls(content: Option<String>, calls: Vec<ToolCallRequest>) -> Self {
        Self {
            role: "assistant".to_string(),
            content,
            tool_calls: calls,
            tool_call_id: None,
        }
    }

    /// Tool result message correlated to a tool call id.
    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
        }
    }

    fn plain(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

/// Tool call as carried on assistant messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded argument object.
    pub arguments: String,
}

/// Chat completion request body.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<serde_json::Value>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,

    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
struct Choice {
    message: ChatMessage,
}

/// A model-issued tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// JSON-encoded argument object, as returned by the model.
    pub arguments: String,
}

/// What the assistant produced for one request: plain text, tool calls,
/// or both.
#[derive(Debug, Clone)]
pub struct AssistantTurn {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

impl AssistantTurn {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            text: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Chat completion seam between the orchestrator and the model service.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn chat(&self, request: ChatRequest) -> Result<AssistantTurn, LlmError>;
}

/// Real client for OpenAI-compatible endpoints.
pub struct HttpChatClient {
    endpoint: String,
    api_key: Option<String>,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl HttpChatClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Http(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.resolve_api_key(),
            timeout_secs: config.timeout_secs,
            client,
        })
    }
}

#[async_trait]
impl ChatApi for HttpChatClient {
    async fn chat(&self, request: ChatRequest) -> Result<AssistantTurn, LlmError> {
        let url = format!("{}/chat/completions", self.endpoint);

        let mut req = self.client.post(&url).json(&request);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout(self.timeout_secs)
            } else {
                LlmError::Http(format!("request failed: {}", e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("failed to parse response: {}", e)))?;

        let message = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or(LlmError::EmptyResponse)?;

        let tool_calls = message
            .tool_calls
            .into_iter()
            .map(|tc| ToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();

        Ok(AssistantTurn {
            text: message.content,
            tool_calls,
        })
    }
}

/// Scripted client for tests.
///
/// Responses are consumed in order; the last one repeats once the script is
/// exhausted. Requests are recorded so tests can assert on what was sent.
pub struct FakeChatClient {
    responses: Mutex<Vec<Result<AssistantTurn, LlmError>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl FakeChatClient {
    pub fn new(responses: Vec<Result<AssistantTurn, LlmError>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Client that always answers with the same text.
    pub fn always_text(content: impl Into<String>) -> Self {
        Self::new(vec![Ok(AssistantTurn::text(content))])
    }

    /// Client that always fails.
    pub fn always_error(error: LlmError) -> Self {
        Self::new(vec![Err(error)])
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Copies of every request sent so far.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatApi for FakeChatClient {
    async fn chat(&self, request: ChatRequest) -> Result<AssistantTurn, LlmError> {
        self.requests.lock().unwrap().push(request);

        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Err(LlmError::EmptyResponse);
        }

        if responses.len() == 1 {
            responses[0].clone()
        } else {
            responses.remove(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fake_client_always_text() {
        let client = FakeChatClient::always_text("hello");

        let turn = client.chat(request_stub()).await.unwrap();
        assert_eq!(turn.text.as_deref(), Some("hello"));
        assert!(!turn.has_tool_calls());

        // Script of one repeats.
        let turn2 = client.chat(request_stub()).await.unwrap();
        assert_eq!(turn2.text.as_deref(), Some("hello"));
        assert_eq!(client.call_count(), 2);
    }

    #[tokio::test]
    async fn test_fake_client_scripted_sequence() {
        let client = FakeChatClient::new(vec![
            Ok(AssistantTurn::text("first")),
            Err(LlmError::Timeout(60)),
        ]);

        assert_eq!(
            client.chat(request_stub()).await.unwrap().text.as_deref(),
            Some("first")
        );
        assert!(matches!(
            client.chat(request_stub()).await,
            Err(LlmError::Timeout(60))
        ));
    }

    #[test]
    fn test_tool_calls_skipped_when_empty() {
        let msg = ChatMessage::user("hi");
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get("tool_calls").is_none());
        assert!(json.get("tool_call_id").is_none());
    }

    #[test]
    fn test_tool_result_message_shape() {
        let msg = ChatMessage::tool_result("call_1", "done");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "tool");
        assert_eq!(json["tool_call_id"], "call_1");
        assert_eq!(json["content"], "done");
    }

    #[test]
    fn test_response_with_tool_calls_parses() {
        let raw = r#"{
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {
                            "name": "generate_image",
                            "arguments": "{\"prompt\": \"a mountain\"}"
                        }
                    }]
                }
            }]
        }"#;

        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        let msg = &parsed.choices[0].message;
        assert!(msg.content.is_none());
        assert_eq!(msg.tool_calls[0].function.name, "generate_image");
    }

    fn request_stub() -> ChatRequest {
        ChatRequest {
            model: "test".to_string(),
            messages: vec![ChatMessage::user("hi")],
            tools: None,
            tool_choice: None,
            max_tokens: 64,
            temperature: 0.0,
            top_p: 1.0,
        }
    }
}
