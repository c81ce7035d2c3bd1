//! LLM provider abstraction and the OpenAI-compatible HTTP implementation.
//!
//! The agent loop only depends on the [`LLMProvider`] trait: one `chat` call
//! taking the message array plus tool definitions and returning content
//! and/or tool-call requests. `OpenAiCompatProvider` speaks the
//! chat-completions wire format, which OpenRouter, vLLM, DeepSeek and most
//! other gateways accept.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{FemtoError, Result};
use crate::session::{Message, Role};

/// A tool invocation requested by the model.
#[derive(Debug, Clone)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    /// Parsed argument object. Unparseable argument strings are wrapped as
    /// `{"raw": "..."}` so validation can reject them with a useful message.
    pub arguments: Value,
}

/// Token accounting reported by the provider.
#[derive(Debug, Clone, Default)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// One chat-completion response.
#[derive(Debug, Clone, Default)]
pub struct LLMResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCallRequest>,
    pub usage: Option<Usage>,
}

impl LLMResponse {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Sampling options for one chat call.
#[derive(Debug, Clone)]
pub struct ChatOptions {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl ChatOptions {
    pub fn new() -> Self {
        Self {
            max_tokens: 4096,
            temperature: 0.7,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// An LLM backend able to run one tool-calling chat completion.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Send a chat completion request.
    ///
    /// `tools` uses the OpenAI function-schema shape produced by the tool
    /// registry. `model` of `None` uses the provider default.
    async fn chat(
        &self,
        messages: Vec<Message>,
        tools: Vec<Value>,
        model: Option<&str>,
        options: ChatOptions,
    ) -> Result<LLMResponse>;

    fn default_model(&self) -> &str;
}

/// Chat-completions client for OpenAI-compatible endpoints.
pub struct OpenAiCompatProvider {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
    default_model: String,
}

impl OpenAiCompatProvider {
    pub fn new(api_key: &str, api_base: Option<&str>, default_model: &str) -> Self {
        // OpenRouter keys are self-describing; anything else defaults to the
        // OpenAI endpoint unless an explicit base is configured.
        let api_base = api_base
            .map(str::to_string)
            .unwrap_or_else(|| {
                if api_key.starts_with("sk-or-") {
                    "https://openrouter.ai/api/v1".to_string()
                } else {
                    "https://api.openai.com/v1".to_string()
                }
            });
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            default_model: default_model.to_string(),
        }
    }

    /// Convert a session message into the wire representation.
    fn to_wire(message: &Message) -> Value {
        match message.role {
            Role::Tool => json!({
                "role": "tool",
                "tool_call_id": message.tool_call_id,
                "content": message.content,
            }),
            Role::Assistant if message.has_tool_calls() => {
                let calls: Vec<Value> = message
                    .tool_calls
                    .as_deref()
                    .unwrap_or_default()
                    .iter()
                    .map(|tc| {
                        json!({
                            "id": tc.id,
                            "type": "function",
                            "function": {
                                "name": tc.name,
                                "arguments": tc.arguments.to_string(),
                            },
                        })
                    })
                    .collect();
                json!({
                    "role": "assistant",
                    "content": message.content,
                    "tool_calls": calls,
                })
            }
            role => {
                let role = match role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::Tool => unreachable!(),
                };
                json!({"role": role, "content": message.content})
            }
        }
    }

    fn parse_response(body: &Value) -> Result<LLMResponse> {
        let message = body
            .pointer("/choices/0/message")
            .ok_or_else(|| FemtoError::Provider(format!("malformed response: {}", body)))?;

        let content = message
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let mut tool_calls = Vec::new();
        if let Some(calls) = message.get("tool_calls").and_then(Value::as_array) {
            for call in calls {
                let id = call.get("id").and_then(Value::as_str).unwrap_or_default();
                let name = call
                    .pointer("/function/name")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let raw_args = call
                    .pointer("/function/arguments")
                    .and_then(Value::as_str)
                    .unwrap_or("{}");
                let arguments = serde_json::from_str(raw_args)
                    .unwrap_or_else(|_| json!({"raw": raw_args}));
                tool_calls.push(ToolCallRequest {
                    id: id.to_string(),
                    name: name.to_string(),
                    arguments,
                });
            }
        }

        let usage = body.get("usage").map(|u| Usage {
            prompt_tokens: u.get("prompt_tokens").and_then(Value::as_u64).unwrap_or(0),
            completion_tokens: u
                .get("completion_tokens")
                .and_then(Value::as_u64)
                .unwrap_or(0),
        });

        Ok(LLMResponse {
            content,
            tool_calls,
            usage,
        })
    }
}

#[async_trait]
impl LLMProvider for OpenAiCompatProvider {
    async fn chat(
        &self,
        messages: Vec<Message>,
        tools: Vec<Value>,
        model: Option<&str>,
        options: ChatOptions,
    ) -> Result<LLMResponse> {
        let wire_messages: Vec<Value> = messages.iter().map(Self::to_wire).collect();

        let mut payload = json!({
            "model": model.unwrap_or(&self.default_model),
            "messages": wire_messages,
            "max_tokens": options.max_tokens,
            "temperature": options.temperature,
        });
        if !tools.is_empty() {
            payload["tools"] = Value::Array(tools);
            payload["tool_choice"] = json!("auto");
        }

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| FemtoError::Provider(format!("request failed: {}", e)))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| FemtoError::Provider(format!("invalid response body: {}", e)))?;

        if !status.is_success() {
            let detail = body
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(FemtoError::Provider(format!("HTTP {}: {}", status, detail)));
        }

        Self::parse_response(&body)
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }
}
