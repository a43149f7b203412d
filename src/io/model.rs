//! Chat model backend over an OpenAI-compatible HTTP API.
//!
//! The trait is the seam tests script against; the real backend speaks the
//! `/chat/completions` wire format, which local servers such as Ollama and
//! vLLM also expose.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::core::types::{MessageRole, ToolCall, TurnMessage};
use crate::io::config::ModelConfig;

/// A tool offered to the model for one request.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDecl {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool arguments.
    pub parameters: Value,
}

/// One chat completion request.
#[derive(Debug)]
pub struct ChatRequest<'a> {
    /// Agent name, used as the sender of the returned message.
    pub agent: &'a str,
    pub model: &'a str,
    pub temperature: f64,
    pub system_prompt: &'a str,
    pub messages: &'a [TurnMessage],
    pub tools: &'a [ToolDecl],
}

/// Something that can produce the next assistant message.
pub trait ModelBackend {
    fn generate(&self, request: &ChatRequest<'_>) -> Result<TurnMessage>;
}

/// HTTP backend for OpenAI-compatible chat endpoints.
pub struct OpenAiChatBackend {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiChatBackend {
    pub fn new(cfg: &ModelConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
        })
    }
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    function: &'a ToolDecl,
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    temperature: f64,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
}

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
}

#[derive(Deserialize)]
struct WireResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Deserialize)]
struct WireToolCall {
    function: WireFunctionCall,
}

#[derive(Deserialize)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

fn wire_role(role: MessageRole) -> &'static str {
    match role {
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::Tool => "tool",
    }
}

impl ModelBackend for OpenAiChatBackend {
    #[instrument(skip_all, fields(agent = request.agent, model = request.model))]
    fn generate(&self, request: &ChatRequest<'_>) -> Result<TurnMessage> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if !request.system_prompt.is_empty() {
            messages.push(WireMessage {
                role: "system",
                content: request.system_prompt,
            });
        }
        for msg in request.messages {
            messages.push(WireMessage {
                role: wire_role(msg.role),
                content: &msg.content,
            });
        }
        let body = WireRequest {
            model: request.model,
            temperature: request.temperature,
            messages,
            tools: request
                .tools
                .iter()
                .map(|tool| WireTool {
                    kind: "function",
                    function: tool,
                })
                .collect(),
        };

        let url = format!("{}/chat/completions", self.base_url);
        debug!(url = %url, "sending chat completion request");
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .with_context(|| format!("send chat request to {url}"))?
            .error_for_status()
            .context("chat request rejected")?;
        let parsed: WireResponse = response.json().context("decode chat response")?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("chat response contained no choices"))?;
        let mut message = TurnMessage::assistant(
            choice.message.content.as_deref().unwrap_or_default(),
            request.agent,
        );
        if let Some(call) = choice.message.tool_calls.into_iter().next() {
            message.tool_call = Some(ToolCall {
                name: call.function.name,
                arguments: call.function.arguments,
            });
        }
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_results_map_to_the_tool_wire_role() {
        assert_eq!(wire_role(MessageRole::Tool), "tool");
        assert_eq!(wire_role(MessageRole::User), "user");
        assert_eq!(wire_role(MessageRole::Assistant), "assistant");
    }

    #[test]
    fn response_with_tool_call_deserializes() {
        let raw = r#"{
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "web_search", "arguments": "{\"query\": \"q\"}"}
                    }]
                }
            }]
        }"#;
        let parsed: WireResponse = serde_json::from_str(raw).expect("parse");
        let call = &parsed.choices[0].message.tool_calls[0];
        assert_eq!(call.function.name, "web_search");
    }
}
