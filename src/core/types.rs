//! Shared deterministic types for pipeline core logic.
//!
//! These types define stable contracts between core components. They should not
//! depend on external state or I/O and must remain deterministic across runs.

use serde::{Deserialize, Serialize};

/// Role an agent plays in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Planner,
    DataExtractor,
    Coder,
    Reviewer,
    TechWriter,
    Supervisor,
}

impl AgentRole {
    pub fn name(self) -> &'static str {
        match self {
            AgentRole::Planner => "Planner",
            AgentRole::DataExtractor => "DataExtractor",
            AgentRole::Coder => "Coder",
            AgentRole::Reviewer => "Reviewer",
            AgentRole::TechWriter => "TechWriter",
            AgentRole::Supervisor => "Supervisor",
        }
    }
}

/// Origin of a message within a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    Tool,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub arguments: String,
}

/// One message inside a conversation turn.
///
/// `sender` is the agent name for assistant messages and the orchestrating
/// proxy name for user messages; selection heuristics key off it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnMessage {
    pub role: MessageRole,
    pub sender: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCall>,
}

impl TurnMessage {
    pub fn user(content: impl Into<String>, sender: &str) -> Self {
        Self {
            role: MessageRole::User,
            sender: sender.to_string(),
            content: content.into(),
            tool_call: None,
        }
    }

    pub fn assistant(content: impl Into<String>, sender: &str) -> Self {
        Self {
            role: MessageRole::Assistant,
            sender: sender.to_string(),
            content: content.into(),
            tool_call: None,
        }
    }

    pub fn tool_result(content: impl Into<String>, tool_name: &str) -> Self {
        Self {
            role: MessageRole::Tool,
            sender: tool_name.to_string(),
            content: content.into(),
            tool_call: None,
        }
    }

    /// Whether this message carries an unanswered tool invocation.
    pub fn has_pending_tool_call(&self) -> bool {
        self.tool_call.is_some()
    }
}

