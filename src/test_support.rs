//! Scripted fakes shared across tests.
//!
//! Backends and runners replay a fixed script; consuming past the end is a
//! visible failure so tests notice unexpected extra calls.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use serde_json::json;

use crate::core::shapes::{CodeReview, GeneratedCode};
use crate::core::types::{ToolCall, TurnMessage};
use crate::escalate::RepairState;
use crate::io::model::{ChatRequest, ModelBackend, ToolDecl};
use crate::io::runner::{TestRun, TestRunner};
use crate::io::tools::Tool;

/// Replays a fixed sequence of model replies and records the prompts it saw.
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<TurnMessage>>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedBackend {
    pub fn new(replies: Vec<TurnMessage>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Plain assistant text replies, one per call.
    pub fn assistant_replies(texts: &[&str]) -> Self {
        Self::new(
            texts
                .iter()
                .map(|text| TurnMessage::assistant(*text, "scripted"))
                .collect(),
        )
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().expect("replies lock").len()
    }

    /// Snapshot of the attempt prompts seen so far.
    pub fn seen_prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompts lock").clone()
    }

    /// Shared handle to the prompt log; survives moving the backend.
    pub fn prompt_log(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.prompts)
    }
}

impl ModelBackend for ScriptedBackend {
    fn generate(&self, request: &ChatRequest<'_>) -> Result<TurnMessage> {
        if let Some(first) = request.messages.first() {
            self.prompts
                .lock()
                .expect("prompts lock")
                .push(first.content.clone());
        }
        let mut reply = self
            .replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .ok_or_else(|| anyhow!("scripted backend exhausted"))?;
        reply.sender = request.agent.to_string();
        Ok(reply)
    }
}

/// Assistant message that requests a tool call.
pub fn tool_call_reply(sender: &str, tool: &str, arguments: &str) -> TurnMessage {
    let mut message = TurnMessage::assistant("", sender);
    message.tool_call = Some(ToolCall {
        name: tool.to_string(),
        arguments: arguments.to_string(),
    });
    message
}

/// Tool that always answers with the same text.
pub struct ScriptedTool {
    answer: String,
}

impl ScriptedTool {
    pub fn answering(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
        }
    }
}

impl Tool for ScriptedTool {
    fn decl(&self) -> ToolDecl {
        ToolDecl {
            name: "web_search".to_string(),
            description: "scripted search".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {"query": {"type": "string"}},
                "required": ["query"]
            }),
        }
    }

    fn run(&self, _arguments: &str) -> Result<String> {
        Ok(self.answer.clone())
    }
}

/// Replays scripted test runs; an exhausted script yields a failing run.
pub struct ScriptedRunner {
    runs: Mutex<VecDeque<TestRun>>,
}

impl ScriptedRunner {
    pub fn with_runs(runs: &[(i32, &str)]) -> Self {
        Self {
            runs: Mutex::new(
                runs.iter()
                    .map(|(exit_code, logs)| TestRun {
                        exit_code: *exit_code,
                        logs: (*logs).to_string(),
                    })
                    .collect(),
            ),
        }
    }

    pub fn remaining(&self) -> usize {
        self.runs.lock().expect("runs lock").len()
    }
}

impl TestRunner for ScriptedRunner {
    fn run_tests(&self, _workspace_dir: &Path, _command: &str) -> TestRun {
        self.runs
            .lock()
            .expect("runs lock")
            .pop_front()
            .unwrap_or_else(|| TestRun {
                exit_code: 1,
                logs: "scripted runner exhausted".to_string(),
            })
    }
}

/// A plausible mid-repair state for loop and escalation tests.
pub fn repair_state() -> RepairState {
    RepairState {
        code: GeneratedCode {
            description: "returns one".to_string(),
            code: "def f():\n    return 1\n".to_string(),
        },
        review: CodeReview {
            review_comments: vec!["trivial".to_string()],
            test_code: "def test_f():\n    assert f() == 2\n".to_string(),
            improvements: Vec::new(),
        },
    }
}
