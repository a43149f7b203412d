//! Bounded agent invocation with corrective retries.
//!
//! One invocation runs up to `max_retries` attempts. Each attempt is a short
//! conversation: the model answers, tool calls are executed and fed back,
//! and the turn ends when a termination rule fires or the turn budget runs
//! out. The selected answer is then parsed and validated; on failure the
//! next attempt opens with a corrective prompt built from what went wrong.
//!
//! Transport errors from the backend are not attempt failures; they abort
//! the invocation, since retrying a broken endpoint with a corrective prompt
//! fixes nothing.

use std::fmt;

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use crate::core::correction::{AttemptError, corrective_prompt, leaked_reasoning};
use crate::core::parse::{extract_candidate, recover_generated_code, recover_price};
use crate::core::selection::{AnswerSelector, LastAssistantSelector, PriceAwareSelector};
use crate::core::shapes::{ResponseShape, StructuredResponse};
use crate::core::termination::check_termination;
use crate::core::types::{AgentRole, TurnMessage};
use crate::core::validate::validate;
use crate::io::config::PipelineConfig;
use crate::io::model::{ChatRequest, ModelBackend, ToolDecl};
use crate::io::prompt::system_prompt;
use crate::io::tools::Tool;
use crate::io::usage::UsageTracker;

/// All retries for one agent call failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationExhausted {
    pub agent: String,
    pub attempts: u32,
    pub last_error: String,
}

impl fmt::Display for InvocationExhausted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "agent '{}' produced no valid response in {} attempts (last: {})",
            self.agent, self.attempts, self.last_error
        )
    }
}

impl std::error::Error for InvocationExhausted {}

/// One configured agent.
pub struct AgentSpec {
    pub name: String,
    pub role: AgentRole,
    pub max_retries: u32,
    pub max_turns: u32,
    pub selector: Box<dyn AnswerSelector>,
    pub tool: Option<Box<dyn Tool>>,
}

impl AgentSpec {
    /// Budgets, selector, and tooling for a role, per config.
    pub fn for_role(role: AgentRole, cfg: &PipelineConfig, tool: Option<Box<dyn Tool>>) -> Self {
        let selector: Box<dyn AnswerSelector> = match role {
            AgentRole::DataExtractor => Box::new(PriceAwareSelector),
            _ => Box::new(LastAssistantSelector),
        };
        Self {
            name: role.name().to_string(),
            role,
            max_retries: cfg.retries_for(role),
            max_turns: cfg.turns_for(role),
            selector,
            tool,
        }
    }
}

/// Drives agent invocations against a model backend.
pub struct AgentInvoker<'a> {
    backend: &'a dyn ModelBackend,
    config: &'a PipelineConfig,
}

impl<'a> AgentInvoker<'a> {
    pub fn new(backend: &'a dyn ModelBackend, config: &'a PipelineConfig) -> Self {
        Self { backend, config }
    }

    /// Invoke an agent until it yields a validated response or the retry
    /// budget is spent.
    #[instrument(skip_all, fields(agent = %agent.name, shape = shape.name()))]
    pub fn invoke(
        &self,
        usage: &mut UsageTracker,
        agent: &AgentSpec,
        task_prompt: &str,
        shape: ResponseShape,
    ) -> Result<StructuredResponse> {
        let mut prompt = task_prompt.to_string();
        let mut last_error = String::new();
        for attempt in 1..=agent.max_retries {
            debug!(attempt, "starting attempt");
            match self.attempt(usage, agent, &prompt, shape)? {
                Ok(response) => {
                    info!(attempt, "agent produced a valid response");
                    return Ok(response);
                }
                Err(error) => {
                    warn!(attempt, kind = error.kind(), "attempt failed");
                    last_error = error.kind().to_string();
                    prompt = corrective_prompt(&error, shape, task_prompt);
                }
            }
        }
        Err(InvocationExhausted {
            agent: agent.name.clone(),
            attempts: agent.max_retries,
            last_error,
        }
        .into())
    }

    /// One attempt. The outer `Result` is transport failure; the inner one
    /// is the attempt verdict.
    fn attempt(
        &self,
        usage: &mut UsageTracker,
        agent: &AgentSpec,
        prompt: &str,
        shape: ResponseShape,
    ) -> Result<Result<StructuredResponse, AttemptError>> {
        let tool_decls: Vec<ToolDecl> = agent.tool.iter().map(|tool| tool.decl()).collect();
        let mut messages = vec![TurnMessage::user(prompt, "pipeline")];

        for _turn in 1..=agent.max_turns {
            let request = ChatRequest {
                agent: &agent.name,
                model: self.config.model_for(agent.role),
                temperature: self.config.temperature_for(agent.role),
                system_prompt: system_prompt(agent.role),
                messages: &messages,
                tools: &tool_decls,
            };
            let reply = self.backend.generate(&request)?;
            usage.record(&agent.name, prompt, &reply.content);

            if let Some(call) = &reply.tool_call {
                let result = match &agent.tool {
                    Some(tool) => tool
                        .run(&call.arguments)
                        .unwrap_or_else(|err| format!("tool failed: {err:#}")),
                    None => format!("tool '{}' is not available", call.name),
                };
                let tool_name = call.name.clone();
                messages.push(reply);
                messages.push(TurnMessage::tool_result(&result, &tool_name));
                continue;
            }

            let done = check_termination(&reply).is_some();
            messages.push(reply);
            if done {
                break;
            }
        }

        let Some(answer) = agent.selector.select(&messages) else {
            return Ok(Err(AttemptError::EmptyResponse));
        };
        let text = answer.content.clone();
        Ok(self.interpret(&text, agent.role, shape))
    }

    /// Parse and validate a selected answer, applying role fast paths.
    fn interpret(
        &self,
        text: &str,
        role: AgentRole,
        shape: ResponseShape,
    ) -> Result<StructuredResponse, AttemptError> {
        if let Some(marker) = leaked_reasoning(text) {
            return Err(AttemptError::LeakedReasoning { marker });
        }
        let candidate = match extract_candidate(text) {
            Some(candidate) => candidate,
            None => {
                if role == AgentRole::DataExtractor && shape == ResponseShape::ExtractedData {
                    if let Some(value) = recover_price(text) {
                        debug!("recovered price from raw text");
                        return validate(shape, &value).map_err(|failure| {
                            AttemptError::InvalidShape {
                                output: text.to_string(),
                                failure,
                            }
                        });
                    }
                }
                if shape == ResponseShape::GeneratedCode {
                    if let Some(code) = recover_generated_code(text) {
                        debug!("recovered code by field-level fallback");
                        return Ok(StructuredResponse::GeneratedCode(code));
                    }
                }
                return Err(AttemptError::ParseFailure {
                    output: text.to_string(),
                });
            }
        };
        debug!(tier = candidate.tier.name(), "extracted candidate payload");
        match validate(shape, &candidate.value) {
            Ok(response) => Ok(response),
            Err(failure) => {
                if shape == ResponseShape::GeneratedCode {
                    if let Some(code) = recover_generated_code(text) {
                        debug!("recovered code by field-level fallback");
                        return Ok(StructuredResponse::GeneratedCode(code));
                    }
                }
                Err(AttemptError::InvalidShape {
                    output: text.to_string(),
                    failure,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::PipelineConfig;
    use crate::io::usage::UsageTracker;
    use crate::test_support::{ScriptedBackend, ScriptedTool, tool_call_reply};

    fn config() -> PipelineConfig {
        PipelineConfig::default()
    }

    fn invoke_with(
        backend: &ScriptedBackend,
        cfg: &PipelineConfig,
        agent: &AgentSpec,
        shape: ResponseShape,
    ) -> Result<StructuredResponse> {
        let invoker = AgentInvoker::new(backend, cfg);
        let mut usage = UsageTracker::default();
        invoker.invoke(&mut usage, agent, "original task", shape)
    }

    #[test]
    fn valid_first_response_succeeds_without_retry() {
        let cfg = config();
        let backend = ScriptedBackend::assistant_replies(&[
            r#"{"plan": ["step"], "data_query": null, "dependencies": []}"#,
        ]);
        let agent = AgentSpec::for_role(AgentRole::Planner, &cfg, None);
        let response =
            invoke_with(&backend, &cfg, &agent, ResponseShape::Plan).expect("response");
        assert!(response.into_plan().is_some());
        assert_eq!(backend.remaining(), 0);
    }

    #[test]
    fn invalid_then_valid_consumes_two_attempts() {
        let cfg = config();
        let backend = ScriptedBackend::assistant_replies(&[
            "I cannot answer in that format right now, sorry about that",
            r#"{"plan": ["step"], "data_query": null, "dependencies": []}"#,
        ]);
        let agent = AgentSpec::for_role(AgentRole::Planner, &cfg, None);
        let response =
            invoke_with(&backend, &cfg, &agent, ResponseShape::Plan).expect("response");
        assert!(response.into_plan().is_some());
        // The second request must carry the corrective prompt.
        let prompts = backend.seen_prompts();
        assert!(prompts[1].contains("Original task:\noriginal task"));
        assert!(prompts[1].contains("did not contain a parseable JSON object"));
    }

    #[test]
    fn exhaustion_yields_typed_error() {
        let cfg = config();
        let backend =
            ScriptedBackend::assistant_replies(&["nope, not json", "still prose", "and again"]);
        let agent = AgentSpec::for_role(AgentRole::Planner, &cfg, None);
        let err = invoke_with(&backend, &cfg, &agent, ResponseShape::Plan).expect_err("exhaust");
        let exhausted = err
            .downcast_ref::<InvocationExhausted>()
            .expect("typed error");
        assert_eq!(exhausted.agent, "Planner");
        assert_eq!(exhausted.attempts, cfg.limits.max_retries);
    }

    #[test]
    fn leaked_reasoning_is_rejected_and_retried() {
        let cfg = config();
        let backend = ScriptedBackend::assistant_replies(&[
            "Let me think about the best plan for this problem first",
            r#"{"plan": ["step"], "data_query": null, "dependencies": []}"#,
        ]);
        let agent = AgentSpec::for_role(AgentRole::Planner, &cfg, None);
        let response =
            invoke_with(&backend, &cfg, &agent, ResponseShape::Plan).expect("response");
        assert!(response.into_plan().is_some());
        assert!(backend.seen_prompts()[1].contains("reasoning"));
    }

    #[test]
    fn extractor_runs_tool_round_then_answers() {
        let cfg = config();
        let backend = ScriptedBackend::new(vec![
            tool_call_reply("extractor", "web_search", r#"{"query": "price"}"#),
            crate::core::types::TurnMessage::assistant(r#"{"price": 139990}"#, "extractor"),
        ]);
        let tool = ScriptedTool::answering("Result 1: 139 990 руб");
        let agent = AgentSpec::for_role(AgentRole::DataExtractor, &cfg, Some(Box::new(tool)));
        let response = invoke_with(&backend, &cfg, &agent, ResponseShape::ExtractedData)
            .expect("response");
        let data = response.into_extracted_data().expect("extracted");
        assert_eq!(data.price, Some(139_990.0));
    }

    #[test]
    fn extractor_recovers_price_from_prose() {
        let mut cfg = config();
        // One turn: prose does not terminate a turn on its own.
        cfg.limits.extractor_max_turns = 1;
        let backend = ScriptedBackend::assistant_replies(&[
            "The best listing shows iPhone 16 Pro at 129 990 руб in stock today",
        ]);
        let agent = AgentSpec::for_role(AgentRole::DataExtractor, &cfg, None);
        let response = invoke_with(&backend, &cfg, &agent, ResponseShape::ExtractedData)
            .expect("response");
        let data = response.into_extracted_data().expect("extracted");
        assert_eq!(data.price, Some(129_990.0));
    }

    #[test]
    fn coder_falls_back_to_field_recovery_on_raw_newlines() {
        let cfg = config();
        // Raw newline inside the JSON string breaks every tier.
        let backend = ScriptedBackend::assistant_replies(&[
            "{\"description\": \"adds\", \"code\": \"def add(a, b):\n    return a + b\"}",
        ]);
        let agent = AgentSpec::for_role(AgentRole::Coder, &cfg, None);
        let response = invoke_with(&backend, &cfg, &agent, ResponseShape::GeneratedCode)
            .expect("response");
        let code = response.into_generated_code().expect("code");
        assert_eq!(code.description, "adds");
        assert!(code.code.contains("return a + b"));
    }

    #[test]
    fn transport_error_aborts_instead_of_retrying() {
        let cfg = config();
        let backend = ScriptedBackend::assistant_replies(&[]);
        let agent = AgentSpec::for_role(AgentRole::Planner, &cfg, None);
        let err = invoke_with(&backend, &cfg, &agent, ResponseShape::Plan).expect_err("abort");
        assert!(err.downcast_ref::<InvocationExhausted>().is_none());
    }
}
