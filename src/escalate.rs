//! Supervised repair of a failing script.
//!
//! The supervisor diagnoses the failing run and routes the fix: the coder
//! rewrites the script, or the reviewer rewrites the tests. Exactly one of
//! the two artifacts changes per escalation.

use anyhow::{Result, anyhow};
use tracing::{info, instrument};

use crate::core::shapes::{CodeReview, GeneratedCode, ResponseShape, TargetAgent};
use crate::invoke::{AgentInvoker, AgentSpec};
use crate::io::prompt::PromptEngine;
use crate::io::usage::UsageTracker;

/// Artifacts flowing through the repair loop.
#[derive(Debug, Clone)]
pub struct RepairState {
    pub code: GeneratedCode,
    pub review: CodeReview,
}

/// Which agent the supervisor chose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationTarget {
    Coder,
    Reviewer,
}

pub struct Escalation<'a> {
    pub invoker: &'a AgentInvoker<'a>,
    pub engine: &'a PromptEngine,
    pub supervisor: &'a AgentSpec,
    pub coder: &'a AgentSpec,
    pub reviewer: &'a AgentSpec,
}

impl Escalation<'_> {
    /// Run one supervised fix: diagnose, then apply the targeted rewrite.
    #[instrument(skip_all)]
    pub fn supervised_fix(
        &self,
        usage: &mut UsageTracker,
        state: &RepairState,
        logs: &str,
    ) -> Result<(RepairState, EscalationTarget)> {
        let prompt = self
            .engine
            .supervise(&state.code.code, &state.review.test_code, logs)?;
        let solution = self
            .invoker
            .invoke(usage, self.supervisor, &prompt, ResponseShape::ProblemSolution)?
            .into_problem_solution()
            .ok_or_else(|| anyhow!("supervisor bound to an unexpected shape"))?;
        info!(
            target = solution.target_agent.name(),
            analysis = %solution.problem_analysis,
            "supervisor routed the fix"
        );

        match solution.target_agent {
            TargetAgent::Coder => {
                let prompt = self.engine.coder_fix(&solution, &state.code.code, logs)?;
                let code = self
                    .invoker
                    .invoke(usage, self.coder, &prompt, ResponseShape::GeneratedCode)?
                    .into_generated_code()
                    .ok_or_else(|| anyhow!("coder bound to an unexpected shape"))?;
                Ok((
                    RepairState {
                        code,
                        review: state.review.clone(),
                    },
                    EscalationTarget::Coder,
                ))
            }
            TargetAgent::Reviewer => {
                let prompt = self
                    .engine
                    .reviewer_fix(&solution, &state.review.test_code, logs)?;
                let review = self
                    .invoker
                    .invoke(usage, self.reviewer, &prompt, ResponseShape::CodeReview)?
                    .into_code_review()
                    .ok_or_else(|| anyhow!("reviewer bound to an unexpected shape"))?;
                Ok((
                    RepairState {
                        code: state.code.clone(),
                        review,
                    },
                    EscalationTarget::Reviewer,
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::AgentRole;
    use crate::io::config::PipelineConfig;
    use crate::test_support::{ScriptedBackend, repair_state};

    fn specs(cfg: &PipelineConfig) -> (AgentSpec, AgentSpec, AgentSpec) {
        (
            AgentSpec::for_role(AgentRole::Supervisor, cfg, None),
            AgentSpec::for_role(AgentRole::Coder, cfg, None),
            AgentSpec::for_role(AgentRole::Reviewer, cfg, None),
        )
    }

    #[test]
    fn coder_target_replaces_code_and_keeps_review() {
        let cfg = PipelineConfig::default();
        let (supervisor, coder, reviewer) = specs(&cfg);
        let backend = ScriptedBackend::assistant_replies(&[
            r#"{"problem_analysis": "off by one", "target_agent": "Coder", "specific_instructions": "fix loop bound", "expected_outcome": "tests pass"}"#,
            r#"{"description": "fixed", "code": "def f():\n    return 2"}"#,
        ]);
        let invoker = AgentInvoker::new(&backend, &cfg);
        let escalation = Escalation {
            invoker: &invoker,
            engine: &PromptEngine::new(),
            supervisor: &supervisor,
            coder: &coder,
            reviewer: &reviewer,
        };
        let state = repair_state();
        let mut usage = UsageTracker::default();
        let (fixed, target) = escalation
            .supervised_fix(&mut usage, &state, "AssertionError: assert 1 == 2")
            .expect("fix");
        assert_eq!(target, EscalationTarget::Coder);
        assert_eq!(fixed.code.description, "fixed");
        assert_eq!(fixed.review, state.review);
    }

    #[test]
    fn reviewer_target_replaces_tests_and_keeps_code() {
        let cfg = PipelineConfig::default();
        let (supervisor, coder, reviewer) = specs(&cfg);
        let backend = ScriptedBackend::assistant_replies(&[
            r#"{"problem_analysis": "tests assert the wrong sum", "target_agent": "Reviewer", "specific_instructions": "assert 3", "expected_outcome": "tests pass"}"#,
            r#"{"review_comments": ["corrected expectations"], "test_code": "def test():\n    assert f() == 3"}"#,
        ]);
        let invoker = AgentInvoker::new(&backend, &cfg);
        let escalation = Escalation {
            invoker: &invoker,
            engine: &PromptEngine::new(),
            supervisor: &supervisor,
            coder: &coder,
            reviewer: &reviewer,
        };
        let state = repair_state();
        let mut usage = UsageTracker::default();
        let (fixed, target) = escalation
            .supervised_fix(&mut usage, &state, "AssertionError")
            .expect("fix");
        assert_eq!(target, EscalationTarget::Reviewer);
        assert_eq!(fixed.code, state.code);
        assert_eq!(fixed.review.review_comments, vec!["corrected expectations"]);
    }

    #[test]
    fn failed_supervision_is_an_error() {
        let cfg = PipelineConfig::default();
        let (supervisor, coder, reviewer) = specs(&cfg);
        let backend =
            ScriptedBackend::assistant_replies(&["not a solution", "still prose", "and more"]);
        let invoker = AgentInvoker::new(&backend, &cfg);
        let escalation = Escalation {
            invoker: &invoker,
            engine: &PromptEngine::new(),
            supervisor: &supervisor,
            coder: &coder,
            reviewer: &reviewer,
        };
        let mut usage = UsageTracker::default();
        assert!(
            escalation
                .supervised_fix(&mut usage, &repair_state(), "boom")
                .is_err()
        );
    }
}
