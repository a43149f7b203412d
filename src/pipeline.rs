//! End-to-end pipeline: plan, extract, generate, review, repair, document.
//!
//! Stages run in a fixed order. Data extraction is the only optional stage
//! and the only one allowed to fail softly: exhausting its retries degrades
//! to the configured fallback price (or none) instead of aborting the run.
//! Finalization (usage accounting) happens on every exit path.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::{info, instrument, warn};

use crate::core::shapes::{Plan, ResponseShape};
use crate::core::types::AgentRole;
use crate::escalate::{Escalation, RepairState};
use crate::improve::{ImprovementLoop, StopReason};
use crate::invoke::{AgentInvoker, AgentSpec, InvocationExhausted};
use crate::io::config::PipelineConfig;
use crate::io::model::{ModelBackend, OpenAiChatBackend};
use crate::io::prompt::PromptEngine;
use crate::io::runner::{DockerTestRunner, LocalTestRunner, TestRunner, build_test_command};
use crate::io::tools::WebSearchTool;
use crate::io::usage::UsageTracker;
use crate::io::workspace::Workspace;

/// What a completed run produced.
#[derive(Debug)]
pub struct PipelineReport {
    pub plan: Plan,
    pub price: Option<f64>,
    pub stop: StopReason,
    pub test_exit_code: i32,
    pub iterations: u32,
    pub workspace_dir: PathBuf,
    pub total_tokens: u64,
}

struct Agents {
    planner: AgentSpec,
    extractor: AgentSpec,
    coder: AgentSpec,
    reviewer: AgentSpec,
    writer: AgentSpec,
    supervisor: AgentSpec,
}

pub struct Pipeline {
    config: PipelineConfig,
    backend: Box<dyn ModelBackend>,
    runner: Box<dyn TestRunner>,
    engine: PromptEngine,
    workspace: Workspace,
    agents: Agents,
}

impl Pipeline {
    /// Wire up the real backend, runner, and search tool from config.
    pub fn from_config(config: PipelineConfig, root: &Path) -> Result<Self> {
        let backend = Box::new(OpenAiChatBackend::new(&config.model)?);
        let runner: Box<dyn TestRunner> = if config.execution.use_docker {
            Box::new(DockerTestRunner::new(config.execution.clone()))
        } else {
            Box::new(LocalTestRunner::new(config.execution.clone()))
        };
        let tool = WebSearchTool::new()?;
        Self::new(config, backend, runner, root, Some(Box::new(tool)))
    }

    /// Assemble a pipeline from parts; tests script the backend and runner.
    pub fn new(
        config: PipelineConfig,
        backend: Box<dyn ModelBackend>,
        runner: Box<dyn TestRunner>,
        root: &Path,
        extractor_tool: Option<Box<dyn crate::io::tools::Tool>>,
    ) -> Result<Self> {
        config.validate()?;
        let workspace = Workspace::create(root, &config.workspace)?;
        let agents = Agents {
            planner: AgentSpec::for_role(AgentRole::Planner, &config, None),
            extractor: AgentSpec::for_role(AgentRole::DataExtractor, &config, extractor_tool),
            coder: AgentSpec::for_role(AgentRole::Coder, &config, None),
            reviewer: AgentSpec::for_role(AgentRole::Reviewer, &config, None),
            writer: AgentSpec::for_role(AgentRole::TechWriter, &config, None),
            supervisor: AgentSpec::for_role(AgentRole::Supervisor, &config, None),
        };
        Ok(Self {
            config,
            backend,
            runner,
            engine: PromptEngine::new(),
            workspace,
            agents,
        })
    }

    /// Run the whole pipeline for one task.
    ///
    /// Usage is recorded and flushed whether the run succeeds or fails; the
    /// original error is re-raised after finalization.
    #[instrument(skip_all)]
    pub fn run(&self, task: &str) -> Result<PipelineReport> {
        let mut usage = UsageTracker::new(self.config.usage.clone());
        let result = self.execute(task, &mut usage);
        if let Err(err) = usage.write_log(self.workspace.dir()) {
            warn!(err = %err, "could not write usage log");
        }
        info!("{}", usage.summary().trim_end());
        match result {
            Ok(mut report) => {
                report.total_tokens = usage.total_tokens();
                Ok(report)
            }
            Err(err) => Err(err),
        }
    }

    fn execute(&self, task: &str, usage: &mut UsageTracker) -> Result<PipelineReport> {
        let invoker = AgentInvoker::new(self.backend.as_ref(), &self.config);

        let prompt = self.engine.plan(task)?;
        let plan = invoker
            .invoke(usage, &self.agents.planner, &prompt, ResponseShape::Plan)?
            .into_plan()
            .ok_or_else(|| anyhow!("planner bound to an unexpected shape"))?;
        info!(steps = plan.plan.len(), query = ?plan.data_query, "plan ready");

        let price = match &plan.data_query {
            Some(query) => self.extract_price(&invoker, usage, query)?,
            None => {
                info!("plan needs no external data, skipping extraction");
                None
            }
        };

        let prompt = self.engine.code(task, &plan, price)?;
        let code = invoker
            .invoke(usage, &self.agents.coder, &prompt, ResponseShape::GeneratedCode)?
            .into_generated_code()
            .ok_or_else(|| anyhow!("coder bound to an unexpected shape"))?;

        let prompt = self.engine.review(&code, self.workspace.script_stem())?;
        let review = invoker
            .invoke(usage, &self.agents.reviewer, &prompt, ResponseShape::CodeReview)?
            .into_code_review()
            .ok_or_else(|| anyhow!("reviewer bound to an unexpected shape"))?;

        let escalation = Escalation {
            invoker: &invoker,
            engine: &self.engine,
            supervisor: &self.agents.supervisor,
            coder: &self.agents.coder,
            reviewer: &self.agents.reviewer,
        };
        let looper = ImprovementLoop {
            invoker: &invoker,
            engine: &self.engine,
            escalation: &escalation,
            coder: &self.agents.coder,
            workspace: &self.workspace,
            runner: self.runner.as_ref(),
            test_command: build_test_command(&plan.dependencies, self.workspace.tests_name()),
            max_iterations: self.config.limits.max_improvement_loops,
        };
        let outcome = looper.run(usage, RepairState { code, review })?;

        let prompt = self
            .engine
            .document(&outcome.state.code, &outcome.state.review)?;
        let docs = invoker
            .invoke(usage, &self.agents.writer, &prompt, ResponseShape::Documentation)?
            .into_documentation()
            .ok_or_else(|| anyhow!("writer bound to an unexpected shape"))?;
        self.workspace
            .write_readme(&docs, &outcome.state.review)
            .context("write README.md")?;

        Ok(PipelineReport {
            plan,
            price,
            stop: outcome.stop,
            test_exit_code: outcome.final_run.exit_code,
            iterations: outcome.iterations,
            workspace_dir: self.workspace.dir().to_path_buf(),
            total_tokens: 0,
        })
    }

    /// Extraction never aborts the run: an exhausted retry budget degrades
    /// to the configured fallback price.
    fn extract_price(
        &self,
        invoker: &AgentInvoker<'_>,
        usage: &mut UsageTracker,
        query: &str,
    ) -> Result<Option<f64>> {
        let prompt = self.engine.extract(query)?;
        match invoker.invoke(
            usage,
            &self.agents.extractor,
            &prompt,
            ResponseShape::ExtractedData,
        ) {
            Ok(response) => {
                let data = response
                    .into_extracted_data()
                    .ok_or_else(|| anyhow!("extractor bound to an unexpected shape"))?;
                info!(price = ?data.price, "extraction done");
                Ok(data.price)
            }
            Err(err) if err.downcast_ref::<InvocationExhausted>().is_some() => {
                warn!(
                    fallback = ?self.config.fallback_price,
                    "extraction exhausted its retries, using fallback"
                );
                Ok(self.config.fallback_price)
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedBackend, ScriptedRunner};

    const PLAN_NO_QUERY: &str =
        r#"{"plan": ["write it"], "data_query": null, "dependencies": []}"#;
    const PLAN_WITH_QUERY: &str = r#"{"plan": ["find price", "write it"], "data_query": "iPhone 16 Pro price", "dependencies": []}"#;
    const CODE: &str = r#"{"description": "calc", "code": "def f():\n    return 1"}"#;
    const REVIEW: &str =
        r#"{"review_comments": ["ok"], "test_code": "def test():\n    assert f() == 1"}"#;
    const DOCS: &str = r#"{"title": "Calc", "description": "d", "usage_examples": ["python generated_script.py"], "api_documentation": "f()"}"#;

    fn pipeline(backend: ScriptedBackend, runner: ScriptedRunner, root: &Path) -> Pipeline {
        let mut cfg = PipelineConfig::default();
        cfg.limits.max_improvement_loops = 3;
        Pipeline::new(cfg, Box::new(backend), Box::new(runner), root, None).expect("pipeline")
    }

    #[test]
    fn null_data_query_skips_extraction() {
        let temp = tempfile::tempdir().expect("tempdir");
        let backend = ScriptedBackend::assistant_replies(&[PLAN_NO_QUERY, CODE, REVIEW, DOCS]);
        let prompts = backend.prompt_log();
        let runner = ScriptedRunner::with_runs(&[(0, "passed")]);
        let report = pipeline(backend, runner, temp.path())
            .run("compute savings")
            .expect("report");
        assert_eq!(report.price, None);
        assert_eq!(report.stop, StopReason::TestsPassed);
        // No prompt ever asks for extraction.
        let seen = prompts.lock().expect("log");
        assert!(seen.iter().all(|p| !p.contains("web_search")));
        // Coder was told there is no price.
        assert!(seen.iter().any(|p| p.contains("No price could be extracted")));
    }

    #[test]
    fn extracted_price_reaches_the_coder_prompt() {
        let temp = tempfile::tempdir().expect("tempdir");
        let backend = ScriptedBackend::assistant_replies(&[
            PLAN_WITH_QUERY,
            r#"{"price": 129990}"#,
            CODE,
            REVIEW,
            DOCS,
        ]);
        let prompts = backend.prompt_log();
        let runner = ScriptedRunner::with_runs(&[(0, "passed")]);
        let report = pipeline(backend, runner, temp.path())
            .run("compute savings")
            .expect("report");
        assert_eq!(report.price, Some(129_990.0));
        let seen = prompts.lock().expect("log");
        assert!(seen.iter().any(|p| p.contains("129990")));
    }

    #[test]
    fn exhausted_extraction_degrades_to_fallback_price() {
        let temp = tempfile::tempdir().expect("tempdir");
        // Short replies end the extractor's turn but carry nothing usable, so
        // both attempts fail and the retry budget runs out.
        let backend = ScriptedBackend::assistant_replies(&[
            PLAN_WITH_QUERY,
            "nope",
            "nada",
            CODE,
            REVIEW,
            DOCS,
        ]);
        let runner = ScriptedRunner::with_runs(&[(0, "passed")]);
        let mut cfg = PipelineConfig::default();
        cfg.fallback_price = Some(100_000.0);
        let pipeline = Pipeline::new(
            cfg,
            Box::new(backend),
            Box::new(runner),
            temp.path(),
            None,
        )
        .expect("pipeline");
        let report = pipeline.run("compute savings").expect("report");
        assert_eq!(report.price, Some(100_000.0));
    }

    #[test]
    fn finished_run_leaves_artifacts_and_usage_log() {
        let temp = tempfile::tempdir().expect("tempdir");
        let backend = ScriptedBackend::assistant_replies(&[PLAN_NO_QUERY, CODE, REVIEW, DOCS]);
        let runner = ScriptedRunner::with_runs(&[(0, "passed")]);
        let report = pipeline(backend, runner, temp.path())
            .run("compute savings")
            .expect("report");
        assert!(report.total_tokens > 0);
        for name in [
            "generated_script.py",
            "test_generated_script.py",
            "README.md",
            "tokens_usage.log",
        ] {
            assert!(
                report.workspace_dir.join(name).exists(),
                "missing artifact {name}"
            );
        }
    }

    #[test]
    fn usage_log_is_written_even_when_a_stage_fails() {
        let temp = tempfile::tempdir().expect("tempdir");
        // Planner burns all attempts; the run errors but still finalizes.
        let backend =
            ScriptedBackend::assistant_replies(&["prose", "more prose", "even more prose"]);
        let runner = ScriptedRunner::with_runs(&[]);
        let pipeline = pipeline(backend, runner, temp.path());
        let err = pipeline.run("compute savings").expect_err("fail");
        assert!(err.downcast_ref::<crate::invoke::InvocationExhausted>().is_some());
        assert!(temp
            .path()
            .join("workspace")
            .join("tokens_usage.log")
            .exists());
    }
}
