//! Prompt rendering for every agent call.
//!
//! Task prompts are minijinja templates embedded at compile time; system
//! prompts are fixed per role. All rendering is deterministic so prompt
//! content can be asserted in tests.

use anyhow::Result;
use minijinja::{Environment, context};

use crate::core::shapes::{CodeReview, GeneratedCode, Plan, ProblemSolution};
use crate::core::types::AgentRole;

const PLANNER_TEMPLATE: &str = include_str!("prompts/planner.md");
const EXTRACTOR_TEMPLATE: &str = include_str!("prompts/extractor.md");
const CODER_TEMPLATE: &str = include_str!("prompts/coder.md");
const REVIEWER_TEMPLATE: &str = include_str!("prompts/reviewer.md");
const WRITER_TEMPLATE: &str = include_str!("prompts/writer.md");
const SUPERVISOR_TEMPLATE: &str = include_str!("prompts/supervisor.md");
const CODER_FIX_TEMPLATE: &str = include_str!("prompts/coder_fix.md");
const REVIEWER_FIX_TEMPLATE: &str = include_str!("prompts/reviewer_fix.md");
const IMPORT_FIX_TEMPLATE: &str = include_str!("prompts/import_fix.md");

/// Fixed system prompt per role.
pub fn system_prompt(role: AgentRole) -> &'static str {
    match role {
        AgentRole::Planner => {
            "You are a planning agent. You produce short actionable plans as JSON. \
             Respond with the JSON object only, no commentary."
        }
        AgentRole::DataExtractor => {
            "You are a data extraction agent with access to a web_search tool. \
             You answer with a single JSON object containing the extracted value."
        }
        AgentRole::Coder => {
            "You are a Python programmer. You output complete runnable scripts \
             wrapped in a single JSON object. Never include prose outside the JSON."
        }
        AgentRole::Reviewer => {
            "You are a code reviewer. You find defects and write pytest tests. \
             Respond with the JSON object only."
        }
        AgentRole::TechWriter => {
            "You are a technical writer. You document finished code for users. \
             Respond with the JSON object only."
        }
        AgentRole::Supervisor => {
            "You are a supervising engineer. You diagnose failing test runs and \
             route the fix to the right agent. Respond with the JSON object only."
        }
    }
}

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        for (name, source) in [
            ("planner", PLANNER_TEMPLATE),
            ("extractor", EXTRACTOR_TEMPLATE),
            ("coder", CODER_TEMPLATE),
            ("reviewer", REVIEWER_TEMPLATE),
            ("writer", WRITER_TEMPLATE),
            ("supervisor", SUPERVISOR_TEMPLATE),
            ("coder_fix", CODER_FIX_TEMPLATE),
            ("reviewer_fix", REVIEWER_FIX_TEMPLATE),
            ("import_fix", IMPORT_FIX_TEMPLATE),
        ] {
            env.add_template(name, source)
                .expect("embedded template should be valid");
        }
        Self { env }
    }

    pub fn plan(&self, task: &str) -> Result<String> {
        let rendered = self
            .env
            .get_template("planner")?
            .render(context! { task => task.trim() })?;
        Ok(rendered)
    }

    pub fn extract(&self, query: &str) -> Result<String> {
        let rendered = self
            .env
            .get_template("extractor")?
            .render(context! { query => query.trim() })?;
        Ok(rendered)
    }

    pub fn code(&self, task: &str, plan: &Plan, price: Option<f64>) -> Result<String> {
        let rendered = self.env.get_template("coder")?.render(context! {
            task => task.trim(),
            plan => &plan.plan,
            price => price,
        })?;
        Ok(rendered)
    }

    pub fn review(&self, code: &GeneratedCode, script_stem: &str) -> Result<String> {
        let rendered = self.env.get_template("reviewer")?.render(context! {
            description => code.description.trim(),
            code => &code.code,
            script_stem => script_stem,
        })?;
        Ok(rendered)
    }

    pub fn document(&self, code: &GeneratedCode, review: &CodeReview) -> Result<String> {
        let rendered = self.env.get_template("writer")?.render(context! {
            description => code.description.trim(),
            code => &code.code,
            review_comments => review.review_comments.join("; "),
        })?;
        Ok(rendered)
    }

    pub fn supervise(&self, code: &str, tests: &str, logs: &str) -> Result<String> {
        let rendered = self.env.get_template("supervisor")?.render(context! {
            code => code,
            tests => tests,
            logs => logs,
        })?;
        Ok(rendered)
    }

    pub fn coder_fix(&self, solution: &ProblemSolution, code: &str, logs: &str) -> Result<String> {
        let rendered = self.env.get_template("coder_fix")?.render(context! {
            instructions => solution.specific_instructions.trim(),
            expected_outcome => solution.expected_outcome.trim(),
            code => code,
            logs => logs,
        })?;
        Ok(rendered)
    }

    pub fn reviewer_fix(
        &self,
        solution: &ProblemSolution,
        tests: &str,
        logs: &str,
    ) -> Result<String> {
        let rendered = self.env.get_template("reviewer_fix")?.render(context! {
            instructions => solution.specific_instructions.trim(),
            expected_outcome => solution.expected_outcome.trim(),
            tests => tests,
            logs => logs,
        })?;
        Ok(rendered)
    }

    pub fn import_fix(&self, code: &str, logs: &str) -> Result<String> {
        let rendered = self.env.get_template("import_fix")?.render(context! {
            code => code,
            logs => logs,
        })?;
        Ok(rendered)
    }
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shapes::TargetAgent;

    fn plan() -> Plan {
        Plan {
            plan: vec!["find the price".to_string(), "write the script".to_string()],
            data_query: Some("iPhone 16 Pro price".to_string()),
            dependencies: vec![],
        }
    }

    #[test]
    fn plan_prompt_embeds_the_task() {
        let engine = PromptEngine::new();
        let prompt = engine.plan("  compute savings  ").expect("render");
        assert!(prompt.contains("compute savings"));
        assert!(prompt.contains("\"data_query\""));
    }

    #[test]
    fn code_prompt_switches_on_price_presence() {
        let engine = PromptEngine::new();
        let with_price = engine.code("task", &plan(), Some(129_990.0)).expect("render");
        assert!(with_price.contains("129990"));
        let without = engine.code("task", &plan(), None).expect("render");
        assert!(without.contains("No price could be extracted"));
    }

    #[test]
    fn review_prompt_names_the_import_module() {
        let engine = PromptEngine::new();
        let code = GeneratedCode {
            description: "d".to_string(),
            code: "def f():\n    pass".to_string(),
        };
        let prompt = engine.review(&code, "generated_script").expect("render");
        assert!(prompt.contains("from generated_script import"));
    }

    #[test]
    fn fix_prompts_carry_supervisor_instructions() {
        let engine = PromptEngine::new();
        let solution = ProblemSolution {
            problem_analysis: "a".to_string(),
            target_agent: TargetAgent::Coder,
            specific_instructions: "guard the empty case".to_string(),
            expected_outcome: "tests pass".to_string(),
        };
        let prompt = engine
            .coder_fix(&solution, "def f(): pass", "AssertionError")
            .expect("render");
        assert!(prompt.contains("guard the empty case"));
        assert!(prompt.contains("AssertionError"));
    }

    #[test]
    fn every_system_prompt_demands_json_only() {
        for role in [
            AgentRole::Planner,
            AgentRole::DataExtractor,
            AgentRole::Coder,
            AgentRole::Reviewer,
            AgentRole::TechWriter,
            AgentRole::Supervisor,
        ] {
            assert!(system_prompt(role).contains("JSON"), "role {role:?}");
        }
    }
}
