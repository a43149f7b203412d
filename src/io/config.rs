//! Pipeline configuration (TOML).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::types::AgentRole;

/// Pipeline configuration.
///
/// This file is intended to be edited by humans and must remain stable and
/// automatable. Missing fields default to sensible values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Assumed price when extraction exhausts its retries. Unset means the
    /// pipeline records no price and the generated program must cope.
    ///
    /// Kept ahead of the tables so TOML can serialize it.
    pub fallback_price: Option<f64>,

    pub model: ModelConfig,
    pub limits: LimitConfig,
    pub execution: ExecutionConfig,
    pub workspace: WorkspaceConfig,
    pub usage: UsageConfig,
}

/// Model backend settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    /// OpenAI-compatible chat completions endpoint base, e.g. a local
    /// `http://localhost:11434/v1`.
    pub base_url: String,
    pub api_key: String,
    /// Model used unless a per-role override applies.
    pub default_model: String,
    /// Heavier model for code generation and supervision.
    pub coder_model: String,
    pub temperature: f64,
    pub coder_temperature: f64,
    pub request_timeout_secs: u64,
}

/// Retry and turn budgets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LimitConfig {
    /// Invocation attempts per agent call.
    pub max_retries: u32,
    /// Data extraction gets a smaller budget; it has a recovery fast path.
    pub extractor_retries: u32,
    /// Model turns within one attempt.
    pub max_turns: u32,
    /// Extraction may need tool rounds, so it gets more turns.
    pub extractor_max_turns: u32,
    /// Test-and-repair iterations before the final check.
    pub max_improvement_loops: u32,
}

/// How generated tests are executed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Run tests inside a disposable container instead of the host.
    pub use_docker: bool,
    pub docker_image: String,
    pub test_timeout_secs: u64,
    /// Truncate test run stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

/// Where artifacts land.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WorkspaceConfig {
    pub dir: String,
    pub script_name: String,
    pub tests_name: String,
}

/// Token accounting rates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UsageConfig {
    pub input_cost_per_1k: f64,
    pub output_cost_per_1k: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434/v1".to_string(),
            api_key: "unused".to_string(),
            default_model: "qwen3:8b".to_string(),
            coder_model: "qwen3:14b".to_string(),
            temperature: 0.3,
            coder_temperature: 0.1,
            request_timeout_secs: 300,
        }
    }
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            extractor_retries: 2,
            max_turns: 1,
            extractor_max_turns: 3,
            max_improvement_loops: 10,
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            use_docker: false,
            docker_image: "python:3.11".to_string(),
            test_timeout_secs: 10 * 60,
            output_limit_bytes: 100_000,
        }
    }
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            dir: "workspace".to_string(),
            script_name: "generated_script.py".to_string(),
            tests_name: "test_generated_script.py".to_string(),
        }
    }
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self {
            input_cost_per_1k: 0.0001,
            output_cost_per_1k: 0.0002,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fallback_price: None,
            model: ModelConfig::default(),
            limits: LimitConfig::default(),
            execution: ExecutionConfig::default(),
            workspace: WorkspaceConfig::default(),
            usage: UsageConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.model.base_url.trim().is_empty() {
            return Err(anyhow!("model.base_url must not be empty"));
        }
        if self.model.default_model.trim().is_empty() || self.model.coder_model.trim().is_empty() {
            return Err(anyhow!("model names must not be empty"));
        }
        if self.limits.max_retries == 0 || self.limits.extractor_retries == 0 {
            return Err(anyhow!("retry budgets must be > 0"));
        }
        if self.limits.max_turns == 0 || self.limits.extractor_max_turns == 0 {
            return Err(anyhow!("turn budgets must be > 0"));
        }
        if self.execution.test_timeout_secs == 0 {
            return Err(anyhow!("execution.test_timeout_secs must be > 0"));
        }
        if self.execution.output_limit_bytes == 0 {
            return Err(anyhow!("execution.output_limit_bytes must be > 0"));
        }
        if self.workspace.script_name.trim().is_empty()
            || self.workspace.tests_name.trim().is_empty()
        {
            return Err(anyhow!("workspace file names must not be empty"));
        }
        if let Some(price) = self.fallback_price {
            if !price.is_finite() || price <= 0.0 {
                return Err(anyhow!("fallback_price must be a positive number"));
            }
        }
        Ok(())
    }

    /// Model name for a role; code-heavy roles get the coder model.
    pub fn model_for(&self, role: AgentRole) -> &str {
        match role {
            AgentRole::Coder | AgentRole::Supervisor => &self.model.coder_model,
            _ => &self.model.default_model,
        }
    }

    /// Sampling temperature for a role.
    pub fn temperature_for(&self, role: AgentRole) -> f64 {
        match role {
            AgentRole::Coder | AgentRole::Supervisor => self.model.coder_temperature,
            _ => self.model.temperature,
        }
    }

    /// Retry budget for a role.
    pub fn retries_for(&self, role: AgentRole) -> u32 {
        match role {
            AgentRole::DataExtractor => self.limits.extractor_retries,
            _ => self.limits.max_retries,
        }
    }

    /// Turn budget for a role.
    pub fn turns_for(&self, role: AgentRole) -> u32 {
        match role {
            AgentRole::DataExtractor => self.limits.extractor_max_turns,
            _ => self.limits.max_turns,
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `PipelineConfig::default()`.
pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    if !path.exists() {
        let cfg = PipelineConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: PipelineConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &PipelineConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
