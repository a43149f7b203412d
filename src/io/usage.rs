//! Token usage accounting.
//!
//! The backend does not report usage, so tokens are estimated from text.
//! Accounting is observational: it never influences retries or budgets.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::io::config::UsageConfig;

/// Rough token estimate: the larger of a character-based and a word-based
/// guess, which tracks real tokenizers well enough for accounting.
pub fn estimate_tokens(text: &str) -> u64 {
    let by_chars = text.chars().count() as f64 / 3.5;
    let by_words = text.split_whitespace().count() as f64 * 1.3;
    by_chars.max(by_words) as u64
}

/// Per-agent tallies.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AgentUsage {
    pub calls: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Accumulates estimated usage across the whole run.
#[derive(Debug, Default)]
pub struct UsageTracker {
    cfg: UsageConfig,
    per_agent: BTreeMap<String, AgentUsage>,
}

impl UsageTracker {
    pub fn new(cfg: UsageConfig) -> Self {
        Self {
            cfg,
            per_agent: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, agent: &str, prompt: &str, response: &str) {
        let usage = self.per_agent.entry(agent.to_string()).or_default();
        usage.calls += 1;
        usage.input_tokens += estimate_tokens(prompt);
        usage.output_tokens += estimate_tokens(response);
    }

    pub fn agent(&self, agent: &str) -> AgentUsage {
        self.per_agent.get(agent).copied().unwrap_or_default()
    }

    pub fn total_tokens(&self) -> u64 {
        self.per_agent
            .values()
            .map(|u| u.input_tokens + u.output_tokens)
            .sum()
    }

    pub fn total_cost(&self) -> f64 {
        self.per_agent
            .values()
            .map(|u| {
                u.input_tokens as f64 / 1_000.0 * self.cfg.input_cost_per_1k
                    + u.output_tokens as f64 / 1_000.0 * self.cfg.output_cost_per_1k
            })
            .sum()
    }

    /// Human-readable session summary.
    pub fn summary(&self) -> String {
        let mut out = String::from("token usage summary\n");
        for (agent, usage) in &self.per_agent {
            let _ = writeln!(
                out,
                "  {agent}: {} calls, {} in, {} out",
                usage.calls, usage.input_tokens, usage.output_tokens
            );
        }
        let _ = writeln!(
            out,
            "  total: {} tokens, estimated cost ${:.4}",
            self.total_tokens(),
            self.total_cost()
        );
        out
    }

    /// Append the summary to `tokens_usage.log` in the workspace and log it.
    pub fn write_log(&self, workspace_dir: &Path) -> Result<()> {
        let summary = self.summary();
        info!(total_tokens = self.total_tokens(), "usage recorded");
        let path = workspace_dir.join("tokens_usage.log");
        let mut existing = fs::read_to_string(&path).unwrap_or_default();
        existing.push_str(&summary);
        fs::write(&path, existing).with_context(|| format!("write {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_takes_the_larger_guess() {
        // 35 chars / 3.5 = 10, one word * 1.3 = 1: chars win.
        assert_eq!(estimate_tokens(&("ab".repeat(17) + "c")), 10);
        // short words: word guess wins over chars.
        assert_eq!(estimate_tokens("a b c d e f g h"), 10);
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn record_accumulates_per_agent() {
        let mut tracker = UsageTracker::new(UsageConfig::default());
        tracker.record("coder", "write a function please now", "def f(): pass");
        tracker.record("coder", "fix it", "done");
        assert_eq!(tracker.agent("coder").calls, 2);
        assert!(tracker.agent("coder").input_tokens > 0);
        assert_eq!(tracker.agent("planner"), AgentUsage::default());
    }

    #[test]
    fn write_log_appends_summary() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut tracker = UsageTracker::new(UsageConfig::default());
        tracker.record("planner", "plan the task", "{\"plan\": []}");
        tracker.write_log(temp.path()).expect("write once");
        tracker.write_log(temp.path()).expect("write twice");
        let log = fs::read_to_string(temp.path().join("tokens_usage.log")).expect("read");
        assert_eq!(log.matches("token usage summary").count(), 2);
        assert!(log.contains("planner"));
    }
}
