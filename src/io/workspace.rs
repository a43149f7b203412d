//! Workspace layout and artifact writing.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::debug;

use crate::core::shapes::{CodeReview, Documentation};
use crate::io::config::WorkspaceConfig;

static DEF_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^def\s+(\w+)\s*\(").expect("def pattern"));

/// Where generated artifacts live for one run.
#[derive(Debug, Clone)]
pub struct Workspace {
    dir: PathBuf,
    script_name: String,
    tests_name: String,
}

impl Workspace {
    /// Create the workspace directory if needed.
    pub fn create(root: &Path, cfg: &WorkspaceConfig) -> Result<Self> {
        let dir = root.join(&cfg.dir);
        fs::create_dir_all(&dir)
            .with_context(|| format!("create workspace {}", dir.display()))?;
        Ok(Self {
            dir,
            script_name: cfg.script_name.clone(),
            tests_name: cfg.tests_name.clone(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn tests_name(&self) -> &str {
        &self.tests_name
    }

    /// Module name tests import the script under.
    pub fn script_stem(&self) -> &str {
        self.script_name
            .strip_suffix(".py")
            .unwrap_or(&self.script_name)
    }

    pub fn write_script(&self, code: &str) -> Result<()> {
        self.write(&self.script_name, code)
    }

    /// Write the test file, repairing a missing import of the script first.
    pub fn write_tests(&self, script: &str, test_code: &str) -> Result<()> {
        let repaired = fix_test_imports(script, test_code, self.script_stem());
        self.write(&self.tests_name, &repaired)
    }

    pub fn write_readme(&self, docs: &Documentation, review: &CodeReview) -> Result<()> {
        self.write("README.md", &render_readme(docs, review))
    }

    fn write(&self, name: &str, contents: &str) -> Result<()> {
        let path = self.dir.join(name);
        debug!(path = %path.display(), "writing artifact");
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))
    }
}

/// Prepend an import of the script's functions when the tests forgot one.
///
/// Reviewer output frequently calls the functions under test without
/// importing the module; that fails collection with a NameError before a
/// single test runs.
pub fn fix_test_imports(script: &str, test_code: &str, script_stem: &str) -> String {
    if test_code.contains(&format!("import {script_stem}"))
        || test_code.contains(&format!("from {script_stem}"))
    {
        return test_code.to_string();
    }
    let names: Vec<&str> = DEF_NAME
        .captures_iter(script)
        .map(|caps| caps.get(1).map_or("", |m| m.as_str()))
        .filter(|name| !name.starts_with('_'))
        .collect();
    if names.is_empty() {
        return test_code.to_string();
    }
    format!(
        "from {script_stem} import {}\n\n{test_code}",
        names.join(", ")
    )
}

fn render_readme(docs: &Documentation, review: &CodeReview) -> String {
    let usage = docs
        .usage_examples
        .iter()
        .map(|example| format!("```\n{}\n```", example.trim()))
        .collect::<Vec<_>>()
        .join("\n\n");
    let mut out = format!(
        "# {}\n\n{}\n\n## Usage\n\n{}\n\n## API\n\n{}\n\n## Review notes\n\n{}\n",
        docs.title.trim(),
        docs.description.trim(),
        usage,
        docs.api_documentation.trim(),
        review
            .review_comments
            .iter()
            .map(|comment| format!("- {}", comment.trim()))
            .collect::<Vec<_>>()
            .join("\n"),
    );
    if !review.improvements.is_empty() {
        out.push_str("\n## Possible improvements\n\n");
        for item in &review.improvements {
            out.push_str(&format!("- {}\n", item.trim()));
        }
    }
    out
}
