//! Executing the generated test suite, locally or in a container.

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use tracing::{info, instrument};

use crate::core::stdlib::filter_installable;
use crate::io::config::ExecutionConfig;
use crate::io::process::run_command_with_timeout;

/// Outcome of one test run. Exit code zero means the suite passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestRun {
    pub exit_code: i32,
    pub logs: String,
}

impl TestRun {
    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }
}

/// Something that can execute a shell command inside a workspace.
///
/// A run that cannot even start is reported as a failing run with the error
/// text as its logs; the repair loop treats it like any other failure.
pub trait TestRunner {
    fn run_tests(&self, workspace_dir: &Path, command: &str) -> TestRun;
}

/// Install pytest plus declared dependencies, then run the test file.
pub fn build_test_command(dependencies: &[String], tests_name: &str) -> String {
    let mut packages = vec!["pytest".to_string()];
    packages.extend(filter_installable(dependencies));
    format!(
        "pip install -q --no-cache-dir {} && PYTHONPATH=. python -m pytest {tests_name} -v --tb=short",
        packages.join(" ")
    )
}

fn execute(cmd: Command, cfg: &ExecutionConfig) -> TestRun {
    let timeout = Duration::from_secs(cfg.test_timeout_secs);
    match run_command_with_timeout(cmd, None, timeout, cfg.output_limit_bytes) {
        Ok(output) => TestRun {
            exit_code: output.status.code().unwrap_or(1),
            logs: output.combined_text(),
        },
        Err(err) => TestRun {
            exit_code: 1,
            logs: format!("failed to run tests: {err:#}"),
        },
    }
}

/// Run tests directly on the host with `sh -c`.
pub struct LocalTestRunner {
    cfg: ExecutionConfig,
}

impl LocalTestRunner {
    pub fn new(cfg: ExecutionConfig) -> Self {
        Self { cfg }
    }
}

impl TestRunner for LocalTestRunner {
    #[instrument(skip_all, fields(workspace = %workspace_dir.display()))]
    fn run_tests(&self, workspace_dir: &Path, command: &str) -> TestRun {
        info!(command, "running tests locally");
        let mut cmd = Command::new("sh");
        cmd.args(["-c", command]).current_dir(workspace_dir);
        execute(cmd, &self.cfg)
    }
}

/// Run tests inside a disposable container with the workspace mounted.
pub struct DockerTestRunner {
    cfg: ExecutionConfig,
}

impl DockerTestRunner {
    pub fn new(cfg: ExecutionConfig) -> Self {
        Self { cfg }
    }
}

impl TestRunner for DockerTestRunner {
    #[instrument(skip_all, fields(workspace = %workspace_dir.display(), image = %self.cfg.docker_image))]
    fn run_tests(&self, workspace_dir: &Path, command: &str) -> TestRun {
        info!(command, "running tests in docker");
        let mount = format!("{}:/work", workspace_dir.display());
        let mut cmd = Command::new("docker");
        cmd.args(["run", "--rm", "-v", &mount, "-w", "/work"])
            .arg(&self.cfg.docker_image)
            .args(["sh", "-c", command]);
        execute(cmd, &self.cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_cfg() -> ExecutionConfig {
        ExecutionConfig {
            test_timeout_secs: 10,
            ..ExecutionConfig::default()
        }
    }

    #[test]
    fn test_command_installs_only_third_party_deps() {
        let deps = vec!["math".to_string(), "requests".to_string()];
        let command = build_test_command(&deps, "test_generated_script.py");
        assert!(command.contains("pip install -q --no-cache-dir pytest requests && "));
        assert!(!command.contains("math"));
        assert!(command.contains("python -m pytest test_generated_script.py -v --tb=short"));
    }

    #[test]
    fn test_command_always_installs_pytest() {
        let command = build_test_command(&[], "t.py");
        assert!(command.starts_with("pip install -q --no-cache-dir pytest && "));
    }

    #[test]
    fn local_runner_reports_exit_code_and_logs() {
        let temp = tempfile::tempdir().expect("tempdir");
        let runner = LocalTestRunner::new(quick_cfg());
        let run = runner.run_tests(temp.path(), "echo failing detail; exit 2");
        assert_eq!(run.exit_code, 2);
        assert!(run.logs.contains("failing detail"));
        assert!(!run.passed());
    }

    #[test]
    fn local_runner_folds_spawn_errors_into_a_failing_run() {
        let temp = tempfile::tempdir().expect("tempdir");
        let missing = temp.path().join("gone");
        let runner = LocalTestRunner::new(quick_cfg());
        let run = runner.run_tests(&missing, "true");
        assert_eq!(run.exit_code, 1);
        assert!(run.logs.contains("failed to run tests"));
    }
}
