//! Test-and-repair loop for the generated script.
//!
//! Each iteration writes the current artifacts, runs the tests, classifies
//! the failure, and picks a repair path: a first-time import failure goes
//! straight back to the coder, everything else goes through the supervisor.
//! A repeated failure fingerprint means the last fix changed nothing, which
//! always forces supervision. After the budget is spent a final check still
//! runs, so the reported outcome reflects the artifacts actually on disk.

use std::collections::HashSet;

use anyhow::Result;
use tracing::{info, instrument, warn};

use crate::core::classify::{ErrorFingerprint, FailureClass, classify};
use crate::core::shapes::ResponseShape;
use crate::escalate::{Escalation, RepairState};
use crate::invoke::{AgentInvoker, AgentSpec};
use crate::io::prompt::PromptEngine;
use crate::io::runner::{TestRun, TestRunner};
use crate::io::usage::UsageTracker;
use crate::io::workspace::Workspace;

/// Assertion failures in a row that get called out as a stuck pattern.
const ASSERTION_STREAK_LIMIT: u32 = 3;

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    TestsPassed,
    BudgetExhausted,
    RepairFailed,
}

/// Final state of the loop, with the last test run's evidence.
#[derive(Debug)]
pub struct ImprovementOutcome {
    pub stop: StopReason,
    pub iterations: u32,
    pub final_run: TestRun,
    pub state: RepairState,
}

pub struct ImprovementLoop<'a> {
    pub invoker: &'a AgentInvoker<'a>,
    pub engine: &'a PromptEngine,
    pub escalation: &'a Escalation<'a>,
    pub coder: &'a AgentSpec,
    pub workspace: &'a Workspace,
    pub runner: &'a dyn TestRunner,
    pub test_command: String,
    pub max_iterations: u32,
}

impl ImprovementLoop<'_> {
    fn write_artifacts(&self, state: &RepairState) -> Result<()> {
        self.workspace.write_script(&state.code.code)?;
        self.workspace
            .write_tests(&state.code.code, &state.review.test_code)
    }

    fn run_once(&self, state: &RepairState) -> Result<TestRun> {
        self.write_artifacts(state)?;
        Ok(self
            .runner
            .run_tests(self.workspace.dir(), &self.test_command))
    }

    /// Drive the loop to a terminal outcome. Never errors on failing tests;
    /// only artifact writes can fail.
    #[instrument(skip_all, fields(max_iterations = self.max_iterations))]
    pub fn run(&self, usage: &mut UsageTracker, state: RepairState) -> Result<ImprovementOutcome> {
        let mut state = state;
        let mut seen: HashSet<ErrorFingerprint> = HashSet::new();
        let mut assertion_streak = 0u32;
        let mut repair_failed = false;
        let mut iterations = 0;

        for iteration in 1..=self.max_iterations {
            iterations = iteration;
            let run = self.run_once(&state)?;
            if run.passed() {
                info!(iteration, "tests passed");
                return Ok(ImprovementOutcome {
                    stop: StopReason::TestsPassed,
                    iterations: iteration,
                    final_run: run,
                    state,
                });
            }

            let class = classify(&run.logs);
            let repeated = !seen.insert(ErrorFingerprint::new(&run.logs));
            if class == FailureClass::Assertion {
                assertion_streak += 1;
            } else {
                assertion_streak = 0;
            }
            info!(
                iteration,
                class = class.name(),
                repeated,
                assertion_streak,
                exit_code = run.exit_code,
                "tests failed"
            );
            if assertion_streak >= ASSERTION_STREAK_LIMIT {
                warn!(assertion_streak, "assertion failures are not converging");
            }

            let direct_import_fix = class == FailureClass::Import && !repeated;
            let repair = if direct_import_fix {
                self.direct_import_fix(usage, &state, &run.logs)
            } else {
                self.escalation
                    .supervised_fix(usage, &state, &run.logs)
                    .map(|(fixed, _target)| fixed)
            };
            match repair {
                Ok(fixed) => state = fixed,
                Err(err) => {
                    warn!(err = %err, "repair failed, keeping last artifacts");
                    repair_failed = true;
                    break;
                }
            }
        }

        // Final check: report what the artifacts on disk actually do.
        let final_run = self.run_once(&state)?;
        let stop = if final_run.passed() {
            StopReason::TestsPassed
        } else if repair_failed {
            StopReason::RepairFailed
        } else {
            StopReason::BudgetExhausted
        };
        info!(stop = ?stop, exit_code = final_run.exit_code, "final check done");
        Ok(ImprovementOutcome {
            stop,
            iterations,
            final_run,
            state,
        })
    }

    /// Import failures skip supervision: the coder can see the missing name
    /// in the logs directly.
    fn direct_import_fix(
        &self,
        usage: &mut UsageTracker,
        state: &RepairState,
        logs: &str,
    ) -> Result<RepairState> {
        let prompt = self.engine.import_fix(&state.code.code, logs)?;
        let code = self
            .invoker
            .invoke(usage, self.coder, &prompt, ResponseShape::GeneratedCode)?
            .into_generated_code()
            .ok_or_else(|| anyhow::anyhow!("coder bound to an unexpected shape"))?;
        Ok(RepairState {
            code,
            review: state.review.clone(),
        })
    }
}
