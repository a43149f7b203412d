//! Multi-agent code generation pipeline over unreliable model output.
//!
//! A task flows through planning, optional data extraction, code generation,
//! review, a bounded test-and-repair loop, and documentation. Model output is
//! treated as untrusted text: every answer is extracted, schema-validated,
//! and retried with corrective prompts before anything downstream sees it.
//! The architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (parsing, validation, selection,
//!   classification). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (HTTP, filesystem, child
//!   processes). Isolated behind traits to enable scripting in tests.
//!
//! Orchestration modules ([`invoke`], [`escalate`], [`improve`],
//! [`pipeline`]) coordinate core logic with I/O.

pub mod core;
pub mod escalate;
pub mod improve;
pub mod invoke;
pub mod io;
pub mod logging;
pub mod pipeline;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
