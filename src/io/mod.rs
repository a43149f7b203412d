//! Side-effecting operations: HTTP, filesystem, child processes.

pub mod config;
pub mod model;
pub mod process;
pub mod prompt;
pub mod runner;
pub mod tools;
pub mod usage;
pub mod workspace;
