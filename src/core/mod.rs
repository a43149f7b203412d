//! Deterministic, pure logic shared by the pipeline.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod classify;
pub mod correction;
pub mod parse;
pub mod selection;
pub mod shapes;
pub mod stdlib;
pub mod termination;
pub mod types;
pub mod validate;
