//! Deciding when an agent's turn is complete.
//!
//! Rules are checked in priority order; the first that applies wins. A
//! pending tool call always keeps the turn open, whatever the text around it
//! says.

use crate::core::parse::extract_candidate;
use crate::core::shapes::ResponseShape;
use crate::core::types::TurnMessage;

/// Explicit completion sentinel agents are instructed to emit.
pub const TERMINATE_SENTINEL: &str = "TERMINATE";

/// Below this many characters a message cannot be a real answer.
pub const MIN_ANSWER_LEN: usize = 10;

/// Why a turn was considered complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Sentinel,
    Empty,
    TooShort,
    StructuredAnswer(ResponseShape),
}

/// Apply the termination rules to the latest message of a turn.
///
/// Returns `None` while the turn should continue.
pub fn check_termination(message: &TurnMessage) -> Option<Termination> {
    if message.has_pending_tool_call() {
        return None;
    }
    let trimmed = message.content.trim();
    if trimmed == TERMINATE_SENTINEL {
        return Some(Termination::Sentinel);
    }
    if trimmed.is_empty() {
        return Some(Termination::Empty);
    }
    // Characters, not bytes: short Cyrillic replies are still too short.
    if trimmed.chars().count() < MIN_ANSWER_LEN {
        return Some(Termination::TooShort);
    }
    if let Some(shape) = sniff_shape(trimmed) {
        return Some(Termination::StructuredAnswer(shape));
    }
    None
}

/// Recognize a payload by its characteristic field set, without validating.
fn sniff_shape(text: &str) -> Option<ResponseShape> {
    let candidate = extract_candidate(text)?;
    let obj = candidate.value.as_object()?;
    let has = |key: &str| obj.contains_key(key);
    if has("plan") && has("dependencies") {
        return Some(ResponseShape::Plan);
    }
    if has("price") {
        return Some(ResponseShape::ExtractedData);
    }
    if has("description") && has("code") {
        return Some(ResponseShape::GeneratedCode);
    }
    if has("review_comments") && has("test_code") {
        return Some(ResponseShape::CodeReview);
    }
    if has("title") && has("api_documentation") {
        return Some(ResponseShape::Documentation);
    }
    if has("problem_analysis") && has("target_agent") {
        return Some(ResponseShape::ProblemSolution);
    }
    None
}
