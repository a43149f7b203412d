//! Attempt failure taxonomy and corrective prompt construction.
//!
//! Retry scheduling lives in the invoker; this module only names what went
//! wrong with one attempt and builds the follow-up prompt as a pure function
//! of that failure, so prompt text can be tested without a model in the loop.

use crate::core::shapes::ResponseShape;
use crate::core::validate::ValidationFailure;

/// Phrases that betray leaked chain-of-thought instead of an answer.
pub const REASONING_MARKERS: [&str; 5] = ["<think>", "Okay, let", "Let me", "I need to", "Sure,"];

/// Offending output is quoted back at most this long.
const QUOTED_OUTPUT_LIMIT: usize = 500;

/// What went wrong with a single invocation attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptError {
    /// The turn produced no selectable answer at all.
    EmptyResponse,
    /// The answer contains a reasoning marker instead of a clean payload.
    LeakedReasoning { marker: &'static str },
    /// No extraction tier produced a JSON object.
    ParseFailure { output: String },
    /// A payload was extracted but did not satisfy the expected shape.
    InvalidShape {
        output: String,
        failure: ValidationFailure,
    },
}

impl AttemptError {
    pub fn kind(&self) -> &'static str {
        match self {
            AttemptError::EmptyResponse => "empty_response",
            AttemptError::LeakedReasoning { .. } => "leaked_reasoning",
            AttemptError::ParseFailure { .. } => "parse_failure",
            AttemptError::InvalidShape { .. } => "invalid_shape",
        }
    }
}

/// Detect a leaked-reasoning marker anywhere in an answer.
pub fn leaked_reasoning(text: &str) -> Option<&'static str> {
    REASONING_MARKERS
        .into_iter()
        .find(|marker| text.contains(marker))
}

/// Build the follow-up prompt for a failed attempt.
///
/// The prompt quotes the offending output (truncated), shows a concrete
/// example of the expected shape, and restates the original task so the
/// model does not drift onto fixing the error message instead.
pub fn corrective_prompt(error: &AttemptError, shape: ResponseShape, original_task: &str) -> String {
    let example = serde_json::to_string_pretty(&shape.example())
        .unwrap_or_else(|_| shape.example().to_string());
    let mut prompt = match error {
        AttemptError::EmptyResponse => {
            "Your previous response was empty. Respond with the JSON object only.\n".to_string()
        }
        AttemptError::LeakedReasoning { marker } => format!(
            "Your previous response contained reasoning text ({marker:?}) instead of a bare answer. \
             Do not narrate your thinking. Respond with the JSON object only.\n"
        ),
        AttemptError::ParseFailure { output } => {
            let mut prompt = format!(
                "Your previous response did not contain a parseable JSON object.\n\
                 Previous response:\n{}\n",
                truncate(output)
            );
            if shape == ResponseShape::GeneratedCode {
                prompt.push_str(
                    "Escape every newline inside the \"code\" string as \\n so the object stays \
                     valid JSON.\n",
                );
            }
            prompt
        }
        AttemptError::InvalidShape { output, failure } => format!(
            "Your previous response was JSON but did not match the required structure.\n\
             Problems:\n{failure}\n\
             Previous response:\n{}\n",
            truncate(output)
        ),
    };
    prompt.push_str(&format!(
        "\nRespond with exactly one JSON object of this form:\n{example}\n\nOriginal task:\n{original_task}\n"
    ));
    prompt
}

fn truncate(output: &str) -> &str {
    match output.char_indices().nth(QUOTED_OUTPUT_LIMIT) {
        Some((idx, _)) => &output[..idx],
        None => output,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_each_reasoning_marker() {
        for marker in REASONING_MARKERS {
            let text = format!("{marker} work through this step by step");
            assert_eq!(leaked_reasoning(&text), Some(marker), "marker {marker:?}");
        }
        assert_eq!(leaked_reasoning("{\"price\": 1}"), None);
    }

    #[test]
    fn detects_a_marker_buried_mid_answer() {
        let text = "Here is the plan. Okay, let me reconsider the steps first.";
        assert_eq!(leaked_reasoning(text), Some("Okay, let"));
    }

    #[test]
    fn prompt_quotes_output_and_example_and_task() {
        let error = AttemptError::ParseFailure {
            output: "no json here".to_string(),
        };
        let prompt = corrective_prompt(&error, ResponseShape::Plan, "compute savings");
        assert!(prompt.contains("no json here"));
        assert!(prompt.contains("\"plan\""));
        assert!(prompt.contains("compute savings"));
    }

    #[test]
    fn prompt_truncates_long_output() {
        let error = AttemptError::ParseFailure {
            output: "x".repeat(5_000),
        };
        let prompt = corrective_prompt(&error, ResponseShape::Plan, "task");
        assert!(prompt.len() < 2_000);
    }

    #[test]
    fn code_parse_failure_mentions_newline_escaping() {
        let error = AttemptError::ParseFailure {
            output: "{\"description\": \"d\", \"code\": \"def f():\n pass\"}".to_string(),
        };
        let prompt = corrective_prompt(&error, ResponseShape::GeneratedCode, "task");
        assert!(prompt.contains("\\n"));
    }

    #[test]
    fn prompt_is_deterministic() {
        let error = AttemptError::EmptyResponse;
        let a = corrective_prompt(&error, ResponseShape::Documentation, "task");
        let b = corrective_prompt(&error, ResponseShape::Documentation, "task");
        assert_eq!(a, b);
    }
}
