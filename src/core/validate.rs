//! Schema validation and binding of extracted payloads.
//!
//! Each response shape has a JSON Schema (Draft 2020-12) embedded from
//! `schemas/`. Validation runs the schema check first so failures name the
//! offending fields, then binds the value into the matching
//! [`StructuredResponse`] variant. The caller always states which shape it
//! expects; nothing is inferred from the payload.

use std::fmt;
use std::sync::LazyLock;

use jsonschema::{Draft, Validator};
use serde_json::Value;

use crate::core::shapes::{ResponseShape, StructuredResponse};

static PLAN_SCHEMA: LazyLock<Validator> =
    LazyLock::new(|| compile(include_str!("../../schemas/plan.schema.json")));
static EXTRACTED_DATA_SCHEMA: LazyLock<Validator> =
    LazyLock::new(|| compile(include_str!("../../schemas/extracted_data.schema.json")));
static GENERATED_CODE_SCHEMA: LazyLock<Validator> =
    LazyLock::new(|| compile(include_str!("../../schemas/generated_code.schema.json")));
static CODE_REVIEW_SCHEMA: LazyLock<Validator> =
    LazyLock::new(|| compile(include_str!("../../schemas/code_review.schema.json")));
static DOCUMENTATION_SCHEMA: LazyLock<Validator> =
    LazyLock::new(|| compile(include_str!("../../schemas/documentation.schema.json")));
static PROBLEM_SOLUTION_SCHEMA: LazyLock<Validator> =
    LazyLock::new(|| compile(include_str!("../../schemas/problem_solution.schema.json")));

fn compile(raw: &str) -> Validator {
    let schema: Value = serde_json::from_str(raw).expect("parse embedded schema");
    jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .expect("compile embedded schema")
}

fn validator_for(shape: ResponseShape) -> &'static Validator {
    match shape {
        ResponseShape::Plan => &PLAN_SCHEMA,
        ResponseShape::ExtractedData => &EXTRACTED_DATA_SCHEMA,
        ResponseShape::GeneratedCode => &GENERATED_CODE_SCHEMA,
        ResponseShape::CodeReview => &CODE_REVIEW_SCHEMA,
        ResponseShape::Documentation => &DOCUMENTATION_SCHEMA,
        ResponseShape::ProblemSolution => &PROBLEM_SOLUTION_SCHEMA,
    }
}

/// One schema violation, located by instance path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub path: String,
    pub message: String,
}

/// Why a payload did not bind to the expected shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    pub shape: ResponseShape,
    pub errors: Vec<FieldError>,
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "payload does not match {}:", self.shape.name())?;
        for err in &self.errors {
            write!(f, "\n- {}: {}", err.path, err.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationFailure {}

/// Validate `value` against the schema for `shape` and bind it.
///
/// Validation is idempotent: re-validating the serialized form of a returned
/// instance succeeds against the same shape.
pub fn validate(shape: ResponseShape, value: &Value) -> Result<StructuredResponse, ValidationFailure> {
    let compiled = validator_for(shape);
    let errors: Vec<FieldError> = compiled
        .iter_errors(value)
        .map(|err| FieldError {
            path: err.instance_path().to_string(),
            message: err.to_string(),
        })
        .collect();
    if !errors.is_empty() {
        return Err(ValidationFailure { shape, errors });
    }
    bind(shape, value).map_err(|err| ValidationFailure {
        shape,
        errors: vec![FieldError {
            path: String::new(),
            message: err.to_string(),
        }],
    })
}

fn bind(shape: ResponseShape, value: &Value) -> Result<StructuredResponse, serde_json::Error> {
    let value = value.clone();
    Ok(match shape {
        ResponseShape::Plan => StructuredResponse::Plan(serde_json::from_value(value)?),
        ResponseShape::ExtractedData => {
            StructuredResponse::ExtractedData(serde_json::from_value(value)?)
        }
        ResponseShape::GeneratedCode => {
            StructuredResponse::GeneratedCode(serde_json::from_value(value)?)
        }
        ResponseShape::CodeReview => StructuredResponse::CodeReview(serde_json::from_value(value)?),
        ResponseShape::Documentation => {
            StructuredResponse::Documentation(serde_json::from_value(value)?)
        }
        ResponseShape::ProblemSolution => {
            StructuredResponse::ProblemSolution(serde_json::from_value(value)?)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plan_with_null_data_query_is_valid() {
        let value = json!({"plan": ["step"], "data_query": null, "dependencies": []});
        let bound = validate(ResponseShape::Plan, &value).expect("valid plan");
        let plan = bound.into_plan().expect("plan variant");
        assert_eq!(plan.data_query, None);
    }

    #[test]
    fn missing_required_field_names_the_field() {
        let value = json!({"plan": ["step"]});
        let failure = validate(ResponseShape::Plan, &value).expect_err("invalid");
        assert_eq!(failure.shape, ResponseShape::Plan);
        assert!(
            failure
                .errors
                .iter()
                .any(|e| e.message.contains("dependencies")),
            "errors: {failure}"
        );
    }

    #[test]
    fn wrong_type_is_rejected_before_binding() {
        let value = json!({"price": "139990"});
        let failure = validate(ResponseShape::ExtractedData, &value).expect_err("invalid");
        assert!(failure.errors.iter().any(|e| e.path.contains("price")));
    }

    #[test]
    fn shape_choice_is_the_callers_not_the_payloads() {
        // A valid code payload still fails when the caller expects a review.
        let value = json!({"description": "d", "code": "pass"});
        assert!(validate(ResponseShape::GeneratedCode, &value).is_ok());
        assert!(validate(ResponseShape::CodeReview, &value).is_err());
    }

    #[test]
    fn validation_is_idempotent() {
        let value = json!({
            "problem_analysis": "tests fail on empty input",
            "target_agent": "Coder",
            "specific_instructions": "guard the empty case",
            "expected_outcome": "tests pass",
        });
        let bound = validate(ResponseShape::ProblemSolution, &value).expect("valid");
        let reserialized = serde_json::to_value(&bound).expect("serialize");
        assert!(validate(ResponseShape::ProblemSolution, &reserialized).is_ok());
    }

    #[test]
    fn code_review_defaults_optional_improvements() {
        let value = json!({"review_comments": ["fine"], "test_code": "def test(): pass"});
        let bound = validate(ResponseShape::CodeReview, &value).expect("valid");
        let review = bound.into_code_review().expect("review variant");
        assert!(review.improvements.is_empty());
    }
}
