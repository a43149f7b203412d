//! The six structured response shapes agents must produce.
//!
//! Each shape is a fixed record validated on construction: an instance that
//! exists satisfies its field-presence and type constraints. The closed
//! [`StructuredResponse`] union carries exactly one variant per shape, and
//! callers always request a specific [`ResponseShape`] discriminant rather
//! than sniffing fields.

use serde::{Deserialize, Serialize};
use serde_json::json;

/// Discriminant naming one of the six response shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseShape {
    Plan,
    ExtractedData,
    GeneratedCode,
    CodeReview,
    Documentation,
    ProblemSolution,
}

impl ResponseShape {
    pub fn name(self) -> &'static str {
        match self {
            ResponseShape::Plan => "Plan",
            ResponseShape::ExtractedData => "ExtractedData",
            ResponseShape::GeneratedCode => "GeneratedCode",
            ResponseShape::CodeReview => "CodeReview",
            ResponseShape::Documentation => "Documentation",
            ResponseShape::ProblemSolution => "ProblemSolution",
        }
    }

    /// Concrete example instance, echoed verbatim in corrective prompts.
    pub fn example(self) -> serde_json::Value {
        match self {
            ResponseShape::Plan => json!({
                "plan": ["analyze the task", "find required data", "write the script"],
                "data_query": "current price of the product",
                "dependencies": ["requests"]
            }),
            ResponseShape::ExtractedData => json!({ "price": 123456.78 }),
            ResponseShape::GeneratedCode => json!({
                "description": "Script that computes how many working days are needed",
                "code": "def calculate_days(monthly_salary):\n    price = 139990.0\n    return int(price / (monthly_salary / 22.5))\n\nif __name__ == '__main__':\n    print(calculate_days(50000))"
            }),
            ResponseShape::CodeReview => json!({
                "review_comments": ["code matches the requirements", "error handling added"],
                "test_code": "from generated_script import calculate_days\n\ndef test_calculate_days():\n    assert calculate_days(50000) == 62",
                "improvements": ["add a docstring"]
            }),
            ResponseShape::Documentation => json!({
                "title": "Savings calculator",
                "description": "Computes the number of working days needed to save up",
                "usage_examples": ["calculate_days(50000)"],
                "api_documentation": "calculate_days(monthly_salary: float) -> int"
            }),
            ResponseShape::ProblemSolution => json!({
                "problem_analysis": "The tests expect the wrong value for calculate_days",
                "target_agent": "Reviewer",
                "specific_instructions": "Fix the expected value in the assert to match the code logic",
                "expected_outcome": "Tests pass with the corrected expected value"
            }),
        }
    }
}

/// Step-by-step implementation plan from the planner agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Ordered implementation steps.
    pub plan: Vec<String>,
    /// Web-search query when external data is needed, `None` otherwise.
    #[serde(default)]
    pub data_query: Option<String>,
    /// Libraries the generated script will need.
    pub dependencies: Vec<String>,
}

/// Numeric datum recovered by the data-extraction agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedData {
    /// Extracted price, `None` when nothing was found.
    pub price: Option<f64>,
}

/// Script produced by the coder agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedCode {
    pub description: String,
    /// Full script source. May arrive with escaped newlines on the wire.
    pub code: String,
}

/// Review and test suite produced by the reviewer agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeReview {
    pub review_comments: Vec<String>,
    pub test_code: String,
    #[serde(default)]
    pub improvements: Vec<String>,
}

/// Project documentation produced by the technical writer agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Documentation {
    pub title: String,
    pub description: String,
    pub usage_examples: Vec<String>,
    pub api_documentation: String,
}

/// Which agent the supervisor routes a fix to. Closed set of two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetAgent {
    Coder,
    Reviewer,
}

impl TargetAgent {
    pub fn name(self) -> &'static str {
        match self {
            TargetAgent::Coder => "Coder",
            TargetAgent::Reviewer => "Reviewer",
        }
    }
}

/// Supervisor diagnosis: who is at fault and what exactly to change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemSolution {
    pub problem_analysis: String,
    pub target_agent: TargetAgent,
    pub specific_instructions: String,
    pub expected_outcome: String,
}

/// Tagged union over the six shapes. No partially-valid instance exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StructuredResponse {
    Plan(Plan),
    ExtractedData(ExtractedData),
    GeneratedCode(GeneratedCode),
    CodeReview(CodeReview),
    Documentation(Documentation),
    ProblemSolution(ProblemSolution),
}

impl StructuredResponse {
    pub fn shape(&self) -> ResponseShape {
        match self {
            StructuredResponse::Plan(_) => ResponseShape::Plan,
            StructuredResponse::ExtractedData(_) => ResponseShape::ExtractedData,
            StructuredResponse::GeneratedCode(_) => ResponseShape::GeneratedCode,
            StructuredResponse::CodeReview(_) => ResponseShape::CodeReview,
            StructuredResponse::Documentation(_) => ResponseShape::Documentation,
            StructuredResponse::ProblemSolution(_) => ResponseShape::ProblemSolution,
        }
    }

    pub fn into_plan(self) -> Option<Plan> {
        match self {
            StructuredResponse::Plan(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn into_extracted_data(self) -> Option<ExtractedData> {
        match self {
            StructuredResponse::ExtractedData(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn into_generated_code(self) -> Option<GeneratedCode> {
        match self {
            StructuredResponse::GeneratedCode(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn into_code_review(self) -> Option<CodeReview> {
        match self {
            StructuredResponse::CodeReview(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn into_documentation(self) -> Option<Documentation> {
        match self {
            StructuredResponse::Documentation(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn into_problem_solution(self) -> Option<ProblemSolution> {
        match self {
            StructuredResponse::ProblemSolution(inner) => Some(inner),
            _ => None,
        }
    }
}
