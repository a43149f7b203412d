//! Extraction of structured payloads from raw agent text.
//!
//! Models wrap their JSON in markdown fences, reasoning markers, or prose.
//! Extraction runs an ordered chain of fallible tiers with early exit: a tier
//! matches only when its captured span parses as JSON, otherwise the next
//! tier gets a chance. The winning tier is reported so callers can log which
//! recovery path fired. When no tier matches the result is `None`, never an
//! empty-but-valid object.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::core::shapes::GeneratedCode;

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"```json\s*(\{[\s\S]*?\})\s*```").expect("fenced block pattern")
});
static TIGHT_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[^{}]*\}").expect("tight object pattern"));
static LOOSE_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[\s\S]*\}").expect("loose object pattern"));
static REASONING_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("reasoning pattern"));

static DESCRIPTION_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""description"\s*:\s*"([^"]*)""#).expect("description pattern"));
static CODE_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)"code"\s*:\s*"(.*?)"\s*[,}]"#).expect("code field pattern")
});
static CODE_FIELD_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)"code"\s*:\s*"(.*)"#).expect("open code field pattern"));

static PRICE_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\{\s*"price"\s*:\s*[^}]+\}"#).expect("price object pattern"));
static PRICE_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""price"\s*:\s*([\d.]+)"#).expect("price field pattern"));
static PRICE_NEAR_CURRENCY: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(\d{1,3}(?:\s?\d{3})*)\s*руб",
        r"(\d{1,3}(?:\s?\d{3})*)\s*₽",
        // A quote in the gap means the quoted "price" field form; that is
        // left to the field pattern below, which keeps the fraction.
        r#"(?i)price[^\d"]{0,20}(\d{1,3}(?:\s?\d{3})*)"#,
        r#"(?i)цена[^\d"]{0,20}(\d{1,3}(?:\s?\d{3})*)"#,
    ]
    .iter()
    .map(|p| Regex::new(p).expect("price recovery pattern"))
    .collect()
});

/// Plausible bound for the price-recovery fast path.
pub const PRICE_MIN: f64 = 50_000.0;
pub const PRICE_MAX: f64 = 300_000.0;

/// Substituted when the field-level fallback recovers a description but no
/// code; running it fails tests, which routes the iteration into repair
/// instead of aborting the pipeline.
pub const PLACEHOLDER_PROGRAM: &str = "def main():\n    raise NotImplementedError('code was not recovered from the agent response')\n\nif __name__ == '__main__':\n    main()\n";

/// Which extraction tier produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseTier {
    /// Explicit ```json fenced block.
    FencedBlock,
    /// Flat single-level object without nested braces.
    TightObject,
    /// Greedy outer braces spanning the largest nested region.
    LooseObject,
    /// Loose match after stripping reasoning delimiters.
    ReasoningStripped,
}

impl ParseTier {
    pub fn name(self) -> &'static str {
        match self {
            ParseTier::FencedBlock => "fenced_block",
            ParseTier::TightObject => "tight_object",
            ParseTier::LooseObject => "loose_object",
            ParseTier::ReasoningStripped => "reasoning_stripped",
        }
    }
}

/// A JSON object recovered from agent text, tagged with the tier that won.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub tier: ParseTier,
    pub value: Value,
}

/// Remove paired reasoning delimiters the model sometimes emits.
pub fn strip_reasoning(text: &str) -> String {
    REASONING_BLOCK.replace_all(text, "").trim().to_string()
}

fn parse_object(payload: &str) -> Option<Value> {
    serde_json::from_str::<Value>(payload)
        .ok()
        .filter(Value::is_object)
}

/// Run the ordered tier chain; the first tier whose span parses wins.
pub fn extract_candidate(text: &str) -> Option<Candidate> {
    if let Some(value) = FENCED_BLOCK
        .captures(text)
        .and_then(|caps| parse_object(caps[1].trim()))
    {
        return Some(Candidate {
            tier: ParseTier::FencedBlock,
            value,
        });
    }
    // Anchor the tight tier at the first opening brace so it cannot grab an
    // inner fragment of a nested object that belongs to the loose tier.
    if let Some(start) = text.find('{') {
        if let Some(value) = TIGHT_OBJECT
            .find_at(text, start)
            .filter(|found| found.start() == start)
            .and_then(|found| parse_object(found.as_str()))
        {
            return Some(Candidate {
                tier: ParseTier::TightObject,
                value,
            });
        }
    }
    if let Some(value) = LOOSE_OBJECT
        .find(text)
        .and_then(|found| parse_object(found.as_str()))
    {
        return Some(Candidate {
            tier: ParseTier::LooseObject,
            value,
        });
    }
    let stripped = strip_reasoning(text);
    if let Some(value) = LOOSE_OBJECT
        .find(&stripped)
        .and_then(|found| parse_object(found.as_str()))
    {
        return Some(Candidate {
            tier: ParseTier::ReasoningStripped,
            value,
        });
    }
    None
}

/// Last-resort price recovery for the data-extraction agent.
///
/// Tries a direct `{"price": ...}` object, the same after stripping reasoning,
/// then numeric values near currency markers within [`PRICE_MIN`]..=[`PRICE_MAX`],
/// then a bare `"price": <number>` field. Returns the recovered object, or
/// `None` so the caller treats the attempt as a parse failure.
pub fn recover_price(text: &str) -> Option<Value> {
    if let Some(value) = PRICE_OBJECT
        .find(text)
        .and_then(|found| parse_object(found.as_str()))
    {
        return Some(value);
    }
    let stripped = strip_reasoning(text);
    if let Some(value) = PRICE_OBJECT
        .find(&stripped)
        .and_then(|found| parse_object(found.as_str()))
    {
        return Some(value);
    }
    for pattern in PRICE_NEAR_CURRENCY.iter() {
        for caps in pattern.captures_iter(text) {
            let digits: String = caps[1].chars().filter(|c| !c.is_whitespace()).collect();
            let Ok(price) = digits.parse::<f64>() else {
                continue;
            };
            if (PRICE_MIN..=PRICE_MAX).contains(&price) {
                return Some(serde_json::json!({ "price": price }));
            }
        }
    }
    if let Some(price) = PRICE_FIELD
        .captures(text)
        .and_then(|caps| caps[1].parse::<f64>().ok())
    {
        return Some(serde_json::json!({ "price": price }));
    }
    None
}

/// Field-level fallback for the code-generation shape.
///
/// The `code` field commonly contains unescaped newlines that break
/// whole-object parsing; recover `description` and `code` by field-anchored
/// patterns instead. When only a description is found a placeholder program
/// is substituted so the pipeline can proceed.
pub fn recover_generated_code(text: &str) -> Option<GeneratedCode> {
    let description = DESCRIPTION_FIELD.captures(text)?[1].to_string();
    let code = CODE_FIELD
        .captures(text)
        .or_else(|| CODE_FIELD_OPEN.captures(text))
        .map(|caps| unescape_code(&caps[1]));
    Some(GeneratedCode {
        description,
        code: code.unwrap_or_else(|| PLACEHOLDER_PROGRAM.to_string()),
    })
}

fn unescape_code(raw: &str) -> String {
    raw.replace("\\n", "\n")
        .replace("\\t", "\t")
        .replace("\\\"", "\"")
}
