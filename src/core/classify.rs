//! Test failure classification and repeat detection.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// How many leading log characters feed the repeat fingerprint.
const FINGERPRINT_PREFIX: usize = 200;

/// Coarse class of a failing test run, derived from its logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Missing name, module, or import; fixable by the coder directly.
    Import,
    /// An assertion fired; the code and the tests disagree on behavior.
    Assertion,
    /// Anything else (syntax errors, crashes, timeouts).
    Other,
}

impl FailureClass {
    pub fn name(self) -> &'static str {
        match self {
            FailureClass::Import => "import",
            FailureClass::Assertion => "assertion",
            FailureClass::Other => "other",
        }
    }
}

/// Classify a failing run by scanning its logs.
///
/// Import markers win over assertion markers: a missing import usually
/// cascades into collection errors that mention assertions further down.
pub fn classify(logs: &str) -> FailureClass {
    if ["NameError", "ImportError", "ModuleNotFoundError"]
        .iter()
        .any(|marker| logs.contains(marker))
    {
        return FailureClass::Import;
    }
    if logs.contains("AssertionError") {
        return FailureClass::Assertion;
    }
    FailureClass::Other
}

/// Identity of a failure for cycle detection.
///
/// Two runs with the same class flags and the same leading log text count as
/// the same failure; seeing one twice means the last fix changed nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorFingerprint {
    import_error: bool,
    assertion_error: bool,
    log_hash: u64,
}

impl ErrorFingerprint {
    pub fn new(logs: &str) -> Self {
        let class = classify(logs);
        let prefix: String = logs.chars().take(FINGERPRINT_PREFIX).collect();
        let mut hasher = DefaultHasher::new();
        prefix.hash(&mut hasher);
        ErrorFingerprint {
            import_error: class == FailureClass::Import,
            assertion_error: class == FailureClass::Assertion,
            log_hash: hasher.finish(),
        }
    }
}
