//! Error classification and recovery selection.
//!
//! Raw failure text is mapped to an [`ErrorCategory`] and a
//! [`RecoveryStrategy`] by pattern matching, with precedence
//! parse → timeout → connection → syntax → runtime → unknown (first match
//! wins). Classification is a pure function of `(message, context)`:
//! identical inputs always yield identical results.

mod retry;

pub use retry::{
    connection_retry_policy, general_retry_policy, json_parse_retry_policy, RetryPolicy,
};

use once_cell::sync::Lazy;
use regex::RegexSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Categories of failure observed during orchestration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Syntax errors in generated code.
    Syntax,
    /// Runtime errors during code execution.
    Runtime,
    /// Code runs but produces wrong output.
    Logic,
    /// JSON parsing errors from LLM responses.
    Parse,
    /// Network/connection errors to the inference service.
    Connection,
    /// Timeouts.
    Timeout,
    /// Anything else.
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Syntax => "syntax",
            ErrorCategory::Runtime => "runtime",
            ErrorCategory::Logic => "logic",
            ErrorCategory::Parse => "parse",
            ErrorCategory::Connection => "connection",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

/// How to recover from a classified failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    /// Retry with the same prompt.
    Retry,
    /// Retry with a "fix this error" prompt.
    Fix,
    /// Retry with a format correction prompt.
    Reformat,
    /// Skip this agent and continue.
    Skip,
    /// Abort the operation.
    Abort,
    /// Reconnect, then retry.
    Reconnect,
}

/// A classified failure: category, original message, chosen recovery, and
/// optional context about where it occurred.
#[derive(Clone, Debug)]
pub struct ClassifiedError {
    pub category: ErrorCategory,
    pub message: String,
    pub recovery_strategy: RecoveryStrategy,
    pub context: Option<Value>,
}

impl std::fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.category.as_str(), self.message)
    }
}

static PARSE_PATTERNS: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        r"(?i)JSONDecodeError:",
        r"(?i)json\.decoder\.JSONDecodeError",
        r"(?i)Expecting value:",
        r"(?i)Invalid JSON",
        r"(?i)Unterminated string",
        r"(?i)Extra data:",
        r"(?i)expected value at line",
        r"(?i)EOF while parsing",
    ])
    .expect("parse patterns compile")
});

static TIMEOUT_PATTERNS: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        r"(?i)TimeoutError:",
        r"(?i)TimeoutException",
        r"(?i)ReadTimeout",
        r"(?i)ConnectTimeout",
        r"(?i)timed out",
        r"(?i)deadline has elapsed",
    ])
    .expect("timeout patterns compile")
});

static CONNECTION_PATTERNS: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        r"(?i)ConnectionError:",
        r"(?i)ConnectionRefusedError:",
        r"(?i)ConnectionResetError:",
        r"(?i)BrokenPipeError:",
        r"(?i)ConnectError",
        r"(?i)ECONNREFUSED",
        r"(?i)Connection refused",
        r"(?i)connection reset",
        r"(?i)Network is unreachable",
        r"(?i)error sending request",
    ])
    .expect("connection patterns compile")
});

static SYNTAX_PATTERNS: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        r"(?i)SyntaxError:",
        r"(?i)IndentationError:",
        r"(?i)TabError:",
        r"(?i)invalid syntax",
        r"(?i)unexpected EOF",
        r"(?i)expected ':'",
    ])
    .expect("syntax patterns compile")
});

static RUNTIME_PATTERNS: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        r"(?i)NameError:",
        r"(?i)TypeError:",
        r"(?i)ValueError:",
        r"(?i)AttributeError:",
        r"(?i)KeyError:",
        r"(?i)IndexError:",
        r"(?i)ZeroDivisionError:",
        r"(?i)ImportError:",
        r"(?i)ModuleNotFoundError:",
        r"(?i)FileNotFoundError:",
        r"(?i)PermissionError:",
        r"(?i)RuntimeError:",
    ])
    .expect("runtime patterns compile")
});

/// Classifies raw failure text into a category and recovery strategy.
///
/// Stateless; a single instance can be shared freely.
#[derive(Clone, Copy, Debug, Default)]
pub struct ErrorClassifier;

impl ErrorClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classifies an error message. Matching precedence: parse → timeout →
    /// connection → syntax → runtime → unknown.
    pub fn classify(&self, message: impl AsRef<str>, context: Option<Value>) -> ClassifiedError {
        let message = message.as_ref();
        let (category, recovery_strategy) = if PARSE_PATTERNS.is_match(message) {
            (ErrorCategory::Parse, RecoveryStrategy::Reformat)
        } else if TIMEOUT_PATTERNS.is_match(message) {
            (ErrorCategory::Timeout, RecoveryStrategy::Retry)
        } else if CONNECTION_PATTERNS.is_match(message) {
            (ErrorCategory::Connection, RecoveryStrategy::Reconnect)
        } else if SYNTAX_PATTERNS.is_match(message) {
            (ErrorCategory::Syntax, RecoveryStrategy::Fix)
        } else if RUNTIME_PATTERNS.is_match(message) {
            (ErrorCategory::Runtime, RecoveryStrategy::Fix)
        } else {
            (ErrorCategory::Unknown, RecoveryStrategy::Abort)
        };

        ClassifiedError {
            category,
            message: message.to_string(),
            recovery_strategy,
            context,
        }
    }
}

/// Renders the fix prompt for a classified error, used by agents that support
/// parse-retry round trips.
pub fn fix_prompt(error: &ClassifiedError) -> String {
    match error.category {
        ErrorCategory::Parse => "Your previous response could not be parsed as valid JSON.\n\
             Please respond with ONLY valid JSON, no additional text or explanation.\n\
             Make sure to:\n\
             - Use double quotes for strings\n\
             - No trailing commas\n\
             - Properly escape special characters\n\
             - Start with { and end with }"
            .to_string(),
        ErrorCategory::Syntax => format!(
            "The code you generated has a syntax error:\n{}\n\n\
             Please fix the syntax error and provide the corrected code.",
            error.message
        ),
        ErrorCategory::Runtime => format!(
            "The code you generated produced a runtime error:\n{}\n\n\
             Please fix the error and provide the corrected code.",
            error.message
        ),
        _ => format!("An error occurred: {}\n\nPlease try again.", error.message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(msg: &str) -> ClassifiedError {
        ErrorClassifier::new().classify(msg, None)
    }

    /// **Scenario**: each pattern family maps to its category and strategy.
    #[test]
    fn categories_map_to_strategies() {
        let cases = [
            ("Expecting value: line 1 column 1", ErrorCategory::Parse, RecoveryStrategy::Reformat),
            ("request timed out", ErrorCategory::Timeout, RecoveryStrategy::Retry),
            ("Connection refused", ErrorCategory::Connection, RecoveryStrategy::Reconnect),
            ("SyntaxError: invalid syntax", ErrorCategory::Syntax, RecoveryStrategy::Fix),
            ("NameError: name 'x' is not defined", ErrorCategory::Runtime, RecoveryStrategy::Fix),
            ("something inexplicable", ErrorCategory::Unknown, RecoveryStrategy::Abort),
        ];
        for (msg, category, strategy) in cases {
            let c = classify(msg);
            assert_eq!(c.category, category, "{msg}");
            assert_eq!(c.recovery_strategy, strategy, "{msg}");
        }
    }

    /// **Scenario**: parse beats timeout beats connection when several
    /// families match the same message.
    #[test]
    fn precedence_first_match_wins() {
        let c = classify("JSONDecodeError: timed out while Connection refused");
        assert_eq!(c.category, ErrorCategory::Parse);
        let c = classify("ReadTimeout after Connection refused");
        assert_eq!(c.category, ErrorCategory::Timeout);
    }

    /// **Scenario**: classification is pure — identical inputs, identical outputs.
    #[test]
    fn classification_is_deterministic() {
        let a = classify("ValueError: bad literal");
        let b = classify("ValueError: bad literal");
        assert_eq!(a.category, b.category);
        assert_eq!(a.recovery_strategy, b.recovery_strategy);
        assert_eq!(a.message, b.message);
    }

    /// **Scenario**: matching is case-insensitive.
    #[test]
    fn matching_is_case_insensitive() {
        assert_eq!(classify("CONNECTION REFUSED").category, ErrorCategory::Connection);
        assert_eq!(classify("Timed Out").category, ErrorCategory::Timeout);
    }

    /// **Scenario**: Display renders `[category] message`.
    #[test]
    fn display_includes_category_tag() {
        let c = classify("RuntimeError: boom");
        assert_eq!(c.to_string(), "[runtime] RuntimeError: boom");
    }

    /// **Scenario**: fix prompts embed the error message, and the parse
    /// prompt demands bare JSON.
    #[test]
    fn fix_prompts_render() {
        let c = classify("SyntaxError: unexpected EOF");
        assert!(fix_prompt(&c).contains("unexpected EOF"));
        let c = classify("Invalid JSON");
        assert!(fix_prompt(&c).contains("ONLY valid JSON"));
        let c = classify("whatever else");
        assert!(fix_prompt(&c).contains("Please try again"));
    }

    /// **Scenario**: context rides along untouched.
    #[test]
    fn context_is_preserved() {
        let ctx = serde_json::json!({"agent": "coder"});
        let c = ErrorClassifier::new().classify("timed out", Some(ctx.clone()));
        assert_eq!(c.context, Some(ctx));
    }
}
