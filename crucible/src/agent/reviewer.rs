//! Reviewer: static gate between generation and execution. No LLM call.
//!
//! Three checks per generated file: a syntax scan for Python sources,
//! a dangerous-pattern scan, and a long-line check. Any issue fails the
//! review and feeds the collected feedback back to the Coder.

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use tracing::info;

use event_wire::EventKind;

use crate::error::AgentError;
use crate::orchestrate::EngineContext;
use crate::state::OrchestrationState;

use super::Agent;

static DANGEROUS_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"\beval\s*\(", "eval() is dangerous"),
        (r"\bexec\s*\(", "exec() is dangerous"),
        (r"\b__import__\s*\(", "__import__() is dangerous"),
        (r"\bos\.system\s*\(", "os.system() is dangerous"),
        (
            r"\bsubprocess\.\w+\s*\(.*shell\s*=\s*True",
            "shell=True is dangerous",
        ),
        (r#"\bopen\s*\([^)]*,\s*['"]w['"]"#, "Writing files may be dangerous"),
    ]
    .into_iter()
    .map(|(pattern, message)| (Regex::new(pattern).expect("dangerous pattern"), message))
    .collect()
});

/// Longest acceptable source line.
const MAX_LINE_LENGTH: usize = 120;

/// Python block-header keywords that must end their clause with a colon.
const BLOCK_KEYWORDS: [&str; 11] = [
    "def", "class", "if", "elif", "else", "for", "while", "try", "except", "finally", "with",
];

/// Line-accurate structural scan of Python source.
///
/// Catches the failure modes generated code actually exhibits: unbalanced
/// brackets, unterminated strings, and block headers missing their colon.
/// Returns the first problem as `(line_number, message)`.
pub(crate) fn check_python_syntax(code: &str) -> Result<(), (usize, String)> {
    let mut bracket_stack: Vec<(char, usize)> = Vec::new();
    let mut triple: Option<char> = None;

    for (idx, line) in code.lines().enumerate() {
        let lineno = idx + 1;
        let mut chars = line.chars().peekable();
        let mut in_string: Option<char> = None;

        while let Some(c) = chars.next() {
            if let Some(quote) = triple {
                if c == quote
                    && chars.peek() == Some(&quote)
                    && chars.clone().nth(1) == Some(quote)
                {
                    chars.next();
                    chars.next();
                    triple = None;
                }
                continue;
            }
            if let Some(quote) = in_string {
                if c == '\\' {
                    chars.next();
                } else if c == quote {
                    in_string = None;
                }
                continue;
            }
            match c {
                '#' => break,
                '\'' | '"' => {
                    if chars.peek() == Some(&c) && chars.clone().nth(1) == Some(c) {
                        chars.next();
                        chars.next();
                        triple = Some(c);
                    } else {
                        in_string = Some(c);
                    }
                }
                '(' | '[' | '{' => bracket_stack.push((c, lineno)),
                ')' | ']' | '}' => {
                    let expected = match c {
                        ')' => '(',
                        ']' => '[',
                        _ => '{',
                    };
                    match bracket_stack.pop() {
                        Some((open, _)) if open == expected => {}
                        _ => return Err((lineno, format!("unmatched '{c}'"))),
                    }
                }
                _ => {}
            }
        }

        if in_string.is_some() {
            return Err((lineno, "unterminated string literal".to_string()));
        }

        // Block headers must close with a colon once brackets are balanced.
        if triple.is_none() && bracket_stack.is_empty() {
            let stripped = strip_comment(line);
            let trimmed = stripped.trim();
            if let Some(first) = trimmed.split_whitespace().next() {
                let keyword = first.trim_end_matches(':');
                if BLOCK_KEYWORDS.contains(&keyword)
                    && !trimmed.ends_with('\\')
                    && !trimmed.contains(':')
                {
                    return Err((lineno, "expected ':'".to_string()));
                }
            }
        }
    }

    if triple.is_some() {
        let last = code.lines().count().max(1);
        return Err((last, "unterminated triple-quoted string literal".to_string()));
    }
    if let Some((open, lineno)) = bracket_stack.first() {
        return Err((*lineno, format!("'{open}' was never closed, unexpected EOF")));
    }
    Ok(())
}

/// Removes a trailing comment, ignoring `#` inside string literals.
fn strip_comment(line: &str) -> String {
    let mut out = String::new();
    let mut in_string: Option<char> = None;
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        if let Some(quote) = in_string {
            out.push(c);
            if c == '\\' {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            } else if c == quote {
                in_string = None;
            }
            continue;
        }
        match c {
            '#' => break,
            '\'' | '"' => {
                in_string = Some(c);
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

fn is_python_file(path: &str) -> bool {
    path.is_empty() || path.ends_with(".py")
}

fn check_security(code: &str) -> Vec<String> {
    DANGEROUS_PATTERNS
        .iter()
        .filter(|(pattern, _)| pattern.is_match(code))
        .map(|(_, message)| format!("Security: {message}"))
        .collect()
}

fn check_quality(code: &str) -> Vec<String> {
    let long_lines: Vec<usize> = code
        .lines()
        .enumerate()
        .filter(|(_, line)| line.len() > MAX_LINE_LENGTH)
        .map(|(i, _)| i + 1)
        .collect();
    if long_lines.is_empty() {
        Vec::new()
    } else {
        let first_three: Vec<String> = long_lines.iter().take(3).map(usize::to_string).collect();
        vec![format!(
            "Quality: Lines too long (>120 chars): [{}]",
            first_three.join(", ")
        )]
    }
}

/// The review gate; third in the pipeline.
pub struct ReviewerAgent {
    ctx: Arc<EngineContext>,
}

impl ReviewerAgent {
    pub const NAME: &'static str = "reviewer";

    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    fn review_targets(state: &OrchestrationState) -> Vec<(String, String)> {
        if let Some(plan) = &state.plan {
            let generated: Vec<(String, String)> = plan
                .files
                .iter()
                .filter(|f| f.generated)
                .map(|f| (f.path.clone(), f.content.clone()))
                .collect();
            if !generated.is_empty() {
                return generated;
            }
        }
        if state.code.is_empty() {
            Vec::new()
        } else {
            vec![(String::new(), state.code.clone())]
        }
    }
}

#[async_trait]
impl Agent for ReviewerAgent {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn invoke(&self, mut state: OrchestrationState) -> Result<OrchestrationState, AgentError> {
        let targets = Self::review_targets(&state);
        if targets.is_empty() {
            state.review_passed = false;
            state.review_feedback = "No code to review".to_string();
            state.add_history(Self::NAME, "review", "No code to review");
            return Ok(state);
        }

        let mut issues: Vec<String> = Vec::new();
        for (path, code) in &targets {
            let label = if path.is_empty() {
                String::new()
            } else {
                format!("{path}: ")
            };

            if is_python_file(path) {
                if let Err((lineno, msg)) = check_python_syntax(code) {
                    issues.push(format!("{label}Syntax error: Line {lineno}: {msg}"));
                }
            }
            issues.extend(check_security(code).into_iter().map(|i| format!("{label}{i}")));
            issues.extend(check_quality(code).into_iter().map(|i| format!("{label}{i}")));
        }

        let passed = issues.is_empty();
        state.review_passed = passed;
        state.review_feedback = if passed {
            "All checks passed".to_string()
        } else {
            issues.join("\n")
        };
        state.review_attempts += 1;

        self.ctx.bus.emit(
            EventKind::CodeReviewed,
            Self::NAME,
            json!({
                "passed": passed,
                "issue_count": issues.len(),
                "attempt": state.review_attempts,
            }),
        );

        let status = if passed {
            "passed".to_string()
        } else {
            format!("failed with {} issues", issues.len())
        };
        info!(agent = Self::NAME, %status, "review complete");
        state.add_history(Self::NAME, "review", status);

        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: well-formed code passes the syntax scan.
    #[test]
    fn syntax_accepts_valid_code() {
        let code = r#"
def fibonacci(n):
    """Sequence up to n."""
    fib = [0, 1]
    for i in range(2, n):
        fib.append(fib[i - 1] + fib[i - 2])
    return fib[:n]

if __name__ == "__main__":
    print(fibonacci(10))
"#;
        assert!(check_python_syntax(code).is_ok());
    }

    /// **Scenario**: unbalanced brackets, missing colons, and unterminated
    /// strings are caught with line numbers.
    #[test]
    fn syntax_rejects_structural_errors() {
        let (line, msg) = check_python_syntax("x = (1 + 2\n").unwrap_err();
        assert_eq!(line, 1);
        assert!(msg.contains("never closed"), "{msg}");

        let (line, msg) = check_python_syntax("def f()\n    pass\n").unwrap_err();
        assert_eq!(line, 1);
        assert!(msg.contains("expected ':'"), "{msg}");

        let (line, msg) = check_python_syntax("s = 'unclosed\n").unwrap_err();
        assert_eq!(line, 1);
        assert!(msg.contains("unterminated string"), "{msg}");

        let (_, msg) = check_python_syntax("x = 1)\n").unwrap_err();
        assert!(msg.contains("unmatched"), "{msg}");
    }

    /// **Scenario**: strings, comments, and multi-line calls don't trip the
    /// scanner.
    #[test]
    fn syntax_tolerates_strings_and_continuations() {
        let code = "s = \"if without colon # not a comment\"\nresult = max(\n    1,\n    2,\n)\n# if in a comment\n";
        assert!(check_python_syntax(code).is_ok());
        let doc = "def f():\n    \"\"\"doc with ( unbalanced\n    more\n    \"\"\"\n    return 1\n";
        assert!(check_python_syntax(doc).is_ok());
    }

    /// **Scenario**: each dangerous pattern is reported.
    #[test]
    fn security_flags_dangerous_calls() {
        let issues = check_security("result = eval(input())\n");
        assert_eq!(issues.len(), 1);
        assert!(issues[0].contains("eval() is dangerous"));

        let issues = check_security("import subprocess\nsubprocess.call(cmd, shell=True)\n");
        assert!(issues.iter().any(|i| i.contains("shell=True")));

        assert!(check_security("print('safe')\n").is_empty());
    }

    /// **Scenario**: long lines report the first three offending numbers.
    #[test]
    fn quality_reports_long_lines() {
        let long = "x".repeat(130);
        let code = format!("{long}\nshort\n{long}\n{long}\n{long}\n");
        let issues = check_quality(&code);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].contains("[1, 3, 4]"), "{}", issues[0]);
    }
}
