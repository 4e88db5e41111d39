//! Coder: generates each planned file, streaming tokens as it goes.
//!
//! Each file gets its own prompt carrying the task, the file's role, the
//! sibling list, and truncated contents of already-generated siblings so
//! imports line up. Content is extracted from fenced blocks by expected
//! language, with a heuristic fallback for fence-less responses.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::RegexBuilder;
use tracing::{info, warn};

use crate::error::AgentError;
use crate::events::truncate;
use crate::inference::ChatMessage;
use crate::orchestrate::EngineContext;
use crate::state::OrchestrationState;
use crate::tools::resolve_path_under;

use super::core::AgentCore;
use super::Agent;

const SYSTEM_PROMPT: &str = r#"You are an expert code generator. Generate the content for ONE specific file.

Given:
- The overall project task
- The specific file you're generating (path and description)
- Other files in the project (for context on imports/dependencies)

Output ONLY the file content with appropriate code fences.

## Rules
- Generate ONLY the content for the specified file
- Use proper imports from other project files when needed
- Include appropriate comments and docstrings
- For requirements.txt: list only the packages needed
- For config files: use proper format (JSON, YAML, etc.)

## Output Format
```python
# Your code here (or appropriate language for the file type)
```

For non-Python files, use the appropriate fence:
- ```txt for requirements.txt
- ```json for JSON files
- ```hcl for Terraform
- ```javascript for JS/Node"#;

/// How much of each generated sibling is quoted into the next prompt.
const SIBLING_CONTEXT_CHARS: usize = 500;
/// How much execution output feeds back into a retry prompt.
const EXECUTION_FEEDBACK_CHARS: usize = 1024;

/// Fence languages to try for a file extension, most specific first.
fn lang_candidates(ext: &str) -> &'static [&'static str] {
    match ext {
        "py" => &["python", "py"],
        "txt" => &["txt", "text", ""],
        "json" => &["json"],
        "tf" => &["hcl", "terraform"],
        "js" => &["javascript", "js"],
        "ts" => &["typescript", "ts"],
        "html" => &["html"],
        "css" => &["css"],
        "yaml" | "yml" => &["yaml", "yml"],
        "md" => &["markdown", "md"],
        _ => &[""],
    }
}

static ANY_FENCE: Lazy<regex::Regex> = Lazy::new(|| {
    RegexBuilder::new(r"```\w*[ \t]*\r?\n?(.*?)```")
        .dot_matches_new_line(true)
        .build()
        .expect("any-fence regex")
});

fn fence_for(lang: &str) -> regex::Regex {
    let pattern = format!(r"```{}[ \t]*\r?\n(.*?)```", regex::escape(lang));
    RegexBuilder::new(&pattern)
        .dot_matches_new_line(true)
        .case_insensitive(true)
        .build()
        .expect("language fence regex")
}

/// Extracts file content from an LLM response.
///
/// Tries fenced blocks labelled with the language expected for the file's
/// extension, then any fenced block, then a heuristic that accepts code-like
/// plain text (dropping obvious commentary lines).
pub(crate) fn extract_content(response: &str, file_path: &str) -> Option<String> {
    let ext = Path::new(file_path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    for lang in lang_candidates(&ext) {
        if lang.is_empty() {
            continue;
        }
        if let Some(captures) = fence_for(lang).captures(response) {
            return Some(captures[1].trim().to_string());
        }
    }

    if let Some(captures) = ANY_FENCE.captures(response) {
        let content = captures[1].trim();
        if !content.is_empty() {
            return Some(content.to_string());
        }
    }

    let code_lines: Vec<&str> = response
        .trim()
        .lines()
        .filter(|line| !line.starts_with("Here") && !line.starts_with("This"))
        .collect();
    let joined = code_lines.join("\n");
    const INDICATORS: [&str; 7] = ["def ", "class ", "import ", "from ", "=", "print(", "return "];
    if !code_lines.is_empty() && INDICATORS.iter().any(|i| joined.contains(i)) {
        return Some(joined);
    }

    None
}

/// Derives a fallback filename from up to three significant task words.
pub(crate) fn filename_from_task(task: &str) -> String {
    const STOP_WORDS: [&str; 9] = [
        "a", "an", "the", "write", "create", "make", "build", "python", "code",
    ];
    let meaningful: Vec<String> = task
        .to_lowercase()
        .split_whitespace()
        .filter(|w| w.chars().all(|c| c.is_ascii_alphanumeric()))
        .filter(|w| !STOP_WORDS.contains(w))
        .take(3)
        .map(str::to_string)
        .collect();
    if meaningful.is_empty() {
        "generated.py".to_string()
    } else {
        format!("{}.py", meaningful.join("_"))
    }
}

/// The generation agent; second in the pipeline.
pub struct CoderAgent {
    core: AgentCore,
}

impl CoderAgent {
    pub const NAME: &'static str = "coder";

    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self {
            core: AgentCore::new(Self::NAME, SYSTEM_PROMPT, ctx),
        }
    }

    fn retry_context(state: &OrchestrationState) -> String {
        let mut extra = String::new();
        if state.review_attempts > 0 && !state.review_passed {
            extra.push_str(&format!(
                "\n\nYour previous attempt failed review with this feedback:\n{}\nFix every reported issue.",
                state.review_feedback
            ));
        }
        if state.error_count > 0 && !state.execution_output.is_empty() {
            extra.push_str(&format!(
                "\n\nThe previous code failed when executed. Output:\n{}\nFix the code so it runs.",
                truncate(&state.execution_output, EXECUTION_FEEDBACK_CHARS)
            ));
        }
        extra
    }

    fn file_prompt(
        state: &OrchestrationState,
        file_index: usize,
    ) -> String {
        let plan = state.plan.as_ref().expect("plan present");
        let spec = &plan.files[file_index];

        let other_files: Vec<String> = plan
            .files
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != file_index)
            .map(|(_, f)| format!("- {}: {}", f.path, f.description))
            .collect();

        let mut existing = String::new();
        for sibling in plan.files.iter().filter(|f| f.generated) {
            if sibling.path == spec.path {
                continue;
            }
            existing.push_str(&format!(
                "\n\n### {}\n```\n{}...\n```",
                sibling.path,
                truncate(&sibling.content, SIBLING_CONTEXT_CHARS)
            ));
        }

        format!(
            "Generate the content for this file:\n\n\
             **Project Task:** {}\n\n\
             **File to Generate:** {}\n\
             **Description:** {}\n\n\
             **Other Project Files:**\n{}{}{}\n\n\
             Generate ONLY the content for {}. Output the complete file content in a code block.",
            state.task,
            spec.path,
            spec.description,
            other_files.join("\n"),
            existing,
            Self::retry_context(state),
            spec.path,
        )
    }

    /// Legacy single-file path used when the plan carries no files.
    async fn generate_single_file(
        &self,
        mut state: OrchestrationState,
    ) -> Result<OrchestrationState, AgentError> {
        let workspace = self.core.ctx().config.workspace_dir.clone();
        let filename = filename_from_task(&state.task);
        let path = resolve_path_under(&workspace, &filename)?;

        let prompt = format!("Write code for: {}{}", state.task, Self::retry_context(&state));
        let messages = [ChatMessage::new("user", prompt)];
        let response = self
            .core
            .call_llm_streaming(&messages, 2048, Some(&filename))
            .await?;
        let code = extract_content(&response, &filename).unwrap_or_default();

        std::fs::write(&path, &code)
            .map_err(|e| AgentError::ExecutionFailed(format!("failed to write {filename}: {e}")))?;

        self.core
            .ctx()
            .bus
            .emit_code_written(Self::NAME, &path.display().to_string(), code.len());

        state.add_file(filename.clone(), code.clone());
        state.code = code;
        state.file_path = path.display().to_string();
        state.add_history(Self::NAME, "generate", format!("Generated {filename}"));

        Ok(state)
    }
}

#[async_trait]
impl Agent for CoderAgent {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn tokens_used(&self) -> u64 {
        self.core.tokens_used()
    }

    async fn invoke(&self, mut state: OrchestrationState) -> Result<OrchestrationState, AgentError> {
        let workspace = self.core.ctx().config.workspace_dir.clone();
        std::fs::create_dir_all(&workspace)
            .map_err(|e| AgentError::ExecutionFailed(format!("cannot create workspace: {e}")))?;

        let has_files = state
            .plan
            .as_ref()
            .map(|p| !p.files.is_empty())
            .unwrap_or(false);
        if !has_files {
            return self.generate_single_file(state).await;
        }

        // A repair round regenerates every file so fixes can span the project.
        let regenerate = (state.review_attempts > 0 && !state.review_passed)
            || (state.error_count > 0 && !state.execution_success && !state.execution_output.is_empty());
        if regenerate {
            if let Some(plan) = state.plan.as_mut() {
                for file in &mut plan.files {
                    file.generated = false;
                }
            }
        }

        let file_count = state.plan.as_ref().map(|p| p.files.len()).unwrap_or(0);
        for index in 0..file_count {
            let (already_generated, rel_path) = {
                let spec = &state.plan.as_ref().expect("plan present").files[index];
                (spec.generated, spec.path.clone())
            };
            if already_generated {
                continue;
            }

            info!(
                agent = Self::NAME,
                file = %rel_path,
                "generating file {}/{}",
                index + 1,
                file_count
            );
            state.current_file_index = index;

            let path = resolve_path_under(&workspace, &rel_path)?;
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    AgentError::ExecutionFailed(format!("cannot create {}: {e}", parent.display()))
                })?;
            }

            let prompt = Self::file_prompt(&state, index);
            let messages = [ChatMessage::new("user", prompt)];
            let response = self
                .core
                .call_llm_streaming(&messages, 2048, Some(&rel_path))
                .await?;

            let content = match extract_content(&response, &rel_path) {
                Some(content) => content,
                None => {
                    warn!(agent = Self::NAME, file = %rel_path, "failed to extract content");
                    format!("# TODO: Generate content for {rel_path}\n")
                }
            };

            std::fs::write(&path, &content).map_err(|e| {
                AgentError::ExecutionFailed(format!("failed to write {rel_path}: {e}"))
            })?;

            let plan = state.plan.as_mut().expect("plan present");
            plan.files[index].mark_generated(content.clone());
            state.workspace_files.insert(rel_path.clone(), content.clone());
            self.core
                .ctx()
                .bus
                .emit_file_created(Self::NAME, &rel_path, content.len());
        }

        if let Some(last) = state.plan.as_ref().and_then(|p| p.files.last()) {
            state.code = last.content.clone();
            state.file_path = workspace.join(&last.path).display().to_string();
        }

        state.add_history(
            Self::NAME,
            "generate",
            format!("Generated {file_count} files"),
        );
        state.add_message(
            "assistant",
            format!("Generated {file_count} files"),
            Some(Self::NAME.to_string()),
        );

        Ok(state)
    }
}
