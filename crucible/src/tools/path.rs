//! Path containment: resolve a parameter under the workspace root and reject
//! escapes before any filesystem access.

use std::path::{Component, Path, PathBuf};

use super::ToolError;

/// Normalizes a path by resolving `.` and `..` lexically, without requiring
/// the path to exist. Does not resolve symlinks.
fn normalize_path(path: &Path) -> PathBuf {
    let mut buf = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::Prefix(p) => buf = PathBuf::from(p.as_os_str()),
            Component::RootDir => buf.push(comp),
            Component::CurDir => {}
            Component::ParentDir => {
                buf.pop();
            }
            Component::Normal(s) => buf.push(s),
        }
    }
    buf
}

/// Resolves `path_param` relative to the workspace root and ensures the
/// result stays inside it.
///
/// Returns the canonical path when it exists, the normalized join otherwise.
/// Any resolution outside the root is `ToolError::AccessDenied`.
pub fn resolve_path_under(workspace_root: &Path, path_param: &str) -> Result<PathBuf, ToolError> {
    let base = workspace_root
        .canonicalize()
        .map_err(|e| ToolError::Io(format!("workspace root unavailable: {e}")))?;

    let path_param = path_param.trim();
    let path_param = if path_param.is_empty() { "." } else { path_param };

    let candidate = if Path::new(path_param).is_absolute() {
        PathBuf::from(path_param)
    } else {
        base.join(path_param)
    };
    let normalized = normalize_path(&candidate);

    if !normalized.starts_with(&base) {
        return Err(ToolError::AccessDenied);
    }

    if normalized.exists() {
        // Canonicalize so symlinked escapes are caught too.
        let canonical = normalized
            .canonicalize()
            .map_err(|e| ToolError::Io(format!("failed to resolve path: {e}")))?;
        if !canonical.starts_with(&base) {
            return Err(ToolError::AccessDenied);
        }
        Ok(canonical)
    } else {
        Ok(normalized)
    }
}
