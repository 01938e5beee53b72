use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{anyhow, Context, Result};

/// Resolves `.` and `..` components without touching the filesystem.
///
/// `..` at the root of an absolute path is dropped; on a relative path it is
/// kept, so callers can still detect an escape.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => normalized.push(prefix.as_os_str()),
            Component::RootDir => normalized.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(
                    normalized.components().next_back(),
                    Some(Component::Normal(_))
                ) && normalized.pop();
                if !popped && !normalized.has_root() {
                    normalized.push("..");
                }
            }
            Component::Normal(part) => normalized.push(part),
        }
    }
    normalized
}

/// True when `path` is a strict descendant of `boundary` after lexical
/// normalization of both sides.
pub fn is_path_within(path: &Path, boundary: &Path) -> bool {
    let path = normalize_lexically(path);
    let boundary = normalize_lexically(boundary);
    path != boundary && path.starts_with(&boundary)
}

/// Canonicalizes `boundary` and `path` and verifies containment.
///
/// `path` itself may not exist yet; in that case its parent is resolved and
/// the final component appended. Returns the resolved path.
pub fn resolve_within(path: &Path, boundary: &Path) -> Result<PathBuf> {
    let real_boundary = fs::canonicalize(boundary)
        .with_context(|| format!("failed to resolve boundary: {}", boundary.display()))?;

    let resolved = match fs::canonicalize(path) {
        Ok(resolved) => resolved,
        Err(_) => {
            let normalized = normalize_lexically(path);
            let file_name = normalized
                .file_name()
                .ok_or_else(|| anyhow!("path has no final component: {}", path.display()))?
                .to_owned();
            let parent = normalized
                .parent()
                .ok_or_else(|| anyhow!("path has no parent: {}", path.display()))?;
            fs::canonicalize(parent)
                .with_context(|| format!("failed to resolve parent of {}", path.display()))?
                .join(file_name)
        }
    };

    if !is_path_within(&resolved, &real_boundary) {
        return Err(anyhow!(
            "path {} resolves outside {} (resolved={})",
            path.display(),
            real_boundary.display(),
            resolved.display()
        ));
    }
    Ok(resolved)
}
