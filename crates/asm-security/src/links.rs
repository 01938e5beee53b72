use std::fs;
use std::path::{Path, PathBuf};

use asm_core::{enumerate, FileRecord};

use crate::check::{SecurityCheck, SecurityReason};
use crate::containment::is_path_within;

/// Fails when `skill_path` is a symlink whose real target lies outside the
/// real path of `scope_root`. Both sides are canonicalized first so aliases
/// like `/var` and `/private/var` compare equal.
pub fn check_symlink_escape(skill_path: &Path, scope_root: &Path) -> SecurityCheck {
    let metadata = match fs::symlink_metadata(skill_path) {
        Ok(metadata) => metadata,
        Err(err) => {
            return SecurityCheck::failed(format!(
                "failed to stat {}: {err}",
                skill_path.display()
            ));
        }
    };
    if !metadata.file_type().is_symlink() {
        return SecurityCheck::Safe;
    }

    let target = match fs::canonicalize(skill_path) {
        Ok(target) => target,
        Err(err) => {
            return SecurityCheck::failed(format!(
                "failed to resolve symlink {}: {err}",
                skill_path.display()
            ));
        }
    };
    let boundary = match fs::canonicalize(scope_root) {
        Ok(boundary) => boundary,
        Err(err) => {
            return SecurityCheck::failed(format!(
                "failed to resolve scope root {}: {err}",
                scope_root.display()
            ));
        }
    };

    if is_path_within(&target, &boundary) {
        tracing::debug!(
            skill = %skill_path.display(),
            target = %target.display(),
            "skill symlink stays inside scope"
        );
        SecurityCheck::Safe
    } else {
        SecurityCheck::unsafe_because(
            SecurityReason::SymlinkEscape,
            format!(
                "{} points to {} which is outside {}",
                skill_path.display(),
                target.display(),
                boundary.display()
            ),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardLinkFinding {
    pub relative_path: PathBuf,
    pub absolute_path: PathBuf,
    pub link_count: u64,
}

pub fn detect_hard_links<I>(records: I) -> Vec<HardLinkFinding>
where
    I: IntoIterator<Item = FileRecord>,
{
    records
        .into_iter()
        .filter(|record| record.is_regular_file() && record.hard_link_count > 1)
        .map(|record| HardLinkFinding {
            relative_path: record.relative_path,
            absolute_path: record.absolute_path,
            link_count: record.hard_link_count,
        })
        .collect()
}

pub fn check_hard_links(root: &Path) -> SecurityCheck {
    if let Err(err) = fs::metadata(root) {
        return SecurityCheck::failed(format!("failed to stat {}: {err}", root.display()));
    }

    let findings = detect_hard_links(enumerate(root));
    if findings.is_empty() {
        return SecurityCheck::Safe;
    }

    let listed = findings
        .iter()
        .take(5)
        .map(|finding| {
            format!(
                "{} (links={})",
                finding.relative_path.display(),
                finding.link_count
            )
        })
        .collect::<Vec<_>>()
        .join(", ");
    SecurityCheck::unsafe_because(
        SecurityReason::HardLinkDetected,
        format!("{} hard-linked file(s): {listed}", findings.len()),
    )
}
