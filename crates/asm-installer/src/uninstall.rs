use std::path::{Path, PathBuf};

use asm_core::validate_skill_name;
use asm_security::{check_symlink_escape, SecurityCheck};
use tokio_util::sync::CancellationToken;

use crate::discovery::{find_installed_skill, SkillLookup};
use crate::fs_utils::{remove_dir_all_if_exists, remove_file_if_exists};
use crate::lock::acquire_skill_lock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UninstallStatus {
    Uninstalled,
    NotInstalled,
    Cancelled,
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UninstallResult {
    pub name: String,
    pub status: UninstallStatus,
    pub path: Option<PathBuf>,
}

/// Removes each named skill from `scope_root` in order.
///
/// The token is checked before and after every skill; once it fires, the
/// remaining skills are reported as `Cancelled` and left untouched.
pub async fn uninstall_skills(
    scope_root: &Path,
    names: &[String],
    cancel: &CancellationToken,
) -> Vec<UninstallResult> {
    let mut results = Vec::with_capacity(names.len());
    for name in names {
        if cancel.is_cancelled() {
            results.push(UninstallResult {
                name: name.clone(),
                status: UninstallStatus::Cancelled,
                path: None,
            });
            continue;
        }

        let result = uninstall_one(scope_root, name).await;
        match &result.status {
            UninstallStatus::Uninstalled => tracing::info!(skill = %name, "uninstalled skill"),
            UninstallStatus::Failed { message } => {
                tracing::warn!(skill = %name, error = %message, "uninstall failed")
            }
            UninstallStatus::NotInstalled | UninstallStatus::Cancelled => {}
        }
        results.push(result);
    }
    results
}

async fn uninstall_one(scope_root: &Path, name: &str) -> UninstallResult {
    let failed = |message: String, path: Option<PathBuf>| UninstallResult {
        name: name.to_string(),
        status: UninstallStatus::Failed { message },
        path,
    };

    if let Err(err) = validate_skill_name(name) {
        return failed(format!("{err:#}"), None);
    }
    let path = match find_installed_skill(scope_root, name) {
        Ok(SkillLookup::Found { path }) => path,
        Ok(SkillLookup::NotFound) => {
            return UninstallResult {
                name: name.to_string(),
                status: UninstallStatus::NotInstalled,
                path: None,
            };
        }
        Ok(SkillLookup::CaseMismatch { actual, .. }) => {
            return failed(
                format!("installed directory is '{actual}', not '{name}'"),
                None,
            );
        }
        Err(err) => return failed(format!("{err:#}"), None),
    };

    match check_symlink_escape(&path, scope_root) {
        SecurityCheck::Safe => {}
        SecurityCheck::Unsafe { reason, detail } => {
            return failed(format!("{reason}: {detail}"), Some(path));
        }
        SecurityCheck::Failed { message } => return failed(message, Some(path)),
    }

    let lock = match acquire_skill_lock(&path, "uninstall", None) {
        Ok(lock) => lock,
        Err(err) => return failed(err.to_string(), Some(path)),
    };

    let target = path.clone();
    let removal = tokio::task::spawn_blocking(move || {
        let removed = match std::fs::symlink_metadata(&target) {
            Ok(metadata) if metadata.file_type().is_symlink() => remove_file_if_exists(&target),
            _ => remove_dir_all_if_exists(&target),
        };
        lock.release();
        removed
    })
    .await;

    match removal {
        Ok(Ok(())) => UninstallResult {
            name: name.to_string(),
            status: UninstallStatus::Uninstalled,
            path: Some(path),
        },
        Ok(Err(err)) => failed(format!("failed to remove {}: {err}", path.display()), Some(path)),
        Err(err) => failed(format!("removal task failed: {err}"), Some(path)),
    }
}
