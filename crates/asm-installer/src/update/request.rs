use std::path::PathBuf;

use asm_core::{Scope, SkillSummary};

use crate::backup::backup_file_name;
use crate::downgrade::{DowngradeCheck, VersionOrdering};
use crate::types::{BackupInfo, VersionComparison};

use super::error::UpdateError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRequest {
    pub skill_name: String,
    /// `project` or `personal`; parsed during validation.
    pub scope: String,
    pub package_path: PathBuf,
    pub options: UpdateOptions,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    pub dry_run: bool,
    /// Skips confirmation and overrides resource limits.
    pub force: bool,
    pub keep_backup: bool,
    pub skip_backup: bool,
    /// Hash same-size files to detect content-only changes.
    pub thorough: bool,
    pub allow_hard_links: bool,
    pub version_ordering: VersionOrdering,
}

/// Asks the user whether to go ahead once the preview is known.
pub trait Confirm: Send + Sync {
    fn confirm(&self, preview: &UpdatePreview) -> bool;
}

impl<F> Confirm for F
where
    F: Fn(&UpdatePreview) -> bool + Send + Sync,
{
    fn confirm(&self, preview: &UpdatePreview) -> bool {
        self(preview)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePhase {
    Validation,
    Discovery,
    PackageValidation,
    SecurityCheck,
    Preparation,
    Execution,
    Cleanup,
}

impl UpdatePhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Discovery => "discovery",
            Self::PackageValidation => "package-validation",
            Self::SecurityCheck => "security-check",
            Self::Preparation => "preparation",
            Self::Execution => "execution",
            Self::Cleanup => "cleanup",
        }
    }
}

impl std::fmt::Display for UpdatePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupState {
    Created(BackupInfo),
    /// `--skip-backup`; the path is where the backup would have gone.
    Skipped { placeholder_path: PathBuf },
}

impl BackupState {
    pub(crate) fn skipped(backup_root: &std::path::Path, skill_name: &str) -> Self {
        Self::Skipped {
            placeholder_path: backup_root.join(backup_file_name(
                skill_name,
                chrono::Utc::now(),
                "skipped",
            )),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::Created(info) => &info.path,
            Self::Skipped { placeholder_path } => placeholder_path,
        }
    }

    pub fn created(&self) -> Option<&BackupInfo> {
        match self {
            Self::Created(info) => Some(info),
            Self::Skipped { .. } => None,
        }
    }
}

/// What an update would do; shown for `--dry-run` and to [`Confirm`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatePreview {
    pub skill_name: String,
    pub scope: Scope,
    pub skill_path: PathBuf,
    pub package_path: PathBuf,
    pub installed_version: Option<String>,
    pub incoming_version: Option<String>,
    pub installed_summary: SkillSummary,
    pub incoming_summary: SkillSummary,
    pub comparison: VersionComparison,
    pub downgrade: DowngradeCheck,
    pub backup_path: Option<PathBuf>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateReport {
    pub skill_name: String,
    pub skill_path: PathBuf,
    pub incoming_version: Option<String>,
    pub comparison: VersionComparison,
    pub files_written: usize,
    /// Set when the backup was kept after a successful update.
    pub backup_path: Option<PathBuf>,
    pub backup_skipped: bool,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    UserDeclined,
    Signal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Success(UpdateReport),
    DryRunPreview(UpdatePreview),
    Cancelled {
        skill_name: String,
        reason: CancelReason,
    },
    /// The update failed and the backup was restored.
    RolledBack {
        skill_name: String,
        backup_path: PathBuf,
        error: UpdateError,
    },
    /// Both the update and the restore failed. `error` is always
    /// [`UpdateError::Critical`].
    RollbackFailed {
        skill_name: String,
        backup_path: PathBuf,
        error: UpdateError,
        recovery_instructions: Vec<String>,
    },
    Failed(UpdateError),
}

impl UpdateOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_) | Self::DryRunPreview(_))
    }

    pub fn error(&self) -> Option<&UpdateError> {
        match self {
            Self::RolledBack { error, .. }
            | Self::RollbackFailed { error, .. }
            | Self::Failed(error) => Some(error),
            _ => None,
        }
    }
}
