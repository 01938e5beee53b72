use std::path::{Path, PathBuf};

use asm_security::SecurityReason;
use thiserror::Error;

/// Every way an update can fail. Each failing phase produces exactly one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpdateError {
    #[error("[ASM-1001] skill '{name}' is not installed in {scope} scope ({})", path.display())]
    SkillNotFound {
        name: String,
        scope: String,
        path: PathBuf,
    },

    #[error("[ASM-1002] invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("[ASM-1003] package contains skill '{package_skill_name}' but the installed skill is '{installed_skill_name}'")]
    PackageMismatch {
        installed_skill_name: String,
        package_skill_name: String,
    },

    #[error("[ASM-2001] security check failed ({reason}): {detail}")]
    Security {
        reason: SecurityReason,
        detail: String,
    },

    #[error("[ASM-3001] {operation} failed for {}: {message}", path.display())]
    Filesystem {
        operation: String,
        path: PathBuf,
        message: String,
    },

    #[error("[ASM-3002] backup creation failed: {message}")]
    BackupCreation { message: String },

    #[error("[ASM-3003] {operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    #[error("[ASM-3101] rollback failed: {message}")]
    Rollback { message: String },

    #[error("[ASM-3900] update failed ({update_error}) and rollback failed ({rollback_error}); backup at {}", backup_path.display())]
    Critical {
        update_error: String,
        rollback_error: String,
        backup_path: PathBuf,
    },
}

impl UpdateError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::SkillNotFound { .. } => "ASM-1001",
            Self::Validation { .. } => "ASM-1002",
            Self::PackageMismatch { .. } => "ASM-1003",
            Self::Security { .. } => "ASM-2001",
            Self::Filesystem { .. } => "ASM-3001",
            Self::BackupCreation { .. } => "ASM-3002",
            Self::Timeout { .. } => "ASM-3003",
            Self::Rollback { .. } => "ASM-3101",
            Self::Critical { .. } => "ASM-3900",
        }
    }

    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::SkillNotFound { .. } => "skill-not-found",
            Self::Validation { .. } => "validation-error",
            Self::PackageMismatch { .. } => "package-mismatch",
            Self::Security { .. } => "security-error",
            Self::Filesystem { .. } => "filesystem-error",
            Self::BackupCreation { .. } => "backup-creation-error",
            Self::Timeout { .. } => "timeout",
            Self::Rollback { .. } => "rollback-error",
            Self::Critical { .. } => "critical-error",
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn security(reason: SecurityReason, detail: impl Into<String>) -> Self {
        Self::Security {
            reason,
            detail: detail.into(),
        }
    }

    /// Wraps an `anyhow` chain, keeping every context line in the message.
    pub fn filesystem(
        operation: impl Into<String>,
        path: impl AsRef<Path>,
        err: &anyhow::Error,
    ) -> Self {
        Self::Filesystem {
            operation: operation.into(),
            path: path.as_ref().to_path_buf(),
            message: format!("{err:#}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_code_prefix() {
        let err = UpdateError::PackageMismatch {
            installed_skill_name: "x".to_string(),
            package_skill_name: "y".to_string(),
        };
        assert_eq!(err.code(), "ASM-1003");
        assert_eq!(err.kind(), "package-mismatch");
        assert!(err.to_string().starts_with("[ASM-1003]"));
        assert!(err.to_string().contains("'y'"));
    }

    #[test]
    fn filesystem_keeps_context_chain() {
        let err = anyhow::anyhow!("disk full").context("failed to write backup");
        let mapped = UpdateError::filesystem("backup", "/tmp/x", &err);
        assert!(mapped.to_string().contains("failed to write backup: disk full"));
    }
}
