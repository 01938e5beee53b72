#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecurityReason {
    SymlinkEscape,
    PathTraversal,
    ZipEntryEscape,
    CaseMismatch,
    HardLinkDetected,
    ContainmentViolation,
}

impl SecurityReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SymlinkEscape => "symlink-escape",
            Self::PathTraversal => "path-traversal",
            Self::ZipEntryEscape => "zip-entry-escape",
            Self::CaseMismatch => "case-mismatch",
            Self::HardLinkDetected => "hard-link-detected",
            Self::ContainmentViolation => "containment-violation",
        }
    }
}

impl std::fmt::Display for SecurityReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single security check.
///
/// `Failed` means the check itself could not run (for example the path could
/// not be resolved); callers treat it as blocking but report it separately
/// from a positive finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityCheck {
    Safe,
    Unsafe {
        reason: SecurityReason,
        detail: String,
    },
    Failed {
        message: String,
    },
}

impl SecurityCheck {
    pub fn unsafe_because(reason: SecurityReason, detail: impl Into<String>) -> Self {
        Self::Unsafe {
            reason,
            detail: detail.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    pub fn is_safe(&self) -> bool {
        matches!(self, Self::Safe)
    }
}
