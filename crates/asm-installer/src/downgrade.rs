use std::cmp::Ordering;
use std::time::SystemTime;

/// How manifest versions are ordered when looking for a downgrade.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VersionOrdering {
    /// Plain string comparison of the two version fields.
    #[default]
    Lexical,
    /// Semantic versioning; falls back to lexical when either side does not
    /// parse.
    Semantic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DowngradeCheck {
    NotDowngrade,
    Downgrade { installed: String, incoming: String },
    OlderByModifiedTime,
    Unknown,
}

impl DowngradeCheck {
    pub fn is_downgrade(&self) -> bool {
        matches!(self, Self::Downgrade { .. } | Self::OlderByModifiedTime)
    }
}

/// Warns when the incoming package looks older than what is installed.
/// Versions are compared when both manifests carry one; otherwise the
/// `SKILL.md` modification times decide.
pub fn detect_downgrade(
    installed_version: Option<&str>,
    incoming_version: Option<&str>,
    installed_modified: Option<SystemTime>,
    incoming_modified: Option<SystemTime>,
    ordering: VersionOrdering,
) -> DowngradeCheck {
    if let (Some(installed), Some(incoming)) = (installed_version, incoming_version) {
        let installed = installed.trim();
        let incoming = incoming.trim();
        return match compare_versions(incoming, installed, ordering) {
            Ordering::Less => DowngradeCheck::Downgrade {
                installed: installed.to_string(),
                incoming: incoming.to_string(),
            },
            _ => DowngradeCheck::NotDowngrade,
        };
    }

    match (installed_modified, incoming_modified) {
        (Some(installed), Some(incoming)) if incoming < installed => {
            DowngradeCheck::OlderByModifiedTime
        }
        (Some(_), Some(_)) => DowngradeCheck::NotDowngrade,
        _ => DowngradeCheck::Unknown,
    }
}

fn compare_versions(left: &str, right: &str, ordering: VersionOrdering) -> Ordering {
    if ordering == VersionOrdering::Semantic {
        let parse = |raw: &str| semver::Version::parse(raw.trim_start_matches('v'));
        if let (Ok(left), Ok(right)) = (parse(left), parse(right)) {
            return left.cmp(&right);
        }
    }
    left.cmp(right)
}
