use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeType {
    Added,
    Removed,
    Modified,
}

impl ChangeType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Removed => "removed",
            Self::Modified => "modified",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: String,
    pub change_type: ChangeType,
    pub size_before: u64,
    pub size_after: u64,
    pub size_delta: i64,
}

impl FileChange {
    pub(crate) fn added(path: String, size: u64) -> Self {
        Self {
            path,
            change_type: ChangeType::Added,
            size_before: 0,
            size_after: size,
            size_delta: signed(size),
        }
    }

    pub(crate) fn removed(path: String, size: u64) -> Self {
        Self {
            path,
            change_type: ChangeType::Removed,
            size_before: size,
            size_after: 0,
            size_delta: -signed(size),
        }
    }

    pub(crate) fn modified(path: String, before: u64, after: u64) -> Self {
        Self {
            path,
            change_type: ChangeType::Modified,
            size_before: before,
            size_after: after,
            size_delta: signed(after) - signed(before),
        }
    }
}

fn signed(size: u64) -> i64 {
    i64::try_from(size).unwrap_or(i64::MAX)
}

/// Added, removed and modified files between the installed skill and a
/// package. Every path lands in at most one list and `size_change` is the sum
/// of all `size_delta` values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionComparison {
    pub files_added: Vec<FileChange>,
    pub files_removed: Vec<FileChange>,
    pub files_modified: Vec<FileChange>,
    pub added_count: usize,
    pub removed_count: usize,
    pub modified_count: usize,
    pub size_change: i64,
}

impl VersionComparison {
    pub fn from_changes<I>(changes: I) -> Self
    where
        I: IntoIterator<Item = FileChange>,
    {
        let mut comparison = Self::default();
        for change in changes {
            comparison.push(change);
        }
        comparison
    }

    pub(crate) fn push(&mut self, change: FileChange) {
        self.size_change += change.size_delta;
        match change.change_type {
            ChangeType::Added => {
                self.added_count += 1;
                self.files_added.push(change);
            }
            ChangeType::Removed => {
                self.removed_count += 1;
                self.files_removed.push(change);
            }
            ChangeType::Modified => {
                self.modified_count += 1;
                self.files_modified.push(change);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added_count == 0 && self.removed_count == 0 && self.modified_count == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompareOptions {
    pub thorough: bool,
    pub memory_threshold: usize,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            thorough: false,
            memory_threshold: 1_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupInfo {
    pub path: PathBuf,
    pub size: u64,
    pub file_count: usize,
    pub skill_name: String,
}
