use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::config::ResourceLimits;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub relative_path: PathBuf,
    pub absolute_path: PathBuf,
    pub size: u64,
    pub is_directory: bool,
    pub is_symlink: bool,
    pub hard_link_count: u64,
}

impl FileRecord {
    /// `/`-separated relative path, the form used as a comparison key.
    pub fn relative_key(&self) -> String {
        self.relative_path
            .components()
            .filter_map(|component| match component {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/")
    }

    pub fn is_regular_file(&self) -> bool {
        !self.is_directory && !self.is_symlink
    }
}

/// Lazy depth-first walk over a skill directory.
///
/// Directories are tracked on an explicit stack; symlinks are reported but
/// never pushed. Entries that cannot be read are skipped.
#[derive(Debug)]
pub struct FileWalk {
    root: PathBuf,
    stack: Vec<PathBuf>,
    pending: std::vec::IntoIter<FileRecord>,
}

pub fn enumerate(root: &Path) -> FileWalk {
    FileWalk {
        root: root.to_path_buf(),
        stack: vec![root.to_path_buf()],
        pending: Vec::new().into_iter(),
    }
}

impl FileWalk {
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read_directory(&self, dir: &Path) -> Vec<FileRecord> {
        let reader = match fs::read_dir(dir) {
            Ok(reader) => reader,
            Err(err) => {
                tracing::debug!(path = %dir.display(), error = %err, "skipping unreadable directory");
                return Vec::new();
            }
        };

        let mut records = Vec::new();
        for entry in reader {
            let Ok(entry) = entry else {
                continue;
            };
            let path = entry.path();
            let Ok(metadata) = fs::symlink_metadata(&path) else {
                continue;
            };
            let Ok(relative) = path.strip_prefix(&self.root) else {
                continue;
            };

            let file_type = metadata.file_type();
            records.push(FileRecord {
                relative_path: relative.to_path_buf(),
                absolute_path: path.clone(),
                size: if file_type.is_file() { metadata.len() } else { 0 },
                is_directory: file_type.is_dir(),
                is_symlink: file_type.is_symlink(),
                hard_link_count: hard_link_count(&metadata),
            });
        }
        records.sort_by(|left, right| left.relative_path.cmp(&right.relative_path));
        records
    }
}

impl Iterator for FileWalk {
    type Item = FileRecord;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.pending.next() {
                return Some(record);
            }

            let dir = self.stack.pop()?;
            let records = self.read_directory(&dir);
            for record in records.iter().rev() {
                if record.is_directory && !record.is_symlink {
                    self.stack.push(record.absolute_path.clone());
                }
            }
            self.pending = records.into_iter();
        }
    }
}

#[cfg(unix)]
fn hard_link_count(metadata: &fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    metadata.nlink()
}

#[cfg(not(unix))]
fn hard_link_count(_metadata: &fs::Metadata) -> u64 {
    1
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SkillSummary {
    pub file_count: u64,
    pub directory_count: u64,
    pub symlink_count: u64,
    pub hard_linked_count: u64,
    pub total_size: u64,
}

pub fn summarize(root: &Path) -> SkillSummary {
    enumerate(root).fold(SkillSummary::default(), |mut summary, record| {
        if record.is_symlink {
            summary.symlink_count += 1;
        } else if record.is_directory {
            summary.directory_count += 1;
        } else {
            summary.file_count += 1;
            summary.total_size += record.size;
            if record.hard_link_count > 1 {
                summary.hard_linked_count += 1;
            }
        }
        summary
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceCheck {
    WithinLimits,
    ExceedsLimits { reasons: Vec<String> },
}

impl ResourceCheck {
    pub fn is_within_limits(&self) -> bool {
        matches!(self, Self::WithinLimits)
    }
}

pub fn check_resource_limits(summary: &SkillSummary, limits: &ResourceLimits) -> ResourceCheck {
    let mut reasons = Vec::new();
    if summary.file_count > limits.max_file_count {
        reasons.push(format!(
            "file count {} exceeds limit {}",
            summary.file_count, limits.max_file_count
        ));
    }
    if summary.total_size > limits.max_total_bytes {
        reasons.push(format!(
            "total size {} bytes exceeds limit {} bytes",
            summary.total_size, limits.max_total_bytes
        ));
    }

    if reasons.is_empty() {
        ResourceCheck::WithinLimits
    } else {
        ResourceCheck::ExceedsLimits { reasons }
    }
}
