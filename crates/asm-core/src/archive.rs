use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use zip::ZipArchive;

const UNIX_FILE_TYPE_MASK: u32 = 0o170000;
const UNIX_SYMLINK_TYPE: u32 = 0o120000;
const MAX_ENTRY_PREALLOC: u64 = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageFormat {
    Skill,
    Zip,
}

impl PackageFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Skill => "skill",
            Self::Zip => "zip",
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "skill" => Some(Self::Skill),
            "zip" => Some(Self::Zip),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageEntry {
    pub name: String,
    pub size: u64,
    pub is_dir: bool,
    pub is_symlink: bool,
}

impl PackageEntry {
    /// First path segment of the entry name, if any.
    pub fn root_segment(&self) -> Option<&str> {
        self.name
            .trim_start_matches('/')
            .split('/')
            .next()
            .filter(|segment| !segment.is_empty())
    }

    /// Entry name with its root directory removed; `None` for the root itself.
    pub fn path_under_root(&self) -> Option<&str> {
        let (_, rest) = self.name.trim_start_matches('/').split_once('/')?;
        let rest = rest.trim_end_matches('/');
        (!rest.is_empty()).then_some(rest)
    }
}

/// Read-only view over a skill package archive.
pub struct SkillPackage {
    path: PathBuf,
    format: PackageFormat,
    archive: ZipArchive<fs::File>,
    entries: Vec<PackageEntry>,
}

impl std::fmt::Debug for SkillPackage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkillPackage")
            .field("path", &self.path)
            .field("format", &self.format)
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl SkillPackage {
    pub fn open(path: &Path) -> Result<Self> {
        let format = PackageFormat::from_path(path).ok_or_else(|| {
            anyhow!(
                "unsupported package extension (expected .skill or .zip): {}",
                path.display()
            )
        })?;
        let file = fs::File::open(path)
            .with_context(|| format!("failed to open package: {}", path.display()))?;
        let mut archive = ZipArchive::new(file)
            .with_context(|| format!("package is not a valid zip archive: {}", path.display()))?;

        let mut entries = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let entry = archive.by_index(index).with_context(|| {
                format!(
                    "failed to read entry #{index} of package: {}",
                    path.display()
                )
            })?;
            let is_symlink = entry
                .unix_mode()
                .is_some_and(|mode| mode & UNIX_FILE_TYPE_MASK == UNIX_SYMLINK_TYPE);
            entries.push(PackageEntry {
                name: entry.name().to_string(),
                size: entry.size(),
                is_dir: entry.is_dir(),
                is_symlink,
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            format,
            archive,
            entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> PackageFormat {
        self.format
    }

    pub fn entries(&self) -> &[PackageEntry] {
        &self.entries
    }

    /// Distinct top-level directory names across all entries.
    pub fn root_directories(&self) -> BTreeSet<String> {
        self.entries
            .iter()
            .filter_map(PackageEntry::root_segment)
            .map(ToOwned::to_owned)
            .collect()
    }

    /// Regular files below the single root as `(relative path, size)`.
    pub fn files_under_root(&self) -> Vec<(String, u64)> {
        self.entries
            .iter()
            .filter(|entry| !entry.is_dir && !entry.is_symlink)
            .filter_map(|entry| {
                entry
                    .path_under_root()
                    .map(|rel| (rel.to_string(), entry.size))
            })
            .collect()
    }

    /// Reads one entry into memory, failing once more than `max_bytes` come
    /// out of the decompressor. The header's declared size is not trusted.
    pub fn read_entry_bytes(&mut self, name: &str, max_bytes: u64) -> Result<Vec<u8>> {
        let entry = self.archive.by_name(name).with_context(|| {
            format!(
                "entry '{name}' not found in package: {}",
                self.path.display()
            )
        })?;
        if entry.size() > max_bytes {
            return Err(anyhow!(
                "package entry '{name}' declares {} bytes, limit is {max_bytes}",
                entry.size()
            ));
        }

        let capacity = entry.size().min(MAX_ENTRY_PREALLOC) as usize;
        let mut bytes = Vec::with_capacity(capacity);
        entry
            .take(max_bytes.saturating_add(1))
            .read_to_end(&mut bytes)
            .with_context(|| format!("failed to read package entry '{name}'"))?;
        if bytes.len() as u64 > max_bytes {
            return Err(anyhow!(
                "package entry '{name}' exceeds {max_bytes} bytes"
            ));
        }
        Ok(bytes)
    }

    pub fn read_entry_text(&mut self, name: &str, max_bytes: u64) -> Result<String> {
        let bytes = self.read_entry_bytes(name, max_bytes)?;
        String::from_utf8(bytes).with_context(|| format!("package entry '{name}' is not UTF-8"))
    }

    /// Extracts regular files and directories into `dst`.
    ///
    /// Symlink entries are never materialized and entries whose names would
    /// resolve outside `dst` are rejected. Returns the number of files written.
    pub fn extract_to(&mut self, dst: &Path) -> Result<usize> {
        fs::create_dir_all(dst).with_context(|| format!("failed to create {}", dst.display()))?;

        let mut written = 0_usize;
        for index in 0..self.archive.len() {
            let mut entry = self.archive.by_index(index).with_context(|| {
                format!("failed to read entry #{index} of {}", self.path.display())
            })?;
            let name = entry.name().to_string();
            let is_symlink = entry
                .unix_mode()
                .is_some_and(|mode| mode & UNIX_FILE_TYPE_MASK == UNIX_SYMLINK_TYPE);
            if is_symlink {
                tracing::debug!(entry = %name, "skipping symlink entry during extraction");
                continue;
            }

            let rel = entry
                .enclosed_name()
                .ok_or_else(|| anyhow!("package entry escapes extraction root: {name}"))?;
            let out_path = dst.join(rel);

            if entry.is_dir() {
                fs::create_dir_all(&out_path)
                    .with_context(|| format!("failed to create {}", out_path.display()))?;
                continue;
            }

            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            let mut out = fs::File::create(&out_path)
                .with_context(|| format!("failed to create {}", out_path.display()))?;
            io::copy(&mut entry, &mut out)
                .with_context(|| format!("failed to extract {name} to {}", out_path.display()))?;
            written += 1;
        }

        Ok(written)
    }
}
