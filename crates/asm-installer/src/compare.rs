use anyhow::{anyhow, Context, Result};
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::iter::Peekable;
use std::path::{Path, PathBuf};

use asm_core::{enumerate, SkillPackage};
use asm_security::{sha256_file_hex, sha256_hex};

use crate::types::{CompareOptions, FileChange, VersionComparison};

const COMPARE_BATCH_SIZE: usize = 256;

/// Compares an installed skill directory against the files of an opened
/// package. The package must have exactly one top-level directory.
pub async fn compare_versions(
    installed_dir: &Path,
    package: &mut SkillPackage,
    options: CompareOptions,
) -> Result<VersionComparison> {
    let roots = package.root_directories();
    let root = match (roots.len(), roots.into_iter().next()) {
        (1, Some(root)) => root,
        (count, _) => {
            return Err(anyhow!(
                "package must contain exactly one top-level directory (found {count}): {}",
                package.path().display()
            ))
        }
    };

    let installed = regular_file_sizes(installed_dir);
    let incoming = package.files_under_root().into_iter().collect::<BTreeMap<_, _>>();
    let total = installed.len() + incoming.len();

    let mut classifier = Classifier {
        installed_root: installed_dir.to_path_buf(),
        incoming: IncomingContent::Archive { package, root },
        thorough: options.thorough,
    };
    classify_all(
        MergeJoin::new(installed, incoming),
        &mut classifier,
        total,
        options.memory_threshold,
    )
    .await
}

/// Same contract as [`compare_versions`] with the package already extracted
/// to `package_dir`.
pub async fn compare_directories(
    installed_dir: &Path,
    package_dir: &Path,
    options: CompareOptions,
) -> Result<VersionComparison> {
    let installed_root = installed_dir.to_path_buf();
    let incoming_root = package_dir.to_path_buf();
    let (installed, incoming) = {
        let installed_root = installed_root.clone();
        let incoming_root = incoming_root.clone();
        tokio::task::spawn_blocking(move || {
            (
                regular_file_sizes(&installed_root),
                regular_file_sizes(&incoming_root),
            )
        })
        .await
        .context("file listing task failed")?
    };
    let total = installed.len() + incoming.len();

    let mut classifier = Classifier {
        installed_root,
        incoming: IncomingContent::Directory(incoming_root),
        thorough: options.thorough,
    };
    classify_all(
        MergeJoin::new(installed, incoming),
        &mut classifier,
        total,
        options.memory_threshold,
    )
    .await
}

/// Lazily yields one [`FileChange`] per differing path, in path order.
/// Hashes for `thorough` mode are computed only when a pair is reached.
pub fn stream_changes(installed_dir: &Path, package_dir: &Path, thorough: bool) -> ChangeStream {
    ChangeStream {
        pairs: MergeJoin::new(
            regular_file_sizes(installed_dir),
            regular_file_sizes(package_dir),
        ),
        classifier: Classifier {
            installed_root: installed_dir.to_path_buf(),
            incoming: IncomingContent::Directory(package_dir.to_path_buf()),
            thorough,
        },
    }
}

pub struct ChangeStream {
    pairs: MergeJoin,
    classifier: Classifier<'static>,
}

impl Iterator for ChangeStream {
    type Item = Result<FileChange>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let pair = self.pairs.next()?;
            match self.classifier.classify(pair) {
                Ok(Some(change)) => return Some(Ok(change)),
                Ok(None) => continue,
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

async fn classify_all(
    pairs: MergeJoin,
    classifier: &mut Classifier<'_>,
    total: usize,
    memory_threshold: usize,
) -> Result<VersionComparison> {
    let mut comparison = VersionComparison::default();
    if total <= memory_threshold {
        for pair in pairs {
            if let Some(change) = classifier.classify(pair)? {
                comparison.push(change);
            }
        }
        return Ok(comparison);
    }

    tracing::debug!(
        total,
        batch = COMPARE_BATCH_SIZE,
        "comparing large skill in batches"
    );
    let mut in_batch = 0_usize;
    for pair in pairs {
        if let Some(change) = classifier.classify(pair)? {
            comparison.push(change);
        }
        in_batch += 1;
        if in_batch == COMPARE_BATCH_SIZE {
            in_batch = 0;
            tokio::task::yield_now().await;
        }
    }
    Ok(comparison)
}

fn regular_file_sizes(root: &Path) -> BTreeMap<String, u64> {
    enumerate(root)
        .filter(|record| record.is_regular_file())
        .map(|record| (record.relative_key(), record.size))
        .collect()
}

struct FilePair {
    key: String,
    before: Option<u64>,
    after: Option<u64>,
}

/// Ordered outer join of the installed and incoming file maps.
struct MergeJoin {
    installed: Peekable<btree_map::IntoIter<String, u64>>,
    incoming: Peekable<btree_map::IntoIter<String, u64>>,
}

impl MergeJoin {
    fn new(installed: BTreeMap<String, u64>, incoming: BTreeMap<String, u64>) -> Self {
        Self {
            installed: installed.into_iter().peekable(),
            incoming: incoming.into_iter().peekable(),
        }
    }
}

impl Iterator for MergeJoin {
    type Item = FilePair;

    fn next(&mut self) -> Option<Self::Item> {
        let order = match (self.installed.peek(), self.incoming.peek()) {
            (None, None) => return None,
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (Some((left, _)), Some((right, _))) => left.cmp(right),
        };
        match order {
            std::cmp::Ordering::Less => {
                let (key, size) = self.installed.next()?;
                Some(FilePair {
                    key,
                    before: Some(size),
                    after: None,
                })
            }
            std::cmp::Ordering::Greater => {
                let (key, size) = self.incoming.next()?;
                Some(FilePair {
                    key,
                    before: None,
                    after: Some(size),
                })
            }
            std::cmp::Ordering::Equal => {
                let (key, before) = self.installed.next()?;
                let (_, after) = self.incoming.next()?;
                Some(FilePair {
                    key,
                    before: Some(before),
                    after: Some(after),
                })
            }
        }
    }
}

enum IncomingContent<'a> {
    Directory(PathBuf),
    Archive {
        package: &'a mut SkillPackage,
        root: String,
    },
}

struct Classifier<'a> {
    installed_root: PathBuf,
    incoming: IncomingContent<'a>,
    thorough: bool,
}

impl Classifier<'_> {
    fn classify(&mut self, pair: FilePair) -> Result<Option<FileChange>> {
        let change = match (pair.before, pair.after) {
            (None, None) => None,
            (None, Some(after)) => Some(FileChange::added(pair.key, after)),
            (Some(before), None) => Some(FileChange::removed(pair.key, before)),
            (Some(before), Some(after)) if before != after => {
                Some(FileChange::modified(pair.key, before, after))
            }
            (Some(size), Some(_)) => {
                if self.thorough && self.contents_differ(&pair.key)? {
                    Some(FileChange::modified(pair.key, size, size))
                } else {
                    None
                }
            }
        };
        Ok(change)
    }

    fn contents_differ(&mut self, key: &str) -> Result<bool> {
        let installed = sha256_file_hex(&self.installed_root.join(key))?;
        let incoming = match &mut self.incoming {
            IncomingContent::Directory(root) => sha256_file_hex(&root.join(key))?,
            IncomingContent::Archive { package, root } => {
                sha256_hex(&package.read_entry_bytes(&format!("{root}/{key}"), u64::MAX)?)
            }
        };
        Ok(installed != incoming)
    }
}
