use super::*;
use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::anyhow;
use asm_core::{EngineConfig, ScopeRoots, SkillPackage, Timeouts, MAX_MANIFEST_BYTES};
use asm_security::SecurityReason;
use tokio_util::sync::CancellationToken;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::update::ExecutionHooks;

struct Fixture {
    _tmp: tempfile::TempDir,
    root: PathBuf,
    scope_root: PathBuf,
    asm_home: PathBuf,
    packages: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let tmp = tempfile::tempdir().expect("tempdir");
        let root = fs::canonicalize(tmp.path()).expect("canonical tempdir");
        let scope_root = root.join("project").join(".claude").join("skills");
        let packages = root.join("packages");
        fs::create_dir_all(&scope_root).expect("scope root");
        fs::create_dir_all(&packages).expect("packages dir");
        Self {
            _tmp: tmp,
            asm_home: root.join("home").join(".asm"),
            root,
            scope_root,
            packages,
        }
    }

    fn engine(&self) -> UpdateEngine {
        self.engine_with(EngineConfig::default())
    }

    fn engine_with(&self, config: EngineConfig) -> UpdateEngine {
        UpdateEngine::new(
            ScopeRoots::new(&self.scope_root, self.root.join("personal")),
            AsmLayout::new(&self.asm_home),
            config,
        )
    }

    fn install(&self, name: &str, files: &[(&str, &[u8])]) -> PathBuf {
        let skill = self.scope_root.join(name);
        write_tree(&skill, files);
        skill
    }

    fn package(&self, file_name: &str, entries: &[(&str, &[u8])]) -> PathBuf {
        let path = self.packages.join(file_name);
        write_package(&path, entries);
        path
    }

    fn request(&self, name: &str, package: &Path, options: UpdateOptions) -> UpdateRequest {
        UpdateRequest {
            skill_name: name.to_string(),
            scope: "project".to_string(),
            package_path: package.to_path_buf(),
            options,
        }
    }

    fn backup_options(&self) -> BackupOptions {
        BackupOptions::new(self.asm_home.join("backups"))
    }

    fn backup_files(&self) -> Vec<PathBuf> {
        match fs::read_dir(self.asm_home.join("backups")) {
            Ok(reader) => reader
                .map(|entry| entry.expect("dir entry").path())
                .filter(|path| path.extension().is_some_and(|ext| ext == "skill"))
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    fn scratch_leftovers(&self) -> usize {
        fs::read_dir(self.asm_home.join("tmp"))
            .map(|reader| reader.count())
            .unwrap_or(0)
    }
}

fn write_tree(root: &Path, files: &[(&str, &[u8])]) {
    fs::create_dir_all(root).expect("mkdir root");
    for (rel, content) in files {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdir parent");
        }
        fs::write(&path, content).expect("write fixture file");
    }
}

fn write_package(path: &Path, entries: &[(&str, &[u8])]) {
    let file = fs::File::create(path).expect("create package");
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default();
    for (name, content) in entries {
        if name.ends_with('/') {
            writer
                .add_directory(*name, options)
                .expect("directory entry");
        } else {
            writer.start_file(*name, options).expect("start entry");
            writer.write_all(content).expect("write entry");
        }
    }
    writer.finish().expect("finish package");
}

fn skill_md(name: &str, version: &str) -> Vec<u8> {
    format!("---\nname: {name}\ndescription: Fixture skill {name}\nversion: {version}\n---\n# {name}\n")
        .into_bytes()
}

fn bytes(len: usize) -> Vec<u8> {
    vec![b'x'; len]
}

fn paths(changes: &[FileChange]) -> Vec<&str> {
    changes.iter().map(|change| change.path.as_str()).collect()
}

fn relative_files(root: &Path) -> BTreeSet<(String, Vec<u8>)> {
    asm_core::enumerate(root)
        .filter(|record| record.is_regular_file())
        .map(|record| {
            let content = fs::read(&record.absolute_path).expect("read file");
            (record.relative_key(), content)
        })
        .collect()
}

fn accept(_: &UpdatePreview) -> bool {
    true
}

fn decline(_: &UpdatePreview) -> bool {
    false
}

fn failing_apply(_source: &Path, target: &Path) -> anyhow::Result<()> {
    let _ = fs::remove_file(target.join("README.md"));
    Err(anyhow!("simulated apply failure"))
}

fn failing_restore(_backup: &Path, _target: &Path, _options: &BackupOptions) -> anyhow::Result<usize> {
    Err(anyhow!("simulated restore failure"))
}

fn refusing_open(_path: &Path) -> anyhow::Result<SkillPackage> {
    Err(anyhow!("package must not be opened"))
}

// Slow steps outlast a one second phase limit, then record that they ran.
const SLOW_STEP: Duration = Duration::from_secs(2);

static SLOW_OPEN_DONE: AtomicBool = AtomicBool::new(false);
static SLOW_EXTRACT_DONE: AtomicBool = AtomicBool::new(false);
static SLOW_BACKUP_DONE: AtomicBool = AtomicBool::new(false);
static SLOW_APPLY_DONE: AtomicBool = AtomicBool::new(false);

fn slow_open(path: &Path) -> anyhow::Result<SkillPackage> {
    std::thread::sleep(SLOW_STEP);
    let package = SkillPackage::open(path);
    SLOW_OPEN_DONE.store(true, Ordering::SeqCst);
    package
}

fn slow_extract(package: &mut SkillPackage, dst: &Path) -> anyhow::Result<usize> {
    std::thread::sleep(SLOW_STEP);
    let written = package.extract_to(dst);
    SLOW_EXTRACT_DONE.store(true, Ordering::SeqCst);
    written
}

fn slow_backup(skill_path: &Path, skill_name: &str, options: &BackupOptions) -> anyhow::Result<BackupInfo> {
    std::thread::sleep(SLOW_STEP);
    let info = create_backup(skill_path, skill_name, options);
    SLOW_BACKUP_DONE.store(true, Ordering::SeqCst);
    info
}

fn slow_apply(_source: &Path, _target: &Path) -> anyhow::Result<()> {
    std::thread::sleep(SLOW_STEP);
    SLOW_APPLY_DONE.store(true, Ordering::SeqCst);
    Ok(())
}

fn short_timeouts(edit: impl FnOnce(&mut Timeouts)) -> EngineConfig {
    let mut config = EngineConfig::default();
    edit(&mut config.timeouts);
    config
}

/// Polls until `done` holds, giving detached workers time to finish.
async fn settle(mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    done()
}

fn timed_out_operation(outcome: &UpdateOutcome) -> &str {
    match outcome {
        UpdateOutcome::Failed(UpdateError::Timeout { operation, seconds }) => {
            assert_eq!(*seconds, 1);
            operation
        }
        other => panic!("expected timeout, got {other:?}"),
    }
}

fn assert_partition(comparison: &VersionComparison) {
    let all = comparison
        .files_added
        .iter()
        .chain(&comparison.files_removed)
        .chain(&comparison.files_modified)
        .collect::<Vec<_>>();
    let unique = all
        .iter()
        .map(|change| change.path.as_str())
        .collect::<BTreeSet<_>>();
    assert_eq!(unique.len(), all.len(), "a path appears in two lists");
    assert_eq!(
        comparison.size_change,
        all.iter().map(|change| change.size_delta).sum::<i64>()
    );
    assert_eq!(comparison.added_count, comparison.files_added.len());
    assert_eq!(comparison.removed_count, comparison.files_removed.len());
    assert_eq!(comparison.modified_count, comparison.files_modified.len());
}

// comparison

#[tokio::test]
async fn compare_reports_modified_and_added_files() {
    let fx = Fixture::new();
    let installed = fx.install(
        "pdf",
        &[("SKILL.md", &bytes(100)), ("README.md", &bytes(50))],
    );
    let incoming = fx.root.join("incoming").join("pdf");
    write_tree(
        &incoming,
        &[
            ("SKILL.md", &bytes(120)),
            ("README.md", &bytes(50)),
            ("NOTES.md", &bytes(30)),
        ],
    );

    let comparison = compare_directories(&installed, &incoming, CompareOptions::default())
        .await
        .expect("comparison must succeed");

    assert_eq!(paths(&comparison.files_modified), vec!["SKILL.md"]);
    assert_eq!(comparison.files_modified[0].size_delta, 20);
    assert_eq!(comparison.files_modified[0].size_before, 100);
    assert_eq!(comparison.files_modified[0].size_after, 120);
    assert_eq!(paths(&comparison.files_added), vec!["NOTES.md"]);
    assert_eq!(comparison.files_added[0].size_delta, 30);
    assert!(comparison.files_removed.is_empty());
    assert_eq!(comparison.size_change, 50);
    assert_partition(&comparison);
}

#[tokio::test]
async fn compare_against_archive_matches_directory_comparison() {
    let fx = Fixture::new();
    let installed = fx.install(
        "pdf",
        &[
            ("SKILL.md", &bytes(100)),
            ("README.md", &bytes(50)),
            ("old/gone.txt", b"gone"),
        ],
    );
    let package_path = fx.package(
        "pdf.skill",
        &[
            ("pdf/", b""),
            ("pdf/SKILL.md", &bytes(120)),
            ("pdf/README.md", &bytes(50)),
            ("pdf/NOTES.md", &bytes(30)),
        ],
    );

    let mut package = SkillPackage::open(&package_path).expect("open package");
    let from_archive = compare_versions(&installed, &mut package, CompareOptions::default())
        .await
        .expect("archive comparison");

    assert_eq!(paths(&from_archive.files_removed), vec!["old/gone.txt"]);
    assert_eq!(from_archive.files_removed[0].size_delta, -4);
    assert_eq!(paths(&from_archive.files_added), vec!["NOTES.md"]);
    assert_eq!(paths(&from_archive.files_modified), vec!["SKILL.md"]);
    assert_eq!(from_archive.size_change, 46);
    assert_partition(&from_archive);
}

#[tokio::test]
async fn thorough_mode_detects_same_size_content_changes() {
    let fx = Fixture::new();
    let installed = fx.install("pdf", &[("SKILL.md", b"aaaa"), ("same.txt", b"keep")]);
    let incoming = fx.root.join("incoming").join("pdf");
    write_tree(&incoming, &[("SKILL.md", b"bbbb"), ("same.txt", b"keep")]);

    let quick = compare_directories(&installed, &incoming, CompareOptions::default())
        .await
        .expect("quick comparison");
    assert!(quick.is_empty());

    let thorough = compare_directories(
        &installed,
        &incoming,
        CompareOptions {
            thorough: true,
            ..CompareOptions::default()
        },
    )
    .await
    .expect("thorough comparison");
    assert_eq!(paths(&thorough.files_modified), vec!["SKILL.md"]);
    assert_eq!(thorough.files_modified[0].size_delta, 0);
    assert_eq!(thorough.size_change, 0);

    let package_path = fx.package(
        "pdf.zip",
        &[("pdf/SKILL.md", b"bbbb"), ("pdf/same.txt", b"keep")],
    );
    let mut package = SkillPackage::open(&package_path).expect("open package");
    let from_archive = compare_versions(
        &installed,
        &mut package,
        CompareOptions {
            thorough: true,
            ..CompareOptions::default()
        },
    )
    .await
    .expect("thorough archive comparison");
    assert_eq!(from_archive, thorough);
}

#[tokio::test]
async fn batched_and_streamed_comparisons_match_in_memory_result() {
    let fx = Fixture::new();
    let installed = fx.scope_root.join("big");
    let incoming = fx.root.join("incoming").join("big");
    for i in 0..300_usize {
        let path = installed.join(format!("dir{}", i % 7)).join(format!("file{i:03}.txt"));
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(&path, bytes(i % 13 + 1)).expect("write");
    }
    for i in 100..420_usize {
        let path = incoming.join(format!("dir{}", i % 7)).join(format!("file{i:03}.txt"));
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(&path, bytes(i % 11 + 1)).expect("write");
    }

    let in_memory = compare_directories(
        &installed,
        &incoming,
        CompareOptions {
            thorough: false,
            memory_threshold: 10_000,
        },
    )
    .await
    .expect("in-memory comparison");
    let batched = compare_directories(
        &installed,
        &incoming,
        CompareOptions {
            thorough: false,
            memory_threshold: 10,
        },
    )
    .await
    .expect("batched comparison");

    assert_eq!(in_memory, batched);
    assert_eq!(in_memory.added_count, 120);
    assert_eq!(in_memory.removed_count, 100);
    assert_partition(&in_memory);

    let streamed = stream_changes(&installed, &incoming, false)
        .collect::<anyhow::Result<Vec<_>>>()
        .expect("stream must complete");
    assert_eq!(VersionComparison::from_changes(streamed), in_memory);
}

#[test]
fn change_stream_is_lazy_and_single_pass() {
    let fx = Fixture::new();
    let installed = fx.install("pdf", &[("a.txt", b"1"), ("b.txt", b"22")]);
    let incoming = fx.root.join("incoming").join("pdf");
    write_tree(&incoming, &[("b.txt", b"333"), ("c.txt", b"4")]);

    let mut stream = stream_changes(&installed, &incoming, false);
    let first = stream.next().expect("first change").expect("ok");
    assert_eq!(first.path, "a.txt");
    assert_eq!(first.change_type, ChangeType::Removed);
    let rest = stream.collect::<anyhow::Result<Vec<_>>>().expect("ok");
    assert_eq!(
        rest.iter()
            .map(|change| (change.path.as_str(), change.change_type))
            .collect::<Vec<_>>(),
        vec![("b.txt", ChangeType::Modified), ("c.txt", ChangeType::Added)]
    );
}

#[tokio::test]
async fn comparison_partition_holds_across_shapes() {
    let fx = Fixture::new();
    for seed in 1_u64..6 {
        let mut state = seed;
        let mut next = move || {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (state >> 33) as usize
        };
        let installed = fx.root.join(format!("left{seed}"));
        let incoming = fx.root.join(format!("right{seed}"));
        fs::create_dir_all(&installed).expect("mkdir");
        fs::create_dir_all(&incoming).expect("mkdir");
        for i in 0..40 {
            let name = format!("f{}.txt", next() % 50);
            match i % 3 {
                0 => fs::write(installed.join(&name), bytes(next() % 9)).expect("write"),
                1 => fs::write(incoming.join(&name), bytes(next() % 9)).expect("write"),
                _ => {
                    fs::write(installed.join(&name), bytes(next() % 9)).expect("write");
                    fs::write(incoming.join(&name), bytes(next() % 9)).expect("write");
                }
            }
        }

        let comparison = compare_directories(&installed, &incoming, CompareOptions::default())
            .await
            .expect("comparison");
        assert_partition(&comparison);
    }
}

// backups

#[test]
fn backup_round_trip_restores_regular_files() {
    let fx = Fixture::new();
    let skill = fx.install(
        "pdf",
        &[
            ("SKILL.md", &skill_md("pdf", "1.0.0")),
            ("scripts/run.sh", b"#!/bin/sh\necho hi\n"),
            ("refs/deep/notes.md", b"notes"),
        ],
    );
    #[cfg(unix)]
    std::os::unix::fs::symlink(skill.join("SKILL.md"), skill.join("alias.md")).expect("symlink");
    let before = relative_files(&skill);

    let info = create_backup(&skill, "pdf", &fx.backup_options()).expect("backup");
    assert_eq!(info.file_count, 3);
    assert_eq!(info.skill_name, "pdf");
    assert!(info.size > 0);
    let file_name = info
        .path
        .file_name()
        .and_then(|name| name.to_str())
        .expect("file name");
    assert!(file_name.starts_with("pdf-"));
    assert!(file_name.ends_with(".skill"));
    assert_eq!(file_name.len(), "pdf-20261018-101112-0a1b2c3d.skill".len());

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let file_mode = fs::metadata(&info.path).expect("stat").permissions().mode() & 0o777;
        let dir_mode = fs::metadata(fx.asm_home.join("backups"))
            .expect("stat")
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(file_mode, 0o600);
        assert_eq!(dir_mode, 0o700);
    }

    fs::remove_dir_all(&skill).expect("remove skill");
    let restored = restore_backup(&info.path, &skill, &fx.backup_options()).expect("restore");
    assert_eq!(restored, 3);
    assert_eq!(relative_files(&skill), before);
    assert!(!skill.join("alias.md").exists());
}

#[test]
fn restore_replaces_modified_tree() {
    let fx = Fixture::new();
    let skill = fx.install("pdf", &[("SKILL.md", b"original"), ("keep.txt", b"k")]);
    let info = create_backup(&skill, "pdf", &fx.backup_options()).expect("backup");

    fs::write(skill.join("SKILL.md"), b"changed").expect("write");
    fs::write(skill.join("extra.txt"), b"extra").expect("write");
    restore_backup(&info.path, &skill, &fx.backup_options()).expect("restore");

    assert_eq!(fs::read(skill.join("SKILL.md")).expect("read"), b"original");
    assert!(!skill.join("extra.txt").exists());
    let siblings = fs::read_dir(&fx.scope_root).expect("read_dir").count();
    assert_eq!(siblings, 1);
}

#[cfg(unix)]
#[test]
fn backup_root_must_be_private_real_directory() {
    use std::os::unix::fs::PermissionsExt;

    let fx = Fixture::new();
    let skill = fx.install("pdf", &[("SKILL.md", b"x")]);

    let real_root = fx.root.join("real-backups");
    fs::create_dir_all(&real_root).expect("mkdir");
    let linked_root = fx.root.join("linked-backups");
    std::os::unix::fs::symlink(&real_root, &linked_root).expect("symlink");
    let err = create_backup(&skill, "pdf", &BackupOptions::new(&linked_root))
        .expect_err("symlinked root must be rejected");
    assert!(err.to_string().contains("symlink"));

    let open_root = fx.root.join("open-backups");
    fs::create_dir_all(&open_root).expect("mkdir");
    fs::set_permissions(&open_root, fs::Permissions::from_mode(0o777)).expect("chmod");
    let err = create_backup(&skill, "pdf", &BackupOptions::new(&open_root))
        .expect_err("world-writable root must be rejected");
    assert!(err.to_string().contains("writable by group or others"));
}

#[test]
fn backup_requires_real_directory() {
    let fx = Fixture::new();
    let file = fx.root.join("not-a-dir");
    fs::write(&file, b"x").expect("write");
    assert!(create_backup(&file, "pdf", &fx.backup_options()).is_err());
    assert!(create_backup(&fx.root.join("missing"), "pdf", &fx.backup_options()).is_err());
}

#[test]
fn list_backups_filters_by_skill_and_sorts_newest_first() {
    let fx = Fixture::new();
    let root = fx.asm_home.join("backups");
    fs::create_dir_all(&root).expect("mkdir");
    for name in [
        "pdf-20260101-000000-aaaaaaaa.skill",
        "pdf-20261001-120000-bbbbbbbb.skill",
        "pdf-tools-20261001-120000-cccccccc.skill",
        "pdf-notes.txt",
    ] {
        fs::write(root.join(name), b"not a zip").expect("write");
    }

    let listed = list_backups("pdf", &fx.backup_options()).expect("list");
    let names = listed
        .iter()
        .map(|info| {
            info.path
                .file_name()
                .and_then(|name| name.to_str())
                .expect("name")
                .to_string()
        })
        .collect::<Vec<_>>();
    assert_eq!(
        names,
        vec![
            "pdf-20261001-120000-bbbbbbbb.skill",
            "pdf-20260101-000000-aaaaaaaa.skill"
        ]
    );
    assert!(list_backups("absent", &BackupOptions::new(fx.root.join("nope")))
        .expect("missing root lists nothing")
        .is_empty());
}

#[test]
fn delete_backup_refuses_paths_outside_root() {
    let fx = Fixture::new();
    let skill = fx.install("pdf", &[("SKILL.md", b"x")]);
    let info = create_backup(&skill, "pdf", &fx.backup_options()).expect("backup");

    let outside = fx.root.join("outside.skill");
    fs::write(&outside, b"x").expect("write");
    assert!(delete_backup(&outside, &fx.backup_options()).is_err());
    assert!(outside.exists());

    delete_backup(&info.path, &fx.backup_options()).expect("delete");
    assert!(!info.path.exists());
}

#[cfg(unix)]
#[test]
fn delete_and_restore_refuse_a_backup_root_swapped_for_a_symlink() {
    let fx = Fixture::new();
    let skill = fx.install("pdf", &[("SKILL.md", b"x")]);
    let info = create_backup(&skill, "pdf", &fx.backup_options()).expect("backup");
    let root = fx.backup_options().backup_root;

    let elsewhere = fx.root.join("elsewhere");
    fs::create_dir_all(&elsewhere).expect("mkdir");
    let victim = elsewhere.join("pdf-20260101-000000-aaaaaaaa.skill");
    fs::copy(&info.path, &victim).expect("copy");
    fs::remove_dir_all(&root).expect("remove root");
    std::os::unix::fs::symlink(&elsewhere, &root).expect("symlink");

    let through_link = root.join("pdf-20260101-000000-aaaaaaaa.skill");
    let err = delete_backup(&through_link, &fx.backup_options())
        .expect_err("symlinked root must be refused");
    assert!(err.to_string().contains("symlink"));
    assert!(victim.exists());

    let err = restore_backup(&through_link, &skill, &fx.backup_options())
        .expect_err("symlinked root must be refused");
    assert!(err.to_string().contains("symlink"));
    assert_eq!(fs::read(skill.join("SKILL.md")).expect("read"), b"x");
}

#[cfg(unix)]
#[test]
fn delete_refuses_a_backup_root_opened_to_others() {
    use std::os::unix::fs::PermissionsExt;

    let fx = Fixture::new();
    let skill = fx.install("pdf", &[("SKILL.md", b"x")]);
    let info = create_backup(&skill, "pdf", &fx.backup_options()).expect("backup");
    let root = fx.backup_options().backup_root;

    fs::set_permissions(&root, fs::Permissions::from_mode(0o777)).expect("chmod");
    assert!(delete_backup(&info.path, &fx.backup_options()).is_err());
    assert!(info.path.exists());
    fs::set_permissions(&root, fs::Permissions::from_mode(0o700)).expect("chmod");
}

// update orchestrator

#[tokio::test]
async fn update_replaces_files_and_cleans_up() {
    let fx = Fixture::new();
    let skill = fx.install(
        "pdf",
        &[
            ("SKILL.md", &skill_md("pdf", "1.0.0")),
            ("README.md", b"old readme"),
        ],
    );
    let package = fx.package(
        "pdf.skill",
        &[
            ("pdf/", b""),
            ("pdf/SKILL.md", &skill_md("pdf", "1.1.0")),
            ("pdf/NOTES.md", b"new notes"),
            ("pdf/scripts/run.sh", b"echo run"),
        ],
    );

    let outcome = fx
        .engine()
        .update_skill(
            fx.request("pdf", &package, UpdateOptions::default()),
            &accept,
            &CancellationToken::new(),
        )
        .await;

    let report = match outcome {
        UpdateOutcome::Success(report) => report,
        other => panic!("expected success, got {other:?}"),
    };
    assert_eq!(report.skill_name, "pdf");
    assert_eq!(report.incoming_version.as_deref(), Some("1.1.0"));
    assert_eq!(report.files_written, 3);
    assert_eq!(report.comparison.added_count, 2);
    assert_eq!(report.comparison.removed_count, 1);
    assert_eq!(report.comparison.modified_count, 0);
    assert!(report.backup_path.is_none());
    assert!(!report.backup_skipped);

    assert!(!skill.join("README.md").exists());
    assert_eq!(fs::read(skill.join("NOTES.md")).expect("read"), b"new notes");
    assert!(skill.join("scripts").join("run.sh").is_file());
    assert!(!lock_path_for(&skill).exists());
    assert!(fx.backup_files().is_empty());
    assert_eq!(fx.scratch_leftovers(), 0);
    assert_eq!(fs::read_dir(&fx.scope_root).expect("read_dir").count(), 1);
}

#[tokio::test]
async fn keep_backup_retains_archive() {
    let fx = Fixture::new();
    fx.install("pdf", &[("SKILL.md", &skill_md("pdf", "1.0.0"))]);
    let package = fx.package("pdf.zip", &[("pdf/SKILL.md", &skill_md("pdf", "1.0.1"))]);

    let outcome = fx
        .engine()
        .update_skill(
            fx.request(
                "pdf",
                &package,
                UpdateOptions {
                    force: true,
                    keep_backup: true,
                    ..UpdateOptions::default()
                },
            ),
            &decline,
            &CancellationToken::new(),
        )
        .await;

    match outcome {
        UpdateOutcome::Success(report) => {
            let kept = report.backup_path.expect("backup must be kept");
            assert!(kept.is_file());
            assert_eq!(fx.backup_files(), vec![kept]);
        }
        other => panic!("expected success, got {other:?}"),
    }
}

#[tokio::test]
async fn dry_run_previews_without_touching_anything() {
    let fx = Fixture::new();
    let skill = fx.install("pdf", &[("SKILL.md", &skill_md("pdf", "1.0.0"))]);
    let before = relative_files(&skill);
    let package = fx.package(
        "pdf.skill",
        &[
            ("pdf/SKILL.md", &skill_md("pdf", "2.0.0")),
            ("pdf/extra.md", b"extra"),
        ],
    );

    let outcome = fx
        .engine()
        .update_skill(
            fx.request(
                "pdf",
                &package,
                UpdateOptions {
                    dry_run: true,
                    ..UpdateOptions::default()
                },
            ),
            &decline,
            &CancellationToken::new(),
        )
        .await;

    match outcome {
        UpdateOutcome::DryRunPreview(preview) => {
            assert_eq!(preview.installed_version.as_deref(), Some("1.0.0"));
            assert_eq!(preview.incoming_version.as_deref(), Some("2.0.0"));
            assert_eq!(paths(&preview.comparison.files_added), vec!["extra.md"]);
            assert!(preview.backup_path.is_none());
        }
        other => panic!("expected dry-run preview, got {other:?}"),
    }
    assert_eq!(relative_files(&skill), before);
    assert!(!lock_path_for(&skill).exists());
    assert!(fx.backup_files().is_empty());
    assert_eq!(fx.scratch_leftovers(), 0);
}

#[tokio::test]
async fn package_root_mismatch_is_reported() {
    let fx = Fixture::new();
    fx.install("x", &[("SKILL.md", &skill_md("x", "1.0.0"))]);
    let package = fx.package("x.skill", &[("y/SKILL.md", &skill_md("y", "1.0.0"))]);

    let outcome = fx
        .engine()
        .update_skill(
            fx.request("x", &package, UpdateOptions::default()),
            &accept,
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(
        outcome,
        UpdateOutcome::Failed(UpdateError::PackageMismatch {
            installed_skill_name: "x".to_string(),
            package_skill_name: "y".to_string(),
        })
    );
}

#[tokio::test]
async fn manifest_name_mismatch_is_reported() {
    let fx = Fixture::new();
    fx.install("pdf", &[("SKILL.md", &skill_md("pdf", "1.0.0"))]);
    let package = fx.package("pdf.skill", &[("pdf/SKILL.md", &skill_md("docx", "1.0.0"))]);

    let outcome = fx
        .engine()
        .update_skill(
            fx.request("pdf", &package, UpdateOptions::default()),
            &accept,
            &CancellationToken::new(),
        )
        .await;

    match outcome {
        UpdateOutcome::Failed(UpdateError::PackageMismatch {
            package_skill_name, ..
        }) => assert_eq!(package_skill_name, "docx"),
        other => panic!("expected package mismatch, got {other:?}"),
    }
}

#[tokio::test]
async fn traversal_entry_blocks_update_before_anything_is_written() {
    let fx = Fixture::new();
    let skill = fx.install("pdf", &[("SKILL.md", &skill_md("pdf", "1.0.0"))]);
    let before = relative_files(&skill);
    let package = fx.package(
        "pdf.skill",
        &[
            ("pdf/SKILL.md", &skill_md("pdf", "1.0.1")),
            ("pdf/../../escaped.txt", b"pwned"),
        ],
    );

    let outcome = fx
        .engine()
        .update_skill(
            fx.request("pdf", &package, UpdateOptions::default()),
            &accept,
            &CancellationToken::new(),
        )
        .await;

    match outcome {
        UpdateOutcome::Failed(UpdateError::Security { reason, .. }) => {
            assert_eq!(reason, SecurityReason::PathTraversal)
        }
        other => panic!("expected path traversal, got {other:?}"),
    }
    assert_eq!(relative_files(&skill), before);
    let escaped = asm_core::enumerate(&fx.root)
        .filter(|record| record.relative_path.ends_with("escaped.txt"))
        .count();
    assert_eq!(escaped, 0);
    assert_eq!(fx.scratch_leftovers(), 0);
}

#[tokio::test]
async fn package_with_two_roots_is_invalid() {
    let fx = Fixture::new();
    fx.install("pdf", &[("SKILL.md", &skill_md("pdf", "1.0.0"))]);
    let package = fx.package(
        "pdf.skill",
        &[
            ("pdf/SKILL.md", &skill_md("pdf", "1.0.1")),
            ("other/file.txt", b"x"),
        ],
    );

    let outcome = fx
        .engine()
        .update_skill(
            fx.request("pdf", &package, UpdateOptions::default()),
            &accept,
            &CancellationToken::new(),
        )
        .await;

    match outcome {
        UpdateOutcome::Failed(UpdateError::Validation { field, .. }) => {
            assert_eq!(field, "package structure")
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[tokio::test]
async fn request_validation_failures() {
    let fx = Fixture::new();
    fx.install("pdf", &[("SKILL.md", &skill_md("pdf", "1.0.0"))]);
    let package = fx.package("pdf.skill", &[("pdf/SKILL.md", &skill_md("pdf", "1.0.1"))]);
    let tarball = fx.packages.join("pdf.tar");
    fs::write(&tarball, b"x").expect("write");
    let garbage = fx.packages.join("broken.skill");
    fs::write(&garbage, b"not a zip").expect("write");
    let engine = fx.engine();

    let cases = [
        (fx.request("Bad_Name", &package, UpdateOptions::default()), "skill name"),
        (
            UpdateRequest {
                scope: "global".to_string(),
                ..fx.request("pdf", &package, UpdateOptions::default())
            },
            "scope",
        ),
        (
            fx.request("pdf", &fx.packages.join("absent.skill"), UpdateOptions::default()),
            "package path",
        ),
        (fx.request("pdf", &tarball, UpdateOptions::default()), "package extension"),
        (fx.request("pdf", &garbage, UpdateOptions::default()), "package"),
    ];

    for (request, expected_field) in cases {
        match engine
            .update_skill(request, &accept, &CancellationToken::new())
            .await
        {
            UpdateOutcome::Failed(UpdateError::Validation { field, .. }) => {
                assert_eq!(field, expected_field)
            }
            other => panic!("expected validation error for {expected_field}, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn missing_skill_is_not_found() {
    let fx = Fixture::new();
    let package = fx.package("pdf.skill", &[("pdf/SKILL.md", &skill_md("pdf", "1.0.1"))]);

    let outcome = fx
        .engine()
        .update_skill(
            fx.request("pdf", &package, UpdateOptions::default()),
            &accept,
            &CancellationToken::new(),
        )
        .await;

    match outcome {
        UpdateOutcome::Failed(err @ UpdateError::SkillNotFound { .. }) => {
            assert_eq!(err.code(), "ASM-1001");
            assert_eq!(err.kind(), "skill-not-found");
        }
        other => panic!("expected skill-not-found, got {other:?}"),
    }
}

#[tokio::test]
async fn case_variant_of_installed_skill_is_a_security_error() {
    let fx = Fixture::new();
    fx.install("PDF", &[("SKILL.md", &skill_md("pdf", "1.0.0"))]);
    let package = fx.package("pdf.skill", &[("pdf/SKILL.md", &skill_md("pdf", "1.0.1"))]);

    let outcome = fx
        .engine()
        .update_skill(
            fx.request("pdf", &package, UpdateOptions::default()),
            &accept,
            &CancellationToken::new(),
        )
        .await;

    match outcome {
        UpdateOutcome::Failed(UpdateError::Security { reason, detail }) => {
            assert_eq!(reason, SecurityReason::CaseMismatch);
            assert!(detail.contains("PDF"));
        }
        other => panic!("expected case mismatch, got {other:?}"),
    }
}

#[tokio::test]
async fn declined_confirmation_releases_lock_and_deletes_backup() {
    let fx = Fixture::new();
    let skill = fx.install("pdf", &[("SKILL.md", &skill_md("pdf", "1.0.0"))]);
    let before = relative_files(&skill);
    let package = fx.package("pdf.skill", &[("pdf/SKILL.md", &skill_md("pdf", "1.0.1"))]);

    let outcome = fx
        .engine()
        .update_skill(
            fx.request("pdf", &package, UpdateOptions::default()),
            &decline,
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(
        outcome,
        UpdateOutcome::Cancelled {
            skill_name: "pdf".to_string(),
            reason: CancelReason::UserDeclined,
        }
    );
    assert_eq!(relative_files(&skill), before);
    assert!(!lock_path_for(&skill).exists());
    assert!(fx.backup_files().is_empty());
    assert_eq!(fx.scratch_leftovers(), 0);
}

#[tokio::test]
async fn cancelled_token_stops_before_any_change() {
    let fx = Fixture::new();
    let skill = fx.install("pdf", &[("SKILL.md", &skill_md("pdf", "1.0.0"))]);
    let before = relative_files(&skill);
    let package = fx.package("pdf.skill", &[("pdf/SKILL.md", &skill_md("pdf", "1.0.1"))]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = fx
        .engine()
        .update_skill(
            fx.request("pdf", &package, UpdateOptions::default()),
            &accept,
            &cancel,
        )
        .await;

    assert_eq!(
        outcome,
        UpdateOutcome::Cancelled {
            skill_name: "pdf".to_string(),
            reason: CancelReason::Signal,
        }
    );
    assert_eq!(relative_files(&skill), before);
    assert!(fx.backup_files().is_empty());
}

#[tokio::test]
async fn cancelled_token_stops_before_the_package_is_opened() {
    let fx = Fixture::new();
    fx.install("pdf", &[("SKILL.md", &skill_md("pdf", "1.0.0"))]);
    let package = fx.package("pdf.skill", &[("pdf/SKILL.md", &skill_md("pdf", "1.0.1"))]);
    let engine = fx.engine().with_hooks(ExecutionHooks {
        open: refusing_open,
        ..ExecutionHooks::default()
    });
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = engine
        .update_skill(
            fx.request("pdf", &package, UpdateOptions::default()),
            &accept,
            &cancel,
        )
        .await;
    assert!(matches!(
        outcome,
        UpdateOutcome::Cancelled {
            reason: CancelReason::Signal,
            ..
        }
    ));

    let missing = fx.packages.join("missing.skill");
    let outcome = fx
        .engine()
        .update_skill(
            fx.request("pdf", &missing, UpdateOptions::default()),
            &accept,
            &cancel,
        )
        .await;
    assert!(matches!(outcome, UpdateOutcome::Cancelled { .. }));
}

#[tokio::test]
async fn oversized_manifest_is_a_validation_error() {
    let fx = Fixture::new();
    let skill = fx.install("pdf", &[("SKILL.md", &skill_md("pdf", "1.0.0"))]);
    let before = relative_files(&skill);
    let mut manifest = skill_md("pdf", "1.0.1");
    manifest.extend(bytes(MAX_MANIFEST_BYTES as usize));
    let package = fx.package("pdf.skill", &[("pdf/SKILL.md", &manifest)]);

    let outcome = fx
        .engine()
        .update_skill(
            fx.request("pdf", &package, UpdateOptions::default()),
            &accept,
            &CancellationToken::new(),
        )
        .await;

    match outcome {
        UpdateOutcome::Failed(UpdateError::Validation { field, message }) => {
            assert_eq!(field, "SKILL.md");
            assert!(message.contains("limit is"), "{message}");
        }
        other => panic!("expected validation failure, got {other:?}"),
    }
    assert_eq!(relative_files(&skill), before);
    assert_eq!(fx.scratch_leftovers(), 0);
}

// timeouts

#[tokio::test]
async fn slow_package_open_times_out() {
    let fx = Fixture::new();
    let skill = fx.install("pdf", &[("SKILL.md", &skill_md("pdf", "1.0.0"))]);
    let package = fx.package("pdf.skill", &[("pdf/SKILL.md", &skill_md("pdf", "1.0.1"))]);
    let engine = fx
        .engine_with(short_timeouts(|timeouts| timeouts.package_validation_secs = 1))
        .with_hooks(ExecutionHooks {
            open: slow_open,
            ..ExecutionHooks::default()
        });

    let outcome = engine
        .update_skill(
            fx.request("pdf", &package, UpdateOptions::default()),
            &accept,
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(timed_out_operation(&outcome), "package validation");
    assert!(!lock_path_for(&skill).exists());
    assert!(settle(|| SLOW_OPEN_DONE.load(Ordering::SeqCst)).await);
    assert_eq!(fx.scratch_leftovers(), 0);
}

#[tokio::test]
async fn slow_extraction_times_out_and_scratch_is_removed_after_the_worker() {
    let fx = Fixture::new();
    let skill = fx.install("pdf", &[("SKILL.md", &skill_md("pdf", "1.0.0"))]);
    let before = relative_files(&skill);
    let package = fx.package(
        "pdf.skill",
        &[
            ("pdf/SKILL.md", &skill_md("pdf", "1.0.1")),
            ("pdf/scripts/run.sh", b"echo hi\n"),
        ],
    );
    let engine = fx
        .engine_with(short_timeouts(|timeouts| timeouts.extraction_secs = 1))
        .with_hooks(ExecutionHooks {
            extract: slow_extract,
            ..ExecutionHooks::default()
        });

    let outcome = engine
        .update_skill(
            fx.request("pdf", &package, UpdateOptions::default()),
            &accept,
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(timed_out_operation(&outcome), "extraction");
    assert!(!lock_path_for(&skill).exists());
    assert!(
        settle(|| SLOW_EXTRACT_DONE.load(Ordering::SeqCst) && fx.scratch_leftovers() == 0).await,
        "scratch tree left behind after the extraction worker finished"
    );
    assert_eq!(relative_files(&skill), before);
}

#[tokio::test]
async fn slow_backup_times_out_and_the_late_archive_is_discarded() {
    let fx = Fixture::new();
    let skill = fx.install(
        "pdf",
        &[
            ("SKILL.md", &skill_md("pdf", "1.0.0")),
            ("README.md", b"original readme"),
        ],
    );
    let before = relative_files(&skill);
    let package = fx.package("pdf.skill", &[("pdf/SKILL.md", &skill_md("pdf", "1.0.1"))]);
    let engine = fx
        .engine_with(short_timeouts(|timeouts| timeouts.backup_secs = 1))
        .with_hooks(ExecutionHooks {
            backup: slow_backup,
            ..ExecutionHooks::default()
        });

    let outcome = engine
        .update_skill(
            fx.request(
                "pdf",
                &package,
                UpdateOptions {
                    force: true,
                    ..UpdateOptions::default()
                },
            ),
            &accept,
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(timed_out_operation(&outcome), "backup");
    assert!(!lock_path_for(&skill).exists());
    assert_eq!(fx.scratch_leftovers(), 0);
    assert!(
        settle(|| SLOW_BACKUP_DONE.load(Ordering::SeqCst) && fx.backup_files().is_empty()).await,
        "backup finished after the timeout was kept"
    );
    assert_eq!(relative_files(&skill), before);
}

#[tokio::test]
async fn overall_update_limit_bounds_a_slow_apply() {
    let fx = Fixture::new();
    let skill = fx.install("pdf", &[("SKILL.md", &skill_md("pdf", "1.0.0"))]);
    let before = relative_files(&skill);
    let package = fx.package("pdf.skill", &[("pdf/SKILL.md", &skill_md("pdf", "1.0.1"))]);
    let engine = fx
        .engine_with(short_timeouts(|timeouts| timeouts.update_secs = 1))
        .with_hooks(ExecutionHooks {
            apply: slow_apply,
            ..ExecutionHooks::default()
        });

    let outcome = engine
        .update_skill(
            fx.request(
                "pdf",
                &package,
                UpdateOptions {
                    force: true,
                    ..UpdateOptions::default()
                },
            ),
            &accept,
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(timed_out_operation(&outcome), "update");
    assert!(
        settle(|| SLOW_APPLY_DONE.load(Ordering::SeqCst)
            && !lock_path_for(&skill).exists()
            && fx.scratch_leftovers() == 0)
        .await,
        "lock or scratch tree outlived the execution worker"
    );
    assert_eq!(relative_files(&skill), before);
}

#[tokio::test]
async fn failed_apply_rolls_back_from_backup() {
    let fx = Fixture::new();
    let skill = fx.install(
        "pdf",
        &[
            ("SKILL.md", &skill_md("pdf", "1.0.0")),
            ("README.md", b"original readme"),
        ],
    );
    let before = relative_files(&skill);
    let package = fx.package("pdf.skill", &[("pdf/SKILL.md", &skill_md("pdf", "1.0.1"))]);
    let engine = fx.engine().with_hooks(ExecutionHooks {
        apply: failing_apply,
        ..ExecutionHooks::default()
    });

    let outcome = engine
        .update_skill(
            fx.request(
                "pdf",
                &package,
                UpdateOptions {
                    force: true,
                    ..UpdateOptions::default()
                },
            ),
            &accept,
            &CancellationToken::new(),
        )
        .await;

    match outcome {
        UpdateOutcome::RolledBack {
            skill_name,
            backup_path,
            error,
        } => {
            assert_eq!(skill_name, "pdf");
            assert!(backup_path.is_file());
            assert!(error.to_string().contains("simulated apply failure"));
        }
        other => panic!("expected rolled back, got {other:?}"),
    }
    assert_eq!(relative_files(&skill), before);
    assert!(!lock_path_for(&skill).exists());
    assert_eq!(fx.scratch_leftovers(), 0);
}

#[tokio::test]
async fn failed_restore_escalates_to_rollback_failed() {
    let fx = Fixture::new();
    fx.install(
        "pdf",
        &[
            ("SKILL.md", &skill_md("pdf", "1.0.0")),
            ("README.md", b"original readme"),
        ],
    );
    let package = fx.package("pdf.skill", &[("pdf/SKILL.md", &skill_md("pdf", "1.0.1"))]);
    let engine = fx.engine().with_hooks(ExecutionHooks {
        apply: failing_apply,
        restore: failing_restore,
        ..ExecutionHooks::default()
    });

    let outcome = engine
        .update_skill(
            fx.request(
                "pdf",
                &package,
                UpdateOptions {
                    force: true,
                    ..UpdateOptions::default()
                },
            ),
            &accept,
            &CancellationToken::new(),
        )
        .await;

    match outcome {
        UpdateOutcome::RollbackFailed {
            backup_path,
            error,
            recovery_instructions,
            ..
        } => {
            assert!(backup_path.is_file());
            assert!(!recovery_instructions.is_empty());
            assert!(recovery_instructions
                .iter()
                .any(|line| line.contains(&backup_path.display().to_string())));
            match error {
                UpdateError::Critical {
                    update_error,
                    rollback_error,
                    ..
                } => {
                    assert!(update_error.contains("simulated apply failure"));
                    assert!(rollback_error.contains("simulated restore failure"));
                }
                other => panic!("expected critical error, got {other:?}"),
            }
        }
        other => panic!("expected rollback failed, got {other:?}"),
    }
}

#[tokio::test]
async fn failure_without_backup_is_a_rollback_error() {
    let fx = Fixture::new();
    fx.install("pdf", &[("SKILL.md", &skill_md("pdf", "1.0.0"))]);
    let package = fx.package("pdf.skill", &[("pdf/SKILL.md", &skill_md("pdf", "1.0.1"))]);
    let engine = fx.engine().with_hooks(ExecutionHooks {
        apply: failing_apply,
        ..ExecutionHooks::default()
    });

    let outcome = engine
        .update_skill(
            fx.request(
                "pdf",
                &package,
                UpdateOptions {
                    force: true,
                    skip_backup: true,
                    ..UpdateOptions::default()
                },
            ),
            &accept,
            &CancellationToken::new(),
        )
        .await;

    assert!(matches!(
        outcome,
        UpdateOutcome::Failed(UpdateError::Rollback { .. })
    ));
    assert!(fx.backup_files().is_empty());
}

#[tokio::test]
async fn skip_backup_still_reports_placeholder_to_confirm() {
    let fx = Fixture::new();
    fx.install("pdf", &[("SKILL.md", &skill_md("pdf", "1.0.0"))]);
    let package = fx.package("pdf.skill", &[("pdf/SKILL.md", &skill_md("pdf", "1.0.1"))]);
    let seen = std::sync::Mutex::new(None);
    let confirm = |preview: &UpdatePreview| {
        *seen.lock().expect("mutex") = preview.backup_path.clone();
        true
    };

    let outcome = fx
        .engine()
        .update_skill(
            fx.request(
                "pdf",
                &package,
                UpdateOptions {
                    skip_backup: true,
                    ..UpdateOptions::default()
                },
            ),
            &confirm,
            &CancellationToken::new(),
        )
        .await;

    match outcome {
        UpdateOutcome::Success(report) => assert!(report.backup_skipped),
        other => panic!("expected success, got {other:?}"),
    }
    let placeholder = seen
        .into_inner()
        .expect("mutex")
        .expect("placeholder must be shown");
    assert!(placeholder.starts_with(fx.asm_home.join("backups")));
    assert!(!placeholder.exists());
    assert!(fx.backup_files().is_empty());
}

#[tokio::test]
async fn held_lock_blocks_update() {
    let fx = Fixture::new();
    let skill = fx.install("pdf", &[("SKILL.md", &skill_md("pdf", "1.0.0"))]);
    let package = fx.package("pdf.skill", &[("pdf/SKILL.md", &skill_md("pdf", "1.0.1"))]);
    let _held = acquire_update_lock(&skill, &package).expect("hold lock");

    let outcome = fx
        .engine()
        .update_skill(
            fx.request("pdf", &package, UpdateOptions::default()),
            &accept,
            &CancellationToken::new(),
        )
        .await;

    match outcome {
        UpdateOutcome::Failed(UpdateError::Filesystem { operation, .. }) => {
            assert_eq!(operation, "lock")
        }
        other => panic!("expected lock failure, got {other:?}"),
    }
    assert!(fx.backup_files().is_empty());
}

#[tokio::test]
async fn resource_limits_need_force() {
    let fx = Fixture::new();
    fx.install(
        "pdf",
        &[("SKILL.md", &skill_md("pdf", "1.0.0")), ("a.txt", b"a")],
    );
    let package = fx.package(
        "pdf.skill",
        &[
            ("pdf/SKILL.md", &skill_md("pdf", "1.0.1")),
            ("pdf/a.txt", b"a"),
            ("pdf/b.txt", b"b"),
        ],
    );
    let mut config = EngineConfig::default();
    config.limits.max_file_count = 2;
    let engine = fx.engine_with(config);

    match engine
        .update_skill(
            fx.request("pdf", &package, UpdateOptions::default()),
            &accept,
            &CancellationToken::new(),
        )
        .await
    {
        UpdateOutcome::Failed(UpdateError::Validation { field, message }) => {
            assert_eq!(field, "resource limits");
            assert!(message.contains("file count 3 exceeds limit 2"));
        }
        other => panic!("expected resource limit failure, got {other:?}"),
    }

    match engine
        .update_skill(
            fx.request(
                "pdf",
                &package,
                UpdateOptions {
                    force: true,
                    ..UpdateOptions::default()
                },
            ),
            &accept,
            &CancellationToken::new(),
        )
        .await
    {
        UpdateOutcome::Success(report) => {
            assert!(report
                .warnings
                .iter()
                .any(|warning| warning.contains("resource limits")));
        }
        other => panic!("expected forced success, got {other:?}"),
    }
}

#[tokio::test]
async fn downgrade_is_a_warning_only() {
    let fx = Fixture::new();
    fx.install("pdf", &[("SKILL.md", &skill_md("pdf", "2.0.0"))]);
    let package = fx.package("pdf.skill", &[("pdf/SKILL.md", &skill_md("pdf", "1.0.0"))]);

    match fx
        .engine()
        .update_skill(
            fx.request("pdf", &package, UpdateOptions::default()),
            &accept,
            &CancellationToken::new(),
        )
        .await
    {
        UpdateOutcome::Success(report) => {
            assert!(report
                .warnings
                .iter()
                .any(|warning| warning.contains("older than installed version 2.0.0")));
        }
        other => panic!("expected success with warning, got {other:?}"),
    }
}

#[cfg(unix)]
#[tokio::test]
async fn hard_links_block_unless_allowed() {
    let fx = Fixture::new();
    let skill = fx.install(
        "pdf",
        &[("SKILL.md", &skill_md("pdf", "1.0.0")), ("shared.txt", b"s")],
    );
    fs::hard_link(skill.join("shared.txt"), fx.root.join("elsewhere.txt")).expect("hard link");
    let package = fx.package("pdf.skill", &[("pdf/SKILL.md", &skill_md("pdf", "1.0.1"))]);
    let engine = fx.engine();

    match engine
        .update_skill(
            fx.request("pdf", &package, UpdateOptions::default()),
            &accept,
            &CancellationToken::new(),
        )
        .await
    {
        UpdateOutcome::Failed(UpdateError::Security { reason, .. }) => {
            assert_eq!(reason, SecurityReason::HardLinkDetected)
        }
        other => panic!("expected hard link block, got {other:?}"),
    }

    let outcome = engine
        .update_skill(
            fx.request(
                "pdf",
                &package,
                UpdateOptions {
                    allow_hard_links: true,
                    ..UpdateOptions::default()
                },
            ),
            &accept,
            &CancellationToken::new(),
        )
        .await;
    assert!(matches!(outcome, UpdateOutcome::Success(_)), "{outcome:?}");
    assert_eq!(
        fs::read(fx.root.join("elsewhere.txt")).expect("read"),
        b"s"
    );
}

#[cfg(unix)]
#[tokio::test]
async fn skill_symlinked_outside_scope_is_rejected() {
    let fx = Fixture::new();
    let outside = fx.root.join("outside").join("pdf");
    write_tree(&outside, &[("SKILL.md", &skill_md("pdf", "1.0.0"))]);
    std::os::unix::fs::symlink(&outside, fx.scope_root.join("pdf")).expect("symlink");
    let package = fx.package("pdf.skill", &[("pdf/SKILL.md", &skill_md("pdf", "1.0.1"))]);

    match fx
        .engine()
        .update_skill(
            fx.request("pdf", &package, UpdateOptions::default()),
            &accept,
            &CancellationToken::new(),
        )
        .await
    {
        UpdateOutcome::Failed(UpdateError::Security { reason, .. }) => {
            assert_eq!(reason, SecurityReason::SymlinkEscape)
        }
        other => panic!("expected symlink escape, got {other:?}"),
    }
}

// uninstall

#[tokio::test]
async fn uninstall_removes_each_skill_and_reports_missing() {
    let fx = Fixture::new();
    let pdf = fx.install("pdf", &[("SKILL.md", b"x")]);
    let docx = fx.install("docx", &[("SKILL.md", b"x")]);

    let results = uninstall_skills(
        &fx.scope_root,
        &["pdf".to_string(), "absent".to_string(), "docx".to_string()],
        &CancellationToken::new(),
    )
    .await;

    let statuses = results
        .iter()
        .map(|result| (result.name.as_str(), result.status.clone()))
        .collect::<Vec<_>>();
    assert_eq!(
        statuses,
        vec![
            ("pdf", UninstallStatus::Uninstalled),
            ("absent", UninstallStatus::NotInstalled),
            ("docx", UninstallStatus::Uninstalled),
        ]
    );
    assert!(!pdf.exists());
    assert!(!docx.exists());
    assert!(!lock_path_for(&pdf).exists());
}

#[tokio::test]
async fn uninstall_stops_when_cancelled() {
    let fx = Fixture::new();
    let pdf = fx.install("pdf", &[("SKILL.md", b"x")]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let results = uninstall_skills(&fx.scope_root, &["pdf".to_string()], &cancel).await;
    assert_eq!(results[0].status, UninstallStatus::Cancelled);
    assert!(pdf.exists());
}

#[tokio::test]
async fn uninstall_respects_update_lock() {
    let fx = Fixture::new();
    let pdf = fx.install("pdf", &[("SKILL.md", b"x")]);
    let _held = acquire_update_lock(&pdf, Path::new("pdf.skill")).expect("hold lock");

    let results =
        uninstall_skills(&fx.scope_root, &["pdf".to_string()], &CancellationToken::new()).await;
    assert!(matches!(
        results[0].status,
        UninstallStatus::Failed { .. }
    ));
    assert!(pdf.exists());
}
