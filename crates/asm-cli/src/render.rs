use std::time::{Duration, Instant};

use anstyle::{AnsiColor, Effects, Style};
use asm_installer::{
    BackupInfo, CancelReason, FileChange, UninstallResult, UninstallStatus, UpdateOutcome,
    UpdatePreview, UpdateReport, VersionComparison,
};
use indicatif::{HumanBytes, HumanCount, ProgressBar, ProgressStyle};

/// Changes listed per kind before the rest is folded into a count.
const MAX_LISTED_CHANGES: usize = 10;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputStyle {
    Plain,
    Rich,
}

pub(crate) fn resolve_output_style(stdout_is_terminal: bool, color_disabled: bool) -> OutputStyle {
    if stdout_is_terminal && !color_disabled {
        OutputStyle::Rich
    } else {
        OutputStyle::Plain
    }
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct TerminalRenderer {
    style: OutputStyle,
}

pub(crate) struct TerminalSpinner {
    style: OutputStyle,
    label: String,
    progress_bar: Option<ProgressBar>,
    started_at: Instant,
}

impl TerminalRenderer {
    pub(crate) fn from_style(style: OutputStyle) -> Self {
        Self { style }
    }

    pub(crate) fn style(self) -> OutputStyle {
        self.style
    }

    pub(crate) fn print_lines(self, lines: &[String]) {
        for line in lines {
            println!("{line}");
        }
    }

    pub(crate) fn start_spinner(self, label: &str) -> TerminalSpinner {
        let progress_bar = if self.style == OutputStyle::Rich {
            let progress_bar = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan.bold} {msg} {elapsed}")
            {
                progress_bar.set_style(style.tick_chars("<^>v "));
            }
            progress_bar.set_message(label.to_string());
            progress_bar.enable_steady_tick(Duration::from_millis(80));
            Some(progress_bar)
        } else {
            None
        };

        TerminalSpinner {
            style: self.style,
            label: label.to_string(),
            progress_bar,
            started_at: Instant::now(),
        }
    }
}

impl TerminalSpinner {
    /// Handle used to pause the spinner while prompting.
    pub(crate) fn handle(&self) -> Option<ProgressBar> {
        self.progress_bar.clone()
    }

    pub(crate) fn finish(mut self) {
        let Some(progress_bar) = self.progress_bar.take() else {
            return;
        };
        progress_bar.finish_and_clear();
        tracing::debug!(
            label = %self.label,
            elapsed = %format_elapsed(self.started_at.elapsed()),
            style = ?self.style,
            "spinner finished"
        );
    }
}

fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let millis = elapsed.subsec_millis();
    format!("{secs}.{millis:03}s")
}

fn badge_style(status: &str) -> Style {
    let color = match status {
        "ok" => AnsiColor::BrightGreen,
        "warn" => AnsiColor::BrightYellow,
        "err" => AnsiColor::BrightRed,
        _ => AnsiColor::BrightCyan,
    };
    Style::new()
        .fg_color(Some(color.into()))
        .effects(Effects::BOLD)
}

fn section_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightBlue.into()))
        .effects(Effects::BOLD)
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}

fn status_badge(status: &str) -> &'static str {
    match status {
        "ok" => "[OK]",
        "warn" => "[WARN]",
        "err" => "[ERR]",
        _ => "[..]",
    }
}

/// Plain output is the bare message; rich output prefixes a colored badge.
pub(crate) fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => message.to_string(),
        OutputStyle::Rich => format!(
            "{} {message}",
            colorize(badge_style(status), status_badge(status))
        ),
    }
}

fn render_section_header(style: OutputStyle, title: &str) -> String {
    match style {
        OutputStyle::Plain => format!("{title}:"),
        OutputStyle::Rich => colorize(section_style(), &format!("== {title} ==")),
    }
}

pub(crate) fn format_size_delta(delta: i64) -> String {
    let magnitude = HumanBytes(delta.unsigned_abs());
    if delta < 0 {
        format!("-{magnitude}")
    } else {
        format!("+{magnitude}")
    }
}

fn format_version(version: Option<&str>) -> &str {
    version.unwrap_or("unversioned")
}

pub(crate) fn format_comparison_summary(comparison: &VersionComparison) -> String {
    format!(
        "{} added, {} removed, {} modified ({})",
        HumanCount(comparison.added_count as u64),
        HumanCount(comparison.removed_count as u64),
        HumanCount(comparison.modified_count as u64),
        format_size_delta(comparison.size_change)
    )
}

fn push_change_lines(lines: &mut Vec<String>, marker: char, changes: &[FileChange]) {
    for change in changes.iter().take(MAX_LISTED_CHANGES) {
        let detail = match marker {
            '+' => HumanBytes(change.size_after).to_string(),
            '-' => HumanBytes(change.size_before).to_string(),
            _ => format!(
                "{} -> {}",
                HumanBytes(change.size_before),
                HumanBytes(change.size_after)
            ),
        };
        lines.push(format!("  {marker} {} ({detail})", change.path));
    }
    if changes.len() > MAX_LISTED_CHANGES {
        lines.push(format!(
            "  {marker} ... and {} more",
            changes.len() - MAX_LISTED_CHANGES
        ));
    }
}

pub(crate) fn format_preview_lines(preview: &UpdatePreview, style: OutputStyle) -> Vec<String> {
    let mut lines = vec![render_section_header(
        style,
        &format!("update {} ({})", preview.skill_name, preview.scope),
    )];
    lines.push(format!(
        "installed: {} [{}; {} files, {}]",
        preview.skill_path.display(),
        format_version(preview.installed_version.as_deref()),
        HumanCount(preview.installed_summary.file_count),
        HumanBytes(preview.installed_summary.total_size)
    ));
    lines.push(format!(
        "package:   {} [{}; {} files, {}]",
        preview.package_path.display(),
        format_version(preview.incoming_version.as_deref()),
        HumanCount(preview.incoming_summary.file_count),
        HumanBytes(preview.incoming_summary.total_size)
    ));
    lines.push(format!(
        "changes:   {}",
        format_comparison_summary(&preview.comparison)
    ));
    push_change_lines(&mut lines, '+', &preview.comparison.files_added);
    push_change_lines(&mut lines, '-', &preview.comparison.files_removed);
    push_change_lines(&mut lines, '~', &preview.comparison.files_modified);
    match &preview.backup_path {
        Some(path) => lines.push(format!("backup:    {}", path.display())),
        None => lines.push("backup:    none".to_string()),
    }
    for warning in &preview.warnings {
        lines.push(render_status_line(style, "warn", warning));
    }
    lines
}

fn format_success_lines(report: &UpdateReport, style: OutputStyle) -> Vec<String> {
    let mut lines = vec![render_status_line(
        style,
        "ok",
        &format!(
            "updated {} to {} ({} files written)",
            report.skill_name,
            format_version(report.incoming_version.as_deref()),
            HumanCount(report.files_written as u64)
        ),
    )];
    lines.push(format!(
        "changes: {}",
        format_comparison_summary(&report.comparison)
    ));
    if let Some(path) = &report.backup_path {
        lines.push(format!("backup kept at {}", path.display()));
    }
    if report.backup_skipped {
        lines.push(render_status_line(
            style,
            "warn",
            "no backup was taken for this update",
        ));
    }
    for warning in &report.warnings {
        lines.push(render_status_line(style, "warn", warning));
    }
    lines
}

pub(crate) fn format_update_outcome_lines(
    outcome: &UpdateOutcome,
    style: OutputStyle,
) -> Vec<String> {
    match outcome {
        UpdateOutcome::Success(report) => format_success_lines(report, style),
        UpdateOutcome::DryRunPreview(preview) => {
            let mut lines = format_preview_lines(preview, style);
            lines.push(render_status_line(
                style,
                "info",
                "dry run: nothing was changed",
            ));
            lines
        }
        UpdateOutcome::Cancelled { skill_name, reason } => {
            let why = match reason {
                CancelReason::UserDeclined => "declined",
                CancelReason::Signal => "interrupted",
            };
            vec![render_status_line(
                style,
                "warn",
                &format!("update of {skill_name} cancelled ({why}); nothing was changed"),
            )]
        }
        UpdateOutcome::RolledBack {
            skill_name,
            backup_path,
            error,
        } => vec![
            render_status_line(style, "err", &error.to_string()),
            render_status_line(
                style,
                "ok",
                &format!("restored {skill_name} from backup"),
            ),
            format!("backup kept at {}", backup_path.display()),
        ],
        UpdateOutcome::RollbackFailed {
            error,
            recovery_instructions,
            ..
        } => {
            let mut lines = vec![
                render_status_line(style, "err", &error.to_string()),
                render_section_header(style, "manual recovery"),
            ];
            lines.extend(
                recovery_instructions
                    .iter()
                    .map(|instruction| format!("  {instruction}")),
            );
            lines
        }
        UpdateOutcome::Failed(error) => vec![render_status_line(style, "err", &error.to_string())],
    }
}

/// 0 on success or dry run, 1 on failure, 2 when cancelled, 3 when the
/// skill is left needing manual recovery.
pub(crate) fn exit_code_for(outcome: &UpdateOutcome) -> u8 {
    match outcome {
        UpdateOutcome::Success(_) | UpdateOutcome::DryRunPreview(_) => 0,
        UpdateOutcome::Cancelled { .. } => 2,
        UpdateOutcome::RolledBack { .. } | UpdateOutcome::Failed(_) => 1,
        UpdateOutcome::RollbackFailed { .. } => 3,
    }
}

pub(crate) fn format_uninstall_lines(results: &[UninstallResult], style: OutputStyle) -> Vec<String> {
    results
        .iter()
        .map(|result| match &result.status {
            UninstallStatus::Uninstalled => render_status_line(
                style,
                "ok",
                &format!("uninstalled {}", result.name),
            ),
            UninstallStatus::NotInstalled => render_status_line(
                style,
                "warn",
                &format!("{} is not installed", result.name),
            ),
            UninstallStatus::Cancelled => render_status_line(
                style,
                "warn",
                &format!("{} skipped (cancelled)", result.name),
            ),
            UninstallStatus::Failed { message } => render_status_line(
                style,
                "err",
                &format!("failed to uninstall {}: {message}", result.name),
            ),
        })
        .collect()
}

pub(crate) fn format_backup_lines(skill_name: &str, backups: &[BackupInfo]) -> Vec<String> {
    if backups.is_empty() {
        return vec![format!("No backups found for {skill_name}")];
    }
    backups
        .iter()
        .map(|backup| {
            format!(
                "{}  {}  {} files",
                backup.path.display(),
                HumanBytes(backup.size),
                HumanCount(backup.file_count as u64)
            )
        })
        .collect()
}
