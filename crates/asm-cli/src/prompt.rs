use std::io::{self, BufRead, Write};

use asm_installer::{Confirm, UpdatePreview};
use indicatif::ProgressBar;

use crate::render::{format_preview_lines, OutputStyle};

/// Prints the preview and reads a y/N answer from stdin. Anything other
/// than `y`/`yes`, including EOF, declines.
pub(crate) struct StdinConfirm {
    style: OutputStyle,
    progress_bar: Option<ProgressBar>,
}

impl StdinConfirm {
    pub(crate) fn new(style: OutputStyle, progress_bar: Option<ProgressBar>) -> Self {
        Self {
            style,
            progress_bar,
        }
    }

    fn ask(&self, preview: &UpdatePreview) -> io::Result<bool> {
        let mut stdout = io::stdout().lock();
        for line in format_preview_lines(preview, self.style) {
            writeln!(stdout, "{line}")?;
        }
        write!(stdout, "Proceed with update of {}? [y/N] ", preview.skill_name)?;
        stdout.flush()?;

        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer)?;
        Ok(parse_confirmation(&answer))
    }
}

impl Confirm for StdinConfirm {
    fn confirm(&self, preview: &UpdatePreview) -> bool {
        let answer = match &self.progress_bar {
            Some(progress_bar) => progress_bar.suspend(|| self.ask(preview)),
            None => self.ask(preview),
        };
        answer.unwrap_or_else(|err| {
            tracing::warn!(error = %err, "could not read confirmation; declining");
            false
        })
    }
}

pub(crate) fn parse_confirmation(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
