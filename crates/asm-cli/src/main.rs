use std::path::PathBuf;
use std::process::ExitCode;

use asm_core::Scope;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

mod completion;
mod dispatch;
mod prompt;
mod render;

use completion::CliCompletionShell;
use dispatch::run_cli;
use render::{render_status_line, resolve_output_style};

#[derive(Parser, Debug)]
#[command(name = "asm", version)]
#[command(about = "Update and manage installed agent skills", long_about = None)]
struct Cli {
    /// Directory whose `.claude/skills` holds project-scoped skills.
    #[arg(long, global = true, env = "ASM_PROJECT_DIR")]
    project_dir: Option<PathBuf>,
    /// Engine config file. Defaults to `~/.asm/config.toml`.
    #[arg(long, global = true, env = "ASM_CONFIG")]
    config: Option<PathBuf>,
    /// Overrides `backup_root` from the config file.
    #[arg(long, global = true)]
    backup_root: Option<PathBuf>,
    #[arg(long, global = true)]
    no_color: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replace an installed skill with the contents of a package.
    Update {
        name: String,
        package: PathBuf,
        #[arg(long, value_enum, default_value_t = CliScope::Project)]
        scope: CliScope,
        #[arg(long)]
        dry_run: bool,
        /// Skip the confirmation prompt and accept oversized skills.
        #[arg(long, short = 'f')]
        force: bool,
        #[arg(long, conflicts_with = "skip_backup")]
        keep_backup: bool,
        #[arg(long)]
        skip_backup: bool,
        /// Hash same-size files to find content-only changes.
        #[arg(long)]
        thorough: bool,
        #[arg(long)]
        allow_hard_links: bool,
        /// Compare manifest versions as semver when checking for downgrades.
        #[arg(long)]
        semver: bool,
    },
    /// Remove one or more installed skills.
    Uninstall {
        #[arg(required = true)]
        names: Vec<String>,
        #[arg(long, value_enum, default_value_t = CliScope::Project)]
        scope: CliScope,
    },
    /// List backups kept for a skill, newest first.
    Backups { name: String },
    /// Restore a skill from a backup archive.
    Restore {
        name: String,
        #[arg(long, value_enum, default_value_t = CliScope::Project)]
        scope: CliScope,
        /// Backup archive to restore; the newest backup when omitted.
        #[arg(long)]
        backup: Option<PathBuf>,
    },
    /// Print a shell completion script.
    Completions {
        #[arg(value_enum)]
        shell: CliCompletionShell,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliScope {
    Project,
    #[value(alias = "user")]
    Personal,
}

impl CliScope {
    fn as_str(self) -> &'static str {
        Scope::from(self).as_str()
    }
}

impl From<CliScope> for Scope {
    fn from(value: CliScope) -> Self {
        match value {
            CliScope::Project => Scope::Project,
            CliScope::Personal => Scope::Personal,
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("ASM_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    let style = resolve_output_style(
        std::io::IsTerminal::is_terminal(&std::io::stdout()),
        cli.no_color || std::env::var_os("NO_COLOR").is_some(),
    );

    match run_cli(cli, style).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{}", render_status_line(style, "err", &format!("{err:#}")));
            ExitCode::FAILURE
        }
    }
}
