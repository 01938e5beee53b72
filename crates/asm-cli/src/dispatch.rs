use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use asm_core::{validate_skill_name, EngineConfig, Scope, ScopeRoots};
use asm_installer::{
    acquire_skill_lock, list_backups, restore_backup, uninstall_skills, AsmLayout,
    BackupOptions, UninstallStatus, UpdateEngine, UpdateOptions, UpdateRequest, VersionOrdering,
};
use tokio_util::sync::CancellationToken;

use crate::completion::write_completions_script;
use crate::prompt::StdinConfirm;
use crate::render::{
    exit_code_for, format_backup_lines, format_uninstall_lines, format_update_outcome_lines,
    render_status_line, OutputStyle, TerminalRenderer,
};
use crate::{Cli, CliScope, Commands};

pub(crate) async fn run_cli(cli: Cli, style: OutputStyle) -> Result<ExitCode> {
    if let Commands::Completions { shell } = cli.command {
        write_completions_script(shell, &mut io::stdout().lock())?;
        return Ok(ExitCode::SUCCESS);
    }

    let layout = AsmLayout::from_env()?;
    let config = load_engine_config(&layout, cli.config.as_deref(), cli.backup_root)?;
    let project_dir = match cli.project_dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("failed to read current directory")?,
    };
    let scopes = ScopeRoots::from_env(&project_dir)?;
    let renderer = TerminalRenderer::from_style(style);

    match cli.command {
        Commands::Update {
            name,
            package,
            scope,
            dry_run,
            force,
            keep_backup,
            skip_backup,
            thorough,
            allow_hard_links,
            semver,
        } => {
            let request = UpdateRequest {
                skill_name: name,
                scope: scope.as_str().to_string(),
                package_path: package,
                options: UpdateOptions {
                    dry_run,
                    force,
                    keep_backup,
                    skip_backup,
                    thorough,
                    allow_hard_links,
                    version_ordering: if semver {
                        VersionOrdering::Semantic
                    } else {
                        VersionOrdering::Lexical
                    },
                },
            };
            run_update_command(UpdateEngine::new(scopes, layout, config), request, renderer)
                .await
        }
        Commands::Uninstall { names, scope } => {
            let scope_root = scopes.resolve(scope.into()).to_path_buf();
            let cancel = cancel_on_ctrl_c();
            let results = uninstall_skills(&scope_root, &names, &cancel).await;
            renderer.print_lines(&format_uninstall_lines(&results, renderer.style()));
            let all_done = results
                .iter()
                .all(|result| result.status == UninstallStatus::Uninstalled);
            Ok(if all_done {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Commands::Backups { name } => {
            validate_skill_name(&name)?;
            let options = BackupOptions::from_config(&layout, &config);
            let backups = list_backups(&name, &options)?;
            renderer.print_lines(&format_backup_lines(&name, &backups));
            Ok(ExitCode::SUCCESS)
        }
        Commands::Restore {
            name,
            scope,
            backup,
        } => {
            let options = BackupOptions::from_config(&layout, &config);
            let restored = run_restore_command(&scopes, scope, &name, backup, options).await?;
            renderer.print_lines(&[render_status_line(
                renderer.style(),
                "ok",
                &format!("restored {name} ({restored} files)"),
            )]);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Completions { .. } => Ok(ExitCode::SUCCESS),
    }
}

/// Reads the config file and applies command-line overrides on top.
pub(crate) fn load_engine_config(
    layout: &AsmLayout,
    config_path: Option<&Path>,
    backup_root: Option<PathBuf>,
) -> Result<EngineConfig> {
    let mut config = match config_path {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::load(&layout.config_path())?,
    };
    if let Some(backup_root) = backup_root {
        config.backup_root = Some(backup_root);
    }
    Ok(config)
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling");
            child.cancel();
        }
    });
    token
}

async fn run_update_command(
    engine: UpdateEngine,
    request: UpdateRequest,
    renderer: TerminalRenderer,
) -> Result<ExitCode> {
    let cancel = cancel_on_ctrl_c();
    let spinner = renderer.start_spinner(&format!("updating {}", request.skill_name));
    let confirm = StdinConfirm::new(renderer.style(), spinner.handle());

    let outcome = engine.update_skill(request, &confirm, &cancel).await;
    spinner.finish();

    renderer.print_lines(&format_update_outcome_lines(&outcome, renderer.style()));
    Ok(ExitCode::from(exit_code_for(&outcome)))
}

async fn run_restore_command(
    scopes: &ScopeRoots,
    scope: CliScope,
    name: &str,
    backup: Option<PathBuf>,
    options: BackupOptions,
) -> Result<usize> {
    validate_skill_name(name)?;
    let backup = match backup {
        Some(path) => path,
        None => list_backups(name, &options)?
            .into_iter()
            .next()
            .map(|info| info.path)
            .ok_or_else(|| anyhow!("no backups found for {name}"))?,
    };

    let scope_root = scopes.resolve(Scope::from(scope)).to_path_buf();
    std::fs::create_dir_all(&scope_root)
        .with_context(|| format!("failed to create {}", scope_root.display()))?;
    let skill_path = scope_root.join(name);

    let lock = acquire_skill_lock(&skill_path, "restore", Some(&backup))?;
    tracing::info!(
        skill = %skill_path.display(),
        backup = %backup.display(),
        "restoring skill from backup"
    );
    let restored = tokio::task::spawn_blocking(move || {
        let result = restore_backup(&backup, &skill_path, &options);
        lock.release();
        result
    })
    .await
    .context("restore task failed to complete")??;
    Ok(restored)
}
