//! Subcommand runners for the `patchset` binary

use std::path::{Path, PathBuf};

use owo_colors::OwoColorize;
use tracing::debug;

use crate::{
    cli::{AppContext, ApplyArgs, CheckArgs, FailuresArgs, InputArgs, ReplayArgs},
    core::{
        engine::PatchEngine,
        error::PatchError,
        failure::FailureStore,
        report::{ChangesetReport, FileReport},
    },
    infra::{
        config::{Config, load_config},
        io::{read_clipboard, read_input},
    },
};

/// Print the error (if any) and exit with its code
pub fn finish_with_exit(result: Result<(), PatchError>) -> ! {
    match result {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(e.exit_code());
        }
    }
}

pub fn apply_run(args: ApplyArgs, ctx: &AppContext) -> Result<(), PatchError> {
    if ctx.dry_run {
        return check_run(
            CheckArgs {
                input: args.input,
                json: args.json,
            },
            ctx,
        );
    }

    let (config, cwd) = load_for_cwd()?;
    let root = resolve_root(args.input.root.clone(), &config, &cwd);
    let engine = PatchEngine::from_config(&config, &root)?;
    let raw = read_changeset(&args.input)?;

    let report = engine.apply(&raw)?;
    if args.json {
        print_json(&report)?;
    } else if !report.validation_failed() && !ctx.quiet {
        print_report(&report, ctx);
    }

    outcome(&report)
}

pub fn check_run(args: CheckArgs, ctx: &AppContext) -> Result<(), PatchError> {
    let (config, cwd) = load_for_cwd()?;
    let root = resolve_root(args.input.root.clone(), &config, &cwd);
    let engine = PatchEngine::from_config(&config, &root)?;
    let raw = read_changeset(&args.input)?;

    let validated = engine.check(&raw)?;
    if args.json {
        let files: Vec<_> = validated
            .groups
            .iter()
            .map(|(path, changes)| {
                serde_json::json!({
                    "path": path,
                    "changes": changes.iter().map(|c| c.kind().tag()).collect::<Vec<_>>(),
                })
            })
            .collect();
        print_json(&serde_json::json!({
            "description": validated.description,
            "valid": true,
            "files": files,
        }))?;
    } else if !ctx.quiet {
        println!(
            "{} Changeset '{}' is valid: {} change(s) across {} file(s)",
            mark(true, ctx),
            validated.description,
            validated.change_count(),
            validated.groups.len()
        );
        for (path, changes) in &validated.groups {
            let kinds: Vec<_> = changes.iter().map(|c| c.kind().tag()).collect();
            println!("  {} [{}]", path.display(), kinds.join(", "));
        }
    }
    Ok(())
}

pub fn replay_run(args: ReplayArgs, ctx: &AppContext) -> Result<(), PatchError> {
    let (config, cwd) = load_for_cwd()?;
    let root = resolve_root(args.root.clone(), &config, &cwd);
    let engine = PatchEngine::from_config(&config, &root)?;

    if ctx.dry_run {
        let record = FailureStore::load(&args.record)
            .map_err(|e| PatchError::Replay(format!("{e:#}")))?;
        if !ctx.quiet {
            println!(
                "Would replay {} modification(s) on {}",
                record.changes.len(),
                record.file_path
            );
        }
        return Ok(());
    }

    let file = engine.replay(&args.record)?;
    let report = ChangesetReport {
        description: format!("replay of {}", args.record.display()),
        validation_errors: Vec::new(),
        files: vec![file],
    };
    if args.json {
        print_json(&report)?;
    } else if !ctx.quiet {
        print_report(&report, ctx);
    }
    outcome(&report)
}

pub fn failures_run(args: FailuresArgs, ctx: &AppContext) -> Result<(), PatchError> {
    let (config, cwd) = load_for_cwd()?;
    let root = resolve_root(args.root.clone(), &config, &cwd);
    let store = FailureStore::new(config.failures_dir_for(&root));

    let mut records = store.list()?;
    if let Some(limit) = args.limit {
        records.truncate(limit);
    }

    if args.json {
        let items: Vec<_> = records
            .iter()
            .map(|s| {
                serde_json::json!({
                    "record": s.path,
                    "timestamp": s.record.timestamp,
                    "filePath": s.record.file_path,
                    "failureReason": s.record.failure_reason,
                    "changes": s.record.changes.len(),
                })
            })
            .collect();
        return print_json(&items);
    }

    if records.is_empty() {
        if !ctx.quiet {
            println!("No merge failures recorded in {}", store.dir().display());
        }
        return Ok(());
    }
    for s in &records {
        println!(
            "{}  {}  {}",
            s.record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            s.record.file_path,
            s.path.display()
        );
        if !ctx.quiet {
            println!("    {}", s.record.failure_reason);
        }
    }
    Ok(())
}

fn load_for_cwd() -> Result<(Config, PathBuf), PatchError> {
    let cwd = std::env::current_dir()
        .map_err(|e| PatchError::Configuration(format!("cannot read working directory: {e}")))?;
    let config = load_config(&cwd).map_err(|e| PatchError::Configuration(format!("{e:#}")))?;
    Ok((config, cwd))
}

/// Root precedence: explicit flag, config `root`, enclosing git work tree, cwd
pub fn resolve_root(explicit: Option<PathBuf>, config: &Config, cwd: &Path) -> PathBuf {
    if let Some(root) = explicit.or_else(|| config.root.clone()) {
        return if root.is_absolute() {
            root
        } else {
            cwd.join(root)
        };
    }

    let mut cur = Some(cwd);
    while let Some(dir) = cur {
        if dir.join(".git").exists() {
            debug!(root = %dir.display(), "using enclosing git work tree as root");
            return dir.to_path_buf();
        }
        cur = dir.parent();
    }
    cwd.to_path_buf()
}

fn read_changeset(input: &InputArgs) -> Result<String, PatchError> {
    let raw = if input.from_clipboard {
        read_clipboard()
    } else {
        read_input(input.file.as_deref())
    };
    raw.map_err(|e| PatchError::Validation(vec![format!("Error: {e:#}")]))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), PatchError> {
    let text = serde_json::to_string_pretty(value).map_err(anyhow::Error::from)?;
    println!("{text}");
    Ok(())
}

fn print_report(report: &ChangesetReport, ctx: &AppContext) {
    println!("Changeset '{}' processing results:", report.description);
    for FileReport { path, results } in &report.files {
        for r in results {
            println!("{} {}: {}", mark(r.success, ctx), path.display(), r.message);
        }
    }
}

fn mark(success: bool, ctx: &AppContext) -> String {
    match (success, ctx.no_color) {
        (true, true) => "✓".to_string(),
        (false, true) => "✗".to_string(),
        (true, false) => "✓".green().to_string(),
        (false, false) => "✗".red().to_string(),
    }
}

/// Map a finished report onto the process outcome
fn outcome(report: &ChangesetReport) -> Result<(), PatchError> {
    if report.validation_failed() {
        return Err(PatchError::Validation(report.validation_errors.clone()));
    }
    let (failed, total) = report.operation_counts();
    if failed > 0 {
        return Err(PatchError::Operations { failed, total });
    }
    Ok(())
}
