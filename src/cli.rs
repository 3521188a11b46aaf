use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Shared application context for global flags
#[derive(Clone, Debug)]
pub struct AppContext {
    pub quiet: bool,    // global --quiet
    pub no_color: bool, // global --no-color
    pub dry_run: bool,  // global --dry-run
}

#[derive(Parser)]
#[command(name = "patchset")]
#[command(about = "Apply agent-produced multi-file changesets safely inside a project root")]
#[command(version, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Validate only; never touch files
    #[arg(long, global = true)]
    pub dry_run: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate and apply a changeset
    Apply(ApplyArgs),

    /// Validate a changeset without applying it
    Check(CheckArgs),

    /// Re-run a recorded merge failure
    Replay(ReplayArgs),

    /// List recorded merge failures, newest first
    Failures(FailuresArgs),

    /// Initialize a patchset.toml config file
    Init(InitArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Where the changeset text comes from
#[derive(Args, Debug, Clone)]
pub struct InputArgs {
    /// Changeset file; reads stdin when omitted or "-"
    pub file: Option<PathBuf>,

    /// Read the changeset from the clipboard
    #[arg(long, conflicts_with = "file")]
    pub from_clipboard: bool,

    /// Sandbox root (defaults to config, then the git work tree, then cwd)
    #[arg(long)]
    pub root: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Output the report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct CheckArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Output the result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct ReplayArgs {
    /// Path to a merge_failure_*.json record
    pub record: PathBuf,

    /// Sandbox root
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Output the report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct FailuresArgs {
    /// Sandbox root whose failure directory is listed
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Show at most this many records
    #[arg(long)]
    pub limit: Option<usize>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Directory to initialize config in
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Overwrite existing config file
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[derive(Parser)]
pub struct CompletionsArgs {
    /// Target shell
    #[arg(value_enum)]
    pub shell: Shell,

    /// Output directory; if omitted and --stdout not set, prints error
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Print completion script to stdout instead of a file
    #[arg(long)]
    pub stdout: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_apply_with_globals_anywhere() {
        let cli = Cli::try_parse_from([
            "patchset", "apply", "cs.json", "--root", "/tmp/p", "--json", "--dry-run",
        ])
        .unwrap();
        assert!(cli.dry_run);
        match cli.command {
            Commands::Apply(a) => {
                assert_eq!(a.input.file.unwrap(), PathBuf::from("cs.json"));
                assert_eq!(a.input.root.unwrap(), PathBuf::from("/tmp/p"));
                assert!(a.json);
            }
            _ => panic!("expected apply"),
        }
    }

    #[test]
    fn clipboard_conflicts_with_file() {
        assert!(Cli::try_parse_from(["patchset", "apply", "x.json", "--from-clipboard"]).is_err());
    }
}
