use clap::Parser;
use patchset::cli::{AppContext, Cli, Commands};
use patchset::commands::{self, finish_with_exit};
use patchset::core::error::PatchError;
use tracing_subscriber::{EnvFilter, fmt};

fn init_tracing() {
    // PATCHSET_LOG=debug, PATCHSET_LOG=patchset::core::matcher=trace, ...
    let filter = EnvFilter::try_from_env("PATCHSET_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    // Build a context once, pass everywhere
    let ctx = AppContext {
        quiet: cli.quiet,
        no_color: cli.no_color,
        dry_run: cli.dry_run,
    };

    let result = match cli.command {
        Commands::Apply(args) => commands::apply_run(args, &ctx),
        Commands::Check(args) => commands::check_run(args, &ctx),
        Commands::Replay(args) => commands::replay_run(args, &ctx),
        Commands::Failures(args) => commands::failures_run(args, &ctx),
        Commands::Init(args) => patchset::infra::config::init(args, &ctx).map_err(config_error),
        Commands::Completions(args) => {
            patchset::completion::run(args, &ctx).map_err(PatchError::Internal)
        }
    };

    finish_with_exit(result)
}

fn config_error(e: anyhow::Error) -> PatchError {
    PatchError::Configuration(format!("{e:#}"))
}
