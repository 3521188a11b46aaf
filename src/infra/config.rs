use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cli::{AppContext, InitArgs};
use crate::core::{
    executor::DEFAULT_MAX_PROMPT_BYTES,
    normalize::DEFAULT_TOOL_NAME,
    oracle::{CommandOracle, Oracle, UnavailableOracle},
};

/// Config file names searched in order; the first one found wins
pub const CONFIG_FILES: [&str; 2] = ["patchset.toml", ".patchset.toml"];

/// Failure records live here under the sandbox root unless overridden
pub const DEFAULT_FAILURES_DIR: &str = ".patchset/merge-failures";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config
{
    /// Sandbox root; defaults to the enclosing git work tree or the cwd
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,

    /// Where merge failure records go; relative paths hang off the root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failures_dir: Option<PathBuf>,

    /// Tool name recognized when repairing concatenated payloads
    pub tool_name: String,

    /// Fallback merge oracle
    pub oracle: OracleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig
{
    /// Program and arguments; empty disables the fallback
    pub command: Vec<String>,
    pub timeout_secs: u64,
    pub max_prompt_bytes: usize,
}

impl Default for Config
{
    fn default() -> Self
    {
        Self {
            root: None,
            failures_dir: None,
            tool_name: DEFAULT_TOOL_NAME.to_string(),
            oracle: OracleConfig::default(),
        }
    }
}

impl Default for OracleConfig
{
    fn default() -> Self
    {
        Self {
            command: Vec::new(),
            timeout_secs: 120,
            max_prompt_bytes: DEFAULT_MAX_PROMPT_BYTES,
        }
    }
}

impl Config
{
    /// Failure directory for `root`, honoring an absolute override
    pub fn failures_dir_for(
        &self,
        root: &Path,
    ) -> PathBuf
    {
        match &self.failures_dir
        {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => root.join(dir),
            None => root.join(DEFAULT_FAILURES_DIR),
        }
    }

    /// Build the configured oracle, or one that always declines
    pub fn build_oracle(&self) -> Result<Box<dyn Oracle>>
    {
        if self
            .oracle
            .command
            .is_empty()
        {
            return Ok(Box::new(UnavailableOracle));
        }
        let oracle = CommandOracle::new(
            &self
                .oracle
                .command,
            Duration::from_secs(
                self.oracle
                    .timeout_secs,
            ),
        )
        .context("Invalid oracle.command")?;
        Ok(Box::new(oracle))
    }
}

/// Load configuration from the first config file in `dir` plus `PATCHSET__*`
/// environment variables (`PATCHSET__ORACLE__TIMEOUT_SECS=30`).
pub fn load_config(dir: &Path) -> Result<Config>
{
    let mut builder = config::Config::builder();

    for name in &CONFIG_FILES
    {
        let path = dir.join(name);
        if path.exists()
        {
            builder = builder.add_source(config::File::from(path));
            break;
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("PATCHSET")
            .separator("__")
            .try_parsing(true)
            .list_separator(" ")
            .with_list_parse_key("oracle.command"),
    );

    let cfg = builder
        .build()
        .context("Failed to load configuration")?;
    let parsed: Config = cfg
        .try_deserialize()
        .context("Failed to parse configuration")?;

    Ok(parsed)
}

pub fn init(
    args: InitArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let config_path = args
        .path
        .join(CONFIG_FILES[0]);

    if config_path.exists() && !args.force
    {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    let config = Config::default();
    let toml_string =
        toml::to_string_pretty(&config).context("Failed to serialize default config")?;

    std::fs::write(&config_path, toml_string).context("Failed to write config file")?;

    if !ctx.quiet
    {
        println!("Created config file at {}", config_path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests
{
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_without_any_file()
    {
        let tmp = TempDir::new().unwrap();
        let cfg = load_config(tmp.path()).unwrap();
        assert_eq!(cfg.tool_name, "CodeDiff");
        assert_eq!(cfg.oracle.timeout_secs, 120);
        assert_eq!(cfg.oracle.max_prompt_bytes, 512 * 1024);
        assert!(cfg.oracle.command.is_empty());
        assert_eq!(
            cfg.failures_dir_for(Path::new("/proj")),
            Path::new("/proj/.patchset/merge-failures")
        );
    }

    #[test]
    fn file_values_override_defaults()
    {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("patchset.toml"),
            "tool_name = \"Edit\"\nfailures_dir = \"logs\"\n\n[oracle]\ncommand = [\"llm\", \"--merge\"]\ntimeout_secs = 5\n",
        )
        .unwrap();

        let cfg = load_config(tmp.path()).unwrap();
        assert_eq!(cfg.tool_name, "Edit");
        assert_eq!(cfg.oracle.command, vec!["llm", "--merge"]);
        assert_eq!(cfg.oracle.timeout_secs, 5);
        assert_eq!(cfg.oracle.max_prompt_bytes, 512 * 1024);
        assert_eq!(cfg.failures_dir_for(Path::new("/p")), Path::new("/p/logs"));
    }

    #[test]
    fn default_config_round_trips_through_toml()
    {
        let text = toml::to_string_pretty(&Config::default()).unwrap();
        assert!(text.contains("tool_name"));
        assert!(text.contains("[oracle]"));
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.oracle.timeout_secs, 120);
    }

    #[test]
    fn init_refuses_to_overwrite_without_force()
    {
        let tmp = TempDir::new().unwrap();
        let ctx = AppContext {
            quiet: true,
            no_color: true,
            dry_run: false,
        };
        let args = || InitArgs {
            path: tmp.path().to_path_buf(),
            force: false,
        };

        init(args(), &ctx).unwrap();
        assert!(tmp.path().join("patchset.toml").exists());
        assert!(init(args(), &ctx).is_err());
        init(
            InitArgs {
                path: tmp.path().to_path_buf(),
                force: true,
            },
            &ctx,
        )
        .unwrap();
    }

    #[test]
    fn empty_command_means_no_oracle()
    {
        let oracle = Config::default().build_oracle().unwrap();
        assert!(!oracle.process("x").success);
    }
}
