//! Patch engine facade
//!
//! Wires normalize -> parse -> validate -> execute for one sandbox root, and
//! replays stored merge failures through the same modify pipeline.

use std::path::{Path, PathBuf};

use tracing::{info, instrument, warn};

use crate::{
    core::{
        changeset::{NO_DESCRIPTION, RawChangeset, ValidatedChangeset},
        error::PatchError,
        executor::{DEFAULT_MAX_PROMPT_BYTES, FileOperationExecutor, NoopStatus, StatusSink},
        failure::FailureStore,
        normalize::ChangesetNormalizer,
        oracle::{Oracle, UnavailableOracle},
        report::{ChangesetReport, FileReport},
        sandbox::PathSandbox,
        validate::ChangesetValidator,
    },
    infra::config::{Config, DEFAULT_FAILURES_DIR},
};

/// One sandbox root plus everything needed to apply changesets under it
pub struct PatchEngine
{
    sandbox: PathSandbox,
    normalizer: ChangesetNormalizer,
    oracle: Box<dyn Oracle>,
    failures: Option<FailureStore>,
    status: Box<dyn StatusSink>,
    max_prompt_bytes: usize,
}

impl PatchEngine
{
    /// Engine for `root` with no oracle and failure records under
    /// `<root>/.patchset/merge-failures`
    pub fn new(root: impl AsRef<Path>) -> Self
    {
        let sandbox = PathSandbox::new(root);
        let failures = sandbox
            .root()
            .map(|r| FailureStore::new(r.join(DEFAULT_FAILURES_DIR)));
        Self {
            sandbox,
            normalizer: ChangesetNormalizer::default(),
            oracle: Box::new(UnavailableOracle),
            failures,
            status: Box::new(NoopStatus),
            max_prompt_bytes: DEFAULT_MAX_PROMPT_BYTES,
        }
    }

    /// Engine built from loaded configuration; `root` is already resolved
    pub fn from_config(
        config: &Config,
        root: &Path,
    ) -> Result<Self, PatchError>
    {
        let oracle = config
            .build_oracle()
            .map_err(|e| PatchError::Configuration(format!("{e:#}")))?;
        let engine = Self::new(root)
            .with_oracle(oracle)
            .with_tool_name(&config.tool_name)
            .with_max_prompt_bytes(config.oracle.max_prompt_bytes);
        let failures_dir = engine
            .sandbox
            .root()
            .map(|r| config.failures_dir_for(r));
        Ok(match failures_dir
        {
            Some(dir) => engine.with_failures_dir(dir),
            None => engine,
        })
    }

    pub fn with_oracle(
        mut self,
        oracle: Box<dyn Oracle>,
    ) -> Self
    {
        self.oracle = oracle;
        self
    }

    pub fn with_failures_dir(
        mut self,
        dir: impl Into<PathBuf>,
    ) -> Self
    {
        self.failures = Some(FailureStore::new(dir));
        self
    }

    /// Do not persist merge failures
    pub fn without_failure_records(mut self) -> Self
    {
        self.failures = None;
        self
    }

    pub fn with_status(
        mut self,
        status: Box<dyn StatusSink>,
    ) -> Self
    {
        self.status = status;
        self
    }

    pub fn with_tool_name(
        mut self,
        tool_name: &str,
    ) -> Self
    {
        self.normalizer = ChangesetNormalizer::new(tool_name);
        self
    }

    pub fn with_max_prompt_bytes(
        mut self,
        max: usize,
    ) -> Self
    {
        self.max_prompt_bytes = max;
        self
    }

    pub fn sandbox(&self) -> &PathSandbox
    {
        &self.sandbox
    }

    pub fn failure_store(&self) -> Option<&FailureStore>
    {
        self.failures
            .as_ref()
    }

    fn ensure_configured(&self) -> Result<&Path, PatchError>
    {
        self.sandbox
            .root()
            .ok_or_else(|| {
                PatchError::Configuration(
                    "project root path is not set; cannot validate file paths".to_string(),
                )
            })
    }

    /// Normalize, parse and validate without touching the file system
    pub fn check(
        &self,
        raw: &str,
    ) -> Result<ValidatedChangeset, PatchError>
    {
        self.ensure_configured()?;
        let normalized = self
            .normalizer
            .normalize(raw);
        let parsed = RawChangeset::parse(&normalized)
            .map_err(|e| PatchError::Validation(vec![format!("Error: {e}")]))?;
        ChangesetValidator::new(&self.sandbox)
            .validate(&parsed)
            .map_err(|report| PatchError::Validation(report.errors))
    }

    /// Validate then execute. Only a missing root is an `Err`; everything
    /// else, validation failures included, comes back in the report.
    #[instrument(level = "info", skip_all, fields(bytes = raw.len()))]
    pub fn apply(
        &self,
        raw: &str,
    ) -> Result<ChangesetReport, PatchError>
    {
        self.apply_with(raw, self.oracle.as_ref())
    }

    pub(crate) fn apply_with(
        &self,
        raw: &str,
        oracle: &dyn Oracle,
    ) -> Result<ChangesetReport, PatchError>
    {
        self.ensure_configured()?;

        let normalized = self
            .normalizer
            .normalize(raw);
        let parsed = match RawChangeset::parse(&normalized)
        {
            Ok(parsed) => parsed,
            Err(e) =>
            {
                warn!(error = %e, "changeset could not be parsed");
                return Ok(ChangesetReport::rejected(NO_DESCRIPTION, vec![format!("Error: {e}")]));
            }
        };

        let validated = match ChangesetValidator::new(&self.sandbox).validate(&parsed)
        {
            Ok(v) => v,
            Err(report) =>
            {
                return Ok(ChangesetReport::rejected(parsed.description, report.errors));
            }
        };

        info!(
            description = %validated.description,
            files = validated.groups.len(),
            changes = validated.change_count(),
            "applying changeset"
        );

        let files = self
            .executor(oracle)
            .execute(&validated);
        let report = ChangesetReport {
            description: validated.description,
            validation_errors: Vec::new(),
            files,
        };

        let (failed, total) = report.operation_counts();
        info!(failed, total, "changeset processed");
        Ok(report)
    }

    /// Re-run a stored merge failure against the file as it is now
    #[instrument(level = "info", skip_all, fields(record = %record_path.display()))]
    pub fn replay(
        &self,
        record_path: &Path,
    ) -> Result<FileReport, PatchError>
    {
        self.ensure_configured()?;

        let record = FailureStore::load(record_path)
            .map_err(|e| PatchError::Replay(format!("{e:#}")))?;
        if record
            .changes
            .is_empty()
        {
            return Err(PatchError::Replay(format!(
                "record {} contains no changes",
                record_path.display()
            )));
        }

        let path = self
            .sandbox
            .normalize_and_validate(&record.file_path)
            .map_err(|e| PatchError::Replay(e.to_string()))?;
        if !path.is_file()
        {
            return Err(PatchError::Replay(format!(
                "target file '{}' no longer exists",
                path.display()
            )));
        }

        match std::fs::read_to_string(&path)
        {
            Ok(current) if !record.matches_content(&current) =>
            {
                warn!(path = %path.display(), "file changed since the failure was recorded");
            }
            Ok(_) =>
            {}
            Err(e) => return Err(PatchError::Replay(format!("read {}: {e}", path.display()))),
        }

        let result = self
            .executor(self.oracle.as_ref())
            .modify(&path, &record.changes);
        Ok(FileReport {
            path,
            results: vec![result],
        })
    }

    fn executor<'a>(
        &'a self,
        oracle: &'a dyn Oracle,
    ) -> FileOperationExecutor<'a>
    {
        let executor = FileOperationExecutor::new(oracle)
            .with_status(self.status.as_ref())
            .with_max_prompt_bytes(self.max_prompt_bytes);
        match &self.failures
        {
            Some(store) => executor.with_failure_store(store),
            None => executor,
        }
    }
}

/// One-shot apply: `raw` changeset under `root`, falling back to `oracle`.
/// Configuration problems come back as a rejected report.
pub fn apply_changeset(
    raw: &str,
    root: impl AsRef<Path>,
    oracle: &dyn Oracle,
) -> ChangesetReport
{
    let engine = PatchEngine::new(root);
    match engine.apply_with(raw, oracle)
    {
        Ok(report) => report,
        Err(e) => ChangesetReport::rejected(NO_DESCRIPTION, vec![format!("Error: {e}")]),
    }
}
