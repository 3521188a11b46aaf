//! **patchset** - changeset-based file patch engine
//!
//! Applies structured multi-file changesets produced by automated agents to a
//! real file tree: every path is sandboxed to a project root, the whole
//! changeset is validated before any I/O, fragment edits are matched
//! whitespace-tolerantly and must be unique, and edits that cannot be proven
//! unique fall back to an external oracle with a replayable failure record.

/// Command-line interface with clap integration
pub mod cli;

/// Subcommand runners used by the binary
pub mod commands;

/// Shell completion generation
pub mod completion;

/// Patch pipeline: sandbox, normalize, validate, match, execute
pub mod core {
    /// Typed errors and exit codes
    pub mod error;
    pub use error::{PatchError, SandboxError};

    /// Project-root path sandbox
    pub mod sandbox;
    pub use sandbox::PathSandbox;

    /// Changeset data model
    pub mod changeset;
    pub use changeset::{Change, ChangeKind, ModifyEdit, RawChangeset, ValidatedChangeset};

    /// Concatenated tool-call repair
    pub mod normalize;
    pub use normalize::ChangesetNormalizer;

    /// Exhaustive changeset validation
    pub mod validate;
    pub use validate::{ChangesetValidator, ValidationReport};

    /// Whitespace-tolerant unique fragment matching
    pub mod matcher;
    pub use matcher::{MatchFailure, try_apply};

    /// Oracle port and external-command adapter
    pub mod oracle;
    pub use oracle::{CommandOracle, Oracle, OracleResponse, UnavailableOracle};

    /// Merge failure records
    pub mod failure;
    pub use failure::{FailureStore, MergeFailureRecord};

    /// Per-operation results and changeset reports
    pub mod report;
    pub use report::{ChangesetReport, FileOperationResult, FileReport};

    /// File operation handlers with oracle fallback
    pub mod executor;
    pub use executor::{FileOperationExecutor, NoopStatus, StatusSink};

    /// Engine facade
    pub mod engine;
    pub use engine::{PatchEngine, apply_changeset};
}

/// Infrastructure - Configuration and I/O
pub mod infra {
    /// Layered configuration with TOML files and environment overrides
    pub mod config;
    pub use config::{Config, init as config_init, load_config};

    /// Atomic writes, input sources and fence stripping
    pub mod io;
    pub use io::{strip_code_fence, write_atomic};
}

pub use cli::{AppContext, Cli, Commands};
pub use core::{ChangesetReport, PatchEngine, PatchError, apply_changeset};
pub use infra::{Config, load_config};
