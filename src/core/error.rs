//! Error taxonomy for the patch engine
//!
//! Domain errors are typed with `thiserror`; plumbing inside handlers uses
//! `anyhow` and is flattened into per-operation messages before it reaches a
//! report.

use std::path::PathBuf;

/// Why a candidate path was refused by the sandbox
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SandboxError {
    /// No sandbox root configured; every check fails closed
    #[error("project root path is not set; cannot validate file paths")]
    NotConfigured,

    #[error("received an empty path for validation")]
    EmptyPath,

    /// Host filesystem cannot represent the path (NUL bytes, bad prefix)
    #[error("invalid or disallowed file path '{raw}': {reason}")]
    InvalidPath { raw: String, reason: String },

    #[error(
        "the path '{raw}' (resolves to '{}') is outside the allowed project root '{}'; access denied",
        .resolved.display(),
        .root.display()
    )]
    OutsideRoot {
        raw: String,
        resolved: PathBuf,
        root: PathBuf,
    },
}

impl SandboxError {
    /// Configuration errors are fatal for the whole request, not one entry
    pub fn is_configuration(&self) -> bool {
        matches!(self, SandboxError::NotConfigured)
    }
}

/// Top-level failures surfaced by the engine facade and the CLI
#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    /// Sandbox root or engine settings unusable
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Input could not be parsed or failed validation
    #[error("validation failed ({} error(s)):\n{}", .0.len(), .0.join("\n"))]
    Validation(Vec<String>),

    /// One or more file operations failed after validation
    #[error("{failed} of {total} file operation(s) failed")]
    Operations { failed: usize, total: usize },

    /// Replay target or record unusable
    #[error("replay failed: {0}")]
    Replay(String),

    #[error("internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl PatchError {
    /// Exit codes: 0=success, 2=operations failed, 3=invalid, 4=config, 5=internal
    pub fn exit_code(&self) -> i32 {
        match self {
            PatchError::Operations { .. } | PatchError::Replay(_) => 2,
            PatchError::Validation(_) => 3,
            PatchError::Configuration(_) => 4,
            PatchError::Internal(_) => 5,
        }
    }
}
