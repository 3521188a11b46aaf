//! Performs the I/O for validated changesets
//!
//! Paths are handled one at a time in first-seen order and changes in the
//! order they were submitted. Every handler turns its errors into a
//! [`FileOperationResult`], so one file failing never stops the next one.
//! Modify batches try the deterministic matcher first and fall back to the
//! oracle, recording a replayable failure in between.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::core::{
    changeset::{Change, ModifyEdit, ValidatedChangeset},
    failure::{FailureStore, MergeFailureRecord},
    matcher,
    oracle::{self, Oracle},
    report::{FileOperationResult, FileReport},
};
use crate::infra::io::{strip_code_fence, write_atomic};

/// Default cap on oracle prompt size
pub const DEFAULT_MAX_PROMPT_BYTES: usize = 512 * 1024;

/// Receives human-readable progress lines; failures are ignored
pub trait StatusSink {
    fn notify(&self, message: &str) -> Result<()>;
}

/// Sink that drops every message
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStatus;

impl StatusSink for NoopStatus {
    fn notify(&self, _message: &str) -> Result<()> {
        Ok(())
    }
}

pub struct FileOperationExecutor<'a> {
    oracle: &'a dyn Oracle,
    failures: Option<&'a FailureStore>,
    status: &'a dyn StatusSink,
    max_prompt_bytes: usize,
}

impl<'a> FileOperationExecutor<'a> {
    pub fn new(oracle: &'a dyn Oracle) -> Self {
        Self {
            oracle,
            failures: None,
            status: &NoopStatus,
            max_prompt_bytes: DEFAULT_MAX_PROMPT_BYTES,
        }
    }

    pub fn with_failure_store(mut self, store: &'a FailureStore) -> Self {
        self.failures = Some(store);
        self
    }

    pub fn with_status(mut self, status: &'a dyn StatusSink) -> Self {
        self.status = status;
        self
    }

    pub fn with_max_prompt_bytes(mut self, max: usize) -> Self {
        self.max_prompt_bytes = max;
        self
    }

    /// Apply every group of a validated changeset
    pub fn execute(&self, changeset: &ValidatedChangeset) -> Vec<FileReport> {
        changeset
            .groups
            .iter()
            .map(|(path, changes)| FileReport {
                path: path.clone(),
                results: self.execute_path(path, changes),
            })
            .collect()
    }

    fn execute_path(&self, path: &Path, changes: &[Change]) -> Vec<FileOperationResult> {
        // Modify never shares a path with another kind after validation
        let edits: Vec<ModifyEdit> = changes
            .iter()
            .filter_map(|c| match c {
                Change::Modify(edit) => Some(edit.clone()),
                _ => None,
            })
            .collect();
        if !edits.is_empty() {
            return vec![self.modify(path, &edits)];
        }

        changes
            .iter()
            .map(|change| match change {
                Change::Create { content, .. } => self.create(path, content),
                Change::Replace { content, .. } => self.replace(path, content),
                Change::Rename { destination, .. } => self.rename(path, destination),
                Change::Delete { .. } => self.delete(path),
                Change::Modify(edit) => self.modify(path, std::slice::from_ref(edit)),
            })
            .collect()
    }

    fn notify(&self, message: &str) {
        if let Err(e) = self.status.notify(message) {
            debug!(error = %e, "status sink failed");
        }
    }

    pub fn create(&self, path: &Path, content: &str) -> FileOperationResult {
        let existed = path.exists();
        self.notify(&format!("Creating {}", display_name(path)));
        match write_content(path, content) {
            Ok(()) if existed => {
                warn!(path = %path.display(), "create overwrote an existing file");
                FileOperationResult::ok("Success: Created file (overwrote existing file).")
            }
            Ok(()) => {
                info!(path = %path.display(), "created file");
                FileOperationResult::ok("Success: Created file.")
            }
            Err(e) => failed_io(path, "create", e),
        }
    }

    pub fn replace(&self, path: &Path, content: &str) -> FileOperationResult {
        let existed = path.exists();
        self.notify(&format!("Replacing {}", display_name(path)));
        match write_content(path, content) {
            Ok(()) if existed => {
                info!(path = %path.display(), "replaced file");
                FileOperationResult::ok("Success: Replaced file content.")
            }
            Ok(()) => {
                warn!(path = %path.display(), "replace target did not exist; created it");
                FileOperationResult::ok("Success: Replaced file content (file did not exist; created).")
            }
            Err(e) => failed_io(path, "replace", e),
        }
    }

    pub fn delete(&self, path: &Path) -> FileOperationResult {
        if !path.exists() {
            warn!(path = %path.display(), "delete target already absent");
            return FileOperationResult::ok(
                "Success: File was already absent; nothing to delete (warning).",
            );
        }
        self.notify(&format!("Deleting {}", display_name(path)));
        match fs::remove_file(path).with_context(|| format!("remove {}", path.display())) {
            Ok(()) => {
                info!(path = %path.display(), "deleted file");
                FileOperationResult::ok("Success: Deleted file.")
            }
            Err(e) => failed_io(path, "delete", e),
        }
    }

    pub fn rename(&self, source: &Path, destination: &Path) -> FileOperationResult {
        if !source.exists() {
            return FileOperationResult::failed("Failed: Source file not found for rename.");
        }
        if destination.exists() {
            return FileOperationResult::failed(format!(
                "Failed: Destination '{}' already exists; refusing to overwrite.",
                destination.display()
            ));
        }
        self.notify(&format!(
            "Renaming {} to {}",
            display_name(source),
            display_name(destination)
        ));

        let moved = ensure_parent(destination).and_then(|()| {
            fs::rename(source, destination).with_context(|| {
                format!("rename {} -> {}", source.display(), destination.display())
            })
        });
        match moved {
            Ok(()) => {
                info!(from = %source.display(), to = %destination.display(), "renamed file");
                FileOperationResult::ok(format!(
                    "Success: Renamed to '{}'.",
                    destination.display()
                ))
            }
            Err(e) => failed_io(source, "rename", e),
        }
    }

    /// Apply a batch of fragment edits to one existing file
    #[instrument(level = "debug", skip_all, fields(path = %path.display(), edits = edits.len()))]
    pub fn modify(&self, path: &Path, edits: &[ModifyEdit]) -> FileOperationResult {
        if !path.is_file() {
            return FileOperationResult::failed("Failed: File not found.");
        }
        let original = match fs::read_to_string(path)
            .with_context(|| format!("read {}", path.display()))
        {
            Ok(text) => text,
            Err(e) => return failed_io(path, "read", e),
        };

        let reason = match matcher::try_apply(&original, edits) {
            Ok(patched) => {
                return match write_atomic(path, patched.as_bytes()) {
                    Ok(()) => {
                        info!(count = edits.len(), "applied modifications programmatically");
                        FileOperationResult::ok(format!(
                            "Success: Applied {} modification(s) programmatically.",
                            edits.len()
                        ))
                    }
                    Err(e) => failed_io(path, "write", e),
                };
            }
            Err(failure) => failure.to_string(),
        };

        warn!(%reason, "deterministic merge failed; falling back to oracle");
        self.record_failure(path, &reason, edits, &original);
        self.oracle_merge(path, edits, &original, &reason)
    }

    fn record_failure(&self, path: &Path, reason: &str, edits: &[ModifyEdit], original: &str) {
        let Some(store) = self.failures else {
            return;
        };
        let record = MergeFailureRecord::new(path, reason, edits, original);
        if let Err(e) = store.record(&record) {
            warn!(error = %format!("{e:#}"), "could not save merge failure record");
        }
    }

    fn oracle_merge(
        &self,
        path: &Path,
        edits: &[ModifyEdit],
        original: &str,
        reason: &str,
    ) -> FileOperationResult {
        let prompt = match oracle::build_prompt(&path.display().to_string(), edits, original) {
            Ok(p) => p,
            Err(e) => {
                return FileOperationResult::failed(format!(
                    "Failed: Deterministic merge failed ({reason}); could not build oracle prompt: {e:#}"
                ));
            }
        };
        if prompt.len() > self.max_prompt_bytes {
            warn!(
                bytes = prompt.len(),
                limit = self.max_prompt_bytes,
                "oracle prompt too large; not sending"
            );
            return FileOperationResult::failed(format!(
                "Failed: Deterministic merge failed ({reason}); oracle prompt of {} bytes exceeds the {} byte limit.",
                prompt.len(),
                self.max_prompt_bytes
            ));
        }

        self.notify(&format!("Processing with oracle: {}", display_name(path)));
        let response = self.oracle.process(&prompt);
        if !response.success {
            let err = response
                .error
                .unwrap_or_else(|| "oracle reported failure without detail".to_string());
            return FileOperationResult::failed(format!(
                "Failed: Deterministic merge failed ({reason}); oracle fallback failed: {err}"
            ));
        }

        let content = match oracle::clean_response(&response.response, original) {
            Ok(c) => c,
            Err(err) => {
                return FileOperationResult::failed(format!(
                    "Failed: Deterministic merge failed ({reason}); oracle fallback failed: {err}"
                ));
            }
        };

        match write_atomic(path, content.as_bytes()) {
            Ok(()) => {
                info!(count = edits.len(), "applied modifications via oracle");
                FileOperationResult::ok(format!(
                    "Success: Applied {} modification(s) via oracle fallback (deterministic merge failed: {reason}).",
                    edits.len()
                ))
            }
            Err(e) => failed_io(path, "write", e),
        }
    }
}

/// Create parents, strip a wrapping fence, write atomically
fn write_content(path: &Path, content: &str) -> Result<()> {
    ensure_parent(path)?;
    let body = strip_code_fence(content);
    write_atomic(path, body.as_bytes())
}

fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display())),
        _ => Ok(()),
    }
}

fn failed_io(path: &Path, op: &str, e: anyhow::Error) -> FileOperationResult {
    warn!(path = %path.display(), op, error = %format!("{e:#}"), "file operation failed");
    FileOperationResult::failed(format!("Failed: IO error during {op}: {e:#}"))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
