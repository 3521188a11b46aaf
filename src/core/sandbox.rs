//! Project-root sandbox for untrusted changeset paths
//!
//! Every path a changeset mentions (sources and rename destinations) passes
//! through [`PathSandbox::normalize_and_validate`] before any I/O. The root is
//! canonicalized once; candidates are folded lexically and their longest
//! existing ancestor is canonicalized so a symlink cannot carry a path out of
//! the root.

use std::path::{Component, MAIN_SEPARATOR, Path, PathBuf};

use tracing::{debug, error, warn};

use crate::core::error::SandboxError;

/// Path authority bound to a single project root
#[derive(Debug, Clone)]
pub struct PathSandbox {
    /// Canonical root; `None` means not configured and fails closed
    root: Option<PathBuf>,
}

impl PathSandbox {
    /// Bind a sandbox to `root`. An empty root yields an unconfigured sandbox.
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        if root.as_os_str().is_empty() {
            error!("sandbox root is empty; all path checks will fail");
            return Self::unconfigured();
        }

        // Relative roots are anchored at the working directory
        let absolute = if root.is_absolute() {
            root.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(root))
                .unwrap_or_else(|_| root.to_path_buf())
        };

        Self {
            root: Some(resolve_existing(&lexical_normalize(&absolute))),
        }
    }

    /// Sandbox with no root; every check reports a configuration error
    pub fn unconfigured() -> Self {
        Self { root: None }
    }

    /// Canonical root, if configured
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Resolve `raw` to an absolute path and prove it lies under the root.
    pub fn normalize_and_validate(&self, raw: &str) -> Result<PathBuf, SandboxError> {
        let root = self.root.as_deref().ok_or(SandboxError::NotConfigured)?;

        if raw.trim().is_empty() {
            warn!("received an empty path for validation");
            return Err(SandboxError::EmptyPath);
        }
        if raw.contains('\0') {
            warn!(raw = %raw.escape_debug(), "path contains a NUL byte");
            return Err(SandboxError::InvalidPath {
                raw: raw.escape_debug().to_string(),
                reason: "path contains a NUL byte".into(),
            });
        }

        let candidate = Path::new(raw);
        let joined = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            root.join(candidate)
        };
        let resolved = resolve_existing(&lexical_normalize(&joined));

        if !is_within(&resolved, root) {
            warn!(
                raw,
                resolved = %resolved.display(),
                root = %root.display(),
                "path outside project root"
            );
            return Err(SandboxError::OutsideRoot {
                raw: raw.to_string(),
                resolved,
                root: root.to_path_buf(),
            });
        }

        Ok(resolved)
    }

    /// Yes/no variant for callers that do not need the reason
    pub fn is_safe(&self, path: &str) -> bool {
        match self.normalize_and_validate(path) {
            Ok(_) => true,
            Err(e) => {
                debug!(path, error = %e, "path rejected");
                false
            }
        }
    }
}

/// Fold `.` and `..` without touching the filesystem. `..` at the root stays
/// at the root, matching how absolute paths resolve on every platform.
fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(out.components().next_back(), Some(Component::Normal(_))) {
                    out.pop();
                }
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}

/// Canonicalize the longest existing ancestor and re-append the missing tail
fn resolve_existing(path: &Path) -> PathBuf {
    for ancestor in path.ancestors() {
        if ancestor.as_os_str().is_empty() {
            break;
        }
        if let Ok(canonical) = dunce::canonicalize(ancestor) {
            return match path.strip_prefix(ancestor) {
                Ok(tail) if !tail.as_os_str().is_empty() => canonical.join(tail),
                _ => canonical,
            };
        }
    }
    path.to_path_buf()
}

/// Separator-padded, case-insensitive prefix test (`/root-evil` is not under `/root`)
fn is_within(candidate: &Path, root: &Path) -> bool {
    let candidate = with_trailing_separator(candidate).to_lowercase();
    let root = with_trailing_separator(root).to_lowercase();
    candidate.starts_with(&root)
}

fn with_trailing_separator(path: &Path) -> String {
    let mut s = path.to_string_lossy().into_owned();
    if !s.ends_with(['/', '\\']) {
        s.push(MAIN_SEPARATOR);
    }
    s
}
