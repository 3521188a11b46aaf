//! Changeset data model
//!
//! A raw changeset is untrusted JSON; the validator turns it into a
//! [`ValidatedChangeset`] of typed [`Change`] values grouped by sandboxed
//! path. Only validated changesets ever reach the executor.

use std::fmt;
use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fallback description used when a changeset omits one
pub const NO_DESCRIPTION: &str = "No description provided";

/// The five operation tags accepted in `change_type`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    #[serde(rename = "modifyFile")]
    Modify,
    #[serde(rename = "createnewFile")]
    CreateNew,
    #[serde(rename = "replaceFile")]
    Replace,
    #[serde(rename = "renameFile")]
    Rename,
    #[serde(rename = "deleteFile")]
    Delete,
}

impl ChangeKind {
    pub const ALL: [ChangeKind; 5] = [
        ChangeKind::Modify,
        ChangeKind::CreateNew,
        ChangeKind::Replace,
        ChangeKind::Rename,
        ChangeKind::Delete,
    ];

    /// Wire tag, e.g. `modifyFile`
    pub fn tag(self) -> &'static str {
        match self {
            ChangeKind::Modify => "modifyFile",
            ChangeKind::CreateNew => "createnewFile",
            ChangeKind::Replace => "replaceFile",
            ChangeKind::Rename => "renameFile",
            ChangeKind::Delete => "deleteFile",
        }
    }

    /// Exact, case-sensitive tag lookup
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.tag() == tag)
    }

    /// Create, replace, rename and delete cannot share a path with anything
    pub fn is_exclusive(self) -> bool {
        !matches!(self, ChangeKind::Modify)
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// One fragment replacement inside an existing file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifyEdit {
    /// Fragment to locate
    pub old_content: String,
    /// Replacement; empty deletes the fragment
    #[serde(default)]
    pub new_content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A validated change; each variant carries only what its operation needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Modify(ModifyEdit),
    Create {
        content: String,
        description: Option<String>,
    },
    Replace {
        content: String,
        description: Option<String>,
    },
    Rename {
        /// Sandboxed destination path
        destination: PathBuf,
        description: Option<String>,
    },
    Delete {
        description: Option<String>,
    },
}

impl Change {
    pub fn kind(&self) -> ChangeKind {
        match self {
            Change::Modify(_) => ChangeKind::Modify,
            Change::Create { .. } => ChangeKind::CreateNew,
            Change::Replace { .. } => ChangeKind::Replace,
            Change::Rename { .. } => ChangeKind::Rename,
            Change::Delete { .. } => ChangeKind::Delete,
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            Change::Modify(edit) => edit.description.as_deref(),
            Change::Create { description, .. }
            | Change::Replace { description, .. }
            | Change::Rename { description, .. }
            | Change::Delete { description } => description.as_deref(),
        }
    }
}

/// Untrusted changeset as parsed from JSON; entries stay raw for validation
#[derive(Debug, Clone, Default)]
pub struct RawChangeset {
    pub description: String,
    /// Raw `files[]` entries; empty when the array is missing
    pub files: Vec<Value>,
}

impl RawChangeset {
    /// Parse a changeset document.
    ///
    /// Accepts `{"changeset": {...}}`, a bare `{"description", "files"}`
    /// object, or a single tool-call envelope whose `args`/`parameters`
    /// carry the changeset.
    pub fn parse(text: &str) -> Result<Self, String> {
        let doc: Value = serde_json::from_str(text)
            .map_err(|e| format!("error parsing changeset JSON: {e}"))?;
        Self::from_document(&doc)
    }

    pub fn from_document(doc: &Value) -> Result<Self, String> {
        let changeset = locate_changeset(doc)
            .ok_or_else(|| "missing or invalid 'changeset' object in parameters".to_string())?;

        let description = changeset
            .get("description")
            .and_then(Value::as_str)
            .filter(|d| !d.trim().is_empty())
            .unwrap_or(NO_DESCRIPTION)
            .to_string();

        let files = match changeset.get("files") {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        };

        Ok(Self { description, files })
    }
}

fn locate_changeset(doc: &Value) -> Option<&Value> {
    if let Some(cs) = doc.get("changeset").filter(|v| v.is_object()) {
        return Some(cs);
    }
    for key in ["args", "parameters"] {
        if let Some(cs) = doc
            .get(key)
            .and_then(|args| args.get("changeset"))
            .filter(|v| v.is_object())
        {
            return Some(cs);
        }
    }
    doc.get("files").map(|_| doc)
}

/// Changes grouped by sandboxed path, in first-seen order
#[derive(Debug, Clone, Default)]
pub struct ValidatedChangeset {
    pub description: String,
    pub groups: IndexMap<PathBuf, Vec<Change>>,
}

impl ValidatedChangeset {
    pub fn change_count(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }
}
