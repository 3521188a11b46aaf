//! Changeset validation: grouping, content rules and cross-path conflicts
//!
//! Validation is one exhaustive pass. Every problem is collected so the caller
//! sees the complete list; any error at all rejects the whole changeset before
//! a single byte is written.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::core::{
    changeset::{Change, ChangeKind, ModifyEdit, RawChangeset, ValidatedChangeset},
    sandbox::PathSandbox,
};

/// Every message produced while validating one changeset
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport
{
    pub errors: Vec<String>,
}

impl ValidationReport
{
    fn push(
        &mut self,
        message: String,
    )
    {
        debug!(%message, "validation error");
        self.errors.push(message);
    }

    pub fn is_empty(&self) -> bool
    {
        self.errors.is_empty()
    }
}

/// Per-path flags gathered during the first pass; dropped after validation
#[derive(Debug, Clone, Default)]
struct PathValidationDetails
{
    has_delete: bool,
    has_rename: bool,
    has_replace: bool,
    has_create: bool,
    has_modify: bool,
    exclusive_ops: usize,
    rename_target: Option<PathBuf>,
}

impl PathValidationDetails
{
    fn mark(
        &mut self,
        kind: ChangeKind,
    )
    {
        if kind.is_exclusive()
        {
            self.exclusive_ops += 1;
        }
        match kind
        {
            ChangeKind::Delete => self.has_delete = true,
            ChangeKind::Rename => self.has_rename = true,
            ChangeKind::Replace => self.has_replace = true,
            ChangeKind::CreateNew => self.has_create = true,
            ChangeKind::Modify => self.has_modify = true,
        }
    }

    /// Exclusive operations requested, repeats of one kind included
    fn exclusive_count(&self) -> usize
    {
        self.exclusive_ops
    }
}

/// Validates raw changesets against a sandbox
#[derive(Debug, Clone, Copy)]
pub struct ChangesetValidator<'a>
{
    sandbox: &'a PathSandbox,
}

impl<'a> ChangesetValidator<'a>
{
    pub fn new(sandbox: &'a PathSandbox) -> Self
    {
        Self { sandbox }
    }

    /// Group changes by sandboxed path and enforce every content and
    /// consistency rule. Returns the grouped changes only when nothing failed.
    pub fn validate(
        &self,
        raw: &RawChangeset,
    ) -> Result<ValidatedChangeset, ValidationReport>
    {
        let mut report = ValidationReport::default();
        let mut groups: IndexMap<PathBuf, Vec<Change>> = IndexMap::new();
        let mut details: IndexMap<PathBuf, PathValidationDetails> = IndexMap::new();
        // destination -> distinct sources renaming onto it
        let mut rename_sources: IndexMap<PathBuf, Vec<PathBuf>> = IndexMap::new();

        if raw.files.is_empty()
        {
            report.push("Error: Changeset contains no file entries.".to_string());
        }

        for (i, entry) in raw.files.iter().enumerate()
        {
            let Some(entry) = entry.as_object()
            else
            {
                report.push(format!(
                    "Error: Item at index {i} in 'files' array is not a valid JSON object."
                ));
                continue;
            };

            let raw_path = match entry.get("path").and_then(Value::as_str)
            {
                Some(p) if !p.is_empty() => p,
                _ =>
                {
                    report.push(format!(
                        "Error: File path is missing or empty for file entry at index {i}."
                    ));
                    continue;
                }
            };

            let path = match self.sandbox.normalize_and_validate(raw_path)
            {
                Ok(p) => p,
                Err(e) =>
                {
                    report.push(format!("Error: {e}"));
                    continue;
                }
            };

            let changes = match entry.get("changes").and_then(Value::as_array)
            {
                Some(c) if !c.is_empty() => c,
                _ =>
                {
                    report.push(format!(
                        "Error: No changes specified for file entry {i} ('{raw_path}'). Each entry must have at least one change."
                    ));
                    continue;
                }
            };

            let path_details = details.entry(path.clone()).or_default();
            let group = groups.entry(path.clone()).or_default();

            for change in changes
            {
                let Some(change) = change.as_object()
                else
                {
                    report.push(format!(
                        "Error: Change entry is not a valid JSON object for file '{raw_path}' (entry {i})."
                    ));
                    continue;
                };

                let Some(parsed) = self.parse_change(change, &path, raw_path, i, &mut report)
                else
                {
                    continue;
                };

                if let Change::Rename { destination, .. } = &parsed
                {
                    let sources = rename_sources.entry(destination.clone()).or_default();
                    if !sources.contains(&path)
                    {
                        sources.push(path.clone());
                    }
                    path_details.rename_target = Some(destination.clone());
                }

                path_details.mark(parsed.kind());
                group.push(parsed);
            }
        }

        for (destination, sources) in &rename_sources
        {
            if sources.len() > 1
            {
                for source in sources
                {
                    report.push(format!(
                        "Error: Multiple files are being renamed to the same target path '{}' (source '{}').",
                        destination.display(),
                        source.display()
                    ));
                }
            }
        }

        check_cross_path(&details, &mut report);

        if !report.is_empty()
        {
            warn!(
                errors = report.errors.len(),
                description = %raw.description,
                "changeset failed validation"
            );
            return Err(report);
        }

        Ok(ValidatedChangeset {
            description: raw.description.clone(),
            groups,
        })
    }

    /// Turn one raw change object into a typed change, recording what is wrong
    fn parse_change(
        &self,
        change: &Map<String, Value>,
        path: &Path,
        raw_path: &str,
        index: usize,
        report: &mut ValidationReport,
    ) -> Option<Change>
    {
        let tag = change.get("change_type").and_then(Value::as_str);
        let Some(kind) = tag.and_then(ChangeKind::from_tag)
        else
        {
            let shown = match change.get("change_type")
            {
                None | Some(Value::Null) => "null".to_string(),
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
            };
            report.push(format!(
                "Error: Missing or invalid change_type ('{shown}') for a change in file '{raw_path}' (entry {index})."
            ));
            return None;
        };

        let shown_path = path.display();
        let old_content = string_field(change, "oldContent", kind, &shown_path, report)?;
        let new_content = string_field(change, "newContent", kind, &shown_path, report)?;
        let description = change
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string);

        match kind
        {
            ChangeKind::Modify =>
            {
                let Some(old_content) = old_content
                else
                {
                    report.push(format!(
                        "Error: 'oldContent' is required for 'modifyFile' operation on '{shown_path}'."
                    ));
                    return None;
                };
                Some(Change::Modify(ModifyEdit {
                    old_content,
                    new_content: new_content.unwrap_or_default(),
                    description,
                }))
            }
            ChangeKind::CreateNew | ChangeKind::Replace =>
            {
                let Some(content) = new_content
                else
                {
                    report.push(format!(
                        "Error: 'newContent' is required for '{kind}' operation on '{shown_path}'."
                    ));
                    return None;
                };
                Some(match kind
                {
                    ChangeKind::CreateNew => Change::Create {
                        content,
                        description,
                    },
                    _ => Change::Replace {
                        content,
                        description,
                    },
                })
            }
            ChangeKind::Rename =>
            {
                let target = match new_content
                {
                    Some(t) if !t.trim().is_empty() => t,
                    _ =>
                    {
                        report.push(format!(
                            "Error: 'newContent' (the new path) is required and cannot be empty for 'renameFile' operation on '{shown_path}'."
                        ));
                        return None;
                    }
                };
                let destination = match self.sandbox.normalize_and_validate(&target)
                {
                    Ok(d) => d,
                    Err(e) =>
                    {
                        report.push(format!("Error: {e}"));
                        return None;
                    }
                };
                if destination == path
                {
                    report.push(format!(
                        "Error: Rename of '{shown_path}' targets the same path."
                    ));
                    return None;
                }
                Some(Change::Rename {
                    destination,
                    description,
                })
            }
            ChangeKind::Delete => Some(Change::Delete { description }),
        }
    }
}

/// Read an optional string field; `null` counts as absent, other types are an error.
/// The outer `None` means the change is invalid.
fn string_field(
    change: &Map<String, Value>,
    key: &str,
    kind: ChangeKind,
    shown_path: &std::path::Display<'_>,
    report: &mut ValidationReport,
) -> Option<Option<String>>
{
    match change.get(key)
    {
        None | Some(Value::Null) => Some(None),
        Some(Value::String(s)) => Some(Some(s.clone())),
        Some(_) =>
        {
            report.push(format!(
                "Error: '{key}' must be a string for '{kind}' operation on '{shown_path}'."
            ));
            None
        }
    }
}

fn check_cross_path(
    details: &IndexMap<PathBuf, PathValidationDetails>,
    report: &mut ValidationReport,
)
{
    for (path, d) in details
    {
        let exclusive = d.exclusive_count();
        if exclusive > 1
        {
            report.push(format!(
                "Error: Conflicting exclusive operations (delete, rename, replace, create) requested for the same file path '{}'.",
                path.display()
            ));
        }
        if exclusive > 0 && d.has_modify
        {
            report.push(format!(
                "Error: Cannot specify 'modifyFile' along with delete, rename, replace, or create for the same file path '{}'.",
                path.display()
            ));
        }

        let Some(target) = d.rename_target.as_ref().filter(|_| d.has_rename)
        else
        {
            continue;
        };
        if let Some(target_details) = details.get(target)
        {
            if target_details.has_create || target_details.has_replace
            {
                report.push(format!(
                    "Error: Rename operation targets path '{}', which is also targeted by a create or replace operation.",
                    target.display()
                ));
            }
            if target_details.has_delete
            {
                warn!(
                    source = %path.display(),
                    target = %target.display(),
                    "file is being renamed onto a path that is also marked for deletion"
                );
            }
        }
    }
}
