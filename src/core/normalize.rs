//! Best-effort repair of concatenated tool-call payloads
//!
//! Upstream agents sometimes emit several `{"name":"CodeDiff","args":{...}}`
//! objects back to back in one string. This module merges them into a single
//! changeset document. It is text scraping, not a parser: a regex finds each
//! envelope header and exactly one JSON value is read after it. Anything it
//! cannot make sense of is passed through untouched so the validator reports
//! the real parse error.

use std::borrow::Cow;

use indexmap::IndexMap;
use regex::Regex;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

/// Tool name upstream agents use for changeset calls
pub const DEFAULT_TOOL_NAME: &str = "CodeDiff";

/// Upper bound on envelopes scanned in one input
const MAX_PAYLOADS: usize = 256;

#[derive(Debug, Clone)]
pub struct ChangesetNormalizer {
    header: Option<Regex>,
}

impl Default for ChangesetNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_TOOL_NAME)
    }
}

impl ChangesetNormalizer {
    pub fn new(tool_name: &str) -> Self {
        let pattern = format!(
            r#"\{{\s*["']name["']\s*:\s*["']{}["']\s*,\s*["'](?:args|parameters)["']\s*:\s*"#,
            regex::escape(tool_name)
        );
        let header = match Regex::new(&pattern) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!(tool_name, error = %e, "cannot build envelope pattern; merging disabled");
                None
            }
        };
        Self { header }
    }

    /// Return a string the validator can parse as one changeset.
    ///
    /// Well-formed input is returned borrowed and unchanged.
    pub fn normalize<'a>(&self, raw: &'a str) -> Cow<'a, str> {
        if serde_json::from_str::<Value>(raw).is_ok() {
            return Cow::Borrowed(raw);
        }

        // Single payload that lost its final closing brace
        let repaired = format!("{raw}}}");
        if serde_json::from_str::<Value>(&repaired).is_ok() {
            info!("input was missing a trailing brace; repaired");
            return Cow::Owned(repaired);
        }

        debug!("input is not a single JSON document; scanning for concatenated payloads");
        match self.merge_embedded(raw) {
            Some(merged) => Cow::Owned(merged),
            None => Cow::Borrowed(raw),
        }
    }

    fn merge_embedded(&self, raw: &str) -> Option<String> {
        let header = self.header.as_ref()?;

        let mut descriptions: Vec<String> = Vec::new();
        // lowercased path -> (first spelling seen, changes in encounter order)
        let mut files: IndexMap<String, (String, Vec<Value>)> = IndexMap::new();

        for m in header.find_iter(raw).take(MAX_PAYLOADS) {
            let rest = &raw[m.end()..];
            let args = match serde_json::Deserializer::from_str(rest)
                .into_iter::<Value>()
                .next()
            {
                Some(Ok(args)) => args,
                Some(Err(e)) => {
                    warn!(offset = m.start(), error = %e, "failed to parse a potential changeset");
                    continue;
                }
                None => continue,
            };

            let Some(changeset) = args.get("changeset").filter(|v| v.is_object()) else {
                debug!(offset = m.start(), "envelope without a changeset object");
                continue;
            };

            descriptions.push(
                changeset
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or("Unnamed changeset")
                    .to_string(),
            );

            let Some(entries) = changeset.get("files").and_then(Value::as_array) else {
                continue;
            };
            for entry in entries {
                let Some(path) = entry
                    .get("path")
                    .and_then(Value::as_str)
                    .filter(|p| !p.is_empty())
                else {
                    warn!("dropping embedded file entry without a path");
                    continue;
                };
                let Some(changes) = entry
                    .get("changes")
                    .and_then(Value::as_array)
                    .filter(|c| !c.is_empty())
                else {
                    warn!(path, "dropping embedded file entry without changes");
                    continue;
                };

                files
                    .entry(path.to_lowercase())
                    .or_insert_with(|| (path.to_string(), Vec::new()))
                    .1
                    .extend(changes.iter().cloned());
            }
        }

        if descriptions.is_empty() {
            debug!("no embedded changesets found; passing input through");
            return None;
        }

        info!(
            changesets = descriptions.len(),
            files = files.len(),
            "combined concatenated changesets"
        );

        let files: Vec<Value> = files
            .into_values()
            .map(|(path, changes)| json!({ "path": path, "changes": changes }))
            .collect();
        let merged = json!({
            "changeset": {
                "description": descriptions.join("; "),
                "files": files,
            }
        });
        Some(merged.to_string())
    }
}
