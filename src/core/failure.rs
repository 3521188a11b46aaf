//! Persisted debug records for failed deterministic merges
//!
//! Each failure lands as one pretty-printed JSON file named
//! `merge_failure_<yyyyMMdd_HHmmss_fff>_<filename>.json`. Records carry the
//! exact edits and the original content so a merge can be replayed later.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

use crate::core::changeset::ModifyEdit;

/// File name prefix shared by every record
pub const RECORD_PREFIX: &str = "merge_failure_";

/// One failed merge, as written to disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeFailureRecord {
    pub timestamp: DateTime<Utc>,
    pub file_path: String,
    pub failure_reason: String,
    pub changes: Vec<ModifyEdit>,
    pub original_content: String,
    /// blake3:<hex> of `original_content`; absent in hand-written records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_checksum: Option<String>,
}

impl MergeFailureRecord {
    pub fn new(
        file_path: &Path,
        failure_reason: impl Into<String>,
        changes: &[ModifyEdit],
        original_content: &str,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            file_path: file_path.display().to_string(),
            failure_reason: failure_reason.into(),
            changes: changes.to_vec(),
            original_content: original_content.to_string(),
            content_checksum: Some(content_checksum(original_content)),
        }
    }

    /// Whether `current` still matches the content captured at failure time.
    /// Records without a checksum compare the stored content directly.
    pub fn matches_content(&self, current: &str) -> bool {
        match &self.content_checksum {
            Some(sum) => *sum == content_checksum(current),
            None => self.original_content == current,
        }
    }
}

/// `blake3:<hex>` digest of a text
pub fn content_checksum(text: &str) -> String {
    format!("blake3:{}", blake3::hash(text.as_bytes()).to_hex())
}

/// A record found on disk
#[derive(Debug, Clone)]
pub struct StoredFailure {
    pub path: PathBuf,
    pub record: MergeFailureRecord,
}

/// Directory of failure records
#[derive(Debug, Clone)]
pub struct FailureStore {
    dir: PathBuf,
}

impl FailureStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `record` and return its path. Never overwrites an existing record.
    pub fn record(&self, record: &MergeFailureRecord) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create failures dir: {}", self.dir.display()))?;

        let text = serde_json::to_string_pretty(record).context("serialize failure record")?;
        let stem = record_stem(record);

        // Same file failing twice within a millisecond gets a numeric suffix
        for attempt in 0..100u32 {
            let name = if attempt == 0 {
                format!("{stem}.json")
            } else {
                format!("{stem}_{attempt}.json")
            };
            let path = self.dir.join(name);
            let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(f) => f,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(anyhow::Error::new(e)
                        .context(format!("create failure record: {}", path.display())));
                }
            };
            file.write_all(text.as_bytes())
                .with_context(|| format!("write failure record: {}", path.display()))?;
            file.sync_all().ok();

            info!(record = %path.display(), file = %record.file_path, "saved merge failure record");
            return Ok(path);
        }

        bail!("too many failure records named {stem} in {}", self.dir.display())
    }

    /// Load one record from an explicit path
    pub fn load(path: &Path) -> Result<MergeFailureRecord> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("read failure record: {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("parse failure record: {}", path.display()))
    }

    /// Every readable record in the directory, newest first.
    ///
    /// A missing directory is an empty list; unreadable records are skipped.
    pub fn list(&self) -> Result<Vec<StoredFailure>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("read failures dir: {}", self.dir.display()))?;

        let mut out = Vec::new();
        for entry in entries {
            let path = entry.context("read failures dir entry")?.path();
            let is_record = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(RECORD_PREFIX) && n.ends_with(".json"));
            if !is_record {
                continue;
            }
            match Self::load(&path) {
                Ok(record) => out.push(StoredFailure { path, record }),
                Err(e) => debug!(path = %path.display(), error = %e, "skipping unreadable record"),
            }
        }

        out.sort_by(|a, b| {
            b.record
                .timestamp
                .cmp(&a.record.timestamp)
                .then_with(|| b.path.cmp(&a.path))
        });
        Ok(out)
    }
}

fn record_stem(record: &MergeFailureRecord) -> String {
    let file_name = Path::new(&record.file_path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unknown".to_string());
    // Keep the name portable across filesystems
    let safe: String = file_name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "{RECORD_PREFIX}{}_{safe}",
        record.timestamp.format("%Y%m%d_%H%M%S_%3f")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn sample(path: &str) -> MergeFailureRecord {
        MergeFailureRecord::new(
            Path::new(path),
            "modification 1 could not be located in the file",
            &[ModifyEdit {
                old_content: "a".into(),
                new_content: "b".into(),
                description: None,
            }],
            "original",
        )
    }

    #[test]
    fn record_then_load_keeps_every_field() {
        let tmp = TempDir::new().unwrap();
        let store = FailureStore::new(tmp.path().join("failures"));
        let record = sample("/proj/src/main.rs");

        let path = store.record(&record).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("merge_failure_"));
        assert!(name.ends_with("_main.rs.json"));

        let loaded = FailureStore::load(&path).unwrap();
        assert_eq!(loaded, record);
    }

    #[test]
    fn on_disk_keys_are_camel_case() {
        let tmp = TempDir::new().unwrap();
        let store = FailureStore::new(tmp.path());
        let path = store.record(&sample("x.txt")).unwrap();
        let text = fs::read_to_string(path).unwrap();
        for key in [
            "\"timestamp\"",
            "\"filePath\"",
            "\"failureReason\"",
            "\"changes\"",
            "\"originalContent\"",
            "\"contentChecksum\"",
            "\"oldContent\"",
        ] {
            assert!(text.contains(key), "missing {key} in {text}");
        }
    }

    #[test]
    fn same_millisecond_records_do_not_collide() {
        let tmp = TempDir::new().unwrap();
        let store = FailureStore::new(tmp.path());
        let record = sample("same.txt");
        let first = store.record(&record).unwrap();
        let second = store.record(&record).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn list_is_newest_first_and_skips_junk() {
        let tmp = TempDir::new().unwrap();
        let store = FailureStore::new(tmp.path());

        let mut older = sample("old.txt");
        older.timestamp = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut newer = sample("new.txt");
        newer.timestamp = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        store.record(&older).unwrap();
        store.record(&newer).unwrap();
        fs::write(tmp.path().join("merge_failure_broken.json"), "{").unwrap();
        fs::write(tmp.path().join("notes.txt"), "ignore me").unwrap();

        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed[0].record.file_path.ends_with("new.txt"));
        assert!(listed[1].record.file_path.ends_with("old.txt"));
    }

    #[test]
    fn missing_dir_lists_nothing() {
        let tmp = TempDir::new().unwrap();
        let store = FailureStore::new(tmp.path().join("absent"));
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn checksum_detects_drift() {
        let record = sample("x.txt");
        assert!(record.matches_content("original"));
        assert!(!record.matches_content("original, edited"));

        let mut legacy = record.clone();
        legacy.content_checksum = None;
        assert!(legacy.matches_content("original"));
    }
}
