//! Whitespace-tolerant fragment matcher
//!
//! A fragment is turned into a regex that matches its non-whitespace text
//! exactly while letting any whitespace run stand in for any other. An edit is
//! applied only when that pattern matches exactly once; the batch for a file
//! is all-or-nothing.

use regex::{Match, Regex, RegexBuilder};
use tracing::debug;

use crate::core::changeset::ModifyEdit;

/// Generous compiled-size cap; fragments can be whole functions
const PATTERN_SIZE_LIMIT: usize = 64 * 1024 * 1024;

/// Why a batch of edits could not be applied deterministically
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchFailure {
    #[error("modification {} could not be located in the file", .index + 1)]
    NotFound { index: usize },

    #[error(
        "modification {} matches {count} locations; a unique match is required",
        .index + 1
    )]
    Ambiguous { index: usize, count: usize },

    #[error("modification {} has an empty or whitespace-only oldContent", .index + 1)]
    EmptyFragment { index: usize },

    #[error("modification {} produced an unusable pattern: {reason}", .index + 1)]
    Pattern { index: usize, reason: String },
}

impl MatchFailure {
    /// Zero-based index of the edit that failed
    pub fn index(&self) -> usize {
        match self {
            MatchFailure::NotFound { index }
            | MatchFailure::Ambiguous { index, .. }
            | MatchFailure::EmptyFragment { index }
            | MatchFailure::Pattern { index, .. } => *index,
        }
    }
}

/// Apply `edits` in order to `text`, each against the output of the previous.
///
/// Returns the fully patched text, or the first failure. On failure nothing
/// of the partially patched text escapes.
pub fn try_apply(text: &str, edits: &[ModifyEdit]) -> Result<String, MatchFailure> {
    let mut current = text.to_string();
    for (index, edit) in edits.iter().enumerate() {
        current = apply_one(&current, index, edit)?;
    }
    Ok(current)
}

fn apply_one(text: &str, index: usize, edit: &ModifyEdit) -> Result<String, MatchFailure> {
    let Some(pattern) = build_pattern(&edit.old_content) else {
        return Err(MatchFailure::EmptyFragment { index });
    };

    let re = RegexBuilder::new(&pattern)
        .dot_matches_new_line(true)
        .size_limit(PATTERN_SIZE_LIMIT)
        .build()
        .map_err(|e| MatchFailure::Pattern {
            index,
            reason: e.to_string(),
        })?;

    let Some(found) = re.find(text) else {
        debug!(index, "fragment not found");
        return Err(MatchFailure::NotFound { index });
    };
    let count = count_placements(&re, text, found);
    if count > 1 {
        debug!(index, count, "fragment is ambiguous");
        return Err(MatchFailure::Ambiguous { index, count });
    }

    let mut out = String::with_capacity(text.len() + edit.new_content.len());
    out.push_str(&text[..found.start()]);
    out.push_str(&edit.new_content);
    out.push_str(&text[found.end()..]);
    Ok(out)
}

/// Count every placement of `re`, overlapping ones included. Each search
/// resumes one character past the first non-whitespace character of the
/// previous match.
fn count_placements(re: &Regex, text: &str, first: Match<'_>) -> usize {
    let mut count = 1;
    let mut current = first;
    loop {
        let span = current.as_str();
        let anchor = current.start() + span.find(|c: char| !c.is_whitespace()).unwrap_or(0);
        let step = text[anchor..].chars().next().map_or(1, char::len_utf8);
        let resume = anchor + step;
        if resume > text.len() {
            return count;
        }
        match re.find_at(text, resume) {
            Some(next) => {
                count += 1;
                current = next;
            }
            None => return count,
        }
    }
}

/// Escape non-whitespace literally and turn each whitespace run into `\s+`.
/// Leading and trailing runs are kept, so they must match too. `None` when
/// the fragment has no non-whitespace content.
pub fn build_pattern(fragment: &str) -> Option<String> {
    let fragment = fragment.replace("\r\n", "\n").replace('\r', "\n");
    if fragment.trim().is_empty() {
        return None;
    }

    let mut pattern = String::with_capacity(fragment.len() * 2);
    let mut literal = String::new();
    let mut in_whitespace = false;
    for ch in fragment.chars() {
        if ch.is_whitespace() {
            if !in_whitespace {
                pattern.push_str(&regex::escape(&literal));
                literal.clear();
                pattern.push_str(r"\s+");
                in_whitespace = true;
            }
        } else {
            literal.push(ch);
            in_whitespace = false;
        }
    }
    pattern.push_str(&regex::escape(&literal));
    Some(pattern)
}
