use anyhow::{Context, Result};
use std::borrow::Cow;
use std::fs;
use std::io::{Read, Write};
use std::path::Path;

/// Read changeset text from a file, or stdin when no path is given
pub fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(p) if p.as_os_str() != "-" => fs::read_to_string(p)
            .with_context(|| format!("Failed to read changeset from {}", p.display())),
        _ => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read changeset from stdin")?;
            Ok(buf)
        }
    }
}

/// Get content from system clipboard
pub fn read_clipboard() -> Result<String> {
    use arboard::Clipboard;
    let mut clipboard = Clipboard::new().context("Failed to access clipboard")?;
    clipboard
        .get_text()
        .context("Failed to get text from clipboard")
}

/// Atomic write with same-directory temp file
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d,
        _ => Path::new("."),
    };

    // Preserve original permissions when replacing
    let perms = fs::metadata(path).map(|m| m.permissions()).ok();

    let tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("create temp file in {}", dir.display()))?;

    let mut file = tmp.as_file();
    file.write_all(data).context("write temp file")?;
    file.sync_all().context("sync temp file")?;

    if let Some(perms) = perms {
        fs::set_permissions(tmp.path(), perms).context("set temp permissions")?;
    }

    // Atomically replace the destination
    if let Err(e) = tmp.persist(path) {
        // Persist can fail on odd filesystems; copy keeps the write
        fs::copy(e.file.path(), path)
            .with_context(|| format!("copy temp file over {}", path.display()))?;
    }

    // fsync parent dir for durability on Unix
    #[cfg(unix)]
    {
        if let Ok(parent_file) = fs::File::open(dir) {
            let _ = parent_file.sync_all();
        }
    }

    Ok(())
}

/// Strip one wrapping code fence (```` ```lang ... ``` ````) if present.
///
/// The closing fence must use at least as many backticks as the opening one,
/// so bodies that themselves contain shorter fences survive intact. Text
/// without a complete wrapping fence is returned as-is.
pub fn strip_code_fence(content: &str) -> Cow<'_, str> {
    let lead = content.len() - content.trim_start().len();
    let body = &content[lead..];
    if !body.starts_with("```") {
        return Cow::Borrowed(content);
    }

    let fence_len = body.chars().take_while(|&c| c == '`').count();
    let Some(open_end) = body.find('\n') else {
        return Cow::Borrowed(content);
    };
    let inner = &body[open_end + 1..];

    // Closing fence: last non-blank line, backticks only
    let trimmed = inner.trim_end();
    let close_start = trimmed.rfind('\n').map_or(0, |i| i + 1);
    let close = trimmed[close_start..].trim();
    let closes = close.len() >= fence_len && close.chars().all(|c| c == '`');
    if !closes {
        return Cow::Borrowed(content);
    }

    Cow::Owned(inner[..close_start].to_string())
}
