//! Secondary merge oracle: the port the executor falls back to, prompt
//! construction, response clean-up and an external-command adapter.

use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::{debug, info, instrument, warn};
use wait_timeout::ChildExt;

use crate::core::changeset::ModifyEdit;
use crate::infra::io::strip_code_fence;

/// Marker an oracle may prefix to signal it could not do the merge
pub const ERROR_MARKER: &str = "ERROR:";
/// Marker some oracles prefix to an otherwise good answer
pub const SUCCESS_MARKER: &str = "SUCCESS";

/// What an oracle call produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleResponse {
    pub success: bool,
    pub response: String,
    pub error: Option<String>,
}

impl OracleResponse {
    pub fn ok(response: impl Into<String>) -> Self {
        Self {
            success: true,
            response: response.into(),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            response: String::new(),
            error: Some(error.into()),
        }
    }
}

/// Text in, text or error out
pub trait Oracle {
    fn process(&self, prompt: &str) -> OracleResponse;
}

impl<F> Oracle for F
where
    F: Fn(&str) -> OracleResponse,
{
    fn process(&self, prompt: &str) -> OracleResponse {
        self(prompt)
    }
}

/// Oracle used when none is configured; every call fails
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableOracle;

impl Oracle for UnavailableOracle {
    fn process(&self, _prompt: &str) -> OracleResponse {
        OracleResponse::failed("no oracle configured")
    }
}

/// Runs an external command: prompt on stdin, new file content on stdout
#[derive(Debug, Clone)]
pub struct CommandOracle {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandOracle {
    pub fn new(command: &[String], timeout: Duration) -> Result<Self> {
        let Some((program, args)) = command.split_first() else {
            bail!("oracle command is empty");
        };
        if program.trim().is_empty() {
            bail!("oracle command is empty");
        }
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            timeout,
        })
    }

    fn run(&self, prompt: &str) -> Result<OracleResponse> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("spawn oracle command '{}'", self.program))?;

        // Stdin and both output pipes each get their own thread
        let mut stdin = child.stdin.take().context("open oracle stdin")?;
        let input = prompt.to_string();
        let writer = thread::spawn(move || {
            // A child that exits early closes the pipe; that is its answer
            let _ = stdin.write_all(input.as_bytes());
        });
        let stdout = drain(child.stdout.take().context("open oracle stdout")?);
        let stderr = drain(child.stderr.take().context("open oracle stderr")?);

        let status = match child
            .wait_timeout(self.timeout)
            .context("wait for oracle command")?
        {
            Some(status) => Some(status),
            None => {
                warn!(program = %self.program, timeout = ?self.timeout, "oracle timed out; killing");
                let _ = child.kill();
                let _ = child.wait();
                None
            }
        };

        let _ = writer.join();
        let out = stdout.join().unwrap_or_default();
        let err = stderr.join().unwrap_or_default();

        let Some(status) = status else {
            return Ok(OracleResponse::failed(format!(
                "oracle command timed out after {:?}",
                self.timeout
            )));
        };

        if !status.success() {
            let stderr = String::from_utf8_lossy(&err).trim().to_string();
            let detail = if stderr.is_empty() {
                status.to_string()
            } else {
                stderr
            };
            return Ok(OracleResponse::failed(format!(
                "oracle command failed: {detail}"
            )));
        }

        match String::from_utf8(out) {
            Ok(text) => Ok(OracleResponse::ok(text)),
            Err(_) => Ok(OracleResponse::failed(
                "oracle command produced non-UTF-8 output",
            )),
        }
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

impl Oracle for CommandOracle {
    #[instrument(level = "debug", skip_all, fields(program = %self.program, prompt_bytes = prompt.len()))]
    fn process(&self, prompt: &str) -> OracleResponse {
        match self.run(prompt) {
            Ok(resp) => {
                debug!(success = resp.success, "oracle finished");
                resp
            }
            Err(e) => OracleResponse::failed(format!("{e:#}")),
        }
    }
}

/// Build the single merge prompt for one file
pub fn build_prompt(file_path: &str, edits: &[ModifyEdit], original: &str) -> Result<String> {
    let modifications =
        serde_json::to_string_pretty(edits).context("serialize modifications for prompt")?;
    Ok(format!(
        "You are a code modification assistant. Apply the following modifications sequentially to the original file content provided below.\n\
         The 'modifications' array describes the changes. Apply them carefully, using 'oldContent' to locate each change. Preserve line endings (CRLF vs LF) from the original file.\n\
         Respond ONLY with the complete, modified file content. Do not include explanations, summaries, or markdown formatting like ```.\n\n\
         File Path: {file_path}\n\n\
         Modifications JSON:\n{modifications}\n\n\
         --- ORIGINAL FILE CONTENT ---\n\
         {original}"
    ))
}

/// Turn a raw oracle answer into file content, or explain why it is unusable
pub fn clean_response(raw: &str, original: &str) -> std::result::Result<String, String> {
    let trimmed = raw.trim_start();
    if let Some(rest) = trimmed.strip_prefix(ERROR_MARKER) {
        return Err(format!("oracle reported an error: {}", rest.trim()));
    }

    let mut content = raw;
    if let Some(rest) = trimmed.strip_prefix(SUCCESS_MARKER) {
        info!("oracle response carried a success marker; stripping");
        content = rest.strip_prefix(':').unwrap_or(rest);
        content = content
            .strip_prefix("\r\n")
            .or_else(|| content.strip_prefix('\n'))
            .unwrap_or(content);
    }

    let content = strip_code_fence(content).into_owned();
    if content.trim().is_empty() && !original.trim().is_empty() {
        return Err("oracle returned empty content for a non-empty file".to_string());
    }
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn prompt_carries_path_edits_and_content() {
        let edits = [ModifyEdit {
            old_content: "a".into(),
            new_content: "b".into(),
            description: Some("swap".into()),
        }];
        let prompt = build_prompt("/p/x.rs", &edits, "line one\nline two").unwrap();
        assert!(prompt.contains("File Path: /p/x.rs"));
        assert!(prompt.contains("\"oldContent\": \"a\""));
        assert!(prompt.ends_with("--- ORIGINAL FILE CONTENT ---\nline one\nline two"));
    }

    #[test]
    fn clean_response_strips_fences_and_markers() {
        assert_eq!(clean_response("```rust\nfn a() {}\n```", "x").unwrap(), "fn a() {}\n");
        assert_eq!(clean_response("SUCCESS\nbody\n", "x").unwrap(), "body\n");
        assert_eq!(clean_response("plain\n", "x").unwrap(), "plain\n");
    }

    #[test]
    fn clean_response_rejects_unusable_answers() {
        let err = clean_response("ERROR: could not merge", "x").unwrap_err();
        assert!(err.contains("could not merge"));
        assert!(clean_response("  \n", "content").is_err());
        assert_eq!(clean_response("", "  ").unwrap(), "");
    }

    #[test]
    fn closures_are_oracles() {
        let oracle = |p: &str| OracleResponse::ok(p.to_uppercase());
        assert_eq!(oracle.process("hi").response, "HI");
        assert!(!UnavailableOracle.process("x").success);
    }

    #[test]
    fn empty_command_is_rejected() {
        assert!(CommandOracle::new(&[], Duration::from_secs(1)).is_err());
        assert!(CommandOracle::new(&[" ".to_string()], Duration::from_secs(1)).is_err());
    }

    #[test]
    fn missing_program_fails_without_panicking() {
        let oracle = CommandOracle::new(
            &["patchset-no-such-oracle-binary".to_string()],
            Duration::from_secs(5),
        )
        .unwrap();
        let resp = oracle.process("prompt");
        assert!(!resp.success);
        assert!(resp.error.unwrap().contains("spawn oracle command"));
    }

    #[cfg(unix)]
    #[test]
    fn command_echoes_stdin() {
        let oracle = CommandOracle::new(&["cat".to_string()], Duration::from_secs(10)).unwrap();
        let resp = oracle.process("hello\nworld\n");
        assert!(resp.success, "{:?}", resp.error);
        assert_eq!(resp.response, "hello\nworld\n");
    }

    #[cfg(unix)]
    #[test]
    fn nonzero_exit_reports_stderr() {
        let cmd = ["sh", "-c", "echo broken >&2; exit 3"].map(String::from);
        let oracle = CommandOracle::new(&cmd, Duration::from_secs(10)).unwrap();
        let resp = oracle.process("x");
        assert!(!resp.success);
        assert!(resp.error.unwrap().contains("broken"));
    }

    #[cfg(unix)]
    #[test]
    fn slow_command_is_killed() {
        let cmd = ["sleep", "5"].map(String::from);
        let oracle = CommandOracle::new(&cmd, Duration::from_millis(200)).unwrap();
        let started = Instant::now();
        let resp = oracle.process("x");
        assert!(!resp.success);
        assert!(resp.error.unwrap().contains("timed out"));
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
