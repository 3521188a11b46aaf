//! Shared test utilities for integration tests
//!
//! Fixture projects and changeset builders used across test files.

#![allow(dead_code)]

use assert_fs::prelude::*;
use serde_json::{Value, json};

/// Create a temporary project root holding `files` (relative path, content).
pub fn project(files: &[(&str, &str)]) -> assert_fs::TempDir
{
    let tmp = assert_fs::TempDir::new().expect("tempdir");

    for (path, body) in files
    {
        tmp.child(path)
            .write_str(body)
            .expect("write fixture");
    }

    tmp
}

/// Wrap `files` in a `{"changeset": {...}}` document.
pub fn changeset(
    description: &str,
    files: Value,
) -> String
{
    json!({ "changeset": { "description": description, "files": files } }).to_string()
}

/// One tool-call envelope as an upstream agent would emit it.
pub fn tool_call(
    description: &str,
    files: Value,
) -> String
{
    json!({
        "name": "CodeDiff",
        "args": { "changeset": { "description": description, "files": files } }
    })
    .to_string()
}

/// Read a project file as UTF-8.
pub fn read(
    root: &assert_fs::TempDir,
    rel: &str,
) -> String
{
    std::fs::read_to_string(root.path().join(rel)).expect("read fixture")
}
