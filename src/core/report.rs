//! Structured outcome of one changeset application

use std::path::PathBuf;

use serde::Serialize;

/// Outcome of a single handler call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileOperationResult {
    pub success: bool,
    pub message: String,
}

impl FileOperationResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// All results for one sandboxed path
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub results: Vec<FileOperationResult>,
}

impl FileReport {
    pub fn success(&self) -> bool {
        self.results.iter().all(|r| r.success)
    }
}

/// Whole-request report; validation errors mean no file was touched
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChangesetReport {
    pub description: String,
    pub validation_errors: Vec<String>,
    pub files: Vec<FileReport>,
}

impl ChangesetReport {
    pub fn rejected(description: impl Into<String>, errors: Vec<String>) -> Self {
        Self {
            description: description.into(),
            validation_errors: errors,
            files: Vec::new(),
        }
    }

    pub fn validation_failed(&self) -> bool {
        !self.validation_errors.is_empty()
    }

    pub fn success(&self) -> bool {
        !self.validation_failed() && self.files.iter().all(FileReport::success)
    }

    /// (failed, total) over every recorded operation
    pub fn operation_counts(&self) -> (usize, usize) {
        let total = self.files.iter().map(|f| f.results.len()).sum();
        let failed = self
            .files
            .iter()
            .flat_map(|f| &f.results)
            .filter(|r| !r.success)
            .count();
        (failed, total)
    }

    /// Plain-text summary, one line per operation
    pub fn render(&self) -> String {
        let mut out = String::new();
        if self.validation_failed() {
            out.push_str(&format!(
                "Changeset '{}' rejected: {} validation error(s)\n",
                self.description,
                self.validation_errors.len()
            ));
            for e in &self.validation_errors {
                out.push_str(&format!("  • {e}\n"));
            }
            return out;
        }

        out.push_str(&format!(
            "Changeset '{}' processing results:\n",
            self.description
        ));
        for file in &self.files {
            for r in &file.results {
                out.push_str(&format!("- {}: {}\n", file.path.display(), r.message));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_and_success_follow_results() {
        let report = ChangesetReport {
            description: "d".into(),
            validation_errors: Vec::new(),
            files: vec![
                FileReport {
                    path: PathBuf::from("a"),
                    results: vec![FileOperationResult::ok("fine")],
                },
                FileReport {
                    path: PathBuf::from("b"),
                    results: vec![FileOperationResult::failed("Failed: nope")],
                },
            ],
        };
        assert!(!report.success());
        assert_eq!(report.operation_counts(), (1, 2));
        assert!(report.render().contains("- b: Failed: nope"));
    }

    #[test]
    fn rejected_report_lists_errors() {
        let report = ChangesetReport::rejected("d", vec!["Error: bad".into()]);
        assert!(report.validation_failed());
        assert!(!report.success());
        assert!(report.render().contains("Error: bad"));
    }
}
