//! The append-only results ledger.
//!
//! One line per test, `name:STATUS[:comment]`, written to `output/results`.
//! Dead-test lines are written before scheduling begins, live-test lines as
//! each completes. The ledger is owned exclusively by the result-collection
//! path; nothing else writes to it.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::warn;

use crate::errors::SuiteResult;

/// Final classification of one test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TestStatus {
    /// Excluded by a discriminant-driven rule, never executed.
    #[serde(rename = "DEAD")]
    Dead,
    /// Ran and passed, no failure expectation.
    #[serde(rename = "OK")]
    Ok,
    /// Ran and passed although a failure was expected.
    #[serde(rename = "UOK")]
    Uok,
    /// Ran and failed, no failure expectation.
    #[serde(rename = "FAILED")]
    Failed,
    /// Ran and failed as expected.
    #[serde(rename = "XFAIL")]
    Xfail,
}

impl TestStatus {
    /// Classification of a completed live test from its execution success
    /// and a possible failure expectation.
    pub fn classify(success: bool, xfail: bool) -> TestStatus {
        match (success, xfail) {
            (true, false) => TestStatus::Ok,
            (false, false) => TestStatus::Failed,
            (true, true) => TestStatus::Uok,
            (false, true) => TestStatus::Xfail,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TestStatus::Dead => "DEAD",
            TestStatus::Ok => "OK",
            TestStatus::Uok => "UOK",
            TestStatus::Failed => "FAILED",
            TestStatus::Xfail => "XFAIL",
        }
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only writer for the results file.
pub struct ResultLedger {
    path: PathBuf,
    file: File,
    seen: std::collections::HashSet<String>,
}

impl ResultLedger {
    /// Create (truncating any previous run's content) the ledger at PATH.
    pub fn create(path: &Path) -> SuiteResult<ResultLedger> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        Ok(ResultLedger {
            path: path.to_path_buf(),
            file,
            seen: std::collections::HashSet::new(),
        })
    }

    /// Append one `name:STATUS[:comment]` record.
    ///
    /// Names are expected to be unique by construction (they derive from
    /// descriptor paths); a duplicate is recorded anyway but flagged, since
    /// it means two descriptors collapsed to one report key.
    pub fn record(
        &mut self,
        name: &str,
        status: TestStatus,
        comment: Option<&str>,
    ) -> SuiteResult<()> {
        if !self.seen.insert(name.to_string()) {
            warn!("duplicate ledger entry for '{name}'");
        }
        let suffix = match comment {
            Some(c) => format!(":{}", c.trim_matches('"')),
            None => String::new(),
        };
        writeln!(self.file, "{name}:{status}{suffix}")?;
        self.file.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_table() {
        assert_eq!(TestStatus::classify(true, false), TestStatus::Ok);
        assert_eq!(TestStatus::classify(false, false), TestStatus::Failed);
        assert_eq!(TestStatus::classify(true, true), TestStatus::Uok);
        assert_eq!(TestStatus::classify(false, true), TestStatus::Xfail);
    }

    #[test]
    fn record_formats() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results");
        let mut ledger = ResultLedger::create(&path).unwrap();

        ledger.record("a-b", TestStatus::Dead, Some("")).unwrap();
        ledger.record("a-c", TestStatus::Ok, None).unwrap();
        ledger
            .record("a-d", TestStatus::Xfail, Some("\"known issue\""))
            .unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "a-b:DEAD:\na-c:OK\na-d:XFAIL:known issue\n");
    }

    #[test]
    fn create_truncates_previous_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results");
        std::fs::write(&path, "stale:OK\n").unwrap();

        let mut ledger = ResultLedger::create(&path).unwrap();
        ledger.record("fresh", TestStatus::Ok, None).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "fresh:OK\n");
    }
}
