//! Result collection and classification.
//!
//! The collector exclusively owns the results ledger, the qualification
//! registry and the consecutive-failure counter: every completion, live or
//! dead, flows through it exactly once, on the coordinator. Success of a
//! live test is the presence of the literal success-marker line in its
//! report file; crashes, missing output and internal test failures are all
//! folded into `success = false` and are not distinguished at this layer.

use std::io::Write;
use std::sync::Arc;

use tracing::{error, info};

use crate::catalog::TestCase;
use crate::config::RunConfig;
use crate::errors::SuiteResult;
use crate::ledger::{ResultLedger, TestStatus};
use crate::registry::QualificationRegistry;
use crate::scheduler::TestCompletion;

/// Consecutive-failure threshold: reaching it aborts the run, it being
/// visibly useless to keep going.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 10;

/// The literal line a test program writes to its report file on success.
pub const SUCCESS_MARKER: &str = "==== PASSED ==================";

pub struct ResultCollector {
    config: Arc<RunConfig>,
    ledger: ResultLedger,
    registry: QualificationRegistry,
    consecutive_failures: u32,
    tripped: bool,
}

impl ResultCollector {
    pub fn new(config: Arc<RunConfig>, ledger: ResultLedger) -> ResultCollector {
        ResultCollector {
            config,
            ledger,
            registry: QualificationRegistry::new(),
            consecutive_failures: 0,
            tripped: false,
        }
    }

    /// Record a dead test: one ledger line, empty comment, never executed.
    pub fn record_dead(&mut self, case: &TestCase) -> SuiteResult<()> {
        self.ledger.record(&case.rname(), TestStatus::Dead, Some(""))
    }

    /// Account for one completed live test.
    pub fn collect(&mut self, completion: &TestCompletion) -> SuiteResult<()> {
        let case = &completion.case;
        let root = &self.config.root_dir;

        // What really happened, whatever was expected: the report file's
        // success marker is the sole success signal.
        let outf = case.report_file(root);
        let success = std::fs::read_to_string(&outf)
            .map(|text| text.contains(SUCCESS_MARKER))
            .unwrap_or(false);

        let xfail = case.options.xfail.is_some();
        let comment = case
            .options
            .xfail
            .as_deref()
            .or(case.options.failed.as_deref());

        let status = TestStatus::classify(success, xfail);

        // On failure, publish the diagnostic where the reporting
        // infrastructure expects it, keyed by the test name.
        if !success {
            let published = self.config.log_dir().join(format!("{}.out", case.rname()));
            let _ = std::fs::remove_file(&published);
            if let Err(e) = std::fs::copy(case.diff_file(root), &published) {
                tracing::warn!("cannot publish diagnostic for {}: {e}", case.path);
            }
        }

        self.ledger.record(
            &case.rname(),
            status,
            if !success { comment } else { None },
        )?;

        let dsec = completion.duration.as_secs();
        if !self.config.quiet || (!success && !xfail) {
            info!(
                "{:68} {:02} m {:02} s - {status} {}",
                case.path,
                dsec / 60,
                dsec % 60,
                comment.map(|c| format!("({c})")).unwrap_or_default()
            );
        }

        if self.config.show_diffs && !success && !xfail {
            let diff = std::fs::read_to_string(case.diff_file(root)).unwrap_or_default();
            info!("Error log:\n{diff}");
        }

        self.registry
            .merge(&case.rname(), status, comment, &case.qdata_file(root));

        self.update_breaker(status)?;
        Ok(())
    }

    fn update_breaker(&mut self, status: TestStatus) -> SuiteResult<()> {
        if status == TestStatus::Failed {
            self.consecutive_failures += 1;
        } else {
            self.consecutive_failures = 0;
        }

        if self.consecutive_failures >= MAX_CONSECUTIVE_FAILURES && !self.tripped {
            self.tripped = true;
            let msg = format!(
                "Stopped after {} consecutive failures",
                self.consecutive_failures
            );
            error!("{msg}");

            // Leave a trace in the run header file for reviewers.
            let comment_file = self.config.log_dir().join("comment");
            if let Ok(mut fd) = std::fs::OpenOptions::new().append(true).open(&comment_file) {
                let _ = writeln!(fd, "Log: {msg}");
            }
        }
        Ok(())
    }

    /// True once the consecutive-failure threshold has been reached. New
    /// work must stop being admitted; in-flight completions are still
    /// collected.
    pub fn breaker_tripped(&self) -> bool {
        self.tripped
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Hand the aggregate over for the final snapshot.
    pub fn into_registry(self) -> QualificationRegistry {
        self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ResolvedOptions;
    use crate::scheduler::DEFAULT_TIMEOUT;
    use std::path::Path;
    use std::time::Duration;

    fn options() -> ResolvedOptions {
        ResolvedOptions {
            dead: false,
            timeout: DEFAULT_TIMEOUT,
            expected_out: "test.out".to_string(),
            xfail: None,
            failed: None,
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        root: std::path::PathBuf,
        collector: ResultCollector,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        std::fs::create_dir_all(root.join("output")).unwrap();
        let config = Arc::new(RunConfig {
            root_dir: root.clone(),
            rts: "native".to_string(),
            ..RunConfig::default()
        });
        let ledger = ResultLedger::create(&root.join("output/results")).unwrap();
        Fixture {
            _dir: dir,
            root,
            collector: ResultCollector::new(config, ledger),
        }
    }

    fn completion(root: &Path, name: &str, index: usize, opts: ResolvedOptions) -> TestCompletion {
        let case = TestCase {
            path: format!("tests/{name}/test.py"),
            index,
            options: opts,
        };
        std::fs::create_dir_all(root.join(case.dir())).unwrap();
        // The scheduler always leaves a diagnostic file behind.
        std::fs::write(case.diff_file(root), "diagnostic\n").unwrap();
        TestCompletion {
            case,
            duration: Duration::from_secs(3),
        }
    }

    fn pass(root: &Path, completion: &TestCompletion) {
        std::fs::write(
            completion.case.report_file(root),
            format!("{SUCCESS_MARKER}\n"),
        )
        .unwrap();
    }

    fn ledger_text(root: &Path) -> String {
        std::fs::read_to_string(root.join("output/results")).unwrap()
    }

    #[test]
    fn success_yields_ok_without_comment() {
        let mut fx = fixture();
        let done = completion(&fx.root, "a", 0, options());
        pass(&fx.root, &done);

        fx.collector.collect(&done).unwrap();
        assert_eq!(ledger_text(&fx.root), "tests-a:OK\n");
        assert_eq!(fx.collector.consecutive_failures(), 0);
    }

    #[test]
    fn missing_report_is_a_failure() {
        let mut fx = fixture();
        let done = completion(&fx.root, "a", 0, options());

        fx.collector.collect(&done).unwrap();
        assert_eq!(ledger_text(&fx.root), "tests-a:FAILED\n");
        assert_eq!(fx.collector.consecutive_failures(), 1);

        // Diagnostic published under the test's report key.
        let published = fx.root.join("output/tests-a.out");
        assert_eq!(std::fs::read_to_string(published).unwrap(), "diagnostic\n");
    }

    #[test]
    fn report_without_marker_is_a_failure() {
        let mut fx = fixture();
        let done = completion(&fx.root, "a", 0, options());
        std::fs::write(done.case.report_file(&fx.root), "something else\n").unwrap();

        fx.collector.collect(&done).unwrap();
        assert_eq!(ledger_text(&fx.root), "tests-a:FAILED\n");
    }

    #[test]
    fn expected_failure_classification_and_comment() {
        let mut fx = fixture();
        let mut opts = options();
        opts.xfail = Some("known issue".to_string());
        let done = completion(&fx.root, "a", 0, opts);

        fx.collector.collect(&done).unwrap();
        assert_eq!(ledger_text(&fx.root), "tests-a:XFAIL:known issue\n");
        // XFAIL resets the breaker counter.
        assert_eq!(fx.collector.consecutive_failures(), 0);
    }

    #[test]
    fn unexpected_pass_is_uok_without_comment() {
        let mut fx = fixture();
        let mut opts = options();
        opts.xfail = Some("should fail".to_string());
        let done = completion(&fx.root, "a", 0, opts);
        pass(&fx.root, &done);

        fx.collector.collect(&done).unwrap();
        assert_eq!(ledger_text(&fx.root), "tests-a:UOK\n");
    }

    #[test]
    fn failed_comment_is_reported_on_plain_failures() {
        let mut fx = fixture();
        let mut opts = options();
        opts.failed = Some("\"build broken\"".to_string());
        let done = completion(&fx.root, "a", 0, opts);

        fx.collector.collect(&done).unwrap();
        assert_eq!(ledger_text(&fx.root), "tests-a:FAILED:build broken\n");
    }

    #[test]
    fn breaker_trips_exactly_at_threshold() {
        let mut fx = fixture();
        std::fs::write(fx.root.join("output/comment"), "Options: --RTS=native\n").unwrap();

        for i in 0..MAX_CONSECUTIVE_FAILURES {
            assert!(!fx.collector.breaker_tripped());
            let done = completion(&fx.root, &format!("t{i:02}"), i as usize, options());
            fx.collector.collect(&done).unwrap();
        }
        assert!(fx.collector.breaker_tripped());

        let comment = std::fs::read_to_string(fx.root.join("output/comment")).unwrap();
        assert!(comment.contains("Log: Stopped after 10 consecutive failures"));
    }

    #[test]
    fn any_non_failed_status_resets_the_counter() {
        let mut fx = fixture();
        for i in 0..5 {
            let done = completion(&fx.root, &format!("f{i}"), i, options());
            fx.collector.collect(&done).unwrap();
        }
        assert_eq!(fx.collector.consecutive_failures(), 5);

        let done = completion(&fx.root, "ok", 5, options());
        pass(&fx.root, &done);
        fx.collector.collect(&done).unwrap();
        assert_eq!(fx.collector.consecutive_failures(), 0);
        assert!(!fx.collector.breaker_tripped());
    }

    #[test]
    fn dead_tests_get_one_line_with_empty_comment() {
        let mut fx = fixture();
        let mut opts = options();
        opts.dead = true;
        let case = TestCase {
            path: "tests/gone/test.py".to_string(),
            index: 0,
            options: opts,
        };
        fx.collector.record_dead(&case).unwrap();
        assert_eq!(ledger_text(&fx.root), "tests-gone:DEAD:\n");
    }

    #[test]
    fn qualification_payload_reaches_the_registry() {
        let mut fx = fixture();
        let done = completion(&fx.root, "a", 0, options());
        pass(&fx.root, &done);
        std::fs::write(
            done.case.qdata_file(&fx.root),
            r#"{"requirement": "R-1"}"#,
        )
        .unwrap();

        fx.collector.collect(&done).unwrap();
        let registry = fx.collector.into_registry();
        let entry = registry.get("tests-a").unwrap();
        assert_eq!(entry.status, TestStatus::Ok);
        assert_eq!(entry.payload.as_ref().unwrap()["requirement"], "R-1");
    }
}
