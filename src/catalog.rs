//! Test discovery and dead/live partitioning.
//!
//! The catalog finds every test descriptor under the fixed discovery roots,
//! narrows the candidates by qualification subtree and free-text filter,
//! evaluates each test's rule file under the run discriminants and
//! partitions the result into path-sorted live and dead lists. Each
//! surviving descriptor gets a strictly increasing, run-scoped index from a
//! sequence owned by the catalog.

use std::path::{Path, PathBuf};

use regex::Regex;

use crate::config::RunConfig;
use crate::discriminants::Discriminants;
use crate::errors::{SuiteError, SuiteResult};
use crate::qualif::{QLANGUAGES, QROOTDIR, QualifLevel};
use crate::rules::{RuleFile, RuleVerdict};
use crate::scheduler::DEFAULT_TIMEOUT;

/// Directories searched for test descriptors, relative to the run root.
pub const DISCOVERY_ROOTS: [&str; 2] = [QROOTDIR, "tests"];

/// Filename of a test descriptor.
pub const DESCRIPTOR: &str = "test.py";

/// Per-test options resolved from the rule file, fixed before scheduling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOptions {
    /// Excluded from this run by the rule file's dead predicate.
    pub dead: bool,
    /// Effective timeout in seconds handed to the test program.
    pub timeout: u64,
    /// Expected-output filename the test program should compare against.
    pub expected_out: String,
    /// Expected-failure comment; presence flips failure classification.
    pub xfail: Option<String>,
    /// Free-form failure comment, shown on actual failures.
    pub failed: Option<String>,
}

impl ResolvedOptions {
    fn from_verdict(verdict: RuleVerdict) -> ResolvedOptions {
        ResolvedOptions {
            dead: verdict.dead,
            timeout: verdict.limit.unwrap_or(DEFAULT_TIMEOUT),
            expected_out: verdict.out.unwrap_or_else(|| "test.out".to_string()),
            xfail: verdict.xfail,
            failed: verdict.failed,
        }
    }
}

/// One discovered test: its descriptor path (normalized to forward
/// slashes, relative to the run root), its run-scoped index and its
/// resolved options.
#[derive(Debug, Clone)]
pub struct TestCase {
    pub path: String,
    pub index: usize,
    pub options: ResolvedOptions,
}

impl TestCase {
    /// Directory holding the descriptor, still forward-slash relative.
    pub fn dir(&self) -> &str {
        self.path
            .rsplit_once('/')
            .map(|(dir, _)| dir)
            .unwrap_or("")
    }

    /// Unique representative name, used as the report key: descriptor path
    /// with the `test.py` leaf dropped and slashes turned into dashes.
    pub fn rname(&self) -> String {
        let name = self.path.strip_suffix(DESCRIPTOR).unwrap_or(&self.path);
        let name = name.strip_prefix("./").unwrap_or(name);
        name.trim_matches('/').replace('/', "-")
    }

    /// Where the test program must leave its report.
    pub fn report_file(&self, root: &Path) -> PathBuf {
        root.join(format!("{}.out", self.path))
    }

    /// Where the test program logs the commands it runs.
    pub fn log_file(&self, root: &Path) -> PathBuf {
        root.join(format!("{}.log", self.path))
    }

    /// Where the test's diagnostic output (driver-captured stdout/stderr)
    /// goes.
    pub fn diff_file(&self, root: &Path) -> PathBuf {
        root.join(format!("{}.err", self.path))
    }

    /// Where the test may leave its qualification payload record.
    pub fn qdata_file(&self, root: &Path) -> PathBuf {
        root.join(self.dir()).join("qdata.json")
    }

    /// Qualification levels whose subtree this test belongs to. Possibly
    /// several, since stricter levels subsume weaker-level directories.
    pub fn qualif_levels(&self) -> Vec<QualifLevel> {
        QualifLevel::ALL
            .into_iter()
            .filter(|level| level.subtree().is_match(self.dir()))
            .collect()
    }

    /// The language-specific qualification subtree this test pertains to.
    pub fn lang(&self) -> Option<&'static str> {
        QLANGUAGES
            .into_iter()
            .find(|lang| self.path.contains(&format!("{QROOTDIR}/{lang}/")))
    }
}

/// The partitioned test catalog: disjoint, path-sorted live and dead
/// lists covering every selected descriptor.
#[derive(Debug, Default)]
pub struct TestCatalog {
    pub live: Vec<TestCase>,
    pub dead: Vec<TestCase>,
}

impl TestCatalog {
    /// Discover, filter and partition the tests for this run.
    pub fn discover(config: &RunConfig, discs: &Discriminants) -> SuiteResult<TestCatalog> {
        let mut candidates = Vec::new();
        for root in DISCOVERY_ROOTS {
            find_descriptors(&config.root_dir.join(root), root, &mut candidates)?;
        }
        candidates.sort();

        // Qualification-subtree filter, active only in qualification mode.
        if let Some(level) = config.qualif_level {
            candidates.retain(|path| level.subtree().is_match(path));
        }

        // Free-text path filter from the command line.
        if let Some(filter) = &config.filter {
            let re = Regex::new(filter)
                .map_err(|e| SuiteError::Config(format!("invalid test filter: {e}")))?;
            candidates.retain(|path| re.is_match(path));
        }

        let mut catalog = TestCatalog::default();
        for (index, path) in candidates.into_iter().enumerate() {
            let case = TestCase {
                index,
                options: ResolvedOptions::from_verdict(
                    resolve_rules(config, &path)?.evaluate(discs),
                ),
                path,
            };
            if case.options.dead {
                catalog.dead.push(case);
            } else {
                catalog.live.push(case);
            }
        }

        Ok(catalog)
    }

    pub fn total(&self) -> usize {
        self.live.len() + self.dead.len()
    }
}

fn resolve_rules(config: &RunConfig, path: &str) -> SuiteResult<RuleFile> {
    let dir = match path.rsplit_once('/') {
        Some((dir, _)) => config.root_dir.join(dir),
        None => config.root_dir.clone(),
    };
    RuleFile::load(&dir)
}

/// Recursively collect descriptor paths under DIR, following symlinks.
/// PREFIX is the forward-slash relative path of DIR from the run root.
fn find_descriptors(dir: &Path, prefix: &str, out: &mut Vec<String>) -> SuiteResult<()> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        // A missing discovery root just contributes no tests.
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let child = format!("{prefix}/{name}");

        // is_dir/is_file follow symlinks, which is what we want here.
        if path.is_dir() {
            if !name.starts_with('.') {
                find_descriptors(&path, &child, out)?;
            }
        } else if name == DESCRIPTOR && path.is_file() {
            out.push(child);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "").unwrap();
    }

    fn tree(paths: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for p in paths {
            touch(&dir.path().join(p));
        }
        dir
    }

    fn config_at(root: &Path) -> RunConfig {
        RunConfig {
            root_dir: root.to_path_buf(),
            rts: "native".to_string(),
            ..RunConfig::default()
        }
    }

    fn all_tags() -> Discriminants {
        Discriminants::from_tags(["ALL"])
    }

    #[test]
    fn discovery_is_sorted_with_increasing_indices() {
        let dir = tree(&[
            "tests/zz/test.py",
            "tests/aa/test.py",
            "Qualif/Common/X/test.py",
        ]);
        let catalog = TestCatalog::discover(&config_at(dir.path()), &all_tags()).unwrap();

        let paths: Vec<&str> = catalog.live.iter().map(|t| t.path.as_str()).collect();
        assert_eq!(
            paths,
            ["Qualif/Common/X/test.py", "tests/aa/test.py", "tests/zz/test.py"]
        );
        let indices: Vec<usize> = catalog.live.iter().map(|t| t.index).collect();
        assert_eq!(indices, [0, 1, 2]);
        assert!(catalog.dead.is_empty());
    }

    #[test]
    fn files_not_named_like_descriptors_are_ignored() {
        let dir = tree(&["tests/aa/test.py", "tests/aa/helper.py", "tests/notes.txt"]);
        let catalog = TestCatalog::discover(&config_at(dir.path()), &all_tags()).unwrap();
        assert_eq!(catalog.total(), 1);
    }

    #[test]
    fn qualif_mode_restricts_to_level_subtree() {
        let dir = tree(&[
            "Qualif/Ada/stmt/A/test.py",
            "Qualif/Ada/mcdc/B/test.py",
            "Qualif/Common/C/test.py",
            "tests/other/test.py",
        ]);
        let mut config = config_at(dir.path());
        config.qualif_level = Some(QualifLevel::DoC);

        let catalog = TestCatalog::discover(&config, &all_tags()).unwrap();
        let paths: Vec<&str> = catalog.live.iter().map(|t| t.path.as_str()).collect();
        assert_eq!(paths, ["Qualif/Ada/stmt/A/test.py", "Qualif/Common/C/test.py"]);
    }

    #[test]
    fn free_text_filter_narrows_selection() {
        let dir = tree(&["tests/foo/test.py", "tests/bar/test.py"]);
        let mut config = config_at(dir.path());
        config.filter = Some("foo".to_string());

        let catalog = TestCatalog::discover(&config, &all_tags()).unwrap();
        assert_eq!(catalog.total(), 1);
        assert_eq!(catalog.live[0].path, "tests/foo/test.py");
    }

    #[test]
    fn invalid_filter_is_a_config_error() {
        let dir = tree(&["tests/foo/test.py"]);
        let mut config = config_at(dir.path());
        config.filter = Some("(".to_string());
        assert!(matches!(
            TestCatalog::discover(&config, &all_tags()),
            Err(SuiteError::Config(_))
        ));
    }

    #[test]
    fn rule_file_partitions_dead_tests() {
        let dir = tree(&["tests/a/test.py", "tests/b/test.py"]);
        std::fs::write(dir.path().join("tests/a/test.opt"), "RTS_ZFP DEAD\n").unwrap();

        let discs = Discriminants::from_tags(["ALL", "RTS_ZFP"]);
        let catalog = TestCatalog::discover(&config_at(dir.path()), &discs).unwrap();

        assert_eq!(catalog.dead.len(), 1);
        assert_eq!(catalog.dead[0].path, "tests/a/test.py");
        assert_eq!(catalog.live.len(), 1);
        assert_eq!(catalog.live[0].path, "tests/b/test.py");
        assert_eq!(catalog.total(), 2);
    }

    #[test]
    fn rule_file_overrides_are_resolved() {
        let dir = tree(&["tests/a/test.py"]);
        std::fs::write(
            dir.path().join("tests/a/test.opt"),
            "ALL LIMIT 42\nALL XFAIL known\nALL OUT alt.out\n",
        )
        .unwrap();

        let catalog = TestCatalog::discover(&config_at(dir.path()), &all_tags()).unwrap();
        let opts = &catalog.live[0].options;
        assert_eq!(opts.timeout, 42);
        assert_eq!(opts.xfail.as_deref(), Some("known"));
        assert_eq!(opts.expected_out, "alt.out");
    }

    #[test]
    fn default_options_without_rule_file() {
        let dir = tree(&["tests/a/test.py"]);
        let catalog = TestCatalog::discover(&config_at(dir.path()), &all_tags()).unwrap();
        let opts = &catalog.live[0].options;
        assert!(!opts.dead);
        assert_eq!(opts.timeout, DEFAULT_TIMEOUT);
        assert_eq!(opts.expected_out, "test.out");
        assert!(opts.xfail.is_none() && opts.failed.is_none());
    }

    #[test]
    fn rname_normalization() {
        let case = TestCase {
            path: "Qualif/Ada/stmt/Core/test.py".to_string(),
            index: 0,
            options: ResolvedOptions::from_verdict(RuleVerdict::default()),
        };
        assert_eq!(case.rname(), "Qualif-Ada-stmt-Core");
    }

    #[test]
    fn language_and_level_inference() {
        let case = TestCase {
            path: "Qualif/Ada/decision/X/test.py".to_string(),
            index: 0,
            options: ResolvedOptions::from_verdict(RuleVerdict::default()),
        };
        assert_eq!(case.lang(), Some("Ada"));
        assert_eq!(case.qualif_levels(), vec![QualifLevel::DoA, QualifLevel::DoB]);

        let outside = TestCase {
            path: "tests/other/test.py".to_string(),
            index: 1,
            options: ResolvedOptions::from_verdict(RuleVerdict::default()),
        };
        assert_eq!(outside.lang(), None);
        assert!(outside.qualif_levels().is_empty());
    }

    #[test]
    fn per_test_file_layout() {
        let case = TestCase {
            path: "tests/a/test.py".to_string(),
            index: 0,
            options: ResolvedOptions::from_verdict(RuleVerdict::default()),
        };
        let root = Path::new("/run");
        assert_eq!(case.report_file(root), Path::new("/run/tests/a/test.py.out"));
        assert_eq!(case.log_file(root), Path::new("/run/tests/a/test.py.log"));
        assert_eq!(case.diff_file(root), Path::new("/run/tests/a/test.py.err"));
        assert_eq!(case.qdata_file(root), Path::new("/run/tests/a/qdata.json"));
    }
}
