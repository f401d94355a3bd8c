//! Run-level configuration.
//!
//! `RunConfig` is the validated, immutable bag of run-level facts the rest
//! of the driver reads from: target platform, runtime-support selector,
//! qualification mode, compiler-flag overrides, pool size and the various
//! identifiers propagated verbatim to each test program.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::errors::{SuiteError, SuiteResult};
use crate::qualif::QualifLevel;

/// Subdirectory of the run root where the driver keeps its own outputs
/// (results ledger, discriminant dump, diagnostic copies, ...).
pub const LOG_DIRNAME: &str = "output";

/// Validated run-level inputs, fixed once at startup.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Directory holding the test roots; the run log directory is created
    /// underneath it.
    pub root_dir: PathBuf,
    /// Target platform identifier passed to every test program.
    pub target: String,
    /// Runtime-support library selector (mandatory, drives the RTS
    /// discriminants and is propagated to each test).
    pub rts: String,
    /// Qualification level, when running in qualification mode.
    pub qualif_level: Option<QualifLevel>,
    /// Language-agnostic compiler flags for qualification tests.
    pub cargs: String,
    /// Per-language compiler flags, keyed by language subtree name.
    pub cargs_lang: BTreeMap<String, String>,
    /// Specific target board to exercise.
    pub board: Option<String>,
    /// Kernel to propagate to test programs, absolutized before use.
    pub kernel: Option<PathBuf>,
    /// Toolchain installation prefix; used for the version discriminant and
    /// sanity-checked at startup.
    pub toolchain: Option<PathBuf>,
    /// Use project-file mode rather than explicit coverage obligations.
    pub gprmode: bool,
    /// Number of tests allowed to run concurrently.
    pub jobs: usize,
    /// Display test failures only.
    pub quiet: bool,
    /// Dump diagnostic output on unexpected failures.
    pub show_diffs: bool,
    /// Only run tests whose descriptor path matches this pattern.
    pub filter: Option<String>,
    /// Interpreter used to execute each test descriptor.
    pub interpreter: String,
    /// When set, recreated empty at startup and each test gets a numbered
    /// subdirectory for its execution traces.
    pub trace_dir: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("."),
            target: String::new(),
            rts: String::new(),
            qualif_level: None,
            cargs: String::new(),
            cargs_lang: BTreeMap::new(),
            board: None,
            kernel: None,
            toolchain: None,
            gprmode: false,
            jobs: 1,
            quiet: false,
            show_diffs: false,
            filter: None,
            interpreter: "python3".to_string(),
            trace_dir: None,
        }
    }
}

impl RunConfig {
    /// Check the mandatory inputs. Called once, before anything runs.
    pub fn validate(&self) -> SuiteResult<()> {
        if self.rts.is_empty() {
            return Err(SuiteError::Config(
                "RTS argument missing, mandatory for BSP selection".to_string(),
            ));
        }
        if self.jobs == 0 {
            return Err(SuiteError::Config("jobs must be at least 1".to_string()));
        }
        if let Some(toolchain) = &self.toolchain {
            let bindir = toolchain.join("bin");
            if !bindir.is_dir() {
                return Err(SuiteError::Config(format!(
                    "provided toolchain dir \"{}\" has no bin directory",
                    toolchain.display()
                )));
            }
        }
        Ok(())
    }

    /// The run log directory, under the run root.
    pub fn log_dir(&self) -> PathBuf {
        self.root_dir.join(LOG_DIRNAME)
    }

    /// Every compiler flag supplied through the cargs family of options,
    /// language agnostic ones first, then per-language in key order.
    pub fn all_cargs(&self) -> Vec<&str> {
        self.cargs
            .split_whitespace()
            .chain(self.cargs_lang.values().flat_map(|v| v.split_whitespace()))
            .collect()
    }

    /// Compiler flags to pass to one test: the language-agnostic part plus
    /// the part for LANG when provided. Empty when nothing was configured.
    pub fn cargs_for(&self, lang: Option<&str>) -> String {
        let mut parts: Vec<&str> = Vec::new();
        if !self.cargs.is_empty() {
            parts.push(&self.cargs);
        }
        if let Some(extra) = lang.and_then(|l| self.cargs_lang.get(l)) {
            if !extra.is_empty() {
                parts.push(extra);
            }
        }
        parts.join(" ")
    }

    /// Kernel path absolutized against the current directory, for
    /// straightforward visibility from the test programs downtree.
    pub fn kernel_abspath(&self) -> Option<PathBuf> {
        self.kernel
            .as_ref()
            .map(|k| std::path::absolute(k).unwrap_or_else(|_| k.clone()))
    }
}
