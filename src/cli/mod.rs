//! CLI for the qualification testsuite driver.
//!
//! ## Usage
//!
//! - `qualsuite --RTS=<rts> [TEST_PATH]` - run the tests matching TEST_PATH
//! - `--qualif-level doA|doB|doC` - qualification mode for a target level
//! - `-j N` - allow N tests to run at once
//!
//! ## Design
//!
//! The CLI uses clap for argument parsing with derive macros.
//! `execute()` returns `CliResult<T>` instead of calling `process::exit`.
//! Only the top-level `run()` function handles errors and exits.

// Enforce explicit error handling - no panicking in production code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

use std::fmt;
use std::path::PathBuf;
use std::process;

use clap::Parser;

use crate::config::RunConfig;
use crate::qualif::QualifLevel;
use crate::suite::TestSuite;

// ============================================================================
// CLI Error handling
// ============================================================================

/// Exit code for CLI operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(pub i32);

impl ExitCode {
    pub const SUCCESS: ExitCode = ExitCode(0);
    pub const FAILURE: ExitCode = ExitCode(1);
}

/// Error type for CLI operations.
///
/// Contains a user-facing message and an exit code. The CLI entry point
/// catches these errors, prints the message, and exits with the code.
#[derive(Debug)]
pub struct CliError {
    /// User-facing error message (already formatted for display)
    pub message: String,
    /// Exit code to return to the shell
    pub exit_code: ExitCode,
}

impl CliError {
    /// Create a new CLI error with a message and exit code.
    pub fn new(message: impl Into<String>, exit_code: ExitCode) -> Self {
        Self {
            message: message.into(),
            exit_code,
        }
    }

    /// Create a failure error (exit code 1).
    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(message, ExitCode::FAILURE)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// Clap CLI definition
// ============================================================================

/// Qualification testsuite driver
#[derive(Parser, Debug)]
#[command(name = "qualsuite")]
#[command(version = VERSION)]
#[command(about = "Run the qualification testsuite", long_about = None)]
pub struct Cli {
    /// Only run tests whose descriptor path matches this pattern
    #[arg(value_name = "TEST_PATH")]
    pub test_path: Option<String>,

    /// Directory holding the test roots
    #[arg(long = "root-dir", value_name = "DIR", default_value = ".")]
    pub root_dir: PathBuf,

    /// Target platform passed to every test program
    #[arg(long, value_name = "PLATFORM", default_value_t = default_target())]
    pub target: String,

    /// RTS library to use, mandatory for BSP support
    #[arg(long = "RTS", value_name = "RTS")]
    pub rts: Option<String>,

    /// Run in qualification mode for a target level; restricts the test
    /// selection to the tests applicable for that level
    #[arg(long = "qualif-level", value_name = "QUALIF_LEVEL", value_enum)]
    pub qualif_level: Option<QualifLevel>,

    /// Additional compiler flags for the test programs, language agnostic
    #[arg(long = "qualif-cargs", value_name = "ARGS")]
    pub qualif_cargs: Option<String>,

    /// qualif-cargs specific to Ada tests
    #[arg(long = "qualif-cargs-Ada", value_name = "ARGS")]
    pub qualif_cargs_ada: Option<String>,

    /// qualif-cargs specific to C tests
    #[arg(long = "qualif-cargs-C", value_name = "ARGS")]
    pub qualif_cargs_c: Option<String>,

    /// Specific target board to exercise
    #[arg(long, value_name = "BOARD")]
    pub board: Option<String>,

    /// Kernel to pass to the test programs in addition to the executable
    #[arg(long, value_name = "KERNEL")]
    pub kernel: Option<PathBuf>,

    /// Use the toolchain in the provided path
    #[arg(long, value_name = "TOOLCHAIN")]
    pub toolchain: Option<PathBuf>,

    /// Use project-file mode instead of explicit coverage obligations
    #[arg(long)]
    pub gprmode: bool,

    /// Allow N tests to run at once
    #[arg(short = 'j', long = "jobs", value_name = "N", default_value_t = 1)]
    pub jobs: usize,

    /// Quiet mode. Display test failures only
    #[arg(long)]
    pub quiet: bool,

    /// Show diagnostic output of unexpected failures on stdout
    #[arg(long)]
    pub diffs: bool,

    /// Interpreter used to execute each test descriptor
    #[arg(long, value_name = "PROGRAM", default_value = "python3")]
    pub interpreter: String,

    /// Collect execution traces under this directory
    #[arg(long = "trace-dir", value_name = "DIR")]
    pub trace_dir: Option<PathBuf>,
}

fn default_target() -> String {
    format!("{}-{}", std::env::consts::ARCH, std::env::consts::OS)
}

impl Cli {
    /// Lower the parsed arguments into the run configuration. Validation
    /// of mandatory inputs happens in `TestSuite::prepare`.
    pub fn into_config(self) -> RunConfig {
        let mut cargs_lang = std::collections::BTreeMap::new();
        if let Some(ada) = self.qualif_cargs_ada {
            cargs_lang.insert("Ada".to_string(), ada);
        }
        if let Some(c) = self.qualif_cargs_c {
            cargs_lang.insert("C".to_string(), c);
        }

        RunConfig {
            root_dir: self.root_dir,
            target: self.target,
            rts: self.rts.unwrap_or_default(),
            qualif_level: self.qualif_level,
            cargs: self.qualif_cargs.unwrap_or_default(),
            cargs_lang,
            board: self.board,
            kernel: self.kernel,
            toolchain: self.toolchain,
            gprmode: self.gprmode,
            jobs: self.jobs,
            quiet: self.quiet,
            show_diffs: self.diffs,
            filter: self.test_path,
            interpreter: self.interpreter,
            trace_dir: self.trace_dir,
        }
    }
}

// ============================================================================
// CLI entry point
// ============================================================================

/// Main CLI entry point.
///
/// This is the only place where `process::exit` is called. The execution
/// path returns `CliResult` and errors are handled here.
pub fn run() {
    let cli = Cli::parse();

    match execute(cli) {
        Ok(exit_code) => {
            if exit_code.0 != 0 {
                process::exit(exit_code.0);
            }
        }
        Err(e) => {
            if !e.message.is_empty() {
                eprintln!("{}", e.message);
            }
            process::exit(e.exit_code.0);
        }
    }
}

/// Prepare and run the suite, mapping run-level outcomes to exit codes.
fn execute(cli: Cli) -> CliResult<ExitCode> {
    let suite = TestSuite::prepare(cli.into_config()).map_err(|e| CliError::failure(e.to_string()))?;

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::failure(format!("cannot start runtime: {e}")))?;

    let summary = runtime
        .block_on(suite.run())
        .map_err(|e| CliError::failure(e.to_string()))?;

    if summary.aborted {
        // The abort reason was already logged by the collection path.
        return Err(CliError::new("", ExitCode::FAILURE));
    }
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// Tests
// ============================================================================
