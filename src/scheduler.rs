//! Bounded-concurrency test execution.
//!
//! A single coordinator drives a pool of at most J concurrently running,
//! OS-isolated subprocesses, one per live test. Submission order is the
//! sorted live-list order; completion order is unconstrained. Every
//! completion is funneled through an mpsc channel into the single-consumer
//! collection loop, so the ledger, the registry and the failure counter
//! are only ever touched from one place.
//!
//! A pool slot is freed only after its completion has been collected,
//! which keeps admission accounting exact: once the circuit breaker trips,
//! no further test is spawned, while tests already in flight are drained
//! and still recorded.

use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, warn};

use crate::catalog::TestCase;
use crate::collector::{MAX_CONSECUTIVE_FAILURES, ResultCollector};
use crate::config::RunConfig;
use crate::errors::{SuiteError, SuiteResult};

/// Default per-test timeout, seconds. Also the grace added on top of the
/// test's own timeout for the parent-level backstop, so the child's
/// internal timeout fires first and produces a clean diagnostic.
pub const DEFAULT_TIMEOUT: u64 = 600;

/// One finished live test, ready for collection.
#[derive(Debug)]
pub struct TestCompletion {
    pub case: TestCase,
    pub duration: Duration,
}

/// Run the live list with a pool of `config.jobs` slots, feeding every
/// completion to COLLECTOR. Returns the breaker error if the run was
/// aborted; in-flight tests are drained and recorded first.
pub async fn run_live(
    config: Arc<RunConfig>,
    live: Vec<TestCase>,
    collector: &mut ResultCollector,
) -> SuiteResult<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let pool = Arc::new(Semaphore::new(config.jobs));
    let stop = Arc::new(AtomicBool::new(false));

    let admitter = {
        let config = Arc::clone(&config);
        let pool = Arc::clone(&pool);
        let stop = Arc::clone(&stop);
        tokio::spawn(async move {
            for case in live {
                let Ok(permit) = Arc::clone(&pool).acquire_owned().await else {
                    break;
                };
                if stop.load(Ordering::Acquire) {
                    break;
                }
                let tx = tx.clone();
                let config = Arc::clone(&config);
                tokio::spawn(async move {
                    let completion = execute_one(&config, case).await;
                    // The permit travels with the completion: the slot is
                    // freed only once the result has been accounted for.
                    let _ = tx.send((completion, permit));
                });
            }
        })
    };

    while let Some((completion, permit)) = rx.recv().await {
        collector.collect(&completion)?;
        if collector.breaker_tripped() {
            stop.store(true, Ordering::Release);
        }
        drop(permit);
    }

    admitter
        .await
        .map_err(|e| SuiteError::Scheduler(e.to_string()))?;

    if collector.breaker_tripped() {
        return Err(SuiteError::ConsecutiveFailures(MAX_CONSECUTIVE_FAILURES));
    }
    Ok(())
}

/// Execute one test as an isolated subprocess.
///
/// Infrastructure trouble (spawn failure, backstop timeout, missing
/// interpreter) is folded into an ordinary completion: the collector will
/// find no success marker and classify accordingly. Only the child's own
/// timeout is expected to fire under normal load; the parent-level timeout
/// is purely a backstop against a hang.
async fn execute_one(config: &RunConfig, case: TestCase) -> TestCompletion {
    debug!("running {}", case.path);
    let started = std::time::Instant::now();

    // Clear execution-related files upfront to prevent accumulation across
    // runs and bogus reuse of old contents if the test dies before
    // initializing them itself.
    let root = &config.root_dir;
    for file in [
        case.report_file(root),
        case.log_file(root),
        case.diff_file(root),
        case.qdata_file(root),
    ] {
        if let Err(e) = std::fs::remove_file(&file) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("cannot clear {}: {e}", file.display());
            }
        }
    }

    if let Err(e) = spawn_and_wait(config, &case).await {
        warn!("{}: execution trouble: {e}", case.path);
    }

    TestCompletion {
        case,
        duration: started.elapsed(),
    }
}

async fn spawn_and_wait(config: &RunConfig, case: &TestCase) -> SuiteResult<()> {
    let root = &config.root_dir;

    if let Some(trace_dir) = &config.trace_dir {
        std::fs::create_dir_all(trace_dir.join(case.index.to_string()))?;
    }

    let diff = std::fs::File::create(case.diff_file(root))?;
    let diff_err = diff.try_clone()?;

    let mut command = tokio::process::Command::new(&config.interpreter);
    command
        .arg(root.join(&case.path))
        .args(child_args(config, case))
        .stdin(Stdio::null())
        .stdout(Stdio::from(diff))
        .stderr(Stdio::from(diff_err))
        .kill_on_drop(true);

    // Place the requested toolchain's bin directory ahead in PATH so the
    // tools the test spawns come from it.
    if let Some(toolchain) = &config.toolchain {
        let mut paths = vec![toolchain.join("bin")];
        paths.extend(std::env::split_paths(
            &std::env::var_os("PATH").unwrap_or_default(),
        ));
        if let Ok(joined) = std::env::join_paths(paths) {
            command.env("PATH", joined);
        }
    }

    let mut child = command.spawn()?;

    let backstop = Duration::from_secs(case.options.timeout.saturating_add(DEFAULT_TIMEOUT));
    match tokio::time::timeout(backstop, child.wait()).await {
        Ok(status) => {
            // The exit code is deliberately ignored: the report file's
            // success marker is the sole success signal.
            status?;
        }
        Err(_) => {
            warn!("{}: backstop timeout, killing", case.path);
            let _ = child.kill().await;
        }
    }
    Ok(())
}

/// The normalized argument surface handed to every test program.
pub fn child_args(config: &RunConfig, case: &TestCase) -> Vec<String> {
    let root = &config.root_dir;
    let mut args = vec![
        format!("--report-file={}", case.report_file(root).display()),
        format!("--log-file={}", case.log_file(root).display()),
        "--target".to_string(),
        config.target.clone(),
        "--timeout".to_string(),
        case.options.timeout.to_string(),
    ];

    if let Some(trace_dir) = &config.trace_dir {
        args.push(format!(
            "--trace-dir={}",
            trace_dir.join(case.index.to_string()).display()
        ));
    }

    let qlevels = case.qualif_levels();

    // In qualification mode, pass the target level to qualification tests
    // and enforce the corresponding coverage level.
    if let Some(level) = config.qualif_level {
        if qlevels.contains(&level) {
            args.push(format!("--qualif-level={}", level.id()));
            args.push(format!("--xcov-level={}", level.coverage_level()));
        }
    }

    // Enforce cargs for tests in the qualification subtree even when not
    // in qualification mode, merging the common part and the part for the
    // test's language.
    if !qlevels.is_empty() {
        let cargs = config.cargs_for(case.lang());
        if !cargs.is_empty() {
            args.push(format!("--cargs={cargs}"));
        }
    }

    if let Some(board) = &config.board {
        args.push(format!("--board={board}"));
    }
    if config.gprmode {
        args.push("--gprmode".to_string());
    }
    if let Some(kernel) = config.kernel_abspath() {
        args.push(format!("--kernel={}", kernel.display()));
    }
    args.push(format!("--RTS={}", config.rts));

    args
}
