//! Run orchestration.
//!
//! `TestSuite::prepare` fixes everything that must hold for the whole run:
//! validated configuration, the run log directory, the discriminant set
//! (dumped for later inspection), the discovered and partitioned catalog,
//! and the dead-test ledger entries. `TestSuite::run` then drains the live
//! list through the scheduler and finalizes the registry snapshot, also on
//! a breaker abort.

use std::sync::Arc;

use tracing::{info, warn};

use crate::catalog::TestCatalog;
use crate::collector::ResultCollector;
use crate::config::RunConfig;
use crate::discriminants::Discriminants;
use crate::errors::{SuiteError, SuiteResult};
use crate::ledger::ResultLedger;
use crate::scheduler;

/// Filename of the registry snapshot handed to the report generator.
pub const REGISTRY_SNAPSHOT: &str = "qualification.json";

/// What a finished (or aborted) run looked like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Descriptors selected after filtering.
    pub total: usize,
    /// Excluded by rule files, recorded as DEAD.
    pub dead: usize,
    /// Submitted to the scheduler.
    pub live: usize,
    /// The consecutive-failure breaker stopped the run.
    pub aborted: bool,
}

/// A prepared testsuite run.
pub struct TestSuite {
    config: Arc<RunConfig>,
    catalog: TestCatalog,
    collector: ResultCollector,
}

impl TestSuite {
    /// Prepare the run: validate options, set up the log and trace
    /// directories, compute and dump discriminants, discover and partition
    /// the catalog, and record all dead tests upfront.
    pub fn prepare(config: RunConfig) -> SuiteResult<TestSuite> {
        config.validate()?;
        let config = Arc::new(config);

        let log_dir = config.log_dir();
        std::fs::create_dir_all(&log_dir)?;

        // Trace directories start empty so stale traces never leak into
        // this run's collection.
        if let Some(trace_dir) = &config.trace_dir {
            match std::fs::remove_dir_all(trace_dir) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            std::fs::create_dir_all(trace_dir)?;
        }

        let discs = Discriminants::resolve(&config);

        // Dump the discriminants, so a later review can determine which
        // tags were set during this particular run.
        std::fs::write(log_dir.join("discs"), format!("{}\n", discs.join()))?;

        // And a run header with the command-line switches, usable as a
        // report header to see how the results were obtained.
        std::fs::write(
            log_dir.join("comment"),
            format!("Options: {}\n", quoted_argv().join(" ")),
        )?;

        if let Some(filter) = &config.filter {
            if !config.quiet {
                info!("Running tests matching '{filter}'");
            }
        }

        let catalog = TestCatalog::discover(&config, &discs)?;

        let ledger = ResultLedger::create(&log_dir.join("results"))?;
        let mut collector = ResultCollector::new(Arc::clone(&config), ledger);

        // Dead tests are never scheduled; their ledger lines go in before
        // anything runs.
        for case in &catalog.dead {
            collector.record_dead(case)?;
        }

        // An empty live list is almost certainly a selection mistake, warn
        // always. Otherwise advertise the count even in quiet mode, as a
        // minimum feedback to match what runs against the intent.
        if catalog.live.is_empty() {
            warn!("List of live tests to run is empty. Selection mistake ?");
        } else {
            info!(
                "{} live tests to run{} ...",
                catalog.live.len(),
                if config.quiet {
                    ", displaying failures only"
                } else {
                    ""
                }
            );
        }

        Ok(TestSuite {
            config,
            catalog,
            collector,
        })
    }

    /// Run all live tests and aggregate the outcomes. Keeps going to the
    /// final aggregation step on a breaker abort: results gathered so far
    /// remain intact and are still reported.
    pub async fn run(mut self) -> SuiteResult<RunSummary> {
        let total = self.catalog.total();
        let dead = self.catalog.dead.len();
        let live = std::mem::take(&mut self.catalog.live);
        let live_count = live.len();

        let outcome = scheduler::run_live(Arc::clone(&self.config), live, &mut self.collector).await;

        let aborted = match outcome {
            Ok(()) => false,
            Err(e @ SuiteError::ConsecutiveFailures(_)) => {
                info!("Mainloop stopped: {e}");
                true
            }
            Err(e) => return Err(e),
        };

        // The external report generator consumes the registry snapshot;
        // hand it off intact even after an abort.
        let registry = self.collector.into_registry();
        registry.write_snapshot(&self.config.log_dir().join(REGISTRY_SNAPSHOT))?;

        Ok(RunSummary {
            total,
            dead,
            live: live_count,
            aborted,
        })
    }
}

/// The command line that invoked us, minus the program name, with
/// space-carrying arguments quoted so the line can be copy/pasted into a
/// shell with the desired effect.
fn quoted_argv() -> Vec<String> {
    std::env::args().skip(1).map(quote_arg).collect()
}

fn quote_arg(arg: String) -> String {
    if !arg.contains(' ') {
        return arg;
    }
    match arg.split_once('=') {
        Some((key, value)) => format!("{key}='{value}'"),
        None => format!("'{arg}'"),
    }
}
