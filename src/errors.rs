//! Error taxonomy for the testsuite driver.
//!
//! Only two conditions are fatal to a whole run: a configuration error
//! (caught before any test executes) and the consecutive-failure breaker.
//! Per-test failures, logical or infrastructural, are classified and
//! recorded, never propagated as errors.

use thiserror::Error;

/// Errors that abort the run or surface I/O trouble on the driver's own
/// bookkeeping paths.
#[derive(Debug, Error)]
pub enum SuiteError {
    /// Missing or invalid mandatory run-level input. Fails the run before
    /// any test executes.
    #[error("configuration error: {0}")]
    Config(String),

    /// The consecutive-failure circuit breaker tripped. Results collected
    /// so far remain valid and are still reported.
    #[error("stopped after {0} consecutive failures")]
    ConsecutiveFailures(u32),

    /// Driver-side bookkeeping I/O failed (ledger, run directory, ...).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A scheduler task ended abnormally (panicked or was cancelled).
    #[error("scheduler task failed: {0}")]
    Scheduler(String),
}

/// Result alias used throughout the library.
pub type SuiteResult<T> = Result<T, SuiteError>;
