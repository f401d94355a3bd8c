#![forbid(unsafe_code)]
//! Qualification Testsuite Driver
//!
//! qualsuite selects, executes and classifies a large tree of independent
//! test programs for a tool-qualification campaign: discriminant-driven
//! dead/live partitioning of the test catalog, bounded-concurrency execution
//! of live tests as isolated subprocesses, outcome classification against
//! expectation metadata, a consecutive-failure circuit breaker, and
//! aggregation of results for the external report generator.
//!
//! ## Panic Policy
//!
//! This codebase follows explicit error handling:
//!
//! - **Production code**: Use `Result` or `Option` with `?` / `ok_or` / `map_err`. The `cli` module
//!   enforces `#![deny(clippy::unwrap_used)]`.
//!
//! - **Test code**: `.unwrap()` and `.expect()` are acceptable in tests.
//!
//! - **True invariants**: If a panic represents a driver bug (logic error), use
//!   `.expect("INVARIANT: reason")` with a clear explanation.

pub mod catalog;
pub mod cli;
pub mod collector;
pub mod config;
pub mod discriminants;
pub mod errors;
pub mod ledger;
pub mod qualif;
pub mod registry;
pub mod rules;
pub mod scheduler;
pub mod suite;

pub use catalog::{TestCase, TestCatalog};
pub use collector::{MAX_CONSECUTIVE_FAILURES, ResultCollector};
pub use config::RunConfig;
pub use discriminants::Discriminants;
pub use errors::SuiteError;
pub use ledger::{ResultLedger, TestStatus};
pub use qualif::QualifLevel;
pub use registry::QualificationRegistry;
pub use rules::{RuleFile, RuleVerdict};
pub use scheduler::DEFAULT_TIMEOUT;
pub use suite::{RunSummary, TestSuite};
