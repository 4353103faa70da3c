//! Cooperative batch orchestration for I/O-bound operations.
//!
//! This crate runs a batch of independent I/O-bound operations under a
//! cooperative, single-threaded scheduling model: every operation
//! suspends only at its I/O-wait boundary, the scheduler overlaps those
//! waits, and the caller gets all results back in submission order. The
//! speedup comes purely from overlapping wait time; no operation code
//! ever runs in parallel with another.
//!
//! # Pipeline
//!
//! One batch moves through these stages:
//!
//! 1. **Fan-out** - Each descriptor becomes an operation tagged with its
//!    position; all of them are registered before any I/O starts
//! 2. **Scheduling** - A current-thread runtime resumes whichever
//!    operation becomes ready, switching only at suspension points
//! 3. **Gather** - Completion events write into a position-indexed
//!    buffer, one slot each, restoring submission order without sorting
//! 4. **Aggregation** - A clean result set, or a failure carrying every
//!    position's outcome
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `types` | Descriptors, outcomes, reports, configuration, errors |
//! | `scheduler` | Cooperative event loop with per-poll state tracking |
//! | `orchestrator` | Fan-out/gather and failure aggregation |
//! | `io` | External collaborators: HTTP client, file reader, timer |
//!
//! # Usage
//!
//! ```ignore
//! use std::time::Duration;
//! use iogather::{submit_batch, HarnessConfig, OpSpec};
//!
//! let specs = vec![
//!     OpSpec::fetch("https://example.com".parse()?),
//!     OpSpec::read_file("notes.txt"),
//!     OpSpec::wait(Duration::from_millis(100), "timer done"),
//! ];
//! let output = submit_batch(specs, &HarnessConfig::default())?;
//!
//! for (position, timing) in output.report.timings.iter().enumerate() {
//!     println!("[{position}] {} finished at {:?}", timing.kind, timing.finished);
//! }
//! ```
//!
//! # The blocking hazard
//!
//! [`OpSpec::BlockingSleep`] is an intentional anti-pattern: it sleeps
//! synchronously inside its poll, so the scheduler cannot switch away and
//! every suspended operation in the batch makes zero progress for the
//! full duration. The harness keeps this reproducible on purpose - the
//! stall shows up in [`BatchReport::longest_hold`] and as a `tracing`
//! warning instead of being optimized away.

mod io;
mod operation;
mod orchestrator;
mod scheduler;
mod types;

use orchestrator::BatchOrchestrator;

pub use types::{
    BatchError, BatchFailure, BatchOutput, BatchReport, CollaboratorError, HarnessConfig,
    OpKind, OpOutcome, OpOutput, OpSpec, OpState, OpTiming,
};

/// Submit one batch of operations and block until every position reaches
/// a terminal state.
///
/// Results come back aligned with the submitted descriptors regardless of
/// completion order. An empty batch returns an empty output immediately.
/// If any operation fails, the whole batch reports
/// [`BatchError::Failed`], which still carries every position's outcome -
/// partial completions are never dropped.
///
/// The harness drives its own single-threaded runtime, so this call
/// blocks the current thread. From async code, wrap it in
/// `tokio::task::spawn_blocking`.
///
/// # Errors
///
/// Returns [`BatchError`] when:
/// - The scheduler runtime or the shared HTTP client cannot be built
/// - At least one operation ends in a [`CollaboratorError`]
pub fn submit_batch(
    specs: Vec<OpSpec>,
    config: &HarnessConfig,
) -> Result<BatchOutput, BatchError> {
    BatchOrchestrator::new(config).run(specs)
}
