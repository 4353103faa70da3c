//! Fan-out/gather over one batch.
//!
//! The orchestrator converts descriptors into operations, registers them
//! all with a fresh scheduler before the loop runs any of them, and folds
//! the completion-order events back into position-aligned results. It
//! owns the batch for its whole lifecycle; nothing is shared across
//! batches.

use std::time::{Duration, Instant};

use reqwest::Client;

use crate::io;
use crate::operation::Operation;
use crate::scheduler::{CompletionEvent, Scheduler};
use crate::types::{
    BatchError, BatchFailure, BatchOutput, BatchReport, HarnessConfig, OpOutcome, OpOutput,
    OpSpec, OpTiming,
};

pub(crate) struct BatchOrchestrator<'a> {
    config: &'a HarnessConfig,
}

impl<'a> BatchOrchestrator<'a> {
    pub(crate) fn new(config: &'a HarnessConfig) -> Self {
        BatchOrchestrator { config }
    }

    /// Run one batch to completion.
    ///
    /// Every descriptor is registered before the scheduler loop starts,
    /// so no operation is deferred behind another's I/O wait. An empty
    /// batch returns immediately; the scheduler is never constructed.
    pub(crate) fn run(&self, specs: Vec<OpSpec>) -> Result<BatchOutput, BatchError> {
        let total = specs.len();
        if total == 0 {
            return Ok(BatchOutput {
                outputs: Vec::new(),
                report: BatchReport::empty(),
            });
        }

        tracing::debug!(operations = total, "submitting batch");

        let mut scheduler = Scheduler::new(self.config.slow_poll_warn())?;
        let max_bytes = self.config.max_response_bytes();
        // One HTTP client per batch, built on the first fetch descriptor
        // and shared by the rest.
        let mut client: Option<Client> = None;

        let submitted = Instant::now();
        for (index, spec) in specs.into_iter().enumerate() {
            let operation = match spec {
                OpSpec::Fetch { url } => {
                    let shared = match &client {
                        Some(existing) => existing.clone(),
                        None => {
                            let built = io::client(self.config)?;
                            client = Some(built.clone());
                            built
                        }
                    };
                    Operation::fetch(index, url, shared, max_bytes)
                }
                OpSpec::ReadFile { path } => Operation::read_file(index, path),
                OpSpec::Wait { duration, message } => Operation::wait(index, duration, message),
                OpSpec::BlockingSleep { duration } => Operation::blocking_sleep(index, duration),
            };
            scheduler.register(operation);
        }

        let events = scheduler.run_until_complete();
        let elapsed = submitted.elapsed();
        gather(total, submitted, elapsed, events)
    }
}

/// Fold completion-order events into position-indexed buffers.
///
/// Each slot is written exactly once by its operation's completion
/// event, so no sorting step is needed to restore submission order.
fn gather(
    total: usize,
    submitted: Instant,
    elapsed: Duration,
    events: Vec<CompletionEvent>,
) -> Result<BatchOutput, BatchError> {
    let mut outcomes: Vec<Option<OpOutcome>> = (0..total).map(|_| None).collect();
    let mut timings: Vec<Option<OpTiming>> = (0..total).map(|_| None).collect();
    let mut first_failed: Option<usize> = None;

    for event in events {
        if event.outcome.is_err() && first_failed.is_none() {
            first_failed = Some(event.index);
        }

        debug_assert!(
            outcomes[event.index].is_none(),
            "slot {} written twice",
            event.index
        );
        timings[event.index] = Some(OpTiming {
            kind: event.kind,
            started: event.first_polled.saturating_duration_since(submitted),
            finished: event.finished.saturating_duration_since(submitted),
            held: event.held,
            polls: event.polls,
        });
        outcomes[event.index] = Some(event.outcome);
    }

    let timings: Vec<OpTiming> = timings.into_iter().flatten().collect();
    let outcomes: Vec<OpOutcome> = outcomes.into_iter().flatten().collect();
    debug_assert_eq!(outcomes.len(), total, "every operation completes exactly once");

    let report = BatchReport { elapsed, timings };

    match first_failed {
        None => {
            tracing::debug!(?elapsed, "batch complete");
            let outputs: Vec<OpOutput> = outcomes.into_iter().filter_map(Result::ok).collect();
            debug_assert_eq!(outputs.len(), total);
            Ok(BatchOutput { outputs, report })
        }
        Some(position) => {
            let failure = BatchFailure {
                first_failed: position,
                outcomes,
                report,
            };
            tracing::warn!(
                first_failed = position,
                failed = failure.failed_positions().len(),
                "batch completed with failures"
            );
            Err(BatchError::Failed(failure))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> HarnessConfig {
        HarnessConfig::default()
    }

    #[test]
    fn test_empty_batch_returns_without_a_scheduler() {
        let config = config();
        let output = BatchOrchestrator::new(&config)
            .run(Vec::new())
            .expect("empty batch");
        assert!(output.outputs.is_empty());
        assert!(output.report.timings.is_empty());
        assert_eq!(output.report.elapsed, Duration::ZERO);
    }

    #[test]
    fn test_results_keep_submission_order_under_latency_inversion() {
        let config = config();
        let specs = vec![
            OpSpec::wait(Duration::from_millis(60), "first"),
            OpSpec::wait(Duration::from_millis(30), "second"),
            OpSpec::wait(Duration::from_millis(5), "third"),
        ];

        let output = BatchOrchestrator::new(&config).run(specs).expect("batch");

        let messages: Vec<&str> = output
            .outputs
            .iter()
            .filter_map(OpOutput::as_message)
            .collect();
        assert_eq!(messages, vec!["first", "second", "third"]);

        // The slowest wait finished last but still sits at position 0.
        assert!(output.report.timings[0].finished >= output.report.timings[2].finished);
    }

    #[test]
    fn test_duplicate_descriptors_stay_independent() {
        let config = config();
        let spec = OpSpec::wait(Duration::from_millis(10), "twin");
        let output = BatchOrchestrator::new(&config)
            .run(vec![spec.clone(), spec])
            .expect("batch");

        assert_eq!(output.outputs.len(), 2);
        assert_eq!(output.outputs[0], output.outputs[1]);
        assert_eq!(output.report.timings.len(), 2);
    }
}
