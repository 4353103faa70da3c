//! Cooperative single-threaded scheduler.
//!
//! The scheduler owns a dedicated current-thread tokio runtime and drives
//! registered operations through a [`FuturesUnordered`] drain loop. All
//! operation code runs on the one calling thread; control changes hands
//! only when an operation reaches its I/O-wait boundary (its future
//! returns `Pending`) or terminates. Synchronous code inside an operation
//! runs to completion and freezes every other operation for that
//! duration; the scheduler measures those holds and reports them rather
//! than hiding them.
//!
//! Each poll is instrumented by a wrapper future that records the
//! operation's lifecycle transitions, so the state machine is observable
//! and the resume logic is a pure function of (state, poll event).

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;

use crate::operation::Operation;
use crate::types::{BatchError, OpKind, OpOutcome, OpState};

/// What happened during one scheduler poll of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PollEvent {
    /// The scheduler handed the thread to the operation.
    Began,
    /// The operation reached its I/O wait and yielded the thread.
    Suspended,
    /// The operation reached a terminal outcome.
    Finished { failed: bool },
}

impl OpState {
    /// Pure transition function driving the operation lifecycle.
    pub(crate) fn advance(self, event: PollEvent) -> OpState {
        match (self, event) {
            (OpState::Pending | OpState::Suspended, PollEvent::Began) => OpState::Running,
            (OpState::Running, PollEvent::Suspended) => OpState::Suspended,
            (OpState::Running, PollEvent::Finished { failed: false }) => OpState::Completed,
            (OpState::Running, PollEvent::Finished { failed: true }) => OpState::Failed,
            (state, event) => {
                debug_assert!(false, "invalid transition: {state:?} on {event:?}");
                state
            }
        }
    }
}

/// Terminal record for one operation, emitted in completion order.
#[derive(Debug)]
pub(crate) struct CompletionEvent {
    pub(crate) index: usize,
    pub(crate) kind: OpKind,
    pub(crate) outcome: OpOutcome,
    pub(crate) first_polled: Instant,
    pub(crate) finished: Instant,
    pub(crate) held: Duration,
    pub(crate) polls: u32,
}

/// Wrapper future that instruments each poll of an operation.
///
/// Tracks the state machine, counts polls, and accumulates how long the
/// operation held the thread inside `poll`. A hold past `slow_poll_warn`
/// means the operation ran synchronous code at the scheduler's expense
/// and gets logged as such.
struct Tracked {
    index: usize,
    kind: OpKind,
    state: OpState,
    first_polled: Option<Instant>,
    held: Duration,
    polls: u32,
    slow_poll_warn: Duration,
    future: Pin<Box<dyn Future<Output = OpOutcome>>>,
}

impl Future for Tracked {
    type Output = CompletionEvent;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        this.state = this.state.advance(PollEvent::Began);
        let entered = Instant::now();
        this.first_polled.get_or_insert(entered);
        this.polls += 1;

        let polled = this.future.as_mut().poll(cx);

        let hold = entered.elapsed();
        this.held += hold;
        if hold >= this.slow_poll_warn {
            tracing::warn!(
                index = this.index,
                kind = %this.kind,
                held_ms = hold.as_millis() as u64,
                "operation held the scheduler thread without suspending; \
                 concurrent operations made no progress"
            );
        }

        match polled {
            Poll::Pending => {
                this.state = this.state.advance(PollEvent::Suspended);
                Poll::Pending
            }
            Poll::Ready(outcome) => {
                this.state = this.state.advance(PollEvent::Finished {
                    failed: outcome.is_err(),
                });
                Poll::Ready(CompletionEvent {
                    index: this.index,
                    kind: this.kind,
                    outcome,
                    first_polled: this.first_polled.unwrap_or(entered),
                    finished: Instant::now(),
                    held: this.held,
                    polls: this.polls,
                })
            }
        }
    }
}

/// Cooperative event loop over one batch of operations.
pub(crate) struct Scheduler {
    runtime: tokio::runtime::Runtime,
    tasks: FuturesUnordered<Tracked>,
    slow_poll_warn: Duration,
}

impl Scheduler {
    /// Build the scheduler and its single-threaded runtime.
    pub(crate) fn new(slow_poll_warn: Duration) -> Result<Self, BatchError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(BatchError::Scheduler)?;

        Ok(Scheduler {
            runtime,
            tasks: FuturesUnordered::new(),
            slow_poll_warn,
        })
    }

    /// Register an operation in `Pending` state.
    ///
    /// Registration does not start anything: the operation is not polled
    /// until [`Scheduler::run_until_complete`] drives the loop, so a full
    /// batch can be registered before any I/O begins.
    pub(crate) fn register(&mut self, operation: Operation) {
        let Operation {
            index,
            kind,
            future,
        } = operation;

        self.tasks.push(Tracked {
            index,
            kind,
            state: OpState::Pending,
            first_polled: None,
            held: Duration::ZERO,
            polls: 0,
            slow_poll_warn: self.slow_poll_warn,
            future,
        });
    }

    /// Drive every registered operation to a terminal state.
    ///
    /// Operations are resumed in readiness order, so the returned events
    /// are in completion order, which may differ from registration order.
    pub(crate) fn run_until_complete(self) -> Vec<CompletionEvent> {
        let Scheduler {
            runtime, mut tasks, ..
        } = self;

        let mut events = Vec::with_capacity(tasks.len());
        runtime.block_on(async {
            while let Some(event) = tasks.next().await {
                tracing::trace!(
                    index = event.index,
                    kind = %event.kind,
                    polls = event.polls,
                    "operation reached a terminal state"
                );
                events.push(event);
            }
        });
        events
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::types::OpOutput;

    #[test]
    fn test_transition_table() {
        assert_eq!(OpState::Pending.advance(PollEvent::Began), OpState::Running);
        assert_eq!(
            OpState::Running.advance(PollEvent::Suspended),
            OpState::Suspended
        );
        assert_eq!(
            OpState::Suspended.advance(PollEvent::Began),
            OpState::Running
        );
        assert_eq!(
            OpState::Running.advance(PollEvent::Finished { failed: false }),
            OpState::Completed
        );
        assert_eq!(
            OpState::Running.advance(PollEvent::Finished { failed: true }),
            OpState::Failed
        );
    }

    /// Future that suspends exactly once before resolving.
    struct YieldOnce {
        yielded: bool,
    }

    impl Future for YieldOnce {
        type Output = ();

        fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
            if self.yielded {
                Poll::Ready(())
            } else {
                self.yielded = true;
                cx.waker().wake_by_ref();
                Poll::Pending
            }
        }
    }

    fn probe(index: usize, started: Rc<Cell<bool>>) -> Operation {
        Operation {
            index,
            kind: OpKind::TimedWait,
            future: Box::pin(async move {
                started.set(true);
                YieldOnce { yielded: false }.await;
                Ok(OpOutput::Elapsed("probe".to_string()))
            }),
        }
    }

    #[test]
    fn test_register_does_not_start_the_operation() {
        let started = Rc::new(Cell::new(false));
        let mut scheduler = Scheduler::new(Duration::from_millis(50)).expect("scheduler");
        scheduler.register(probe(0, Rc::clone(&started)));

        assert!(!started.get(), "registration must not poll the operation");

        let events = scheduler.run_until_complete();
        assert!(started.get());
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_suspension_is_counted_as_an_extra_poll() {
        let started = Rc::new(Cell::new(false));
        let mut scheduler = Scheduler::new(Duration::from_millis(50)).expect("scheduler");
        scheduler.register(probe(7, started));

        let events = scheduler.run_until_complete();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].index, 7);
        assert_eq!(events[0].polls, 2, "one suspension, one resumption");
        assert!(events[0].outcome.is_ok());
    }

    #[test]
    fn test_completion_order_follows_readiness_not_registration() {
        let mut scheduler = Scheduler::new(Duration::from_millis(50)).expect("scheduler");
        scheduler.register(Operation::wait(
            0,
            Duration::from_millis(60),
            "slow".to_string(),
        ));
        scheduler.register(Operation::wait(
            1,
            Duration::from_millis(10),
            "quick".to_string(),
        ));

        let events = scheduler.run_until_complete();
        let completion_order: Vec<usize> = events.iter().map(|e| e.index).collect();
        assert_eq!(completion_order, vec![1, 0]);
    }
}
