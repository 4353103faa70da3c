//! Domain types for the harness.
//!
//! This module contains the operation descriptors, outcome and report
//! types, configuration, and structured errors shared by the scheduler
//! and the batch orchestrator.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Descriptor for one operation in a batch.
///
/// Descriptors are opaque to the scheduler: each one maps to exactly one
/// external collaborator call, and the scheduler only ever sees the
/// future built from it. The position of a descriptor in the submitted
/// sequence is the operation's identity; results come back aligned to it.
#[derive(Debug, Clone)]
pub enum OpSpec {
    /// Fetch a URL over HTTP and resolve with the full response body.
    Fetch {
        /// Target URL. Taking a parsed [`Url`] keeps invalid targets out
        /// of the batch entirely.
        url: Url,
    },

    /// Read a file and resolve with its full contents.
    ReadFile {
        /// Path handed verbatim to the file reader.
        path: PathBuf,
    },

    /// Suspend for a fixed duration, then resolve carrying `message`.
    Wait {
        /// How long the operation stays suspended.
        duration: Duration,
        /// Payload returned when the timer elapses.
        message: String,
    },

    /// Occupy the scheduler thread for a fixed duration without ever
    /// suspending.
    ///
    /// This is a deliberate misuse demonstration: because the wait is
    /// synchronous, every other operation in the batch is frozen for the
    /// full duration. Keep it out of production batches.
    BlockingSleep {
        /// How long the thread is held.
        duration: Duration,
    },
}

impl OpSpec {
    #[must_use]
    pub fn fetch(url: Url) -> Self {
        OpSpec::Fetch { url }
    }

    #[must_use]
    pub fn read_file(path: impl Into<PathBuf>) -> Self {
        OpSpec::ReadFile { path: path.into() }
    }

    #[must_use]
    pub fn wait(duration: Duration, message: impl Into<String>) -> Self {
        OpSpec::Wait {
            duration,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn blocking_sleep(duration: Duration) -> Self {
        OpSpec::BlockingSleep { duration }
    }

    /// Kind tag used in reports and logs.
    #[must_use]
    pub fn kind(&self) -> OpKind {
        match self {
            OpSpec::Fetch { .. } => OpKind::Fetch,
            OpSpec::ReadFile { .. } => OpKind::FileRead,
            OpSpec::Wait { .. } => OpKind::TimedWait,
            OpSpec::BlockingSleep { .. } => OpKind::BlockingSleep,
        }
    }
}

/// The kind of collaborator call behind an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    /// HTTP fetch via the batch-shared client.
    Fetch,
    /// Asynchronous file read.
    FileRead,
    /// Timer wait with a message payload.
    TimedWait,
    /// Synchronous sleep that never yields the thread.
    BlockingSleep,
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OpKind::Fetch => "fetch",
            OpKind::FileRead => "file_read",
            OpKind::TimedWait => "timed_wait",
            OpKind::BlockingSleep => "blocking_sleep",
        };
        f.write_str(label)
    }
}

/// Lifecycle of one operation under the scheduler.
///
/// `Suspended` is entered only while the operation waits on its external
/// collaborator; it is the sole point where the scheduler may hand the
/// thread to another operation. A blocking operation never reaches
/// `Suspended` at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpState {
    /// Registered but not yet polled.
    Pending,
    /// Currently occupying the scheduler thread.
    Running,
    /// Parked at its I/O-wait boundary.
    Suspended,
    /// Terminal: resolved with an output.
    Completed,
    /// Terminal: resolved with a collaborator error.
    Failed,
}

impl OpState {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, OpState::Completed | OpState::Failed)
    }
}

/// Opaque success payload of one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpOutput {
    /// Full response body from a fetch.
    Body(Vec<u8>),
    /// Full contents of a file read.
    Contents(Vec<u8>),
    /// Message carried by an elapsed wait (timed or blocking).
    Elapsed(String),
}

impl OpOutput {
    /// Byte view for fetch and file-read outputs.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            OpOutput::Body(bytes) | OpOutput::Contents(bytes) => Some(bytes),
            OpOutput::Elapsed(_) => None,
        }
    }

    /// Message view for wait outputs.
    #[must_use]
    pub fn as_message(&self) -> Option<&str> {
        match self {
            OpOutput::Elapsed(message) => Some(message),
            OpOutput::Body(_) | OpOutput::Contents(_) => None,
        }
    }
}

/// Terminal outcome of one operation, indexed by batch position.
pub type OpOutcome = Result<OpOutput, CollaboratorError>;

/// A failure of the external collaborator behind one operation.
///
/// Collaborator failures are recovered locally: they are recorded at the
/// failing position and never abort sibling operations mid-flight.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    /// The request could not be sent or the response stream broke.
    #[error("request to {url} failed: {message}")]
    Network {
        /// Target of the failed fetch.
        url: String,
        /// Client-reported cause.
        message: String,
    },

    /// The server answered with a non-success status.
    #[error("{url} returned HTTP {status}")]
    HttpStatus {
        /// Target of the failed fetch.
        url: String,
        /// The offending status code.
        status: u16,
    },

    /// The response body exceeded the configured byte cap.
    #[error("response from {url} exceeded {limit} bytes")]
    ResponseTooLarge {
        /// Target of the failed fetch.
        url: String,
        /// Cap the body ran over.
        limit: u64,
    },

    /// The file could not be read.
    #[error("failed to read {}: {source}", .path.display())]
    FileRead {
        /// Path handed to the file reader.
        path: PathBuf,
        /// Underlying filesystem error.
        #[source]
        source: io::Error,
    },
}

/// Successful batch: every operation completed.
#[derive(Debug)]
pub struct BatchOutput {
    /// Outputs aligned with the submitted descriptors.
    pub outputs: Vec<OpOutput>,

    /// Timing for the batch.
    pub report: BatchReport,
}

/// Aggregated account of a batch in which at least one operation failed.
///
/// Partial completions are not dropped: `outcomes` is position-aligned
/// and carries every operation's terminal outcome, successes included.
#[derive(Debug)]
pub struct BatchFailure {
    /// Position of the first failure in completion order.
    pub first_failed: usize,

    /// Per-position outcomes, aligned with the submitted descriptors.
    pub outcomes: Vec<OpOutcome>,

    /// Timing for the batch, failed positions included.
    pub report: BatchReport,
}

impl BatchFailure {
    /// Positions that ended in a collaborator error, in position order.
    #[must_use]
    pub fn failed_positions(&self) -> Vec<usize> {
        self.outcomes
            .iter()
            .enumerate()
            .filter(|(_, outcome)| outcome.is_err())
            .map(|(position, _)| position)
            .collect()
    }
}

/// Batch submission error.
#[derive(Debug, Error)]
pub enum BatchError {
    /// The scheduler's runtime could not be constructed.
    #[error("failed to start the scheduler runtime: {0}")]
    Scheduler(#[source] io::Error),

    /// The batch-shared HTTP client could not be constructed.
    #[error("failed to build the HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// At least one operation ended in a collaborator error.
    #[error(
        "{} of {} operations failed, first at position {}",
        .0.failed_positions().len(),
        .0.outcomes.len(),
        .0.first_failed
    )]
    Failed(BatchFailure),
}

/// Timing for one completed batch.
///
/// The report is the surface where a blocking operation's stall becomes
/// visible: its `held` time dwarfs everyone else's, and every suspended
/// sibling's `finished` offset is pushed out by at least that much.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    /// Wall-clock time from submission to the last terminal state.
    pub elapsed: Duration,

    /// Per-position timing, aligned with the submitted descriptors.
    pub timings: Vec<OpTiming>,
}

impl BatchReport {
    pub(crate) fn empty() -> Self {
        BatchReport {
            elapsed: Duration::ZERO,
            timings: Vec::new(),
        }
    }

    /// The position that occupied the scheduler thread the longest, with
    /// its cumulative hold time.
    #[must_use]
    pub fn longest_hold(&self) -> Option<(usize, Duration)> {
        self.timings
            .iter()
            .enumerate()
            .max_by_key(|(_, timing)| timing.held)
            .map(|(position, timing)| (position, timing.held))
    }
}

/// Timing for one operation.
#[derive(Debug, Clone, Serialize)]
pub struct OpTiming {
    /// Kind tag of the operation.
    pub kind: OpKind,

    /// Offset from batch submission to the operation's first poll.
    pub started: Duration,

    /// Offset from batch submission to the terminal state.
    pub finished: Duration,

    /// Cumulative time the operation occupied the scheduler thread.
    pub held: Duration,

    /// Number of times the scheduler polled the operation.
    pub polls: u32,
}

/// Harness configuration.
///
/// All fields are optional; accessors fall back to the documented
/// defaults. Maps cleanly onto a `[harness]` table in a TOML config file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HarnessConfig {
    /// User-Agent string for fetch operations.
    pub user_agent: Option<String>,

    /// Maximum redirects a fetch will follow. Default: 5.
    pub max_redirects: Option<u32>,

    /// Maximum response body size in bytes. Default: 10 MiB.
    pub max_response_bytes: Option<u64>,

    /// Use system proxy settings (`HTTP_PROXY`/`HTTPS_PROXY`).
    #[serde(default)]
    pub use_system_proxy: bool,

    /// Threshold in milliseconds above which a single poll is logged as
    /// having stalled the scheduler thread. Default: 50.
    pub slow_poll_warn_millis: Option<u64>,
}

impl HarnessConfig {
    /// Default User-Agent.
    pub const DEFAULT_USER_AGENT: &str = concat!("iogather/", env!("CARGO_PKG_VERSION"));

    /// Default max redirects.
    pub const DEFAULT_MAX_REDIRECTS: u32 = 5;

    /// Default max response bytes (10 MiB).
    pub const DEFAULT_MAX_RESPONSE_BYTES: u64 = 10 * 1024 * 1024;

    /// Default slow-poll warning threshold.
    pub const DEFAULT_SLOW_POLL_WARN_MILLIS: u64 = 50;

    #[must_use]
    pub fn user_agent(&self) -> &str {
        self.user_agent.as_deref().unwrap_or(Self::DEFAULT_USER_AGENT)
    }

    #[must_use]
    pub fn max_redirects(&self) -> u32 {
        self.max_redirects.unwrap_or(Self::DEFAULT_MAX_REDIRECTS)
    }

    #[must_use]
    pub fn max_response_bytes(&self) -> u64 {
        self.max_response_bytes
            .unwrap_or(Self::DEFAULT_MAX_RESPONSE_BYTES)
    }

    #[must_use]
    pub fn slow_poll_warn(&self) -> Duration {
        Duration::from_millis(
            self.slow_poll_warn_millis
                .unwrap_or(Self::DEFAULT_SLOW_POLL_WARN_MILLIS),
        )
    }
}
