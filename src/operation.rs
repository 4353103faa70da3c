//! Operations: one I/O-bound unit of work per batch position.
//!
//! An operation pairs its position and kind tag with the future that
//! performs exactly one collaborator call. The future is built lazily
//! from an `async` block so the collaborator is not touched until the
//! scheduler's first poll.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

use reqwest::Client;
use url::Url;

use crate::io;
use crate::types::{OpKind, OpOutcome, OpOutput};

/// A registered unit of work.
pub(crate) struct Operation {
    /// Position in the submitted batch.
    pub(crate) index: usize,

    /// Kind tag for reports and logs.
    pub(crate) kind: OpKind,

    /// The collaborator call. Resolves with this operation's terminal
    /// outcome; runs only on the scheduler's thread, so no `Send` bound.
    pub(crate) future: Pin<Box<dyn Future<Output = OpOutcome>>>,
}

impl Operation {
    /// Fetch operation using the batch-shared HTTP client.
    pub(crate) fn fetch(index: usize, url: Url, client: Client, max_bytes: u64) -> Self {
        Operation {
            index,
            kind: OpKind::Fetch,
            future: Box::pin(async move {
                io::fetch(&client, url, max_bytes).await.map(OpOutput::Body)
            }),
        }
    }

    /// File-read operation.
    pub(crate) fn read_file(index: usize, path: PathBuf) -> Self {
        Operation {
            index,
            kind: OpKind::FileRead,
            future: Box::pin(async move {
                io::read_file(&path).await.map(OpOutput::Contents)
            }),
        }
    }

    /// Timed-wait operation carrying a message payload.
    pub(crate) fn wait(index: usize, duration: Duration, message: String) -> Self {
        Operation {
            index,
            kind: OpKind::TimedWait,
            future: Box::pin(async move {
                io::wait(duration).await;
                Ok(OpOutput::Elapsed(message))
            }),
        }
    }

    /// The starvation demonstration.
    ///
    /// The sleep happens synchronously inside the first poll, so the
    /// operation completes without ever reaching `Suspended` and no other
    /// operation runs in the meantime.
    pub(crate) fn blocking_sleep(index: usize, duration: Duration) -> Self {
        Operation {
            index,
            kind: OpKind::BlockingSleep,
            future: Box::pin(async move {
                io::block(duration);
                Ok(OpOutput::Elapsed(format!(
                    "held the thread for {}ms",
                    duration.as_millis()
                )))
            }),
        }
    }
}
