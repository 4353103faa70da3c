//! External collaborators consumed by operations.
//!
//! Four calls, one per operation kind: the network client, the file
//! reader, the timer, and the blocking primitive behind the starvation
//! demonstration. The first three suspend the caller at their await
//! points; the last one deliberately does not.

use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use reqwest::redirect::Policy;
use url::Url;

use crate::types::{BatchError, CollaboratorError, HarnessConfig};

/// Build the HTTP client shared by every fetch operation in one batch.
pub(crate) fn client(config: &HarnessConfig) -> Result<Client, BatchError> {
    let mut builder = Client::builder()
        .user_agent(config.user_agent())
        .redirect(Policy::limited(config.max_redirects() as usize));

    if !config.use_system_proxy {
        builder = builder.no_proxy();
    }

    builder.build().map_err(BatchError::Client)
}

/// Fetch the full response body, suspending while the response is
/// awaited.
///
/// Non-success statuses and oversized bodies are collaborator failures
/// attributed to the operation's position; they never abort the batch.
pub(crate) async fn fetch(
    client: &Client,
    url: Url,
    max_bytes: u64,
) -> Result<Vec<u8>, CollaboratorError> {
    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| CollaboratorError::Network {
            url: url.to_string(),
            message: e.to_string(),
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(CollaboratorError::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    if let Some(len) = response.content_length()
        && len > max_bytes
    {
        return Err(CollaboratorError::ResponseTooLarge {
            url: url.to_string(),
            limit: max_bytes,
        });
    }

    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| CollaboratorError::Network {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        if body.len() as u64 + chunk.len() as u64 > max_bytes {
            return Err(CollaboratorError::ResponseTooLarge {
                url: url.to_string(),
                limit: max_bytes,
            });
        }

        body.extend_from_slice(&chunk);
    }

    tracing::debug!(%url, status = status.as_u16(), bytes = body.len(), "fetched");
    Ok(body)
}

/// Read a file's full contents, suspending while the read is in flight.
pub(crate) async fn read_file(path: &Path) -> Result<Vec<u8>, CollaboratorError> {
    tokio::fs::read(path)
        .await
        .map_err(|source| CollaboratorError::FileRead {
            path: path.to_path_buf(),
            source,
        })
}

/// Suspend until the duration elapses.
pub(crate) async fn wait(duration: Duration) {
    tokio::time::sleep(duration).await;
}

/// Occupy the calling thread for the duration.
///
/// Does not suspend: the scheduler cannot switch away, so every other
/// operation in the batch is frozen until this returns.
pub(crate) fn block(duration: Duration) {
    std::thread::sleep(duration);
}
