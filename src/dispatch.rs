//! The hand-off seam between the poller and a download client.

use crate::config::FeedConfig;
use async_trait::async_trait;
use thiserror::Error;

/// How a hand-off attempt failed.
///
/// The variant decides whether the item is marked seen or retried: a
/// successful `deliver` commits the item's dedup key, every error leaves it
/// uncommitted so the next poll cycle tries again.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The client signalled overload; the feed needs a `delay_seconds`.
    #[error("client refused: too many requests")]
    RateLimited,
    /// The client rejected our credentials.
    #[error("client refused: unauthorized")]
    Unauthorized,
    /// The client could not be reached at all.
    #[error("client unreachable: {0}")]
    Unreachable(String),
    /// The client did not answer within the configured timeout.
    #[error("client timed out")]
    TimedOut,
    /// Anything else; treated like a transient failure.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A consumer of resolved links. The poller only ever sees this trait, so a
/// different download client can be swapped in behind it.
#[async_trait]
pub trait Dispatch: Send + Sync {
    async fn deliver(
        &self,
        url: &str,
        feed: &FeedConfig,
        download_path: Option<&str>,
    ) -> Result<(), DispatchError>;
}
