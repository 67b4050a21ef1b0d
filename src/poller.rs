//! Periodic feed poller and the per-item hand-off state machine.

use crate::config::{Config, FeedConfig};
use crate::dispatch::{Dispatch, DispatchError};
use crate::filter::{FeedFilter, Verdict};
use crate::resolver;
use crate::storage::SeenFile;
use anyhow::Context;
use std::time::Duration;

/// One configured feed with its rules compiled.
struct Feed {
    config: FeedConfig,
    filter: FeedFilter,
}

pub struct FeedPoller<D> {
    feeds: Vec<Feed>,
    update_interval: i64,
    seen: SeenFile,
    dispatcher: D,
    client: reqwest::Client,
    insecure_client: reqwest::Client,
}

impl<D: Dispatch> FeedPoller<D> {
    pub fn new(config: &Config, dispatcher: D) -> anyhow::Result<Self> {
        let feeds = config
            .feeds
            .iter()
            .map(|feed_config| {
                let filter = FeedFilter::new(feed_config)
                    .with_context(|| format!("Invalid rules for feed {}", feed_config.url))?;
                Ok(Feed {
                    config: feed_config.clone(),
                    filter,
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let seen = SeenFile::open(&config.seen_file).with_context(|| {
            format!("Failed to open seen file {}", config.seen_file.display())
        })?;
        tracing::debug!("{} keys loaded from seen file", seen.len());

        Ok(Self {
            feeds,
            update_interval: config.update_interval,
            seen,
            dispatcher,
            client: http_client(true)?,
            insecure_client: http_client(false)?,
        })
    }

    /// Runs poll cycles until shutdown. A negative interval finishes after a
    /// single pass.
    pub async fn launch(mut self) -> anyhow::Result<()> {
        if self.update_interval < 0 {
            tracing::info!("Starting feed poller in single-pass mode");
            return self.poll_feeds().await;
        }

        let interval = Duration::from_secs(self.update_interval as u64);
        tracing::info!(
            "Starting feed poller with interval of {} seconds",
            interval.as_secs()
        );

        loop {
            self.poll_feeds().await?;
            tokio::time::sleep(interval).await;
        }
    }

    /// Polls every feed once, in declared order. Fetch and parse problems
    /// skip the affected feed; only seen-file I/O failures abort the cycle.
    async fn poll_feeds(&mut self) -> anyhow::Result<()> {
        tracing::debug!("Polling all feeds");

        'feed_loop: for index in 0..self.feeds.len() {
            let url = self.feeds[index].config.url.clone();
            tracing::debug!("Retrieving feed {url}");

            let client = if self.feeds[index].config.validate_cert {
                &self.client
            } else {
                &self.insecure_client
            };

            let content = match fetch_feed(client, &url).await {
                Ok(content) => content,
                Err(error) => {
                    tracing::warn!("Retrieval error for {url}: {error:#}");
                    continue 'feed_loop;
                }
            };

            let channel = match rss::Channel::read_from(&content[..]) {
                Ok(channel) => channel,
                Err(error) => {
                    tracing::warn!("Parse error for {url}: {error}");
                    continue 'feed_loop;
                }
            };
            tracing::debug!("Retrieved {} items from {url}", channel.items().len());

            for item in channel.items() {
                self.process_item(index, item).await?;
            }
        }

        Ok(())
    }

    /// Runs one item through resolution, dedup, filtering and hand-off.
    async fn process_item(&mut self, index: usize, item: &rss::Item) -> anyhow::Result<()> {
        let feed = &self.feeds[index];

        // Items without a usable link are dropped.
        let Some(resolved) = resolver::resolve(item, &feed.config) else {
            return Ok(());
        };

        if self.seen.contains(&resolved.dedup_key) {
            return Ok(());
        }

        let title = item.title().unwrap_or_default();
        let download_path = match feed.filter.evaluate(title) {
            Verdict::Accepted { download_path } => download_path,
            Verdict::Rejected => {
                // Filtering is deterministic, so a rejected item is recorded
                // and never looked at again.
                tracing::debug!("Rejected by filter: {title}");
                return self.record_seen(&resolved.dedup_key);
            }
        };

        if feed.config.delay_seconds > 0 {
            tracing::debug!(
                "Sleeping {} seconds before hand-off",
                feed.config.delay_seconds
            );
            tokio::time::sleep(Duration::from_secs(feed.config.delay_seconds)).await;
        }

        tracing::info!("New item: {}", resolved.url);
        match self
            .dispatcher
            .deliver(
                &resolved.url,
                &self.feeds[index].config,
                download_path.as_deref(),
            )
            .await
        {
            Ok(()) => self.record_seen(&resolved.dedup_key),
            Err(DispatchError::RateLimited) => {
                tracing::warn!(
                    "Client rate-limited {}; consider adding delay_seconds to this feed",
                    self.feeds[index].config.url
                );
                Ok(())
            }
            Err(error) => {
                // Left out of the seen file, so the next cycle retries it.
                tracing::warn!("Hand-off failed, will retry next cycle: {error}");
                Ok(())
            }
        }
    }

    fn record_seen(&mut self, key: &str) -> anyhow::Result<()> {
        // Losing dedup state means handing off duplicates, so this failure
        // is allowed to take the loop down.
        self.seen
            .add(key)
            .with_context(|| format!("Failed to persist seen file {}", self.seen.path().display()))
    }
}

fn http_client(validate_cert: bool) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(30))
        .danger_accept_invalid_certs(!validate_cert)
        .build()
        .context("Failed to create feed HTTP client")
}

async fn fetch_feed(client: &reqwest::Client, url: &str) -> anyhow::Result<Vec<u8>> {
    let response = client
        .get(url)
        .send()
        .await
        .context("Failed to HTTP GET feed")?
        .error_for_status()
        .context("Feed answered with an error status")?;

    let content = response.bytes().await.context("Failed to read feed body")?;
    Ok(content.to_vec())
}
