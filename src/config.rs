use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// File holding the keys of items already handed off, one per line.
    #[serde(default = "default_seen_file")]
    pub seen_file: PathBuf,
    /// Seconds between poll cycles. A negative value runs a single pass.
    #[serde(default = "default_update_interval")]
    pub update_interval: i64,
    #[serde(default)]
    pub feeds: Vec<FeedConfig>,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeedConfig {
    pub url: String,
    #[serde(default = "default_true")]
    pub validate_cert: bool,
    /// Build a magnet link from an info hash found on the item.
    #[serde(default)]
    pub use_hash: bool,
    /// Item field to prefer as the download link, e.g. "guid" or "nyaa:magnetUrl".
    #[serde(default)]
    pub link_field: Option<String>,
    /// Deduplicate on the item guid instead of the resolved link.
    #[serde(default)]
    pub seen_by_guid: bool,
    #[serde(default)]
    pub matchers: Vec<MatchRule>,
    #[serde(default)]
    pub exclude: Vec<String>,
    pub download_path: Option<String>,
    /// Pause before each hand-off to the download client.
    #[serde(default)]
    pub delay_seconds: u64,
}

/// Title pattern with an optional download path override.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MatchRule {
    pub pattern: String,
    pub download_path: Option<String>,
}

/// Connection details for the Transmission RPC endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub rpc_path: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 9091,
            rpc_path: "/transmission/rpc".to_string(),
            username: None,
            password: None,
            timeout_seconds: 5,
        }
    }
}

fn default_seen_file() -> PathBuf {
    PathBuf::from(".seen")
}

fn default_update_interval() -> i64 {
    600
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_config_parses() {
        let content = r#"
            seen_file = "/var/lib/snag-rss/seen"
            update_interval = 300

            [server]
            host = "tower"
            port = 9092
            username = "admin"
            password = "hunter2"

            [[feeds]]
            url = "https://nyaa.si/?page=rss"
            use_hash = true
            seen_by_guid = true
            download_path = "/data/anime"
            delay_seconds = 2
            exclude = ["720p", "HEVC"]

            [[feeds.matchers]]
            pattern = "1080p"
            download_path = "/data/anime/hd"

            [[feeds.matchers]]
            pattern = "480p"

            [[feeds]]
            url = "https://www.archlinux.org/feeds/releases/"
            validate_cert = false
        "#;

        let config: Config = toml::from_str(content).unwrap();

        assert_eq!(config.seen_file, PathBuf::from("/var/lib/snag-rss/seen"));
        assert_eq!(config.update_interval, 300);
        assert_eq!(config.server.host, "tower");
        assert_eq!(config.server.port, 9092);
        assert_eq!(config.server.rpc_path, "/transmission/rpc");
        assert_eq!(config.server.username.as_deref(), Some("admin"));

        assert_eq!(config.feeds.len(), 2);
        let nyaa = &config.feeds[0];
        assert!(nyaa.use_hash);
        assert!(nyaa.seen_by_guid);
        assert!(nyaa.validate_cert);
        assert_eq!(nyaa.delay_seconds, 2);
        assert_eq!(nyaa.exclude, vec!["720p", "HEVC"]);
        assert_eq!(nyaa.matchers.len(), 2);
        assert_eq!(nyaa.matchers[0].pattern, "1080p");
        assert_eq!(nyaa.matchers[0].download_path.as_deref(), Some("/data/anime/hd"));
        assert_eq!(nyaa.matchers[1].download_path, None);

        let arch = &config.feeds[1];
        assert!(!arch.validate_cert);
        assert!(!arch.use_hash);
        assert!(arch.matchers.is_empty());
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [[feeds]]
            url = "https://example.com/feed.xml"
            "#,
        )
        .unwrap();

        assert_eq!(config.seen_file, PathBuf::from(".seen"));
        assert_eq!(config.update_interval, 600);
        assert_eq!(config.server.host, "localhost");
        assert_eq!(config.server.port, 9091);
        assert_eq!(config.server.timeout_seconds, 5);

        let feed = &config.feeds[0];
        assert!(feed.validate_cert);
        assert!(!feed.use_hash);
        assert!(!feed.seen_by_guid);
        assert_eq!(feed.link_field, None);
        assert_eq!(feed.download_path, None);
        assert_eq!(feed.delay_seconds, 0);
    }

    #[test]
    fn empty_config_is_valid() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.feeds.is_empty());
        assert_eq!(config.update_interval, 600);
    }
}
