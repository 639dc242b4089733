//! Configuration module
//!
//! Reads the environment (after `.env`) into a validated `ConnectorConfig`.
//! Defaults live in `constants.rs`.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use validator::{Validate, ValidationErrors};

use crate::constants;
use crate::logic::objects::{ObservableKind, TlpLevel};
use crate::logic::normalizer::SourceConfig;
use crate::logic::platform::{default_state_dir, PlatformConfig};
use crate::logic::scheduler::{BackoffPolicy, SchedulerConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(#[from] ValidationErrors),

    #[error("missing credential: {0}")]
    MissingCredential(&'static str),

    #[error("invalid feed entry '{entry}': {reason}")]
    InvalidFeed { entry: String, reason: String },

    #[error("no feeds configured (set SOURCE_FEEDS)")]
    NoFeeds,

    #[error("invalid TLP level: {0}")]
    InvalidTlp(String),
}

/// How a feed's payload is read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedKind {
    /// JSON vendor API, shape detected per record
    Json,
    /// Plain-text blocklist, one value of the given kind per line
    Text(ObservableKind),
}

#[derive(Debug, Clone, PartialEq, Eq, Validate)]
pub struct FeedConfig {
    #[validate(length(min = 1))]
    pub name: String,
    pub kind: FeedKind,
    #[validate(url)]
    pub url: String,
}

impl FeedConfig {
    /// Parse one `name=kind:url` entry
    pub fn parse(entry: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidFeed {
            entry: entry.to_string(),
            reason: reason.to_string(),
        };

        let (name, rest) = entry.split_once('=').ok_or_else(|| invalid("expected name=kind:url"))?;
        let (kind, url) = rest.split_once(':').ok_or_else(|| invalid("expected kind:url"))?;

        let kind = match kind.trim().to_lowercase().as_str() {
            "json" => FeedKind::Json,
            other => FeedKind::Text(other.parse().map_err(|e: String| invalid(&e))?),
        };

        Ok(Self {
            name: name.trim().to_string(),
            kind,
            url: url.trim().to_string(),
        })
    }
}

/// Parse the comma-separated `SOURCE_FEEDS` list
pub fn parse_feeds(raw: &str) -> Result<Vec<FeedConfig>, ConfigError> {
    let feeds = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(FeedConfig::parse)
        .collect::<Result<Vec<_>, _>>()?;

    if feeds.is_empty() {
        return Err(ConfigError::NoFeeds);
    }
    Ok(feeds)
}

fn parse_labels(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Application configuration
#[derive(Debug, Clone, Validate)]
pub struct ConnectorConfig {
    /// Connector id on the platform (cursor and work items are keyed on it)
    #[validate(length(min = 1))]
    pub connector_id: String,

    /// Author identity name
    #[validate(length(min = 1))]
    pub name: String,

    /// Seconds between cycle starts
    #[validate(range(min = 1))]
    pub duration_period: u64,

    #[validate(range(max = 100))]
    pub min_score: u8,

    pub create_indicator: bool,
    pub tlp: TlpLevel,
    pub labels: Vec<String>,

    #[validate(range(min = 1))]
    pub batch_size: usize,

    /// Seconds, bound on every external call
    #[validate(range(min = 1))]
    pub fetch_timeout: u64,

    pub max_retries: u32,

    #[validate(range(min = 1))]
    pub backoff_base: u64,
    pub backoff_max: u64,

    #[validate(url)]
    pub platform_url: String,
    pub platform_token: Option<String>,
    pub dry_run: bool,
    pub state_dir: PathBuf,

    #[validate(nested)]
    pub feeds: Vec<FeedConfig>,
    pub source_api_key: Option<String>,

    #[validate(range(max = 100))]
    pub default_score: u8,
}

impl ConnectorConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let tlp = env::var("CONNECTOR_TLP")
            .unwrap_or_else(|_| constants::DEFAULT_TLP.to_string())
            .parse()
            .map_err(ConfigError::InvalidTlp)?;

        let config = Self {
            connector_id: env::var("CONNECTOR_ID")
                .unwrap_or_else(|_| constants::APP_NAME.to_string()),
            name: constants::get_connector_name(),
            duration_period: constants::get_duration_period(),
            min_score: constants::get_min_score(),
            create_indicator: constants::is_create_indicator(),
            tlp,
            labels: parse_labels(&env::var("CONNECTOR_LABELS").unwrap_or_default()),
            batch_size: constants::get_batch_size(),
            fetch_timeout: constants::get_fetch_timeout(),
            max_retries: constants::get_max_retries(),
            backoff_base: constants::get_backoff_base(),
            backoff_max: constants::get_backoff_max(),
            platform_url: constants::get_platform_url(),
            platform_token: non_empty(env::var("PLATFORM_TOKEN").ok()),
            dry_run: constants::is_dry_run(),
            state_dir: env::var("STATE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_state_dir()),
            feeds: parse_feeds(&env::var("SOURCE_FEEDS").unwrap_or_default())?,
            source_api_key: non_empty(env::var("SOURCE_API_KEY").ok()),
            default_score: constants::get_feed_score(),
        };

        config.check()?;
        Ok(config)
    }

    /// Derive + explicit checks
    pub fn check(&self) -> Result<(), ConfigError> {
        self.validate()?;

        if !self.dry_run && self.platform_token.is_none() {
            return Err(ConfigError::MissingCredential("PLATFORM_TOKEN"));
        }
        if self.feeds.is_empty() {
            return Err(ConfigError::NoFeeds);
        }
        Ok(())
    }

    pub fn source_config(&self) -> SourceConfig {
        SourceConfig {
            author_name: self.name.clone(),
            tlp: self.tlp,
            min_score: self.min_score,
            create_indicator: self.create_indicator,
            default_score: self.default_score,
            labels: self.labels.clone(),
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            name: self.name.clone(),
            period: Duration::from_secs(self.duration_period),
            call_timeout: self.call_timeout(),
            backoff: BackoffPolicy::new(
                Duration::from_secs(self.backoff_base),
                Duration::from_secs(self.backoff_max),
                self.max_retries,
            ),
        }
    }

    pub fn platform_config(&self) -> PlatformConfig {
        PlatformConfig {
            url: self.platform_url.clone(),
            token: self.platform_token.clone().unwrap_or_default(),
            connector_id: self.connector_id.clone(),
            timeout_seconds: self.fetch_timeout,
        }
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ConnectorConfig {
        ConnectorConfig {
            connector_id: "conn-1".to_string(),
            name: "Intel Connector".to_string(),
            duration_period: 3600,
            min_score: 20,
            create_indicator: true,
            tlp: TlpLevel::Amber,
            labels: vec!["osint".to_string()],
            batch_size: 500,
            fetch_timeout: 30,
            max_retries: 5,
            backoff_base: 5,
            backoff_max: 300,
            platform_url: "http://localhost:8080".to_string(),
            platform_token: Some("secret".to_string()),
            dry_run: false,
            state_dir: PathBuf::from("/tmp/intel"),
            feeds: parse_feeds("vendor=json:https://api.vendor.io/v2/intel").unwrap(),
            source_api_key: None,
            default_score: 50,
        }
    }

    #[test]
    fn test_parse_feeds() {
        let feeds = parse_feeds(
            "vendor=json:https://api.vendor.io/v2/intel, feodo=ipv4-addr:https://feodotracker.abuse.ch/blocklist.txt",
        )
        .unwrap();

        assert_eq!(feeds.len(), 2);
        assert_eq!(feeds[0].name, "vendor");
        assert_eq!(feeds[0].kind, FeedKind::Json);
        assert_eq!(feeds[1].kind, FeedKind::Text(ObservableKind::Ipv4Addr));
        assert_eq!(feeds[1].url, "https://feodotracker.abuse.ch/blocklist.txt");
    }

    #[test]
    fn test_parse_feeds_errors() {
        assert!(matches!(parse_feeds(""), Err(ConfigError::NoFeeds)));
        assert!(matches!(
            parse_feeds("no-equals-sign"),
            Err(ConfigError::InvalidFeed { .. })
        ));
        assert!(matches!(
            parse_feeds("x=martian:https://example.com"),
            Err(ConfigError::InvalidFeed { .. })
        ));
    }

    #[test]
    fn test_labels() {
        assert_eq!(parse_labels(" OSINT, ,feeds "), vec!["osint", "feeds"]);
        assert!(parse_labels("").is_empty());
    }

    #[test]
    fn test_check() {
        assert!(sample().check().is_ok());

        let mut config = sample();
        config.min_score = 150;
        assert!(matches!(config.check(), Err(ConfigError::Invalid(_))));

        let mut config = sample();
        config.platform_url = "not a url".to_string();
        assert!(matches!(config.check(), Err(ConfigError::Invalid(_))));

        let mut config = sample();
        config.platform_token = None;
        assert!(matches!(
            config.check(),
            Err(ConfigError::MissingCredential("PLATFORM_TOKEN"))
        ));

        config.dry_run = true;
        assert!(config.check().is_ok());
    }

    #[test]
    fn test_derived_configs() {
        let config = sample();

        let source = config.source_config();
        assert_eq!(source.min_score, 20);
        assert_eq!(source.tlp, TlpLevel::Amber);
        assert_eq!(source.labels, vec!["osint".to_string()]);

        let scheduler = config.scheduler_config();
        assert_eq!(scheduler.period, Duration::from_secs(3600));
        assert_eq!(scheduler.backoff.max_retries, 5);

        let platform = config.platform_config();
        assert_eq!(platform.token, "secret");
        assert_eq!(platform.connector_id, "conn-1");
    }
}
