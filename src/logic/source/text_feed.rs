//! Text Feed Source
//!
//! Plain-text blocklists (one indicator per line), e.g.
//! - URLhaus (abuse.ch)
//! - Emerging Threats compromised IPs
//! - Feodo Tracker botnet C2
//!
//! Each line becomes a blocklist record; the feed is always fetched whole.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use super::types::{parse_retry_after, FetchError, FetchOutcome, SourceClient};
use crate::logic::normalizer::RawRecord;
use crate::logic::objects::{ObservableKind, SourceRef};
use crate::logic::scheduler::Cursor;

pub struct TextFeedSource {
    name: String,
    url: String,
    kind: ObservableKind,
    http_client: reqwest::Client,
}

impl TextFeedSource {
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        kind: ObservableKind,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Connection(e.to_string()))?;

        Ok(Self {
            name: name.into(),
            url: url.into(),
            kind,
            http_client,
        })
    }

    /// Parse feed content into blocklist records
    pub fn parse_feed(&self, content: &str) -> Vec<RawRecord> {
        parse_feed(&self.name, self.kind, content)
    }
}

pub fn parse_feed(feed: &str, kind: ObservableKind, content: &str) -> Vec<RawRecord> {
    let mut records = Vec::new();

    for line in content.lines() {
        let line = line.trim();

        // Skip comments and empty lines
        if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
            continue;
        }

        // First column only; some lists append ports or comments
        let value = match line.split_whitespace().next() {
            Some(value) => value,
            None => continue,
        };

        let index = records.len();
        records.push(RawRecord::new(
            SourceRef::new(feed, index),
            json!({
                "feed": feed,
                "value": value,
                "observable_type": kind.stix_type(),
            }),
        ));
    }

    records
}

#[async_trait]
impl SourceClient for TextFeedSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, _cursor: &Cursor) -> Result<FetchOutcome, FetchError> {
        let response = self
            .http_client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(&e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            return Err(FetchError::from_status(status.as_u16(), retry_after));
        }

        let content = response.text().await.map_err(|e| FetchError::from_reqwest(&e))?;
        let records = self.parse_feed(&content);
        tracing::info!("Synced {} indicators from {}", records.len(), self.name);

        Ok(FetchOutcome {
            records,
            next_token: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_feed_skips_comments() {
        let content = "# header\n// note\n\n1.2.3.4\n  5.6.7.8  # inline\n";
        let records = parse_feed("et", ObservableKind::Ipv4Addr, content);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].body["value"], "1.2.3.4");
        assert_eq!(records[1].body["value"], "5.6.7.8");
        assert_eq!(records[1].body["observable_type"], "ipv4-addr");
        assert_eq!(records[1].source_ref.index, 1);
    }

    #[test]
    fn test_parsed_lines_normalize_as_blocklist() {
        use crate::logic::normalizer::{Normalizer, ShapeKind, SourceConfig};

        let records = parse_feed("urlhaus", ObservableKind::Url, "http://evil.com/a.exe\n");
        let shape = ShapeKind::classify(records[0].body.as_object().unwrap());
        assert_eq!(shape, Some(ShapeKind::Blocklist));

        let normalizer = Normalizer::new(SourceConfig::default()).unwrap();
        let out = normalizer.normalize(&records[0]).unwrap();
        assert!(out.objects.iter().any(|o| o.attr_str("value") == Some("http://evil.com/a.exe")));
    }
}
