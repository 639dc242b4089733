//! JSON Feed Source
//!
//! `GET {url}?since=<ts>&cursor=<token>` with an `X-Api-Key` header.
//! Accepts either a bare JSON array or `{"data": [...], "next": token}`.
//! `next` is followed within one fetch, up to `MAX_PAGES` pages.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::types::{parse_retry_after, FetchError, FetchOutcome, SourceClient};
use crate::logic::normalizer::RawRecord;
use crate::logic::objects::SourceRef;
use crate::logic::scheduler::Cursor;

/// Pages read per fetch; a token left at the cap resumes next cycle
pub const MAX_PAGES: usize = 10;

/// Walk `next` tokens starting from `first` until the feed runs dry or
/// `max_pages` pages have been read. Record indexes run across pages.
pub async fn collect_pages<F, Fut>(
    feed: &str,
    first: Option<String>,
    max_pages: usize,
    mut fetch_page: F,
) -> Result<FetchOutcome, FetchError>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Value, FetchError>>,
{
    let mut records = Vec::new();
    let mut token = first;
    let mut pages = 0;

    loop {
        let requested = token.clone();
        let page = JsonFeedSource::parse_body(feed, fetch_page(token.take()).await?)?;
        pages += 1;

        let offset = records.len();
        records.extend(page.records.into_iter().map(|mut record| {
            record.source_ref.index += offset;
            record
        }));

        token = page.next_token;
        // A feed echoing the token it was given would never finish
        if token.is_some() && token == requested {
            tracing::warn!("Feed {} repeated page token, stopping", feed);
            token = None;
        }
        if token.is_none() || pages >= max_pages {
            break;
        }
    }

    if token.is_some() {
        tracing::info!("Feed {} still paging after {} pages", feed, pages);
    }
    Ok(FetchOutcome { records, next_token: token })
}

pub struct JsonFeedSource {
    name: String,
    url: String,
    api_key: Option<String>,
    http_client: reqwest::Client,
}

impl JsonFeedSource {
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("intel-connector/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Connection(e.to_string()))?;

        Ok(Self {
            name: name.into(),
            url: url.into(),
            api_key,
            http_client,
        })
    }

    /// Split a response body into raw records and the next token
    pub fn parse_body(feed: &str, body: Value) -> Result<FetchOutcome, FetchError> {
        let (items, next_token) = match body {
            Value::Array(items) => (items, None),
            Value::Object(mut map) => {
                let items = match map.remove("data") {
                    Some(Value::Array(items)) => items,
                    Some(Value::Null) | None => Vec::new(),
                    Some(_) => {
                        return Err(FetchError::Unknown {
                            message: "'data' is not an array".to_string(),
                            side_effect_applied: false,
                        })
                    }
                };
                let next = match map.remove("next") {
                    Some(Value::String(s)) if !s.is_empty() => Some(s),
                    Some(Value::Number(n)) => Some(n.to_string()),
                    _ => None,
                };
                (items, next)
            }
            _ => {
                return Err(FetchError::Unknown {
                    message: "response is neither an array nor an object".to_string(),
                    side_effect_applied: false,
                })
            }
        };

        let records = items
            .into_iter()
            .enumerate()
            .map(|(index, body)| RawRecord::new(SourceRef::new(feed, index), body))
            .collect();

        Ok(FetchOutcome { records, next_token })
    }

    async fn fetch_page(&self, since: Option<i64>, token: Option<String>) -> Result<Value, FetchError> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(since) = since {
            query.push(("since", since.to_string()));
        }
        if let Some(token) = token {
            query.push(("cursor", token));
        }

        let mut request = self.http_client.get(&self.url).query(&query);
        if let Some(key) = &self.api_key {
            request = request.header("X-Api-Key", key);
        }

        tracing::debug!("Fetching feed {} ({})", self.name, self.url);
        let response = request.send().await.map_err(|e| FetchError::from_reqwest(&e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            return Err(FetchError::from_status(status.as_u16(), retry_after));
        }

        response.json().await.map_err(|e| FetchError::Unknown {
            message: e.to_string(),
            side_effect_applied: false,
        })
    }
}

#[async_trait]
impl SourceClient for JsonFeedSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, cursor: &Cursor) -> Result<FetchOutcome, FetchError> {
        let since = cursor.last_run_timestamp;
        let first = cursor.token(&self.name).map(str::to_string);

        let outcome = collect_pages(&self.name, first, MAX_PAGES, |token| {
            self.fetch_page(since, token)
        })
        .await?;

        tracing::info!("Fetched {} records from {}", outcome.records.len(), self.name);
        Ok(outcome)
    }
}
