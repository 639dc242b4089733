//! Cursor
//!
//! Incremental-polling checkpoint: last successful run time plus per-feed
//! pagination tokens. Persisted by the platform as
//! `{"lastRunTimestamp": 1700000000, "tokens": {"feed": "token"}}`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cursor {
    /// Epoch seconds of the last committed cycle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_timestamp: Option<i64>,

    /// Feed name → pagination token
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tokens: BTreeMap<String, String>,
}

impl Cursor {
    pub fn is_first_run(&self) -> bool {
        self.last_run_timestamp.is_none() && self.tokens.is_empty()
    }

    pub fn token(&self, feed: &str) -> Option<&str> {
        self.tokens.get(feed).map(String::as_str)
    }

    /// Cursor to commit after a successful cycle.
    ///
    /// Feeds that returned no token have caught up and lose theirs. The
    /// timestamp only moves once no feed is left mid-pagination, so the
    /// `since` window of an unfinished page walk stays put.
    pub fn advance(&self, started_at: i64, tokens: BTreeMap<String, Option<String>>) -> Cursor {
        let tokens: BTreeMap<String, String> = tokens
            .into_iter()
            .filter_map(|(feed, token)| token.map(|t| (feed, t)))
            .collect();

        let last_run_timestamp = if tokens.is_empty() {
            Some(started_at)
        } else {
            self.last_run_timestamp
        };

        Cursor { last_run_timestamp, tokens }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let mut cursor = Cursor {
            last_run_timestamp: Some(1_700_000_000),
            tokens: BTreeMap::new(),
        };
        cursor.tokens.insert("feed".to_string(), "p2".to_string());

        let json = serde_json::to_value(&cursor).unwrap();
        assert_eq!(json["lastRunTimestamp"], 1_700_000_000);
        assert_eq!(json["tokens"]["feed"], "p2");

        let empty: Cursor = serde_json::from_str("{}").unwrap();
        assert!(empty.is_first_run());
    }

    #[test]
    fn test_advance_drops_finished_tokens() {
        let cursor = Cursor::default();
        let mut tokens = BTreeMap::new();
        tokens.insert("a".to_string(), Some("next".to_string()));
        tokens.insert("b".to_string(), None);

        let next = cursor.advance(42, tokens);
        assert_eq!(next.token("a"), Some("next"));
        assert_eq!(next.token("b"), None);
    }

    #[test]
    fn test_timestamp_held_while_paging() {
        let cursor = Cursor {
            last_run_timestamp: Some(10),
            tokens: BTreeMap::new(),
        };

        let mut pending = BTreeMap::new();
        pending.insert("a".to_string(), Some("p2".to_string()));
        pending.insert("b".to_string(), None);
        let paging = cursor.advance(20, pending);
        assert_eq!(paging.last_run_timestamp, Some(10));
        assert!(!paging.is_first_run());

        let mut done = BTreeMap::new();
        done.insert("a".to_string(), None);
        done.insert("b".to_string(), None);
        let caught_up = paging.advance(30, done);
        assert_eq!(caught_up.last_run_timestamp, Some(30));
        assert!(caught_up.tokens.is_empty());

        let first = Cursor::default().advance(40, BTreeMap::from([("a".to_string(), Some("p2".to_string()))]));
        assert_eq!(first.last_run_timestamp, None);
        assert_eq!(first.token("a"), Some("p2"));
    }
}
