//! Platform API Client
//!
//! HTTP client for the central threat-intel platform.
//!
//! Endpoints:
//! - `POST /api/v1/bundles`                      submit a bundle
//! - `POST /api/v1/works`                        open a work item
//! - `POST /api/v1/works/{id}/complete`          close it
//! - `GET|PUT /api/v1/connectors/{id}/state`     cursor storage (404 = none)

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::types::{PlatformClient, StateError, SubmitError};
use crate::logic::emitter::{BatchAck, Bundle};
use crate::logic::scheduler::Cursor;
use crate::logic::source::types::parse_retry_after;

/// Platform connection settings
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    pub url: String,
    pub token: String,
    pub connector_id: String,
    pub timeout_seconds: u64,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        use crate::constants;

        Self {
            url: constants::get_platform_url(),
            token: String::new(),
            connector_id: String::new(),
            timeout_seconds: constants::get_fetch_timeout(),
        }
    }
}

// Request/Response types

#[derive(Debug, Serialize)]
struct InitiateWorkRequest<'a> {
    connector_id: &'a str,
    name: &'a str,
}

#[derive(Debug, Deserialize)]
struct InitiateWorkResponse {
    work_id: String,
}

#[derive(Debug, Serialize)]
struct CompleteWorkRequest<'a> {
    message: &'a str,
}

pub struct HttpPlatform {
    config: PlatformConfig,
    http_client: reqwest::Client,
}

impl HttpPlatform {
    pub fn new(config: PlatformConfig) -> Result<Self, SubmitError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| SubmitError::Connection(e.to_string()))?;

        Ok(Self { config, http_client })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/v1/{}", self.config.url.trim_end_matches('/'), path)
    }

    fn state_url(&self) -> String {
        self.endpoint(&format!("connectors/{}/state", self.config.connector_id))
    }

    fn submit_error(e: reqwest::Error) -> SubmitError {
        if e.is_timeout() {
            SubmitError::Timeout
        } else {
            SubmitError::Connection(e.to_string())
        }
    }

    fn state_error(e: reqwest::Error) -> StateError {
        if e.is_timeout() {
            StateError::Timeout
        } else {
            StateError::Http(e.to_string())
        }
    }

    /// Map a non-success response of a submit-side call
    async fn rejected(response: reqwest::Response) -> SubmitError {
        let status = response.status().as_u16();
        match status {
            401 | 403 => SubmitError::Unauthorized,
            429 => SubmitError::RateLimited {
                retry_after: parse_retry_after(response.headers()),
            },
            500..=599 => SubmitError::ServerError(status),
            _ => {
                let message = response.text().await.unwrap_or_default();
                SubmitError::Rejected { status, message }
            }
        }
    }
}

#[async_trait]
impl PlatformClient for HttpPlatform {
    async fn submit(&self, bundle: &Bundle, work_id: Option<&str>) -> Result<BatchAck, SubmitError> {
        let mut request = self
            .http_client
            .post(self.endpoint("bundles"))
            .header("Authorization", format!("Bearer {}", self.config.token))
            .json(bundle);
        if let Some(work_id) = work_id {
            request = request.header("X-Work-Id", work_id);
        }

        let response = request.send().await.map_err(Self::submit_error)?;

        if response.status().is_success() {
            response
                .json()
                .await
                .map_err(|e| SubmitError::Parse(e.to_string()))
        } else {
            Err(Self::rejected(response).await)
        }
    }

    async fn read_cursor(&self) -> Result<Option<Cursor>, StateError> {
        let response = self
            .http_client
            .get(self.state_url())
            .header("Authorization", format!("Bearer {}", self.config.token))
            .send()
            .await
            .map_err(Self::state_error)?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(StateError::ServerError(status.as_u16()));
        }

        let text = response.text().await.map_err(Self::state_error)?;
        if text.trim().is_empty() || text.trim() == "null" {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&text)?))
    }

    async fn write_cursor(&self, cursor: &Cursor) -> Result<(), StateError> {
        let response = self
            .http_client
            .put(self.state_url())
            .header("Authorization", format!("Bearer {}", self.config.token))
            .json(cursor)
            .send()
            .await
            .map_err(Self::state_error)?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(StateError::ServerError(response.status().as_u16()))
        }
    }

    async fn initiate_work(&self, name: &str) -> Result<Option<String>, SubmitError> {
        let request = InitiateWorkRequest {
            connector_id: &self.config.connector_id,
            name,
        };

        let response = self
            .http_client
            .post(self.endpoint("works"))
            .header("Authorization", format!("Bearer {}", self.config.token))
            .json(&request)
            .send()
            .await
            .map_err(Self::submit_error)?;

        if response.status().is_success() {
            let result: InitiateWorkResponse = response
                .json()
                .await
                .map_err(|e| SubmitError::Parse(e.to_string()))?;
            tracing::info!("Work opened: {}", result.work_id);
            Ok(Some(result.work_id))
        } else {
            Err(Self::rejected(response).await)
        }
    }

    async fn complete_work(&self, work_id: &str, message: &str) -> Result<(), SubmitError> {
        let response = self
            .http_client
            .post(self.endpoint(&format!("works/{}/complete", work_id)))
            .header("Authorization", format!("Bearer {}", self.config.token))
            .json(&CompleteWorkRequest { message })
            .send()
            .await
            .map_err(Self::submit_error)?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::rejected(response).await)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn platform(url: &str) -> HttpPlatform {
        HttpPlatform::new(PlatformConfig {
            url: url.to_string(),
            token: "t".to_string(),
            connector_id: "abc".to_string(),
            timeout_seconds: 5,
        })
        .unwrap()
    }

    #[test]
    fn test_endpoints() {
        let p = platform("http://platform:8080/");
        assert_eq!(p.endpoint("bundles"), "http://platform:8080/api/v1/bundles");
        assert_eq!(p.state_url(), "http://platform:8080/api/v1/connectors/abc/state");
    }

    #[test]
    fn test_ack_parsing() {
        let ack: BatchAck = serde_json::from_str(
            r#"{"accepted": 2, "rejected": [{"id": "x--1", "reason": "bad"}]}"#,
        )
        .unwrap();
        assert_eq!(ack.accepted, 2);
        assert_eq!(ack.rejected[0].reason, "bad");

        let ack: BatchAck = serde_json::from_str(r#"{"accepted": 5}"#).unwrap();
        assert!(ack.rejected.is_empty());
    }
}
