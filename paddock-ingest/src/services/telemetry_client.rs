//! Telemetry provider client
//!
//! One `GET {base}/sessions/{year}/{round}/{code}` per session returns the
//! whole session document. The hourly quota is enforced by the caller; the
//! client only spaces requests so bursts stay polite.

use super::extractors::SessionBlob;
use crate::models::SessionType;
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use std::num::NonZeroU32;
use std::time::Duration;
use thiserror::Error;

pub(crate) const USER_AGENT: &str = concat!("paddock-ingest/", env!("CARGO_PKG_VERSION"));

/// Provider fetch errors
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Transient provider error: {0}")]
    Transient(String),

    #[error("Malformed provider response: {0}")]
    Malformed(String),

    #[error("Provider rate limit hit")]
    RateLimited,
}

/// Source of raw session documents
#[async_trait]
pub trait TelemetryProvider: Send + Sync {
    /// Fetch the full document for one session
    ///
    /// Exactly one remote call per invocation.
    async fn fetch_session_blob(
        &self,
        year: i32,
        round_number: u32,
        session_type: SessionType,
    ) -> Result<SessionBlob, FetchError>;
}

/// HTTP telemetry provider
pub struct HttpTelemetryProvider {
    client: Client,
    base_url: String,
    rate_limiter: RateLimiter<
        governor::state::direct::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
}

impl HttpTelemetryProvider {
    pub fn new(base_url: &str, timeout: Duration, requests_per_second: u32) -> paddock_common::Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| paddock_common::Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        let per_second = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            rate_limiter: RateLimiter::direct(Quota::per_second(per_second)),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn session_url(&self, year: i32, round_number: u32, session_type: SessionType) -> String {
        format!(
            "{}/sessions/{}/{}/{}",
            self.base_url,
            year,
            round_number,
            session_type.provider_code()
        )
    }

    /// Issue one GET and map the status code onto [`FetchError`]
    async fn get(&self, url: &str, what: &str) -> Result<reqwest::Response, FetchError> {
        self.rate_limiter.until_ready().await;

        tracing::debug!(url = %url, "Querying telemetry provider");

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_decode() {
                FetchError::Malformed(e.to_string())
            } else {
                FetchError::Transient(e.to_string())
            }
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(what.to_string()));
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Transient(format!("HTTP {}: {}", status.as_u16(), body)));
        }

        Ok(response)
    }
}

#[async_trait]
impl TelemetryProvider for HttpTelemetryProvider {
    async fn fetch_session_blob(
        &self,
        year: i32,
        round_number: u32,
        session_type: SessionType,
    ) -> Result<SessionBlob, FetchError> {
        let url = self.session_url(year, round_number, session_type);
        let what = format!("{} round {} {}", year, round_number, session_type);

        let response = self.get(&url, &what).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transient(e.to_string()))?;

        serde_json::from_slice(&bytes).map_err(|e| FetchError::Malformed(format!("{}: {}", what, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_url_uses_provider_code() {
        let provider = HttpTelemetryProvider::new("http://localhost:8000/api/", Duration::from_secs(5), 2).unwrap();
        assert_eq!(provider.base_url(), "http://localhost:8000/api");
        assert_eq!(
            provider.session_url(2025, 6, SessionType::SprintQualifying),
            "http://localhost:8000/api/sessions/2025/6/SQ"
        );
        assert_eq!(
            provider.session_url(2024, 1, SessionType::Practice1),
            "http://localhost:8000/api/sessions/2024/1/FP1"
        );
    }

    #[test]
    fn test_zero_rate_falls_back_to_one_per_second() {
        assert!(HttpTelemetryProvider::new("http://localhost", Duration::from_secs(1), 0).is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_transient() {
        // port 9 (discard) on loopback is reliably closed in test environments
        let provider = HttpTelemetryProvider::new("http://127.0.0.1:9", Duration::from_secs(2), 10).unwrap();
        let err = provider
            .fetch_session_blob(2025, 1, SessionType::Race)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Transient(_)));
    }
}
