//! Postal code lookup client
//!
//! One `GET {base_url}/{postal_code}` per call, bounded by the configured
//! timeout, no caching and no retry. The service answers with a JSON document
//! whose `places` array carries `state` and `place name` for each match; the
//! first entry wins.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use zipflow_common::{Location, PostalCode};

use crate::config::PipelineConfig;
use crate::error::Result;

/// Why a lookup produced no location. Every variant is terminal for the row.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("lookup timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("not found")]
    NotFound,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl LookupError {
    /// Machine-readable kind stored next to the message
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "lookup_timeout",
            Self::NotFound => "lookup_not_found",
            Self::Transport(_) => "lookup_transport_error",
            Self::MalformedResponse(_) => "lookup_malformed_response",
        }
    }
}

/// Resolves postal codes to locations
#[async_trait]
pub trait LocationLookup: Send + Sync {
    async fn lookup(&self, postal_code: &PostalCode) -> std::result::Result<Location, LookupError>;
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    places: Vec<Place>,
}

#[derive(Debug, Deserialize)]
struct Place {
    state: String,
    #[serde(rename = "place name")]
    place_name: String,
}

/// HTTP client for the lookup service
#[derive(Debug, Clone)]
pub struct LocationLookupClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl LocationLookupClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("zipflow/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        Self::new(config.lookup_base_url.clone(), config.lookup_timeout())
    }

    fn url_for(&self, postal_code: &PostalCode) -> String {
        format!("{}/{}", self.base_url, postal_code)
    }

    fn classify(&self, err: reqwest::Error) -> LookupError {
        if err.is_timeout() {
            LookupError::Timeout(self.timeout)
        } else if err.is_decode() {
            LookupError::MalformedResponse(err.to_string())
        } else {
            LookupError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl LocationLookup for LocationLookupClient {
    async fn lookup(&self, postal_code: &PostalCode) -> std::result::Result<Location, LookupError> {
        let url = self.url_for(postal_code);
        debug!(url = %url, "Looking up postal code");

        let response = self.client.get(&url).send().await.map_err(|e| self.classify(e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(LookupError::NotFound);
        }
        if !status.is_success() {
            return Err(LookupError::Transport(format!("unexpected status {}", status)));
        }

        let parsed: LookupResponse = response.json().await.map_err(|e| self.classify(e))?;

        let place = parsed.places.into_iter().next().ok_or(LookupError::NotFound)?;
        if place.state.trim().is_empty() || place.place_name.trim().is_empty() {
            return Err(LookupError::MalformedResponse(
                "place entry has an empty state or place name".to_string(),
            ));
        }

        Ok(Location::new(place.state, place.place_name))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_url_strips_trailing_slash() {
        let client =
            LocationLookupClient::new("http://lookup.test/us/", Duration::from_secs(5)).unwrap();
        let zip: PostalCode = "90210".parse().unwrap();
        assert_eq!(client.url_for(&zip), "http://lookup.test/us/90210");
    }

    #[test]
    fn test_error_kinds_and_messages() {
        assert_eq!(LookupError::NotFound.to_string(), "not found");
        assert_eq!(LookupError::NotFound.kind(), "lookup_not_found");
        assert_eq!(
            LookupError::Timeout(Duration::from_secs(5)).to_string(),
            "lookup timed out after 5s"
        );
        assert_eq!(LookupError::Timeout(Duration::from_secs(5)).kind(), "lookup_timeout");
        assert_eq!(LookupError::Transport("refused".into()).kind(), "lookup_transport_error");
        assert_eq!(
            LookupError::MalformedResponse("eof".into()).kind(),
            "lookup_malformed_response"
        );
    }

    #[test]
    fn test_response_shape() {
        let body = r#"{"post code":"90210","country":"United States","places":[
            {"place name":"Beverly Hills","longitude":"-118.4065","state":"California",
             "state abbreviation":"CA","latitude":"34.0901"}]}"#;
        let parsed: LookupResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.places[0].state, "California");
        assert_eq!(parsed.places[0].place_name, "Beverly Hills");

        assert!(serde_json::from_str::<LookupResponse>("{}").is_err());
    }
}
