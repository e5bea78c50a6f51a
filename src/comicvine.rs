//! ComicVine catalog client
//!
//! Thin authenticated wrapper over the catalog's GET API. The service
//! reports failure through an embedded `status_code` (HTTP 200 with
//! `status_code != 1` is still an error), and rate limiting is the caller's
//! responsibility, so every successful call is followed by a fixed pause
//! before control returns. The next request anywhere in the process is
//! therefore always spaced by at least `rate_delay`.

use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tokio::time::sleep;

use crate::config::Config;
use crate::error::SyncError;

/// Embedded status code the catalog uses for success
const STATUS_OK: i64 = 1;

/// Fixed page size for all paginated catalog endpoints
pub const PAGE_SIZE: u64 = 100;

/// Resource-type prefix for volume ids ("4050-<id>")
pub const VOLUME_TYPE_PREFIX: &str = "4050";

/// Resource-type prefix for publisher ids ("4010-<id>")
pub const PUBLISHER_TYPE_PREFIX: &str = "4010";

/// Namespace-qualified volume identifier, the form Mylar registers
pub fn volume_comic_id(volume_id: i64) -> String {
    format!("{}-{}", VOLUME_TYPE_PREFIX, volume_id)
}

/// Response envelope common to all catalog endpoints
#[derive(Debug, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub status_code: i64,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub number_of_total_results: i64,
    #[serde(default)]
    pub results: Value,
}

/// Minimal volume reference as it appears in credits lists and issue records
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VolumeRef {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PublisherRef {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Volume metadata fetched lazily for filtering
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VolumeDetail {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub publisher: Option<PublisherRef>,
    /// Upstream sends either a JSON string or a number here
    #[serde(default)]
    pub start_year: Option<Value>,
    #[serde(default)]
    pub count_of_issues: Option<i64>,
}

impl VolumeDetail {
    /// Tolerant start-year accessor; `None` when absent or unparsable.
    pub fn start_year_value(&self) -> Option<i32> {
        match &self.start_year {
            Some(Value::Number(n)) => n.as_i64().map(|y| y as i32),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

pub struct ComicVineClient {
    client: Client,
    base_url: String,
    api_key: String,
    rate_delay: Duration,
}

impl ComicVineClient {
    pub fn new(cfg: &Config) -> Result<Self, SyncError> {
        let client = Client::builder()
            .user_agent(cfg.comicvine.user_agent.clone())
            .timeout(Duration::from_secs(cfg.behavior.request_timeout))
            .build()?;
        Ok(Self {
            client,
            base_url: cfg.comicvine.base_url.trim_end_matches('/').to_string(),
            api_key: cfg.comicvine.api_key.clone(),
            rate_delay: Duration::from_secs_f64(cfg.behavior.rate_delay),
        })
    }

    /// Execute one authenticated GET against `path` (e.g. `"issues/"`).
    ///
    /// `api_key` and `format=json` are added to whatever params the caller
    /// supplies. Consumes one unit of remote rate budget per call; sleeps
    /// `rate_delay` after a successful response before returning.
    pub async fn search(&self, path: &str, extra: &[(&str, String)]) -> Result<Envelope, SyncError> {
        let url = format!("{}/{}", self.base_url, path.trim_matches('/'));
        let mut query: Vec<(&str, String)> = vec![
            ("api_key", self.api_key.clone()),
            ("format", "json".to_string()),
        ];
        query.extend(extra.iter().map(|(k, v)| (*k, v.clone())));

        let response = self.client.get(&url).query(&query).send().await?;
        let response = response.error_for_status()?;
        let body = response.text().await?;
        let envelope: Envelope = serde_json::from_str(&body)?;
        if envelope.status_code != STATUS_OK {
            return Err(SyncError::Remote {
                code: envelope.status_code,
                message: envelope.error.clone(),
            });
        }
        sleep(self.rate_delay).await;
        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_parses_success() {
        let body = r#"{
            "status_code": 1,
            "error": "OK",
            "number_of_total_results": 2470,
            "results": [{"id": 9, "volume": {"id": 2127, "name": "Untold Tales"}}]
        }"#;
        let env: Envelope = serde_json::from_str(body).unwrap();
        assert_eq!(env.status_code, 1);
        assert_eq!(env.number_of_total_results, 2470);
        assert!(env.results.is_array());
    }

    #[test]
    fn test_envelope_defaults_for_missing_fields() {
        let env: Envelope = serde_json::from_str("{}").unwrap();
        assert_eq!(env.status_code, 0);
        assert!(env.error.is_empty());
        assert!(env.results.is_null());
    }

    #[test]
    fn test_start_year_accepts_string_and_number() {
        let detail: VolumeDetail =
            serde_json::from_str(r#"{"id": 2127, "start_year": "2001"}"#).unwrap();
        assert_eq!(detail.start_year_value(), Some(2001));

        let detail: VolumeDetail =
            serde_json::from_str(r#"{"id": 2127, "start_year": 1995}"#).unwrap();
        assert_eq!(detail.start_year_value(), Some(1995));

        let detail: VolumeDetail =
            serde_json::from_str(r#"{"id": 2127, "start_year": null}"#).unwrap();
        assert_eq!(detail.start_year_value(), None);

        let detail: VolumeDetail =
            serde_json::from_str(r#"{"id": 2127, "start_year": "unknown"}"#).unwrap();
        assert_eq!(detail.start_year_value(), None);
    }

    #[test]
    fn test_volume_comic_id() {
        assert_eq!(volume_comic_id(2127), "4050-2127");
    }
}
