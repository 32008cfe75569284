//! API client for communicating with the tracker daemon

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// API client for the tracker daemon
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).context("Invalid path")
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .client
            .get(self.url(path)?)
            .send()
            .await
            .context("Failed to send request")?;

        parse(response).await
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let response = self
            .client
            .post(self.url(path)?)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        parse(response).await
    }

    /// Make a PUT request with JSON body
    pub async fn put<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let response = self
            .client
            .put(self.url(path)?)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        parse(response).await
    }

    /// Make a DELETE request with query parameters, discarding any body
    pub async fn delete(&self, path: &str, query: &[(&str, &str)]) -> Result<()> {
        let mut url = self.url(path)?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }

        let response = self
            .client
            .delete(url)
            .send()
            .await
            .context("Failed to send request")?;

        check(response).await.map(|_| ())
    }
}

/// Turn a non-success status into an error carrying the daemon's message
async fn check(response: Response) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|e| e.error)
        .unwrap_or(body);
    anyhow::bail!("API error ({}): {}", status, message);
}

async fn parse<T: DeserializeOwned>(response: Response) -> Result<T> {
    check(response)
        .await?
        .json()
        .await
        .context("Failed to parse response")
}

// API response types

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSummary {
    pub mean_value: f64,
    pub mean_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub samples: usize,
    pub mean_score: f64,
    pub std_dev: f64,
    pub ci95_half_width: Option<f64>,
    pub latest_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metrics: BTreeMap<String, MetricSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerView {
    pub url: String,
    pub label: Option<String>,
    pub running: bool,
    pub in_flight: bool,
    pub phase: String,
    pub active_strategy: Option<String>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub pause_reason: Option<String>,
    #[serde(default)]
    pub auto_pause_armed: bool,
    pub mobile: Option<Summary>,
    pub desktop: Option<Summary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contribution {
    pub score: f64,
    pub points: f64,
    pub max_points: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricColumn {
    pub mean_value: f64,
    pub mean_score: f64,
    pub percentile: f64,
    pub contribution: Option<Contribution>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonRow {
    pub url: String,
    pub label: Option<String>,
    pub strategy: String,
    pub samples: usize,
    pub mean_score: Option<f64>,
    pub ci95_half_width: Option<f64>,
    pub score_percentile: Option<f64>,
    pub baseline_delta: Option<f64>,
    #[serde(default)]
    pub is_baseline: bool,
    #[serde(default)]
    pub metrics: BTreeMap<String, MetricColumn>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonReport {
    pub baseline: Option<String>,
    pub sort: serde_json::Value,
    pub rows: Vec<ComparisonRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsResponse {
    pub api_key_set: bool,
    pub poll_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsRequest {
    pub api_key: String,
    pub poll_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AddTrackerRequest {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UrlRequest {
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MoveRequest {
    pub url: String,
    pub index: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BaselineRequest {
    pub url: Option<String>,
}
