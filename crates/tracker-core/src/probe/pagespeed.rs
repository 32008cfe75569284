//! PageSpeed Insights v5 client

use super::{async_trait, DecodeError, Probe, ProbeError};
use crate::models::{MeasurementSample, MetricKey, MetricReading, Strategy};
use anyhow::{Context, Result};
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_ENDPOINT: &str = "https://www.googleapis.com/pagespeedonline/v5/runPagespeed";

/// Configuration for the PageSpeed client
#[derive(Debug, Clone)]
pub struct PageSpeedConfig {
    /// Full `runPagespeed` URL
    pub endpoint: String,
    /// Whole-request timeout; a Lighthouse run routinely takes 20-40s
    pub timeout: Duration,
}

impl Default for PageSpeedConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: Duration::from_secs(90),
        }
    }
}

/// Probe backed by the PageSpeed Insights API
pub struct PageSpeedClient {
    client: Client,
    config: PageSpeedConfig,
}

impl PageSpeedClient {
    pub fn new(config: PageSpeedConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, config })
    }
}

#[async_trait]
impl Probe for PageSpeedClient {
    async fn fetch_sample(
        &self,
        url: &str,
        strategy: Strategy,
        api_key: &str,
    ) -> Result<MeasurementSample, ProbeError> {
        debug!(url = %url, strategy = %strategy, "Requesting PageSpeed run");

        let response = self
            .client
            .get(&self.config.endpoint)
            .query(&[
                ("url", url),
                ("key", api_key),
                ("strategy", strategy.as_str()),
                ("category", "performance"),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            let message = upstream_error_message(&body)
                .unwrap_or_else(|| format!("Request failed with status {}", status.as_u16()));
            return Err(ProbeError::Http {
                status: status.as_u16(),
                message,
            });
        }

        Ok(decode_response(&body)?)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PsiResponse {
    lighthouse_result: Option<LighthouseResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LighthouseResult {
    fetch_time: Option<String>,
    categories: Option<Categories>,
    audits: Option<HashMap<String, Audit>>,
}

#[derive(Debug, Deserialize)]
struct Categories {
    performance: Option<Category>,
}

#[derive(Debug, Deserialize)]
struct Category {
    score: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Audit {
    numeric_value: Option<Value>,
    score: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

fn upstream_error_message(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<ErrorEnvelope>(body)
        .ok()?
        .error?
        .message
        .filter(|m| !m.is_empty())
}

/// Decode a `runPagespeed` response body into a sample
///
/// Requires a numeric performance score and a numeric `numericValue` for all
/// five metric audits. Audit scores that are absent count as 0.
pub fn decode_response(body: &[u8]) -> Result<MeasurementSample, DecodeError> {
    let response: PsiResponse =
        serde_json::from_slice(body).map_err(|e| DecodeError::Malformed(e.to_string()))?;

    let result = response
        .lighthouse_result
        .ok_or_else(|| DecodeError::Malformed("missing lighthouseResult".to_string()))?;

    let performance_score = result
        .categories
        .and_then(|c| c.performance)
        .and_then(|p| p.score)
        .and_then(|s| s.as_f64())
        .ok_or(DecodeError::MissingPerformanceScore)?;

    let audits = result
        .audits
        .ok_or_else(|| DecodeError::Malformed("missing audits".to_string()))?;

    let mut metrics = BTreeMap::new();
    for key in MetricKey::ALL {
        let audit = audits
            .get(key.audit_id())
            .ok_or(DecodeError::MissingMetric(key))?;
        let value = match &audit.numeric_value {
            None | Some(Value::Null) => return Err(DecodeError::MissingMetric(key)),
            Some(v) => v.as_f64().ok_or(DecodeError::NonNumericMetric(key))?,
        };
        let score = audit
            .score
            .as_ref()
            .and_then(Value::as_f64)
            .map(|s| s * 100.0)
            .unwrap_or(0.0);
        metrics.insert(key, MetricReading { value, score });
    }

    Ok(MeasurementSample {
        timestamp: Utc::now(),
        performance_score: performance_score * 100.0,
        metrics,
        source_fetch_time: result.fetch_time.filter(|t| !t.is_empty()),
    })
}
