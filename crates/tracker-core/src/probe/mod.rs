//! Measurement probes
//!
//! A probe fetches one [`MeasurementSample`] for a URL and strategy. The
//! scheduler treats every failure the same way; the error kinds exist so the
//! recorded message says what went wrong.

mod pagespeed;

pub use pagespeed::{decode_response, PageSpeedClient, PageSpeedConfig, DEFAULT_ENDPOINT};

use crate::models::{MeasurementSample, MetricKey, Strategy};
use thiserror::Error;

pub use async_trait::async_trait;

/// Shape problems in an upstream response
#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    #[error("Unexpected API response shape: {0}")]
    Malformed(String),
    #[error("Unexpected API response shape: missing performance score")]
    MissingPerformanceScore,
    #[error("Metric {} missing from response", .0.label())]
    MissingMetric(MetricKey),
    #[error("Metric {} has a non-numeric value", .0.label())]
    NonNumericMetric(MetricKey),
}

/// Failure of a single probe
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("{message}")]
    Http { status: u16, message: String },
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Collaborator that measures a URL once
#[async_trait]
pub trait Probe: Send + Sync {
    async fn fetch_sample(
        &self,
        url: &str,
        strategy: Strategy,
        api_key: &str,
    ) -> Result<MeasurementSample, ProbeError>;
}
