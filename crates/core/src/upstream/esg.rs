use super::{HttpUpstream, UpstreamError};
use crate::config::Settings;
use serde_json::Value;

/// Read access to the ESG ratings service.
#[async_trait::async_trait]
pub trait EsgDataSource: Send + Sync {
    /// Raw `/api/esg/{TICKER}` body.
    async fn history(&self, ticker: &str) -> Result<Value, UpstreamError>;

    async fn all_companies(&self) -> Result<Value, UpstreamError>;

    async fn level_a(&self) -> Result<Value, UpstreamError>;

    /// Raw prediction body for lags ordered most recent first.
    async fn predict(&self, lags: [f64; 3]) -> Result<Value, UpstreamError>;
}

#[derive(Debug, Clone)]
pub struct EsgApiClient {
    upstream: HttpUpstream,
}

impl EsgApiClient {
    pub fn new(upstream: HttpUpstream) -> Self {
        Self { upstream }
    }

    pub fn from_settings(settings: &Settings, http: reqwest::Client) -> anyhow::Result<Self> {
        let base_url = settings.require_esg_api_base_url()?;
        Ok(Self::new(HttpUpstream::new(
            http,
            base_url,
            settings.upstream_retries,
        )))
    }
}

#[async_trait::async_trait]
impl EsgDataSource for EsgApiClient {
    async fn history(&self, ticker: &str) -> Result<Value, UpstreamError> {
        let ticker = ticker.trim().to_ascii_uppercase();
        self.upstream.get_json(&["api", "esg", &ticker], &[]).await
    }

    async fn all_companies(&self) -> Result<Value, UpstreamError> {
        self.upstream.get_json(&["api", "all"], &[]).await
    }

    async fn level_a(&self) -> Result<Value, UpstreamError> {
        self.upstream
            .get_json(&["api", "search", "level", "total_level", "A"], &[])
            .await
    }

    async fn predict(&self, lags: [f64; 3]) -> Result<Value, UpstreamError> {
        let [lag_1, lag_2, lag_3] = lags;
        self.upstream
            .get_json(
                &["api", "predict"],
                &[
                    ("lag_1", lag_1.to_string()),
                    ("lag_2", lag_2.to_string()),
                    ("lag_3", lag_3.to_string()),
                ],
            )
            .await
    }
}
