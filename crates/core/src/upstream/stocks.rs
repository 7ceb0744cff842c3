use super::{HttpUpstream, UpstreamError};
use crate::config::Settings;
use serde_json::Value;

/// Historical quotes from the stock API.
#[derive(Debug, Clone)]
pub struct StockQuoteClient {
    upstream: HttpUpstream,
}

impl StockQuoteClient {
    pub fn new(upstream: HttpUpstream) -> Self {
        Self { upstream }
    }

    pub fn from_settings(settings: &Settings, http: reqwest::Client) -> anyhow::Result<Self> {
        let base_url = settings.require_stock_api_base_url()?;
        Ok(Self::new(HttpUpstream::new(
            http,
            base_url,
            settings.upstream_retries,
        )))
    }

    /// Closing price on `date` (`YYYY-MM-DD`), `None` when the API has no point
    /// for that day.
    pub async fn historical_close(
        &self,
        ticker: &str,
        date: &str,
    ) -> Result<Option<f64>, UpstreamError> {
        let ticker = ticker.trim().to_ascii_lowercase();
        let body = self
            .upstream
            .get_json(&["stocks", "historicalSingular", &ticker, date], &[])
            .await?;
        Ok(body
            .get("historicalPoint")
            .and_then(|p| p.get("close"))
            .and_then(Value::as_f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn reads_close_from_historical_point() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/stocks/historicalSingular/aapl/2024-01-02"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"historicalPoint": {"close": 185.64}})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/stocks/historicalSingular/aapl/2024-01-01"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"historicalPoint": null})))
            .mount(&server)
            .await;

        let c = StockQuoteClient::new(HttpUpstream::new(reqwest::Client::new(), server.uri(), 1));
        assert_eq!(c.historical_close("AAPL", "2024-01-02").await.unwrap(), Some(185.64));
        assert_eq!(c.historical_close("AAPL", "2024-01-01").await.unwrap(), None);
    }
}
