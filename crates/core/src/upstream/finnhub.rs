use super::{HttpUpstream, UpstreamError};
use crate::charts::service::CompanySearch;
use crate::config::Settings;
use crate::import::validate::{TickerCheck, TickerValidator};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;

/// Finnhub accepts the key as a header, which keeps it out of URLs and logs.
const TOKEN_HEADER: &str = "x-finnhub-token";

/// Finnhub-compatible company search and profile lookups.
#[derive(Debug, Clone)]
pub struct FinnhubClient {
    upstream: HttpUpstream,
    api_key: Option<String>,
}

impl FinnhubClient {
    pub fn new(upstream: HttpUpstream, api_key: Option<String>) -> Self {
        Self { upstream, api_key }
    }

    pub fn from_settings(settings: &Settings, http: reqwest::Client) -> Self {
        if settings.finnhub_api_key.is_none() {
            tracing::warn!("FINNHUB_API_KEY is not set; company search and ticker validation will fail");
        }
        Self::new(
            HttpUpstream::new(http, &settings.finnhub_base_url, settings.upstream_retries),
            settings.finnhub_api_key.clone(),
        )
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn auth_headers(&self) -> Result<HeaderMap, UpstreamError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or(UpstreamError::NotConfigured("FINNHUB_API_KEY"))?;
        let mut value = HeaderValue::from_str(key)
            .map_err(|_| UpstreamError::InvalidHeader("FINNHUB_API_KEY"))?;
        value.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static(TOKEN_HEADER), value);
        Ok(headers)
    }

    pub async fn search(&self, query: &str) -> Result<Value, UpstreamError> {
        let headers = self.auth_headers()?;
        self.upstream
            .get_json_with_headers(&["search"], &[("q", query.to_string())], headers)
            .await
    }

    pub async fn profile(&self, symbol: &str) -> Result<Value, UpstreamError> {
        let headers = self.auth_headers()?;
        self.upstream
            .get_json_with_headers(
                &["stock", "profile2"],
                &[("symbol", symbol.to_string())],
                headers,
            )
            .await
    }
}

/// A profile body identifies a real company when it is a non-empty object
/// without an `error` field.
pub fn is_valid_profile(body: &Value) -> bool {
    match body.as_object() {
        Some(obj) => !obj.is_empty() && !obj.contains_key("error"),
        None => false,
    }
}

#[async_trait::async_trait]
impl TickerValidator for FinnhubClient {
    async fn check(&self, ticker: &str) -> anyhow::Result<TickerCheck> {
        match self.profile(ticker).await {
            Ok(body) if is_valid_profile(&body) => Ok(TickerCheck::Valid),
            Ok(_) => Ok(TickerCheck::Unknown),
            // Finnhub answers unknown symbols with an error body on some plans.
            Err(UpstreamError::Status { status, body }) if status < 500 => {
                tracing::debug!(ticker, status, ?body, "profile lookup rejected ticker");
                Ok(TickerCheck::Unknown)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait::async_trait]
impl CompanySearch for FinnhubClient {
    async fn search_companies(&self, query: &str) -> Result<Value, UpstreamError> {
        self.search(query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, key: Option<&str>) -> FinnhubClient {
        FinnhubClient::new(
            HttpUpstream::new(reqwest::Client::new(), server.uri(), 1),
            key.map(str::to_string),
        )
    }

    #[test]
    fn profile_validity() {
        assert!(is_valid_profile(&json!({"name": "Apple Inc", "ticker": "AAPL"})));
        assert!(!is_valid_profile(&json!({})));
        assert!(!is_valid_profile(&json!({"error": "limit"})));
        assert!(!is_valid_profile(&json!(null)));
        assert!(!is_valid_profile(&json!([1])));
    }

    #[tokio::test]
    async fn search_requires_api_key() {
        let server = MockServer::start().await;
        let err = client(&server, None).search("apple").await.unwrap_err();
        assert!(matches!(err, UpstreamError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn check_maps_profiles_to_outcomes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/stock/profile2"))
            .and(query_param("symbol", "AAPL"))
            .and(header("X-Finnhub-Token", "k"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "Apple"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/stock/profile2"))
            .and(query_param("symbol", "TOTAL"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let c = client(&server, Some("k"));
        assert_eq!(c.check("AAPL").await.unwrap(), TickerCheck::Valid);
        assert_eq!(c.check("TOTAL").await.unwrap(), TickerCheck::Unknown);
    }

    #[tokio::test]
    async fn key_travels_in_header_not_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "apple"))
            .and(header("X-Finnhub-Token", "SECRET_KEY_123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": []})))
            .expect(1)
            .mount(&server)
            .await;

        client(&server, Some("SECRET_KEY_123"))
            .search("apple")
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        assert!(requests
            .iter()
            .all(|r| !r.url.as_str().contains("SECRET_KEY_123")));
    }

    #[tokio::test]
    async fn failed_lookup_does_not_reveal_key() {
        let c = FinnhubClient::new(
            HttpUpstream::new(reqwest::Client::new(), "http://127.0.0.1:9", 1),
            Some("SECRET_KEY_123".to_string()),
        );
        let err = c.search("apple").await.unwrap_err();
        assert!(!err.to_string().contains("SECRET_KEY_123"));

        let err = c.check("AAPL").await.unwrap_err();
        assert!(!format!("{err:#}").contains("SECRET_KEY_123"));
    }
}
