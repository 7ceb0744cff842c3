pub mod backend;
pub mod esg;
pub mod finnhub;
pub mod logo;
pub mod ocr;
pub mod stocks;

use crate::config::Settings;
use anyhow::Context;
use reqwest::header::HeaderMap;
use reqwest::Url;
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("upstream responded with HTTP {status}")]
    Status { status: u16, body: Option<Value> },

    /// The wrapped error never carries the request URL, which may hold a key.
    #[error("upstream request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("upstream response is not valid JSON: {0}")]
    Decode(String),

    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("invalid upstream url: {0}")]
    InvalidUrl(String),

    #[error("{0} is not a valid header value")]
    InvalidHeader(&'static str),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        UpstreamError::Transport(err.without_url())
    }
}

impl UpstreamError {
    /// Upstream HTTP status, when the failure was a non-success response.
    pub fn status(&self) -> Option<u16> {
        match self {
            UpstreamError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The `message` field of a JSON error body, if the upstream sent one.
    pub fn message(&self) -> Option<&str> {
        match self {
            UpstreamError::Status {
                body: Some(body), ..
            } => body.get("message").and_then(Value::as_str),
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            UpstreamError::Status { status, .. } => *status >= 500,
            UpstreamError::Transport(_) => true,
            _ => false,
        }
    }
}

/// Longest backoff is `250ms << MAX_BACKOFF_SHIFT`.
const MAX_BACKOFF_SHIFT: u32 = 5;

fn backoff(attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(MAX_BACKOFF_SHIFT);
    Duration::from_millis(250u64 << shift)
}

pub fn build_http_client(settings: &Settings) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(settings.upstream_timeout)
        .build()
        .context("failed to build upstream http client")
}

/// One upstream base URL plus the shared client used to reach it.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    http: reqwest::Client,
    base_url: String,
    retries: u32,
}

impl HttpUpstream {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, retries: u32) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            retries: retries.max(1),
        }
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Joins percent-encoded path segments onto the base URL, keeping any
    /// path prefix the base already carries.
    pub fn url(&self, segments: &[&str]) -> Result<Url, UpstreamError> {
        let mut url = Url::parse(self.base_url.trim_end_matches('/'))
            .map_err(|e| UpstreamError::InvalidUrl(format!("{}: {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|_| UpstreamError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub async fn get_json(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> Result<Value, UpstreamError> {
        self.get_json_with_headers(segments, query, HeaderMap::new())
            .await
    }

    /// [`get_json`](Self::get_json) with extra request headers, e.g. an API key
    /// that must stay out of the URL.
    pub async fn get_json_with_headers(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
        headers: HeaderMap,
    ) -> Result<Value, UpstreamError> {
        let url = self.url(segments)?;
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.get_json_once(url.clone(), query, headers.clone()).await {
                Ok(v) => return Ok(v),
                Err(err) => {
                    if attempt >= self.retries || !err.is_retryable() {
                        return Err(err);
                    }
                    let backoff = backoff(attempt);
                    tracing::warn!(attempt, ?backoff, %url, error = %err, "upstream fetch failed; retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    async fn get_json_once(
        &self,
        url: Url,
        query: &[(&str, String)],
        headers: HeaderMap,
    ) -> Result<Value, UpstreamError> {
        let res = self.http.get(url).query(query).headers(headers).send().await?;
        read_json(res).await
    }
}

/// Reads a response body as JSON, turning non-success statuses into
/// [`UpstreamError::Status`] with whatever JSON body came along.
pub async fn read_json(res: reqwest::Response) -> Result<Value, UpstreamError> {
    let status = res.status();
    let text = res.text().await?;

    if !status.is_success() {
        return Err(UpstreamError::Status {
            status: status.as_u16(),
            body: serde_json::from_str::<Value>(&text).ok(),
        });
    }

    serde_json::from_str::<Value>(&text).map_err(|e| UpstreamError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn upstream(base: &str, retries: u32) -> HttpUpstream {
        HttpUpstream::new(reqwest::Client::new(), base, retries)
    }

    #[test]
    fn url_keeps_base_prefix_and_encodes_segments() {
        let u = upstream("https://example.com/prod/", 1);
        let url = u.url(&["api", "esg", "BRK B"]).unwrap();
        assert_eq!(url.as_str(), "https://example.com/prod/api/esg/BRK%20B");
    }

    #[tokio::test]
    async fn get_json_returns_body_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/all"))
            .and(query_param("q", "x"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .expect(1)
            .mount(&server)
            .await;

        let v = upstream(&server.uri(), 1)
            .get_json(&["api", "all"], &[("q", "x".to_string())])
            .await
            .unwrap();
        assert_eq!(v, json!({"data": []}));
    }

    #[tokio::test]
    async fn non_success_carries_status_and_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({"message": "no such ticker"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let err = upstream(&server.uri(), 3)
            .get_json(&["api", "esg", "ZZZZ"], &[])
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.message(), Some("no such ticker"));
    }

    #[tokio::test]
    async fn retries_server_errors_up_to_the_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;

        let err = upstream(&server.uri(), 2)
            .get_json(&["api", "all"], &[])
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(503));
    }

    #[tokio::test]
    async fn invalid_json_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = upstream(&server.uri(), 1)
            .get_json(&["x"], &[])
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::Decode(_)));
    }

    #[test]
    fn backoff_doubles_then_caps() {
        assert_eq!(backoff(1), Duration::from_millis(250));
        assert_eq!(backoff(2), Duration::from_millis(500));
        assert_eq!(backoff(6), Duration::from_millis(8000));
        assert_eq!(backoff(7), Duration::from_millis(8000));
        assert_eq!(backoff(u32::MAX), Duration::from_millis(8000));
    }

    #[tokio::test]
    async fn transport_errors_do_not_echo_the_url() {
        let err = upstream("http://127.0.0.1:9", 1)
            .get_json(&["search"], &[("token", "SECRET_KEY_123".to_string())])
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::Transport(_)));
        let plain = err.to_string();
        let chain = format!("{:#}", anyhow::Error::new(err));
        assert!(!plain.contains("SECRET_KEY_123"), "{plain}");
        assert!(!chain.contains("SECRET_KEY_123"), "{chain}");
    }
}
