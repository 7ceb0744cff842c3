use super::{read_json, HttpUpstream, UpstreamError};
use crate::config::Settings;
use crate::import::OcrEngine;
use anyhow::Context;
use serde_json::Value;

/// OCR service reached over HTTP: the image is posted as the raw request body
/// and the recognised text comes back as `{ "text": "..." }`.
#[derive(Debug, Clone)]
pub struct HttpOcrEngine {
    upstream: HttpUpstream,
    api_key: Option<String>,
}

impl HttpOcrEngine {
    pub fn new(upstream: HttpUpstream, api_key: Option<String>) -> Self {
        Self { upstream, api_key }
    }

    pub fn from_settings(settings: &Settings, http: reqwest::Client) -> anyhow::Result<Self> {
        let base_url = settings.require_ocr_base_url()?;
        Ok(Self::new(
            HttpUpstream::new(http, base_url, 1),
            settings.ocr_api_key.clone(),
        ))
    }
}

#[async_trait::async_trait]
impl OcrEngine for HttpOcrEngine {
    async fn recognize(&self, image: Vec<u8>, content_type: &str) -> anyhow::Result<String> {
        let url = self.upstream.url(&["ocr"])?;
        let mut req = self
            .upstream
            .http()
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(image);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let res = req
            .send()
            .await
            .map_err(UpstreamError::from)
            .context("OCR request failed")?;
        let body = read_json(res).await.context("OCR service error")?;
        body.get("text")
            .and_then(Value::as_str)
            .map(str::to_string)
            .context("OCR response has no text field")
    }
}
