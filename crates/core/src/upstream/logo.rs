use super::{HttpUpstream, UpstreamError};
use crate::config::Settings;
use anyhow::Context;
use reqwest::Url;

const DEFAULT_CONTENT_TYPE: &str = "image/png";

#[derive(Debug, Clone, PartialEq)]
pub enum LogoOutcome {
    Image { bytes: Vec<u8>, content_type: String },
    /// The logo service could not serve the domain; send the caller here instead.
    Fallback(String),
}

#[derive(Debug, Clone)]
pub struct LogoClient {
    upstream: HttpUpstream,
    token: Option<String>,
    fallback_base_url: Url,
}

impl LogoClient {
    pub fn new(
        upstream: HttpUpstream,
        token: Option<String>,
        fallback_base_url: &str,
    ) -> Result<Self, UpstreamError> {
        let fallback_base_url = Url::parse(fallback_base_url.trim_end_matches('/'))
            .map_err(|e| UpstreamError::InvalidUrl(format!("{fallback_base_url}: {e}")))?;
        if fallback_base_url.cannot_be_a_base() {
            return Err(UpstreamError::InvalidUrl(fallback_base_url.to_string()));
        }
        Ok(Self {
            upstream,
            token,
            fallback_base_url,
        })
    }

    pub fn from_settings(settings: &Settings, http: reqwest::Client) -> anyhow::Result<Self> {
        Self::new(
            HttpUpstream::new(http, &settings.logo_base_url, 1),
            settings.logo_api_token.clone(),
            &settings.logo_fallback_url,
        )
        .context("LOGO_FALLBACK_URL is invalid")
    }

    /// `{fallback}/{domain}?size=128` with the domain percent-encoded as a
    /// single path segment, so the result is always a valid `Location`.
    pub fn fallback_url(&self, domain: &str) -> String {
        let mut url = self.fallback_base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(domain.trim());
        }
        url.set_query(Some("size=128"));
        url.into()
    }

    /// Never fails: any problem with the primary service yields the fallback.
    pub async fn fetch(&self, domain: &str) -> LogoOutcome {
        let Some(token) = self.token.as_deref() else {
            return LogoOutcome::Fallback(self.fallback_url(domain));
        };

        match self.fetch_image(domain, token).await {
            Ok((bytes, content_type)) => LogoOutcome::Image {
                bytes,
                content_type,
            },
            Err(err) => {
                tracing::warn!(domain, error = %err, "logo fetch failed; using fallback");
                LogoOutcome::Fallback(self.fallback_url(domain))
            }
        }
    }

    async fn fetch_image(&self, domain: &str, token: &str) -> Result<(Vec<u8>, String), UpstreamError> {
        let url = self.upstream.url(&[domain.trim()])?;
        let res = self
            .upstream
            .http()
            .get(url)
            .query(&[("token", token)])
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body: None,
            });
        }

        let content_type = res
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();
        let bytes = res.bytes().await?.to_vec();
        Ok((bytes, content_type))
    }
}
