pub mod auth;
pub mod cache;
pub mod charts;
pub mod domain;
pub mod import;
pub mod portfolio;
pub mod prediction;
pub mod task;
pub mod time;
pub mod upstream;

pub mod config {
    use anyhow::Context;
    use std::time::Duration;

    const DEFAULT_FINNHUB_BASE_URL: &str = "https://finnhub.io/api/v1";
    const DEFAULT_LOGO_BASE_URL: &str = "https://img.logo.dev";
    const DEFAULT_LOGO_FALLBACK_URL: &str = "https://logo.clearbit.com";

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub esg_api_base_url: Option<String>,
        pub backend_base_url: Option<String>,
        pub finnhub_base_url: String,
        pub finnhub_api_key: Option<String>,
        pub stock_api_base_url: Option<String>,
        pub logo_base_url: String,
        pub logo_api_token: Option<String>,
        pub logo_fallback_url: String,
        pub ocr_base_url: Option<String>,
        pub ocr_api_key: Option<String>,
        pub sentry_dsn: Option<String>,
        pub upstream_timeout: Duration,
        pub upstream_retries: u32,
        pub prediction_cache_ttl: Duration,
        pub prediction_cache_capacity: usize,
        pub finance_cache_ttl: Duration,
        pub finance_cache_capacity: usize,
        pub chart_concurrency: usize,
        pub validation_concurrency: usize,
        pub validation_timeout: Duration,
    }

    impl Default for Settings {
        fn default() -> Self {
            Self {
                esg_api_base_url: None,
                backend_base_url: None,
                finnhub_base_url: DEFAULT_FINNHUB_BASE_URL.to_string(),
                finnhub_api_key: None,
                stock_api_base_url: None,
                logo_base_url: DEFAULT_LOGO_BASE_URL.to_string(),
                logo_api_token: None,
                logo_fallback_url: DEFAULT_LOGO_FALLBACK_URL.to_string(),
                ocr_base_url: None,
                ocr_api_key: None,
                sentry_dsn: None,
                upstream_timeout: Duration::from_secs(30),
                upstream_retries: 1,
                prediction_cache_ttl: Duration::from_secs(30 * 60),
                prediction_cache_capacity: 1024,
                finance_cache_ttl: Duration::from_secs(24 * 60 * 60),
                finance_cache_capacity: 256,
                chart_concurrency: 4,
                validation_concurrency: 4,
                validation_timeout: Duration::from_secs(10),
            }
        }
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            let defaults = Self::default();
            Ok(Self {
                esg_api_base_url: non_empty_var("ESG_API_BASE_URL"),
                backend_base_url: non_empty_var("BACKEND_BASE_URL"),
                finnhub_base_url: non_empty_var("FINNHUB_BASE_URL")
                    .unwrap_or(defaults.finnhub_base_url),
                finnhub_api_key: non_empty_var("FINNHUB_API_KEY"),
                stock_api_base_url: non_empty_var("STOCK_API_BASE_URL"),
                logo_base_url: non_empty_var("LOGO_BASE_URL").unwrap_or(defaults.logo_base_url),
                logo_api_token: non_empty_var("LOGO_API_TOKEN"),
                logo_fallback_url: non_empty_var("LOGO_FALLBACK_URL")
                    .unwrap_or(defaults.logo_fallback_url),
                ocr_base_url: non_empty_var("OCR_BASE_URL"),
                ocr_api_key: non_empty_var("OCR_API_KEY"),
                sentry_dsn: non_empty_var("SENTRY_DSN"),
                upstream_timeout: secs_var("UPSTREAM_TIMEOUT_SECS")?
                    .unwrap_or(defaults.upstream_timeout),
                upstream_retries: parsed_var("UPSTREAM_RETRIES")?
                    .unwrap_or(defaults.upstream_retries)
                    .max(1),
                prediction_cache_ttl: secs_var("PREDICTION_CACHE_TTL_SECS")?
                    .unwrap_or(defaults.prediction_cache_ttl),
                prediction_cache_capacity: parsed_var("PREDICTION_CACHE_CAPACITY")?
                    .unwrap_or(defaults.prediction_cache_capacity),
                finance_cache_ttl: secs_var("FINANCE_CACHE_TTL_SECS")?
                    .unwrap_or(defaults.finance_cache_ttl),
                finance_cache_capacity: parsed_var("FINANCE_CACHE_CAPACITY")?
                    .unwrap_or(defaults.finance_cache_capacity),
                chart_concurrency: parsed_var("CHART_CONCURRENCY")?
                    .unwrap_or(defaults.chart_concurrency)
                    .max(1),
                validation_concurrency: parsed_var("VALIDATION_CONCURRENCY")?
                    .unwrap_or(defaults.validation_concurrency)
                    .max(1),
                validation_timeout: secs_var("VALIDATION_TIMEOUT_SECS")?
                    .unwrap_or(defaults.validation_timeout),
            })
        }

        pub fn require_esg_api_base_url(&self) -> anyhow::Result<&str> {
            self.esg_api_base_url
                .as_deref()
                .context("ESG_API_BASE_URL is required")
        }

        pub fn require_backend_base_url(&self) -> anyhow::Result<&str> {
            self.backend_base_url
                .as_deref()
                .context("BACKEND_BASE_URL is required")
        }

        pub fn require_stock_api_base_url(&self) -> anyhow::Result<&str> {
            self.stock_api_base_url
                .as_deref()
                .context("STOCK_API_BASE_URL is required")
        }

        pub fn require_ocr_base_url(&self) -> anyhow::Result<&str> {
            self.ocr_base_url
                .as_deref()
                .context("OCR_BASE_URL is required")
        }
    }

    fn non_empty_var(key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|s| !s.trim().is_empty())
    }

    fn parsed_var<T: std::str::FromStr>(key: &str) -> anyhow::Result<Option<T>> {
        match non_empty_var(key) {
            Some(raw) => raw
                .trim()
                .parse::<T>()
                .map(Some)
                .map_err(|_| anyhow::anyhow!("{key} has an invalid value: {raw}")),
            None => Ok(None),
        }
    }

    fn secs_var(key: &str) -> anyhow::Result<Option<Duration>> {
        Ok(parsed_var::<u64>(key)?.map(Duration::from_secs))
    }

}
