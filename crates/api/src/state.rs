use esgdash_core::cache::TtlCache;
use esgdash_core::charts::service::ChartService;
use esgdash_core::config::Settings;
use esgdash_core::import::validate::ValidationOptions;
use esgdash_core::import::ImportPipeline;
use esgdash_core::prediction::PredictionService;
use esgdash_core::upstream::backend::BackendClient;
use esgdash_core::upstream::esg::{EsgApiClient, EsgDataSource};
use esgdash_core::upstream::finnhub::FinnhubClient;
use esgdash_core::upstream::logo::LogoClient;
use esgdash_core::upstream::ocr::HttpOcrEngine;
use esgdash_core::upstream::stocks::StockQuoteClient;
use esgdash_core::upstream::build_http_client;
use std::sync::Arc;

/// Upstream clients and services shared by every handler. Services whose
/// upstream is not configured are `None` and their routes answer 503.
#[derive(Clone)]
pub struct AppState {
    pub esg: Option<Arc<dyn EsgDataSource>>,
    pub finnhub: Arc<FinnhubClient>,
    pub logo: LogoClient,
    pub predictions: Option<PredictionService>,
    pub charts: Option<ChartService>,
    pub backend: Option<Arc<BackendClient>>,
    pub import: Option<ImportPipeline>,
}

impl AppState {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let http = build_http_client(settings)?;

        let finnhub = Arc::new(FinnhubClient::from_settings(settings, http.clone()));
        let logo = LogoClient::from_settings(settings, http.clone())?;

        let esg: Option<Arc<dyn EsgDataSource>> =
            match EsgApiClient::from_settings(settings, http.clone()) {
                Ok(client) => Some(Arc::new(client)),
                Err(e) => {
                    tracing::error!(error = %e, "ESG routes disabled");
                    None
                }
            };

        let stocks = match StockQuoteClient::from_settings(settings, http.clone()) {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!(error = %e, "finance series disabled");
                None
            }
        };

        let predictions = esg.clone().map(|esg| {
            PredictionService::new(
                esg,
                Arc::new(TtlCache::new(
                    settings.prediction_cache_capacity,
                    settings.prediction_cache_ttl,
                )),
            )
        });

        let charts = esg.clone().map(|esg| {
            ChartService::new(
                esg,
                finnhub.clone(),
                stocks,
                Arc::new(TtlCache::new(
                    settings.finance_cache_capacity,
                    settings.finance_cache_ttl,
                )),
                settings.chart_concurrency,
            )
        });

        let backend = match BackendClient::from_settings(settings, http.clone()) {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                tracing::error!(error = %e, "auth and portfolio routes disabled");
                None
            }
        };

        let import = match HttpOcrEngine::from_settings(settings, http) {
            Ok(ocr) => Some(ImportPipeline::new(
                Arc::new(ocr),
                finnhub.clone(),
                ValidationOptions::from_settings(settings),
            )),
            Err(e) => {
                tracing::warn!(error = %e, "portfolio import disabled");
                None
            }
        };

        Ok(Self {
            esg,
            finnhub,
            logo,
            predictions,
            charts,
            backend,
            import,
        })
    }
}
