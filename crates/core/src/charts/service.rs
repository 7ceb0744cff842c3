use super::{
    company_series, factor_series, group_company_series, level_a_companies, level_series,
    trend_series, CompanySeries, FactorPoint, FinancePoint, LevelPoint, TrendPoint,
};
use crate::cache::{Cache, CacheEntry};
use crate::domain::esg::{parse_company_records, parse_search_tickers, EsgHistory, LevelACompany};
use crate::domain::Parsed;
use crate::time::timestamps::monthly_periods;
use crate::upstream::esg::EsgDataSource;
use crate::upstream::stocks::StockQuoteClient;
use crate::upstream::UpstreamError;
use anyhow::Context;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

pub const FINANCE_START_YEAR: i32 = 2023;
pub const FINANCE_END_YEAR: i32 = 2025;

/// Days of the month tried, in order, when looking for a monthly close.
const FINANCE_DAYS_PER_MONTH: u32 = 3;

#[async_trait::async_trait]
pub trait CompanySearch: Send + Sync {
    async fn search_companies(&self, query: &str) -> Result<Value, UpstreamError>;
}

#[derive(Clone)]
pub struct ChartService {
    esg: Arc<dyn EsgDataSource>,
    search: Arc<dyn CompanySearch>,
    stocks: Option<StockQuoteClient>,
    finance_cache: Arc<dyn Cache<Vec<FinancePoint>>>,
    concurrency: usize,
}

impl ChartService {
    pub fn new(
        esg: Arc<dyn EsgDataSource>,
        search: Arc<dyn CompanySearch>,
        stocks: Option<StockQuoteClient>,
        finance_cache: Arc<dyn Cache<Vec<FinancePoint>>>,
        concurrency: usize,
    ) -> Self {
        Self {
            esg,
            search,
            stocks,
            finance_cache,
            concurrency: concurrency.max(1),
        }
    }

    /// ESG history for `ticker`; an unexpected payload counts as no history.
    pub async fn history(&self, ticker: &str) -> anyhow::Result<EsgHistory> {
        let ticker = ticker.trim().to_ascii_uppercase();
        let body = self
            .esg
            .history(&ticker)
            .await
            .with_context(|| format!("failed to fetch ESG history for {ticker}"))?;
        Ok(history_or_empty(&ticker, &body))
    }

    pub async fn trend(&self, ticker: &str) -> anyhow::Result<Vec<TrendPoint>> {
        Ok(trend_series(&self.history(ticker).await?))
    }

    pub async fn factors(&self, ticker: &str) -> anyhow::Result<Vec<FactorPoint>> {
        Ok(factor_series(&self.history(ticker).await?))
    }

    pub async fn levels(&self, ticker: &str) -> anyhow::Result<Vec<LevelPoint>> {
        Ok(level_series(&self.history(ticker).await?))
    }

    pub async fn all_companies(&self) -> anyhow::Result<Vec<CompanySeries>> {
        let body = self
            .esg
            .all_companies()
            .await
            .context("failed to fetch all-companies data")?;
        match parse_company_records(&body) {
            Parsed::Ok(records) => Ok(group_company_series(&records)),
            Parsed::Malformed(reason) => {
                tracing::warn!(%reason, "unexpected all-companies payload");
                Ok(Vec::new())
            }
        }
    }

    pub async fn level_a(&self) -> anyhow::Result<Vec<LevelACompany>> {
        let body = self
            .esg
            .level_a()
            .await
            .context("failed to fetch level-A companies")?;
        Ok(level_a_companies(&body))
    }

    /// Series for every distinct ticker the company search returns. Tickers
    /// whose history cannot be fetched are skipped.
    pub async fn search_companies(&self, query: &str) -> anyhow::Result<Vec<CompanySeries>> {
        let body = self
            .search
            .search_companies(query)
            .await
            .with_context(|| format!("company search failed for {query:?}"))?;

        let tickers = match parse_search_tickers(&body) {
            Parsed::Ok(t) => dedupe_lowercase(t),
            Parsed::Malformed(reason) => {
                tracing::warn!(query, %reason, "unexpected company search payload");
                return Ok(Vec::new());
            }
        };
        tracing::debug!(query, tickers = tickers.len(), "fetching histories for search results");

        let histories: Vec<(String, Result<Value, UpstreamError>)> = stream::iter(tickers)
            .map(|ticker| async move {
                let res = self.esg.history(&ticker.to_ascii_uppercase()).await;
                (ticker, res)
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut out = Vec::new();
        for (ticker, res) in histories {
            match res {
                Ok(body) => {
                    if let Some(series) = company_series(&history_or_empty(&ticker, &body)) {
                        out.push(series);
                    }
                }
                Err(err) => tracing::warn!(ticker, error = %err, "skipping search result"),
            }
        }
        Ok(out)
    }

    pub async fn finance(&self, ticker: &str) -> anyhow::Result<Vec<FinancePoint>> {
        self.finance_at(ticker, Utc::now()).await
    }

    /// Monthly closes for the finance chart, cached per ticker.
    pub async fn finance_at(
        &self,
        ticker: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Vec<FinancePoint>> {
        let stocks = self
            .stocks
            .as_ref()
            .context("STOCK_API_BASE_URL is required for finance series")?;
        let key = ticker.trim().to_ascii_lowercase();
        anyhow::ensure!(!key.is_empty(), "ticker must be non-empty");

        if let Some(hit) = self.finance_cache.get(&key, now) {
            return Ok(hit.value);
        }

        let months = monthly_periods(FINANCE_START_YEAR, FINANCE_END_YEAR);
        let key_ref = key.as_str();
        let points: Vec<FinancePoint> = stream::iter(months)
            .map(|month| async move { monthly_close(stocks, key_ref, &month).await })
            .buffered(self.concurrency)
            .collect()
            .await;

        // A full outage would otherwise pin an empty chart for a day.
        if points.iter().any(|p| p.close.is_some()) {
            self.finance_cache.put(
                &key,
                CacheEntry {
                    value: points.clone(),
                    fetched_at: now,
                },
            );
        }
        Ok(points)
    }
}

async fn monthly_close(stocks: &StockQuoteClient, ticker: &str, month: &str) -> FinancePoint {
    for day in 1..=FINANCE_DAYS_PER_MONTH {
        let date = format!("{month}-{day:02}");
        match stocks.historical_close(ticker, &date).await {
            Ok(Some(close)) => {
                return FinancePoint {
                    date,
                    close: Some(close),
                }
            }
            Ok(None) => {}
            Err(err) => tracing::debug!(ticker, %date, error = %err, "no close for date"),
        }
    }
    FinancePoint {
        date: format!("{month}-01"),
        close: None,
    }
}

fn history_or_empty(ticker: &str, body: &Value) -> EsgHistory {
    match EsgHistory::from_value(ticker, body) {
        Parsed::Ok(h) => h,
        Parsed::Malformed(reason) => {
            tracing::warn!(ticker, %reason, "unexpected ESG history shape");
            EsgHistory {
                ticker: ticker.to_ascii_uppercase(),
                historical_ratings: Vec::new(),
            }
        }
    }
}

fn dedupe_lowercase(tickers: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    tickers
        .into_iter()
        .map(|t| t.to_ascii_lowercase())
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TtlCache;
    use crate::upstream::HttpUpstream;
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use wiremock::matchers::{method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct StubEsg {
        history_calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl EsgDataSource for StubEsg {
        async fn history(&self, ticker: &str) -> Result<Value, UpstreamError> {
            self.history_calls.fetch_add(1, Ordering::SeqCst);
            match ticker {
                "AAPL" => Ok(json!({
                    "ticker": "aapl",
                    "historical_ratings": [
                        {"timestamp": "2024-02-01", "company_name": "Apple",
                         "environmental_score": 1, "social_score": 2, "governance_score": 3},
                        {"timestamp": "2024-01-01", "company_name": "Apple",
                         "environmental_score": 1, "social_score": 1, "governance_score": 1},
                    ]
                })),
                "ZERO" => Ok(json!({
                    "ticker": "zero",
                    "historical_ratings": [
                        {"timestamp": "2024-01-01", "environmental_score": 0,
                         "social_score": 0, "governance_score": 0},
                    ]
                })),
                _ => Err(UpstreamError::Status {
                    status: 404,
                    body: None,
                }),
            }
        }

        async fn all_companies(&self) -> Result<Value, UpstreamError> {
            Ok(json!({"unexpected": true}))
        }

        async fn level_a(&self) -> Result<Value, UpstreamError> {
            Ok(json!({"companies": []}))
        }

        async fn predict(&self, _lags: [f64; 3]) -> Result<Value, UpstreamError> {
            Ok(json!({}))
        }
    }

    struct StubSearch(Value);

    #[async_trait::async_trait]
    impl CompanySearch for StubSearch {
        async fn search_companies(&self, _query: &str) -> Result<Value, UpstreamError> {
            Ok(self.0.clone())
        }
    }

    fn service(search: Value, stocks: Option<StockQuoteClient>) -> (ChartService, Arc<StubEsg>) {
        let esg = Arc::new(StubEsg {
            history_calls: AtomicUsize::new(0),
        });
        let svc = ChartService::new(
            esg.clone(),
            Arc::new(StubSearch(search)),
            stocks,
            Arc::new(TtlCache::new(8, Duration::from_secs(24 * 3600))),
            2,
        );
        (svc, esg)
    }

    #[test]
    fn dedupe_is_case_insensitive_and_ordered() {
        let out = dedupe_lowercase(vec!["AAPL".into(), "msft".into(), "aapl".into()]);
        assert_eq!(out, vec!["aapl", "msft"]);
    }

    #[tokio::test]
    async fn search_dedupes_and_drops_zero_and_failed_series() {
        let (svc, esg) = service(
            json!({"companies": [
                {"ticker": "AAPL"}, {"ticker": "aapl"}, {"ticker": "zero"}, {"ticker": "gone"},
            ]}),
            None,
        );

        let series = svc.search_companies("a").await.unwrap();
        assert_eq!(esg.history_calls.load(Ordering::SeqCst), 3);
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].key, "Apple::AAPL");
        assert_eq!(series[0].points[0].label, "Jan 24");
    }

    #[tokio::test]
    async fn malformed_payloads_are_empty_views() {
        let (svc, _) = service(json!({"nothing": []}), None);
        assert!(svc.search_companies("a").await.unwrap().is_empty());
        assert!(svc.all_companies().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn finance_requires_stock_api() {
        let (svc, _) = service(json!({}), None);
        assert!(svc.finance("aapl").await.is_err());
    }

    #[tokio::test]
    async fn finance_tries_first_three_days_and_caches() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/stocks/historicalSingular/aapl/2023-01-03"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"historicalPoint": {"close": 125.0}})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/stocks/historicalSingular/aapl/2023-02-01"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"historicalPoint": {"close": 145.5}})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/stocks/historicalSingular/aapl/.*$"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let stocks = StockQuoteClient::new(HttpUpstream::new(reqwest::Client::new(), server.uri(), 1));
        let (svc, _) = service(json!({}), Some(stocks));
        let now = Utc.with_ymd_and_hms(2026, 1, 5, 0, 0, 0).unwrap();

        let points = svc.finance_at("AAPL", now).await.unwrap();
        assert_eq!(points.len(), 36);
        assert_eq!(
            points[0],
            FinancePoint {
                date: "2023-01-03".into(),
                close: Some(125.0)
            }
        );
        assert_eq!(points[1].close, Some(145.5));
        assert_eq!(
            points[2],
            FinancePoint {
                date: "2023-03-01".into(),
                close: None
            }
        );

        // Served from cache: the `expect(1)` mocks would fail on a refetch.
        let again = svc
            .finance_at("aapl", now + chrono::Duration::hours(23))
            .await
            .unwrap();
        assert_eq!(again, points);
    }
}
