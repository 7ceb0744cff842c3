use crate::domain::portfolio::PortfolioTicker;
use crate::upstream::UpstreamError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum PortfolioError {
    #[error("Please enter a ticker symbol")]
    EmptyTicker,

    #[error("This ticker is already in your favorites")]
    Duplicate(String),

    #[error("{0}")]
    Rejected(String),

    #[error("removing tickers is not supported by the backend")]
    Unsupported,

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveTickerResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Where a user's saved tickers live.
#[async_trait::async_trait]
pub trait PortfolioStore: Send + Sync {
    async fn list_tickers(&self, token: &str) -> Result<Vec<PortfolioTicker>, PortfolioError>;

    async fn save_ticker(
        &self,
        token: &str,
        ticker: &str,
    ) -> Result<SaveTickerResponse, PortfolioError>;

    async fn delete_ticker(&self, _token: &str, _ticker: &str) -> Result<(), PortfolioError> {
        Err(PortfolioError::Unsupported)
    }
}

/// Trimmed, upper-cased ticker; `None` when nothing is left.
pub fn normalize(input: &str) -> Option<String> {
    let t = input.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_ascii_uppercase())
    }
}

pub fn is_duplicate(existing: &[PortfolioTicker], ticker: &str) -> bool {
    existing.iter().any(|t| t.ticker.eq_ignore_ascii_case(ticker))
}

/// Adds one ticker. Empty input and duplicates are rejected before the backend
/// is called.
pub async fn add_ticker(
    store: &dyn PortfolioStore,
    token: &str,
    existing: &[PortfolioTicker],
    input: &str,
    now: DateTime<Utc>,
) -> Result<PortfolioTicker, PortfolioError> {
    let ticker = normalize(input).ok_or(PortfolioError::EmptyTicker)?;
    if is_duplicate(existing, &ticker) {
        return Err(PortfolioError::Duplicate(ticker));
    }

    let res = store.save_ticker(token, &ticker).await?;
    if !res.success {
        let message = res
            .message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| "Failed to add ticker".to_string());
        tracing::warn!(%ticker, %message, "backend refused ticker");
        return Err(PortfolioError::Rejected(message));
    }

    tracing::info!(%ticker, "ticker added");
    Ok(PortfolioTicker {
        ticker,
        created_at: now,
    })
}

#[derive(Debug)]
pub struct AddOutcome {
    pub ticker: String,
    pub result: Result<PortfolioTicker, PortfolioError>,
}

/// Adds several tickers in order against the current portfolio. Tickers added
/// earlier in the batch count as existing for later ones.
pub async fn add_tickers(
    store: &dyn PortfolioStore,
    token: &str,
    tickers: &[String],
    now: DateTime<Utc>,
) -> Result<Vec<AddOutcome>, PortfolioError> {
    let mut existing = store.list_tickers(token).await?;
    let mut out = Vec::with_capacity(tickers.len());
    for ticker in tickers {
        let result = add_ticker(store, token, &existing, ticker, now).await;
        if let Ok(added) = &result {
            existing.push(added.clone());
        }
        out.push(AddOutcome {
            ticker: ticker.clone(),
            result,
        });
    }
    Ok(out)
}
