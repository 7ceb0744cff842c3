use crate::cache::{Cache, CacheEntry};
use crate::domain::esg::EsgHistory;
use crate::domain::Parsed;
use crate::upstream::esg::EsgDataSource;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Number of historical total scores the prediction model consumes.
pub const LAG_COUNT: usize = 3;

/// Direction of the predicted total score relative to the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Same,
}

impl Trend {
    /// Compares both values after rounding to one decimal place.
    pub fn classify(prediction: f64, current: f64) -> Self {
        let (p, c) = (round1(prediction), round1(current));
        if p > c {
            Trend::Up
        } else if p < c {
            Trend::Down
        } else {
            Trend::Same
        }
    }

    pub fn headline(self) -> &'static str {
        match self {
            Trend::Up => "ESG Total Score Predicted to Increase",
            Trend::Down => "ESG Total Score Predicted to Decrease",
            Trend::Same => "ESG Total Score Predicted to Stay the Same",
        }
    }
}

pub fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

/// The three most recent total scores, most recent first. Records without a
/// total score are skipped; `None` when fewer than three remain.
pub fn lags(history: &EsgHistory) -> Option<[f64; LAG_COUNT]> {
    let recent: Vec<f64> = history
        .newest_first()
        .into_iter()
        .filter_map(|r| r.total_score)
        .take(LAG_COUNT)
        .collect();
    recent.try_into().ok()
}

/// Reads the numeric prediction out of a prediction-endpoint body.
/// Older deployments named the field `predicted_score`.
pub fn parse_prediction(body: &Value) -> Parsed<f64> {
    let raw = body.get("prediction").or_else(|| body.get("predicted_score"));
    let n = match raw {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match n.filter(|n| n.is_finite()) {
        Some(n) => Parsed::Ok(n),
        None => Parsed::Malformed(format!("no numeric prediction in {body}")),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictionEntry {
    pub prediction: f64,
    pub current_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub ticker: String,
    pub current_score: f64,
    pub predicted_score: f64,
    pub trend: Trend,
    pub headline: String,
    pub summary: String,
    pub fetched_at: DateTime<Utc>,
    pub cached: bool,
}

impl Prediction {
    fn new(ticker: String, entry: PredictionEntry, fetched_at: DateTime<Utc>, cached: bool) -> Self {
        let trend = Trend::classify(entry.prediction, entry.current_score);
        Self {
            ticker,
            current_score: entry.current_score,
            predicted_score: entry.prediction,
            trend,
            headline: trend.headline().to_string(),
            summary: format!("From {} → {}", entry.current_score, entry.prediction),
            fetched_at,
            cached,
        }
    }
}

/// Fetches ESG history, derives the lags and calls the prediction endpoint,
/// reusing cached predictions while they are fresh.
#[derive(Clone)]
pub struct PredictionService {
    source: Arc<dyn EsgDataSource>,
    cache: Arc<dyn Cache<PredictionEntry>>,
}

impl PredictionService {
    pub fn new(source: Arc<dyn EsgDataSource>, cache: Arc<dyn Cache<PredictionEntry>>) -> Self {
        Self { source, cache }
    }

    pub async fn predict(&self, ticker: &str) -> anyhow::Result<Option<Prediction>> {
        self.predict_at(ticker, Utc::now()).await
    }

    /// Like [`predict`](Self::predict), but failures are logged and reported
    /// as "no prediction".
    pub async fn predict_or_none(&self, ticker: &str) -> Option<Prediction> {
        match self.predict(ticker).await {
            Ok(p) => p,
            Err(err) => {
                tracing::warn!(ticker, error = %format!("{err:#}"), "prediction unavailable");
                None
            }
        }
    }

    pub async fn predict_at(
        &self,
        ticker: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<Prediction>> {
        let key = ticker.trim().to_ascii_uppercase();
        anyhow::ensure!(!key.is_empty(), "ticker must be non-empty");

        let body = self
            .source
            .history(&key)
            .await
            .with_context(|| format!("failed to fetch ESG history for {key}"))?;

        let history = match EsgHistory::from_value(&key, &body) {
            Parsed::Ok(h) => h,
            Parsed::Malformed(reason) => {
                tracing::warn!(ticker = %key, %reason, "unexpected ESG history shape");
                return Ok(None);
            }
        };

        let Some(lags) = lags(&history) else {
            tracing::debug!(ticker = %key, points = history.historical_ratings.len(), "not enough history for a prediction");
            return Ok(None);
        };

        if let Some(hit) = self.cache.get(&key, now) {
            tracing::debug!(ticker = %key, fetched_at = %hit.fetched_at, "prediction cache hit");
            return Ok(Some(Prediction::new(key, hit.value, hit.fetched_at, true)));
        }

        let body = self
            .source
            .predict(lags)
            .await
            .with_context(|| format!("prediction request failed for {key}"))?;
        let prediction = parse_prediction(&body).into_result()?;

        let entry = PredictionEntry {
            prediction,
            current_score: lags[0],
        };
        self.cache.put(
            &key,
            CacheEntry {
                value: entry,
                fetched_at: now,
            },
        );
        tracing::info!(ticker = %key, prediction, current = lags[0], "fetched prediction");

        Ok(Some(Prediction::new(key, entry, now, false)))
    }
}
