use crate::config::Settings;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TickerCheck {
    Valid,
    Unknown,
}

/// Looks a candidate up against a company-profile source.
#[async_trait::async_trait]
pub trait TickerValidator: Send + Sync {
    async fn check(&self, ticker: &str) -> anyhow::Result<TickerCheck>;
}

#[derive(Debug, Clone)]
pub struct ValidationOptions {
    pub concurrency: usize,
    pub timeout: Duration,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl ValidationOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            concurrency: settings.validation_concurrency.max(1),
            timeout: settings.validation_timeout,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationFailure {
    pub ticker: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub validated: Vec<String>,
    pub rejected: Vec<String>,
    pub failed: Vec<ValidationFailure>,
}

/// Checks every candidate with at most `opts.concurrency` lookups in flight.
/// Each list in the report keeps candidate order.
pub async fn validate_candidates(
    validator: &dyn TickerValidator,
    candidates: &[String],
    opts: &ValidationOptions,
) -> ValidationReport {
    let timeout = opts.timeout;
    let outcomes: Vec<(String, anyhow::Result<TickerCheck>)> =
        stream::iter(candidates.iter().cloned())
            .map(|ticker| async move {
                let res = match tokio::time::timeout(timeout, validator.check(&ticker)).await {
                    Ok(res) => res,
                    Err(_) => Err(anyhow::anyhow!("timed out after {timeout:?}")),
                };
                (ticker, res)
            })
            .buffered(opts.concurrency.max(1))
            .collect()
            .await;

    let mut report = ValidationReport::default();
    for (ticker, res) in outcomes {
        match res {
            Ok(TickerCheck::Valid) => report.validated.push(ticker),
            Ok(TickerCheck::Unknown) => report.rejected.push(ticker),
            Err(err) => {
                tracing::warn!(ticker = %ticker, error = %format!("{err:#}"), "ticker validation failed");
                report.failed.push(ValidationFailure {
                    ticker,
                    reason: format!("{err:#}"),
                });
            }
        }
    }

    tracing::info!(
        candidates = candidates.len(),
        validated = report.validated.len(),
        rejected = report.rejected.len(),
        failed = report.failed.len(),
        "ticker validation finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct StubValidator {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl TickerValidator for StubValidator {
        async fn check(&self, ticker: &str) -> anyhow::Result<TickerCheck> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let delay = if ticker == "SLOW" { 2_000 } else { 20 };
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            match ticker {
                "ERR" => anyhow::bail!("profile service unavailable"),
                "NOPE" => Ok(TickerCheck::Unknown),
                _ => Ok(TickerCheck::Valid),
            }
        }
    }

    fn tickers(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn sorts_outcomes_into_report_in_candidate_order() {
        let v = StubValidator::default();
        let opts = ValidationOptions {
            concurrency: 2,
            timeout: Duration::from_secs(1),
        };
        let report =
            validate_candidates(&v, &tickers(&["AAPL", "NOPE", "ERR", "MSFT"]), &opts).await;

        assert_eq!(report.validated, vec!["AAPL", "MSFT"]);
        assert_eq!(report.rejected, vec!["NOPE"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].ticker, "ERR");
        assert!(report.failed[0].reason.contains("unavailable"));
    }

    #[tokio::test]
    async fn never_exceeds_concurrency_cap() {
        let v = StubValidator::default();
        let opts = ValidationOptions {
            concurrency: 3,
            timeout: Duration::from_secs(1),
        };
        let many: Vec<String> = (0..12).map(|i| format!("T{i}")).collect();
        let report = validate_candidates(&v, &many, &opts).await;

        assert_eq!(report.validated.len(), 12);
        assert!(v.max_in_flight.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn slow_lookups_time_out_without_sinking_the_batch() {
        let v = StubValidator::default();
        let opts = ValidationOptions {
            concurrency: 4,
            timeout: Duration::from_millis(200),
        };
        let report = validate_candidates(&v, &tickers(&["SLOW", "AAPL"]), &opts).await;

        assert_eq!(report.validated, vec!["AAPL"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].ticker, "SLOW");
        assert!(report.failed[0].reason.contains("timed out"));
    }

    #[tokio::test]
    async fn empty_candidates_make_empty_report() {
        let v = StubValidator::default();
        let report = validate_candidates(&v, &[], &ValidationOptions::default()).await;
        assert_eq!(report, ValidationReport::default());
    }
}
