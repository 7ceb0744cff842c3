pub mod service;

use crate::domain::esg::{parse_level_a, EsgHistory, EsgRating, LevelACompany};
use crate::domain::Parsed;
use crate::time::timestamps::{day_label, month_label};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// Page size of the aggregate company views.
pub const AGGREGATE_PAGE_SIZE: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub date: String,
    pub total_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactorPoint {
    pub date: String,
    pub environmental: Option<f64>,
    pub social: Option<f64>,
    pub governance: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelPoint {
    pub date: String,
    pub numeric_rating: u8,
    pub rating: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EsgBarPoint {
    pub label: String,
    pub environmental: f64,
    pub social: f64,
    pub governance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompanySeries {
    /// `"{company_name}::{TICKER}"`
    pub key: String,
    pub company_name: String,
    pub ticker: String,
    pub points: Vec<EsgBarPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinancePoint {
    pub date: String,
    pub close: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub total_pages: usize,
    pub total_items: usize,
}

/// Letter rating on a 1..=5 axis (A=5 … E=1); anything else is 0.
pub fn rating_value(rating: Option<&str>) -> u8 {
    match rating.map(str::trim) {
        Some("A") => 5,
        Some("B") => 4,
        Some("C") => 3,
        Some("D") => 2,
        Some("E") => 1,
        _ => 0,
    }
}

pub fn trend_series(history: &EsgHistory) -> Vec<TrendPoint> {
    history
        .chronological()
        .into_iter()
        .filter_map(|r| {
            Some(TrendPoint {
                date: day_label(r.timestamp),
                total_score: r.total_score?,
            })
        })
        .collect()
}

pub fn factor_series(history: &EsgHistory) -> Vec<FactorPoint> {
    history
        .chronological()
        .into_iter()
        .map(|r| FactorPoint {
            date: day_label(r.timestamp),
            environmental: r.environmental_score,
            social: r.social_score,
            governance: r.governance_score,
        })
        .collect()
}

pub fn level_series(history: &EsgHistory) -> Vec<LevelPoint> {
    history
        .chronological()
        .into_iter()
        .map(|r| LevelPoint {
            date: day_label(r.timestamp),
            numeric_rating: rating_value(r.rating.as_deref()),
            rating: r.rating.clone(),
        })
        .collect()
}

fn bar_points<'a>(records: impl IntoIterator<Item = &'a EsgRating>) -> Vec<EsgBarPoint> {
    let mut records: Vec<&EsgRating> = records.into_iter().collect();
    records.sort_by_key(|r| r.timestamp);
    records
        .into_iter()
        .map(|r| EsgBarPoint {
            label: month_label(r.timestamp),
            environmental: r.environmental_score.unwrap_or(0.0),
            social: r.social_score.unwrap_or(0.0),
            governance: r.governance_score.unwrap_or(0.0),
        })
        .collect()
}

fn series_key(company_name: &str, ticker: &str) -> String {
    format!("{company_name}::{ticker}")
}

/// Groups the flat all-companies records per company, oldest point first.
/// Companies keep the order in which they first appear. Companies whose every
/// record is all-zero are dropped.
pub fn group_company_series(records: &[EsgRating]) -> Vec<CompanySeries> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut grouped: Vec<(String, String, String, Vec<&EsgRating>)> = Vec::new();
    for r in records {
        let Some(ticker) = r.ticker.as_deref() else {
            continue;
        };
        let ticker = ticker.to_ascii_uppercase();
        let name = r.company_name.clone().unwrap_or_else(|| ticker.clone());
        let key = series_key(&name, &ticker);
        let slot = *index.entry(key.clone()).or_insert_with(|| {
            grouped.push((key, name, ticker, Vec::new()));
            grouped.len() - 1
        });
        grouped[slot].3.push(r);
    }

    grouped
        .into_iter()
        .filter(|(_, _, _, rows)| !rows.iter().all(|r| r.is_zero_esg()))
        .map(|(key, company_name, ticker, rows)| CompanySeries {
            key,
            company_name,
            ticker,
            points: bar_points(rows),
        })
        .collect()
}

/// One company's history in the aggregate-view shape; `None` when it has no
/// records or only all-zero records.
pub fn company_series(history: &EsgHistory) -> Option<CompanySeries> {
    if history.historical_ratings.iter().all(EsgRating::is_zero_esg) {
        return None;
    }
    let company_name = history
        .company_name()
        .unwrap_or(history.ticker.as_str())
        .to_string();
    Some(CompanySeries {
        key: series_key(&company_name, &history.ticker),
        company_name,
        ticker: history.ticker.clone(),
        points: bar_points(&history.historical_ratings),
    })
}

/// Level-A companies minus the `Unknown` placeholder rows. An unexpected
/// payload is treated as an empty list.
pub fn level_a_companies(value: &Value) -> Vec<LevelACompany> {
    match parse_level_a(value) {
        Parsed::Ok(rows) => rows
            .into_iter()
            .filter(|c| c.company_name != "Unknown")
            .collect(),
        Parsed::Malformed(reason) => {
            tracing::warn!(%reason, "unexpected level-A payload");
            Vec::new()
        }
    }
}

/// Zero-based page of `items`. Pages past the end are empty.
pub fn paginate<T: Clone>(items: &[T], page: usize, page_size: usize) -> Page<T> {
    let page_size = page_size.max(1);
    let start = page.saturating_mul(page_size).min(items.len());
    let end = start.saturating_add(page_size).min(items.len());
    Page {
        items: items[start..end].to_vec(),
        page,
        total_pages: items.len().div_ceil(page_size),
        total_items: items.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::esg::parse_company_records;
    use serde_json::json;

    fn history(v: Value) -> EsgHistory {
        EsgHistory::from_value("AAPL", &v).ok().unwrap()
    }

    #[test]
    fn report_series_are_chronological() {
        // Newest first, as the ESG API returns it.
        let h = history(json!({"historical_ratings": [
            {"timestamp": "2024-03-01", "total_score": 9, "environmental_score": 3, "rating": "C"},
            {"timestamp": "2024-02-01", "total_score": 12, "rating": "A"},
            {"timestamp": "2024-01-01", "rating": "Z"},
        ]}));

        let trend = trend_series(&h);
        assert_eq!(
            trend,
            vec![
                TrendPoint { date: "2024-02-01".into(), total_score: 12.0 },
                TrendPoint { date: "2024-03-01".into(), total_score: 9.0 },
            ]
        );

        let factors = factor_series(&h);
        assert_eq!(factors.len(), 3);
        assert_eq!(factors[2].environmental, Some(3.0));
        assert_eq!(factors[0].social, None);

        let levels: Vec<u8> = level_series(&h).iter().map(|p| p.numeric_rating).collect();
        assert_eq!(levels, vec![0, 5, 3]);
    }

    #[test]
    fn rating_scale() {
        assert_eq!(rating_value(Some("A")), 5);
        assert_eq!(rating_value(Some("E")), 1);
        assert_eq!(rating_value(Some("F")), 0);
        assert_eq!(rating_value(None), 0);
    }

    #[test]
    fn grouping_drops_all_zero_companies() {
        let records = parse_company_records(&json!({"data": [
            {"company_name": "Apple", "ticker": "aapl", "timestamp": "2024-02-01",
             "environmental_score": 1, "social_score": 2, "governance_score": 3},
            {"company_name": "Apple", "ticker": "AAPL", "timestamp": "2024-01-01",
             "environmental_score": 0, "social_score": 0, "governance_score": 0},
            {"company_name": "Ghost", "ticker": "gho", "timestamp": "2024-01-01",
             "environmental_score": 0, "social_score": 0, "governance_score": 0},
            {"company_name": "Ghost", "ticker": "gho", "timestamp": "2024-02-01",
             "environmental_score": 0, "social_score": 0, "governance_score": 0},
            {"company_name": "NoTicker", "timestamp": "2024-02-01", "environmental_score": 5},
        ]}))
        .ok()
        .unwrap();

        let series = group_company_series(&records);
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].key, "Apple::AAPL");
        let labels: Vec<&str> = series[0].points.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, vec!["Jan 24", "Feb 24"]);
        assert_eq!(series[0].points[1].governance, 3.0);
    }

    #[test]
    fn grouping_keeps_first_seen_order_and_missing_values() {
        let records = parse_company_records(&json!({"data": [
            {"company_name": "Zeta", "ticker": "zzz", "timestamp": "2024-01-01",
             "environmental_score": 1, "social_score": 1, "governance_score": 1},
            {"company_name": "Alpha", "ticker": "aaa", "timestamp": "2024-01-01",
             "environmental_score": 0, "social_score": 0},
            {"company_name": "Mid", "ticker": "mmm", "timestamp": "2024-01-01",
             "environmental_score": 2, "social_score": 2, "governance_score": 2},
            {"company_name": "Zeta", "ticker": "ZZZ", "timestamp": "2023-12-01",
             "environmental_score": 3, "social_score": 3, "governance_score": 3},
        ]}))
        .ok()
        .unwrap();

        let series = group_company_series(&records);
        let keys: Vec<&str> = series
            .iter()
            .map(|s| s.key.as_str())
            .collect();
        // Alpha has no governance score, so it is not an all-zero company.
        assert_eq!(keys, vec!["Zeta::ZZZ", "Alpha::AAA", "Mid::MMM"]);
    }

    #[test]
    fn single_non_zero_value_keeps_series() {
        let h = history(json!({"historical_ratings": [
            {"timestamp": "2024-01-01", "company_name": "Apple",
             "environmental_score": 0, "social_score": 0, "governance_score": 0},
            {"timestamp": "2024-02-01", "company_name": "Apple",
             "environmental_score": 0, "social_score": 0.5, "governance_score": 0},
        ]}));
        let s = company_series(&h).unwrap();
        assert_eq!(s.key, "Apple::AAPL");
        assert_eq!(s.points.len(), 2);

        let zero = history(json!({"historical_ratings": [
            {"timestamp": "2024-01-01", "environmental_score": 0, "social_score": 0, "governance_score": 0},
        ]}));
        assert!(company_series(&zero).is_none());
        assert!(company_series(&history(json!({"historical_ratings": []}))).is_none());
    }

    #[test]
    fn level_a_filters_unknown() {
        let v = json!({"companies": [
            {"company_name": "Apple", "ticker": "aapl", "rating": "A"},
            {"company_name": "Unknown", "ticker": "zzz", "rating": "A"},
        ]});
        let rows = level_a_companies(&v);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].ticker, "aapl");
        assert!(level_a_companies(&json!({"error": "x"})).is_empty());
    }

    #[test]
    fn pagination() {
        let items: Vec<u32> = (0..12).collect();
        let p = paginate(&items, 2, AGGREGATE_PAGE_SIZE);
        assert_eq!(p.items, vec![10, 11]);
        assert_eq!(p.total_pages, 3);
        assert_eq!(p.total_items, 12);
        assert!(paginate(&items, 9, 5).items.is_empty());
        assert_eq!(paginate::<u32>(&[], 0, 5).total_pages, 0);
    }
}
