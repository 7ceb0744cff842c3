use super::Parsed;
use crate::time::timestamps::parse_timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EsgRating {
    pub timestamp: DateTime<Utc>,
    pub environmental_score: Option<f64>,
    pub social_score: Option<f64>,
    pub governance_score: Option<f64>,
    pub total_score: Option<f64>,
    pub rating: Option<String>,
    pub company_name: Option<String>,
    pub ticker: Option<String>,
}

impl EsgRating {
    pub fn from_value(value: &Value) -> Parsed<Self> {
        let Some(obj) = value.as_object() else {
            return Parsed::Malformed("rating record is not an object".to_string());
        };

        let Some(raw_ts) = obj.get("timestamp").and_then(Value::as_str) else {
            return Parsed::Malformed("rating record has no timestamp".to_string());
        };
        let Some(timestamp) = parse_timestamp(raw_ts) else {
            return Parsed::Malformed(format!("unparseable timestamp: {raw_ts}"));
        };

        Parsed::Ok(Self {
            timestamp,
            environmental_score: number_field(obj, "environmental_score"),
            social_score: number_field(obj, "social_score"),
            governance_score: number_field(obj, "governance_score"),
            total_score: number_field(obj, "total_score"),
            rating: string_field(obj, "rating").map(|s| s.to_ascii_uppercase()),
            company_name: string_field(obj, "company_name"),
            ticker: string_field(obj, "ticker"),
        })
    }

    /// True when every E/S/G component is present and exactly zero. A missing
    /// component does not count as zero.
    pub fn is_zero_esg(&self) -> bool {
        [
            self.environmental_score,
            self.social_score,
            self.governance_score,
        ]
        .iter()
        .all(|s| *s == Some(0.0))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EsgHistory {
    pub ticker: String,
    pub historical_ratings: Vec<EsgRating>,
}

impl EsgHistory {
    /// Validates an `/api/esg/{ticker}` body. `requested_ticker` is used when
    /// the payload does not echo the ticker back.
    pub fn from_value(requested_ticker: &str, value: &Value) -> Parsed<Self> {
        let Some(obj) = value.as_object() else {
            return Parsed::Malformed("ESG history is not an object".to_string());
        };
        let Some(rows) = obj.get("historical_ratings").and_then(Value::as_array) else {
            return Parsed::Malformed("historical_ratings missing or not an array".to_string());
        };

        let ticker = string_field(obj, "ticker")
            .unwrap_or_else(|| requested_ticker.trim().to_string())
            .to_ascii_uppercase();

        let historical_ratings = parse_rows(rows, &ticker);
        Parsed::Ok(Self {
            ticker,
            historical_ratings,
        })
    }

    /// Ratings oldest first. Ties keep their original relative order.
    pub fn chronological(&self) -> Vec<&EsgRating> {
        let mut out: Vec<&EsgRating> = self.historical_ratings.iter().collect();
        out.sort_by_key(|r| r.timestamp);
        out
    }

    /// Ratings newest first.
    pub fn newest_first(&self) -> Vec<&EsgRating> {
        let mut out = self.chronological();
        out.reverse();
        out
    }

    pub fn company_name(&self) -> Option<&str> {
        self.historical_ratings
            .iter()
            .find_map(|r| r.company_name.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub ticker: String,
    pub company_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelACompany {
    pub company_name: String,
    pub ticker: String,
    #[serde(default)]
    pub rating: Option<String>,
    #[serde(default)]
    pub total_score: Option<f64>,
    #[serde(default)]
    pub environmental_score: Option<f64>,
    #[serde(default)]
    pub social_score: Option<f64>,
    #[serde(default)]
    pub governance_score: Option<f64>,
    #[serde(default)]
    pub last_processed_date: Option<String>,
}

/// Flat `{ data: [...] }` records from the all-companies endpoint.
pub fn parse_company_records(value: &Value) -> Parsed<Vec<EsgRating>> {
    let Some(rows) = value.get("data").and_then(Value::as_array) else {
        return Parsed::Malformed("data missing or not an array".to_string());
    };
    Parsed::Ok(parse_rows(rows, "all-companies"))
}

/// `{ companies: [...] }` from the level-A endpoint. Rows that do not carry a
/// name and ticker are skipped.
pub fn parse_level_a(value: &Value) -> Parsed<Vec<LevelACompany>> {
    let Some(rows) = value.get("companies").and_then(Value::as_array) else {
        return Parsed::Malformed("companies missing or not an array".to_string());
    };
    Parsed::Ok(
        rows.iter()
            .filter_map(|row| serde_json::from_value::<LevelACompany>(row.clone()).ok())
            .collect(),
    )
}

/// Tickers from a company-search response. Both the ESG search shape
/// (`companies[].ticker`) and the Finnhub shape (`result[].symbol`) are accepted.
pub fn parse_search_tickers(value: &Value) -> Parsed<Vec<String>> {
    let (rows, key) = if let Some(rows) = value.get("companies").and_then(Value::as_array) {
        (rows, "ticker")
    } else if let Some(rows) = value.get("result").and_then(Value::as_array) {
        (rows, "symbol")
    } else {
        return Parsed::Malformed("neither companies nor result is an array".to_string());
    };

    Parsed::Ok(
        rows.iter()
            .filter_map(|row| row.get(key).and_then(Value::as_str))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
    )
}

fn parse_rows(rows: &[Value], context: &str) -> Vec<EsgRating> {
    let mut out = Vec::with_capacity(rows.len());
    let mut malformed = 0usize;
    for row in rows {
        match EsgRating::from_value(row) {
            Parsed::Ok(r) => out.push(r),
            Parsed::Malformed(reason) => {
                malformed += 1;
                tracing::debug!(context, %reason, "dropping malformed rating record");
            }
        }
    }
    if malformed > 0 {
        tracing::warn!(context, malformed, kept = out.len(), "dropped malformed rating records");
    }
    out
}

fn number_field(obj: &Map<String, Value>, key: &str) -> Option<f64> {
    let n = match obj.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    n.filter(|n| n.is_finite())
}

fn string_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
