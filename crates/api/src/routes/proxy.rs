use crate::error::{ApiError, ApiResult};
use crate::routes::{cache_control, CACHE_ESG, CACHE_LISTS, CACHE_LOGO};
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use esgdash_core::upstream::esg::EsgDataSource;
use esgdash_core::upstream::logo::LogoOutcome;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

fn esg(state: &AppState) -> ApiResult<&Arc<dyn EsgDataSource>> {
    state
        .esg
        .as_ref()
        .ok_or_else(|| ApiError::unavailable("ESG_API_BASE_URL"))
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

#[derive(Debug, Deserialize)]
pub struct TickerQuery {
    ticker: Option<String>,
}

pub async fn esg_history(
    State(state): State<AppState>,
    Query(q): Query<TickerQuery>,
) -> ApiResult<Response> {
    let ticker = non_empty(q.ticker)
        .ok_or_else(|| ApiError::bad_request("Ticker parameter required"))?
        .to_ascii_uppercase();

    let body = esg(&state)?
        .history(&ticker)
        .await
        .map_err(|e| ApiError::relay(e, "Fetching ESG data failed"))?;
    Ok((cache_control(CACHE_ESG), Json(body)).into_response())
}

pub async fn all_companies(State(state): State<AppState>) -> ApiResult<Response> {
    match esg(&state)?.all_companies().await {
        Ok(body) => Ok((cache_control(CACHE_LISTS), Json(body)).into_response()),
        Err(e) if e.status().is_some() => Err(ApiError::relay(e, "Failed to fetch ESG data")),
        Err(e) => Err(ApiError::internal("Internal server error", e.into())),
    }
}

pub async fn level_a(State(state): State<AppState>) -> ApiResult<Response> {
    match esg(&state)?.level_a().await {
        Ok(body) => Ok((cache_control(CACHE_LISTS), Json(body)).into_response()),
        Err(e) if e.status().is_some() => Err(ApiError::relay(e, "Failed to fetch companies")),
        Err(e) => Err(ApiError::internal("Internal server error", e.into())),
    }
}

pub async fn company_search(
    State(state): State<AppState>,
    Path(query): Path<String>,
) -> ApiResult<Json<Value>> {
    if !state.finnhub.has_api_key() {
        return Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "API key is not configured",
        ));
    }
    state
        .finnhub
        .search(&query)
        .await
        .map(Json)
        .map_err(|e| ApiError::internal("Failed to fetch company search results", e.into()))
}

#[derive(Debug, Deserialize)]
pub struct LogoQuery {
    domain: Option<String>,
}

pub async fn logo(
    State(state): State<AppState>,
    Query(q): Query<LogoQuery>,
) -> ApiResult<Response> {
    let domain = non_empty(q.domain).ok_or_else(|| ApiError::bad_request("Domain Params missing"))?;

    Ok(match state.logo.fetch(&domain).await {
        LogoOutcome::Image {
            bytes,
            content_type,
        } => (
            [
                (header::CONTENT_TYPE, content_type),
                (header::CACHE_CONTROL, CACHE_LOGO.to_string()),
            ],
            bytes,
        )
            .into_response(),
        LogoOutcome::Fallback(url) => Redirect::temporary(&url).into_response(),
    })
}

#[derive(Debug, Deserialize)]
pub struct PredictQuery {
    lag_1: Option<String>,
    lag_2: Option<String>,
    lag_3: Option<String>,
}

impl PredictQuery {
    fn lags(&self) -> Option<[f64; 3]> {
        let parse = |v: &Option<String>| v.as_deref()?.trim().parse::<f64>().ok().filter(|n| n.is_finite());
        Some([parse(&self.lag_1)?, parse(&self.lag_2)?, parse(&self.lag_3)?])
    }
}

pub async fn predict(
    State(state): State<AppState>,
    Query(q): Query<PredictQuery>,
) -> ApiResult<Json<Value>> {
    let lags = q
        .lags()
        .ok_or_else(|| ApiError::bad_request("Missing required parameters"))?;
    esg(&state)?
        .predict(lags)
        .await
        .map(Json)
        .map_err(|e| ApiError::internal("Prediction fetch failed", e.into()))
}
