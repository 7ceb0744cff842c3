use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::Json;
use esgdash_core::charts::service::ChartService;
use esgdash_core::charts::{
    paginate, CompanySeries, FactorPoint, FinancePoint, LevelPoint, Page, TrendPoint,
    AGGREGATE_PAGE_SIZE,
};
use esgdash_core::domain::esg::LevelACompany;
use esgdash_core::prediction::Prediction;
use serde::Deserialize;

fn charts(state: &AppState) -> ApiResult<&ChartService> {
    state
        .charts
        .as_ref()
        .ok_or_else(|| ApiError::unavailable("ESG_API_BASE_URL"))
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    page: usize,
}

/// `null` whenever no prediction can be made.
pub async fn prediction(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> Json<Option<Prediction>> {
    let Some(predictions) = &state.predictions else {
        tracing::warn!(%ticker, "prediction requested but ESG API is not configured");
        return Json(None);
    };
    Json(predictions.predict_or_none(&ticker).await)
}

pub async fn trend(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> ApiResult<Json<Vec<TrendPoint>>> {
    charts(&state)?
        .trend(&ticker)
        .await
        .map(Json)
        .map_err(|e| ApiError::internal("Fetching ESG data failed", e))
}

pub async fn factors(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> ApiResult<Json<Vec<FactorPoint>>> {
    charts(&state)?
        .factors(&ticker)
        .await
        .map(Json)
        .map_err(|e| ApiError::internal("Fetching ESG data failed", e))
}

pub async fn levels(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> ApiResult<Json<Vec<LevelPoint>>> {
    charts(&state)?
        .levels(&ticker)
        .await
        .map(Json)
        .map_err(|e| ApiError::internal("Fetching ESG data failed", e))
}

pub async fn finance(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> ApiResult<Json<Vec<FinancePoint>>> {
    charts(&state)?
        .finance(&ticker)
        .await
        .map(Json)
        .map_err(|e| ApiError::internal("Failed to fetch stock data", e))
}

pub async fn all_companies(
    State(state): State<AppState>,
    Query(q): Query<PageQuery>,
) -> ApiResult<Json<Page<CompanySeries>>> {
    let series = charts(&state)?
        .all_companies()
        .await
        .map_err(|e| ApiError::internal("Failed to fetch ESG data", e))?;
    Ok(Json(paginate(&series, q.page, AGGREGATE_PAGE_SIZE)))
}

pub async fn search(
    State(state): State<AppState>,
    Path(query): Path<String>,
    Query(q): Query<PageQuery>,
) -> ApiResult<Json<Page<CompanySeries>>> {
    let query = query.trim();
    if query.is_empty() {
        return Err(ApiError::bad_request("Search query required"));
    }
    let series = charts(&state)?
        .search_companies(query)
        .await
        .map_err(|e| ApiError::internal("Failed to fetch company search results", e))?;
    Ok(Json(paginate(&series, q.page, AGGREGATE_PAGE_SIZE)))
}

pub async fn level_a(State(state): State<AppState>) -> ApiResult<Json<Vec<LevelACompany>>> {
    charts(&state)?
        .level_a()
        .await
        .map(Json)
        .map_err(|e| ApiError::internal("Failed to fetch companies", e))
}
