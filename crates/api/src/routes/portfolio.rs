use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{Path, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use esgdash_core::auth::{bearer_token, AuthError, LOGIN_PATH};
use esgdash_core::domain::portfolio::{PortfolioTicker, Session};
use esgdash_core::import::{ImportOutcome, ImportPipeline};
use esgdash_core::portfolio::{add_ticker, PortfolioError, PortfolioStore};
use esgdash_core::upstream::backend::BackendClient;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Bearer token of the caller, set by [`require_bearer`].
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

/// Rejects requests without a bearer token before they reach a portfolio
/// handler.
pub async fn require_bearer(mut req: Request, next: Next) -> Response {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
        .map(str::to_string);

    match token {
        Some(token) => {
            req.extensions_mut().insert(BearerToken(token));
            next.run(req).await
        }
        None => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Authentication required", "redirect": LOGIN_PATH })),
        )
            .into_response(),
    }
}

fn backend(state: &AppState) -> ApiResult<&Arc<BackendClient>> {
    state
        .backend
        .as_ref()
        .ok_or_else(|| ApiError::unavailable("BACKEND_BASE_URL"))
}

fn auth_error(err: AuthError, fallback: &str) -> ApiError {
    match err {
        AuthError::Rejected(message) => ApiError::new(StatusCode::UNAUTHORIZED, message),
        AuthError::Upstream(e) => ApiError::internal(fallback, e.into()),
    }
}

fn portfolio_error(err: PortfolioError) -> ApiError {
    let status = match &err {
        PortfolioError::EmptyTicker | PortfolioError::Rejected(_) => StatusCode::BAD_REQUEST,
        PortfolioError::Duplicate(_) => StatusCode::CONFLICT,
        PortfolioError::Unsupported => StatusCode::NOT_IMPLEMENTED,
        PortfolioError::Upstream(e) => match e.status() {
            Some(401) => StatusCode::UNAUTHORIZED,
            Some(403) => StatusCode::FORBIDDEN,
            _ => StatusCode::BAD_GATEWAY,
        },
    };
    let message = match &err {
        PortfolioError::Upstream(e) => e.message().unwrap_or("Portfolio request failed").to_string(),
        other => other.to_string(),
    };
    ApiError::report(status, message, err.into())
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    email: String,
    password: String,
    name: String,
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<Session>> {
    backend(&state)?
        .login(&req.email, &req.password)
        .await
        .map(Json)
        .map_err(|e| auth_error(e, "Login failed"))
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<Json<Session>> {
    backend(&state)?
        .register(&req.email, &req.password, &req.name)
        .await
        .map(Json)
        .map_err(|e| auth_error(e, "Registration failed"))
}

#[derive(Debug, Serialize)]
pub struct TickerList {
    tickers: Vec<PortfolioTicker>,
}

pub async fn list_tickers(
    State(state): State<AppState>,
    Extension(BearerToken(token)): Extension<BearerToken>,
) -> ApiResult<Json<TickerList>> {
    let tickers = backend(&state)?
        .list_tickers(&token)
        .await
        .map_err(portfolio_error)?;
    Ok(Json(TickerList { tickers }))
}

#[derive(Debug, Deserialize)]
pub struct AddTickerRequest {
    #[serde(default)]
    ticker: String,
}

pub async fn add(
    State(state): State<AppState>,
    Extension(BearerToken(token)): Extension<BearerToken>,
    Json(req): Json<AddTickerRequest>,
) -> ApiResult<(StatusCode, Json<PortfolioTicker>)> {
    let store = backend(&state)?.as_ref();
    let existing = store.list_tickers(&token).await.map_err(portfolio_error)?;
    let added = add_ticker(store, &token, &existing, &req.ticker, chrono::Utc::now())
        .await
        .map_err(portfolio_error)?;
    Ok((StatusCode::CREATED, Json(added)))
}

pub async fn remove(
    State(state): State<AppState>,
    Extension(BearerToken(token)): Extension<BearerToken>,
    Path(ticker): Path<String>,
) -> ApiResult<StatusCode> {
    backend(&state)?
        .delete_ticker(&token, &ticker)
        .await
        .map_err(portfolio_error)?;
    Ok(StatusCode::NO_CONTENT)
}

fn import_pipeline(state: &AppState) -> ApiResult<&ImportPipeline> {
    state
        .import
        .as_ref()
        .ok_or_else(|| ApiError::unavailable("OCR_BASE_URL"))
}

pub async fn import(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<ImportOutcome>> {
    let pipeline = import_pipeline(&state)?;
    if body.is_empty() {
        return Err(ApiError::bad_request("Image body required"));
    }
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream");

    pipeline
        .run(body.to_vec(), content_type)
        .await
        .map(Json)
        .map_err(|e| ApiError::report(StatusCode::BAD_GATEWAY, "Failed to read tickers from image", e))
}
