mod error;
mod routes;
mod state;

use axum::extract::DefaultBodyLimit;
use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::routes::{portfolio, proxy, reports};
use crate::state::AppState;

const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = esgdash_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let state = match AppState::from_settings(&settings) {
        Ok(state) => state,
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "failed to build upstream clients");
            return Err(e);
        }
    };

    let app = app(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn app(state: AppState) -> Router {
    let gated = Router::new()
        .route(
            "/tickers",
            get(portfolio::list_tickers).post(portfolio::add),
        )
        .route("/tickers/:ticker", delete(portfolio::remove))
        .route(
            "/import",
            post(portfolio::import).layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES)),
        )
        .route_layer(middleware::from_fn(portfolio::require_bearer));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/esg", get(proxy::esg_history))
        .route("/api/all-companies", get(proxy::all_companies))
        .route("/api/level-a", get(proxy::level_a))
        .route("/api/company-search/:query", get(proxy::company_search))
        .route("/api/logo", get(proxy::logo))
        .route("/api/predict", get(proxy::predict))
        .route("/api/reports/:ticker/prediction", get(reports::prediction))
        .route("/api/reports/:ticker/trend", get(reports::trend))
        .route("/api/reports/:ticker/factors", get(reports::factors))
        .route("/api/reports/:ticker/levels", get(reports::levels))
        .route("/api/reports/:ticker/finance", get(reports::finance))
        .route("/api/charts/all-companies", get(reports::all_companies))
        .route("/api/charts/search/:query", get(reports::search))
        .route("/api/charts/level-a", get(reports::level_a))
        .route("/api/auth/login", post(portfolio::login))
        .route("/api/auth/register", post(portfolio::register))
        .nest("/api/portfolio", gated)
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &esgdash_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
