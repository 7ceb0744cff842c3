use anyhow::Context;
use clap::{Parser, Subcommand};
use esgdash_core::auth::{self, AuthState, FileSessionStore, GateDecision};
use esgdash_core::config::Settings;
use esgdash_core::domain::portfolio::Session;
use esgdash_core::import::validate::ValidationOptions;
use esgdash_core::import::{ImportOutcome, ImportPipeline};
use esgdash_core::portfolio::{add_tickers, AddOutcome};
use esgdash_core::task::FetchScope;
use esgdash_core::upstream::backend::BackendClient;
use esgdash_core::upstream::build_http_client;
use esgdash_core::upstream::finnhub::FinnhubClient;
use esgdash_core::upstream::ocr::HttpOcrEngine;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_SESSION_FILE: &str = ".esgdash_session.json";
const IMPORT_PAGE: &str = "/portfolio/import";

#[derive(Debug, Parser)]
#[command(name = "esgdash_import")]
struct Args {
    /// Where the signed-in session is kept. Defaults to $ESGDASH_SESSION_FILE,
    /// then `.esgdash_session.json`.
    #[arg(long, global = true)]
    session_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sign in and remember the session.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Create an account and remember the session.
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        name: String,
    },
    /// Forget the stored session.
    Logout,
    /// Read tickers from a brokerage statement screenshot.
    Scan {
        #[arg(long)]
        image: PathBuf,

        /// Add the validated tickers to the signed-in user's portfolio.
        #[arg(long)]
        save: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();
    let store = FileSessionStore::new(session_path(
        args.session_file,
        std::env::var("ESGDASH_SESSION_FILE").ok(),
    ));

    let scope = FetchScope::new();
    let token = scope.token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted; cancelling outstanding requests");
            token.cancel();
        }
    });

    let res = match scope.run(run(args.command, &settings, &store)).await {
        Ok(res) => res,
        Err(cancelled) => Err(anyhow::Error::new(cancelled)),
    };
    if let Err(err) = &res {
        sentry_anyhow::capture_anyhow(err);
        tracing::error!(error = %format!("{err:#}"), "esgdash_import failed");
    }
    res
}

async fn run(command: Command, settings: &Settings, store: &FileSessionStore) -> anyhow::Result<()> {
    let http = build_http_client(settings)?;

    match command {
        Command::Login { email, password } => {
            let backend = BackendClient::from_settings(settings, http)?;
            let session = backend.login(&email, &password).await?;
            remember(store, &session)
        }
        Command::Register {
            email,
            password,
            name,
        } => {
            let backend = BackendClient::from_settings(settings, http)?;
            let session = backend.register(&email, &password, &name).await?;
            remember(store, &session)
        }
        Command::Logout => {
            auth::clear(store)?;
            tracing::info!(path = %store.path().display(), "session cleared");
            Ok(())
        }
        Command::Scan { image, save } => {
            // Check the session before spending an OCR call on a save that cannot happen.
            let token = if save {
                Some(signed_in_token(auth::restore(store))?)
            } else {
                None
            };

            let bytes = read_image(&image).await?;
            let finnhub = Arc::new(FinnhubClient::from_settings(settings, http.clone()));
            let pipeline = ImportPipeline::new(
                Arc::new(HttpOcrEngine::from_settings(settings, http.clone())?),
                finnhub,
                ValidationOptions::from_settings(settings),
            );
            let outcome = pipeline.run(bytes, content_type_for(&image)).await?;

            let saved = match token {
                Some(token) => {
                    let backend = BackendClient::from_settings(settings, http)?;
                    let outcomes = add_tickers(
                        &backend,
                        &token,
                        &outcome.report.validated,
                        chrono::Utc::now(),
                    )
                    .await
                    .context("failed to load the current portfolio")?;
                    Some(outcomes)
                }
                None => None,
            };

            println!("{}", serde_json::to_string_pretty(&render(&outcome, saved.as_deref()))?);
            Ok(())
        }
    }
}

fn remember(store: &FileSessionStore, session: &Session) -> anyhow::Result<()> {
    auth::persist(store, session)?;
    let who = session.user.as_ref().map(|u| u.email.as_str()).unwrap_or("unknown user");
    tracing::info!(user = who, path = %store.path().display(), "session saved");
    Ok(())
}

fn signed_in_token(state: AuthState) -> anyhow::Result<String> {
    match (auth::decide(&state, IMPORT_PAGE), state) {
        (GateDecision::Render, AuthState::Authenticated(session)) => Ok(session.token),
        _ => anyhow::bail!("not signed in; run `esgdash_import login` first"),
    }
}

fn session_path(arg: Option<PathBuf>, env: Option<String>) -> PathBuf {
    arg.or_else(|| env.filter(|s| !s.trim().is_empty()).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SESSION_FILE))
}

async fn read_image(path: &Path) -> anyhow::Result<Vec<u8>> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    anyhow::ensure!(!bytes.is_empty(), "{} is empty", path.display());
    Ok(bytes)
}

fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        Some("tif" | "tiff") => "image/tiff",
        _ => "application/octet-stream",
    }
}

fn render(outcome: &ImportOutcome, saved: Option<&[AddOutcome]>) -> serde_json::Value {
    let mut out = json!({
        "candidates": outcome.candidates,
        "validated": outcome.report.validated,
        "rejected": outcome.report.rejected,
        "failed": outcome.report.failed,
    });
    if let Some(saved) = saved {
        let mut added = Vec::new();
        let mut skipped = Vec::new();
        for o in saved {
            match &o.result {
                Ok(t) => added.push(t.ticker.clone()),
                Err(e) => skipped.push(json!({ "ticker": o.ticker, "reason": e.to_string() })),
            }
        }
        out["added"] = json!(added);
        out["skipped"] = json!(skipped);
    }
    out
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
