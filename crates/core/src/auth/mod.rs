pub mod session;

use crate::domain::portfolio::{Session, User};
use crate::upstream::UpstreamError;
use serde::Serialize;

pub use session::{FileSessionStore, MemorySessionStore, SessionStore};

pub const TOKEN_KEY: &str = "token";
pub const USER_KEY: &str = "user";
pub const LOGIN_PATH: &str = "/login";

const PUBLIC_PATHS: [&str; 3] = ["/", "/login", "/register"];
const DASHBOARD_PREFIXES: [&str; 4] = ["/dashboard", "/favorites", "/portfolio", "/report"];
const GATED_API_PREFIX: &str = "/api/portfolio";

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    Rejected(String),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Loading,
    Authenticated(Session),
    Unauthenticated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceholderKind {
    Spinner,
    SidebarSkeleton,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "action", content = "placeholder")]
pub enum GateDecision {
    Placeholder(PlaceholderKind),
    RedirectToLogin,
    Render,
}

/// `prefix` itself or anything below it (`/report`, `/report/AAPL`), but not
/// `/reports`.
fn under(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'),
        None => false,
    }
}

pub fn is_public_path(path: &str) -> bool {
    PUBLIC_PATHS.contains(&path)
}

pub fn is_dashboard_path(path: &str) -> bool {
    DASHBOARD_PREFIXES.iter().any(|p| under(path, p))
}

pub fn decide(state: &AuthState, path: &str) -> GateDecision {
    match state {
        AuthState::Loading if is_dashboard_path(path) => {
            GateDecision::Placeholder(PlaceholderKind::SidebarSkeleton)
        }
        AuthState::Loading => GateDecision::Placeholder(PlaceholderKind::Spinner),
        AuthState::Unauthenticated if !is_public_path(path) => GateDecision::RedirectToLogin,
        _ => GateDecision::Render,
    }
}

/// API routes that need a bearer token.
pub fn is_gated_api_path(path: &str) -> bool {
    under(path, GATED_API_PREFIX)
}

/// Token from an `Authorization: Bearer ...` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Reads the persisted session. A token with an unparseable user stays
/// authenticated without user details.
pub fn restore(store: &dyn SessionStore) -> AuthState {
    let read = |key: &str| match store.get(key) {
        Ok(v) => v.filter(|s| !s.trim().is_empty()),
        Err(err) => {
            tracing::warn!(key, error = %format!("{err:#}"), "failed to read session store");
            None
        }
    };

    let (Some(token), Some(raw_user)) = (read(TOKEN_KEY), read(USER_KEY)) else {
        return AuthState::Unauthenticated;
    };

    let user = match serde_json::from_str::<User>(&raw_user) {
        Ok(user) => Some(user),
        Err(err) => {
            tracing::warn!(error = %err, "stored user is not valid JSON; keeping token only");
            None
        }
    };
    AuthState::Authenticated(Session { token, user })
}

pub fn persist(store: &dyn SessionStore, session: &Session) -> anyhow::Result<()> {
    store.set(TOKEN_KEY, &session.token)?;
    match &session.user {
        Some(user) => store.set(USER_KEY, &serde_json::to_string(user)?)?,
        None => store.remove(USER_KEY)?,
    }
    Ok(())
}

pub fn clear(store: &dyn SessionStore) -> anyhow::Result<()> {
    store.remove(TOKEN_KEY)?;
    store.remove(USER_KEY)
}
