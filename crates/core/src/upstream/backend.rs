use super::{read_json, HttpUpstream, UpstreamError};
use crate::auth::AuthError;
use crate::config::Settings;
use crate::domain::portfolio::{PortfolioTicker, Session, User};
use crate::portfolio::{PortfolioError, PortfolioStore, SaveTickerResponse};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Auth and ticker storage backend.
#[derive(Debug, Clone)]
pub struct BackendClient {
    upstream: HttpUpstream,
}

#[derive(Debug, Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    token: String,
    #[serde(default)]
    user: Option<User>,
}

#[derive(Debug, Deserialize)]
struct TickersResponse {
    #[serde(default)]
    tickers: Vec<PortfolioTicker>,
}

impl BackendClient {
    pub fn new(upstream: HttpUpstream) -> Self {
        Self { upstream }
    }

    pub fn from_settings(settings: &Settings, http: reqwest::Client) -> anyhow::Result<Self> {
        let base_url = settings.require_backend_base_url()?;
        Ok(Self::new(HttpUpstream::new(http, base_url, 1)))
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        self.authenticate(
            "login",
            Credentials {
                email,
                password,
                name: None,
            },
            "Login failed",
        )
        .await
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<Session, AuthError> {
        self.authenticate(
            "register",
            Credentials {
                email,
                password,
                name: Some(name),
            },
            "Registration failed",
        )
        .await
    }

    async fn authenticate(
        &self,
        action: &str,
        credentials: Credentials<'_>,
        default_message: &str,
    ) -> Result<Session, AuthError> {
        let url = self.upstream.url(&["auth", action])?;
        let res = self
            .upstream
            .http()
            .post(url)
            .json(&credentials)
            .send()
            .await
            .map_err(UpstreamError::from)?;

        let body = match read_json(res).await {
            Ok(body) => body,
            Err(err @ UpstreamError::Status { .. }) => {
                let message = err.message().unwrap_or(default_message).to_string();
                tracing::warn!(action, status = ?err.status(), %message, "backend rejected credentials");
                return Err(AuthError::Rejected(message));
            }
            Err(err) => return Err(err.into()),
        };

        let parsed: AuthResponse = serde_json::from_value(body)
            .map_err(|e| UpstreamError::Decode(format!("auth response: {e}")))?;
        Ok(Session {
            token: parsed.token,
            user: parsed.user,
        })
    }
}

#[async_trait::async_trait]
impl PortfolioStore for BackendClient {
    async fn list_tickers(&self, token: &str) -> Result<Vec<PortfolioTicker>, PortfolioError> {
        let url = self.upstream.url(&["auth", "tickers"])?;
        let res = self
            .upstream
            .http()
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(UpstreamError::from)?;
        let body = read_json(res).await?;
        let parsed: TickersResponse = serde_json::from_value(body)
            .map_err(|e| UpstreamError::Decode(format!("tickers response: {e}")))?;
        Ok(parsed.tickers)
    }

    async fn save_ticker(
        &self,
        token: &str,
        ticker: &str,
    ) -> Result<SaveTickerResponse, PortfolioError> {
        let url = self.upstream.url(&["auth", "tickers"])?;
        let res = self
            .upstream
            .http()
            .post(url)
            .bearer_auth(token)
            .json(&serde_json::json!({ "ticker": ticker }))
            .send()
            .await
            .map_err(UpstreamError::from)?;
        let body = read_json(res).await?;
        Ok(SaveTickerResponse {
            success: body.get("success").and_then(Value::as_bool).unwrap_or(false),
            message: body
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> BackendClient {
        BackendClient::new(HttpUpstream::new(reqwest::Client::new(), server.uri(), 1))
    }

    #[tokio::test]
    async fn login_returns_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .and(body_json(json!({"email": "a@b.c", "password": "pw"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token": "tok",
                "user": {"email": "a@b.c", "name": "A", "user_id": "u1"},
            })))
            .expect(1)
            .mount(&server)
            .await;

        let session = client(&server).login("a@b.c", "pw").await.unwrap();
        assert_eq!(session.token, "tok");
        assert_eq!(session.user.unwrap().user_id, "u1");
    }

    #[tokio::test]
    async fn rejected_login_uses_backend_message_or_default() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"message": "Invalid password"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/register"))
            .respond_with(ResponseTemplate::new(409))
            .mount(&server)
            .await;

        let c = client(&server);
        let err = c.login("a@b.c", "bad").await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid password");

        let err = c.register("a@b.c", "pw", "A").await.unwrap_err();
        assert_eq!(err.to_string(), "Registration failed");
    }

    #[tokio::test]
    async fn lists_and_saves_tickers_with_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/tickers"))
            .and(header("Authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tickers": [{"ticker": "aapl", "created_at": "2024-01-01T00:00:00Z"}],
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/tickers"))
            .and(header("Authorization", "Bearer tok"))
            .and(body_json(json!({"ticker": "MSFT"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .expect(1)
            .mount(&server)
            .await;

        let c = client(&server);
        let tickers = c.list_tickers("tok").await.unwrap();
        assert_eq!(tickers.len(), 1);
        assert_eq!(tickers[0].ticker, "aapl");

        let saved = c.save_ticker("tok", "MSFT").await.unwrap();
        assert!(saved.success);
        assert!(saved.message.is_none());
    }
}
