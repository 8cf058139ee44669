// REST HTTP client
//
// Wraps `reqwest::Client` with gateway URL construction, bearer-token
// injection, envelope unwrapping and session-expiry handling. Endpoint
// methods live in `auth.rs` as inherent methods.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use url::Url;

use crate::error::Error;
use crate::rest::models::ApiResponse;
use crate::transport::TransportConfig;

/// Where the REST client gets its bearer token from.
///
/// `revoke` is called when the gateway answers 401 on an authenticated
/// call; implementations drop the persisted credentials.
pub trait TokenSource: Send + Sync {
    fn token(&self) -> Option<SecretString>;
    fn revoke(&self);
}

/// Published when an authenticated call came back 401.
///
/// Front ends react by sending the user back to the login entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRequired {
    pub endpoint: String,
}

/// Whether the call presents the bearer token and treats 401 as expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Auth {
    /// Login: no token, a 401 means bad credentials.
    Anonymous,
    /// Everything else.
    Bearer,
}

/// HTTP client for the gateway's `/api/auth/*` endpoints.
pub struct RestClient {
    http: reqwest::Client,
    base_url: Url,
    credentials: Arc<dyn TokenSource>,
    login_required: broadcast::Sender<LoginRequired>,
}

impl RestClient {
    /// Create a client rooted at `base_url` (e.g. `http://localhost:8000`).
    pub fn new(
        base_url: Url,
        credentials: Arc<dyn TokenSource>,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self::with_client(http, base_url, credentials))
    }

    /// Create a client around a pre-built `reqwest::Client`.
    pub fn with_client(
        http: reqwest::Client,
        base_url: Url,
        credentials: Arc<dyn TokenSource>,
    ) -> Self {
        let (login_required, _) = broadcast::channel(8);
        Self {
            http,
            base_url,
            credentials,
            login_required,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Subscribe to "login required" notifications.
    pub fn login_required(&self) -> broadcast::Receiver<LoginRequired> {
        self.login_required.subscribe()
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// `{base}/api/{path}`, keeping any path prefix on the base URL.
    pub(crate) fn api_url(&self, path: &str) -> Result<Url, Error> {
        let full = format!(
            "{}/api/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Ok(Url::parse(&full)?)
    }

    // ── Request helpers ──────────────────────────────────────────────

    pub(crate) async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, Error> {
        let url = self.api_url(path)?;
        debug!("GET {}", url);
        let req = self.authorize(self.http.get(url), Auth::Bearer);
        self.send(req, path, Auth::Bearer).await
    }

    pub(crate) async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &impl Serialize,
        auth: Auth,
    ) -> Result<Option<T>, Error> {
        let url = self.api_url(path)?;
        debug!("POST {}", url);
        let req = self.authorize(self.http.post(url).json(body), auth);
        self.send(req, path, auth).await
    }

    pub(crate) async fn put<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &impl Serialize,
    ) -> Result<Option<T>, Error> {
        let url = self.api_url(path)?;
        debug!("PUT {}", url);
        let req = self.authorize(self.http.put(url).json(body), Auth::Bearer);
        self.send(req, path, Auth::Bearer).await
    }

    fn authorize(&self, req: reqwest::RequestBuilder, auth: Auth) -> reqwest::RequestBuilder {
        match (auth, self.credentials.token()) {
            (Auth::Bearer, Some(token)) => req.bearer_auth(token.expose_secret()),
            _ => req,
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
        path: &str,
        auth: Auth,
    ) -> Result<Option<T>, Error> {
        let resp = req.send().await.map_err(Error::Transport)?;
        self.parse_envelope(resp, path, auth).await
    }

    /// Parse the `{ success, data }` envelope.
    ///
    /// A 401 on a bearer call revokes the stored credentials and publishes
    /// [`LoginRequired`] before returning [`Error::SessionExpired`].
    async fn parse_envelope<T: DeserializeOwned>(
        &self,
        resp: reqwest::Response,
        path: &str,
        auth: Auth,
    ) -> Result<Option<T>, Error> {
        let status = resp.status();
        let body = resp.text().await.map_err(Error::Transport)?;

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(match auth {
                Auth::Anonymous => Error::Authentication {
                    message: envelope_message(&body)
                        .unwrap_or_else(|| "invalid email or password".into()),
                },
                Auth::Bearer => {
                    warn!(endpoint = path, "gateway rejected bearer token, revoking credentials");
                    self.credentials.revoke();
                    let _ = self.login_required.send(LoginRequired {
                        endpoint: path.to_owned(),
                    });
                    Error::SessionExpired
                }
            });
        }

        if body.trim().is_empty() {
            return if status.is_success() {
                Ok(None)
            } else {
                Err(Error::Api {
                    message: format!("HTTP {status}"),
                    code: None,
                    status: status.as_u16(),
                })
            };
        }

        let envelope: ApiResponse<T> =
            serde_json::from_str(&body).map_err(|e| Error::Deserialization {
                message: e.to_string(),
                body: body.clone(),
            })?;

        if status.is_success() && envelope.success {
            Ok(envelope.data)
        } else {
            Err(Error::Api {
                message: envelope.failure_message(),
                code: envelope.failure_code(),
                status: status.as_u16(),
            })
        }
    }
}

/// Best-effort message extraction from an error body of unknown shape.
fn envelope_message(body: &str) -> Option<String> {
    let envelope: ApiResponse<serde_json::Value> = serde_json::from_str(body).ok()?;
    (envelope.error.is_some() || envelope.message.is_some()).then(|| envelope.failure_message())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    struct NoToken;

    impl TokenSource for NoToken {
        fn token(&self) -> Option<SecretString> {
            None
        }
        fn revoke(&self) {}
    }

    #[test]
    fn api_url_keeps_base_prefix() {
        let client = RestClient::with_client(
            reqwest::Client::new(),
            Url::parse("https://portal.example.com/gateway/").unwrap(),
            Arc::new(NoToken),
        );
        assert_eq!(
            client.api_url("auth/login").unwrap().as_str(),
            "https://portal.example.com/gateway/api/auth/login"
        );
    }

    #[test]
    fn envelope_message_needs_a_message() {
        assert_eq!(
            envelope_message(r#"{"success":false,"message":"locked"}"#).as_deref(),
            Some("locked")
        );
        assert_eq!(envelope_message("not json"), None);
        assert_eq!(envelope_message(r#"{"success":false}"#), None);
    }
}
