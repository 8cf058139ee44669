// ── Auth session controller ──
//
// Login, logout and startup revalidation. The controller is the only
// writer of `Session`; REST calls that can expire the token are routed
// through it so a 401 anywhere clears local state the same way logout does.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use htpi_api::{LoginRequired, ProfileUpdate, RestClient, User};

use crate::connection::ConnectionManager;
use crate::credentials::CredentialStore;
use crate::error::CoreError;
use crate::sync::DataSync;

/// Authenticated-identity state, independent of channel connectivity.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub identity: Option<User>,
    pub token: Option<SecretString>,
    /// Startup revalidation in progress; `identity` may be unconfirmed.
    pub loading: bool,
    /// Last time the gateway confirmed the token.
    pub validated_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some() && self.token.is_some()
    }
}

/// Cheaply cloneable via `Arc<SessionInner>`.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    rest: RestClient,
    credentials: CredentialStore,
    connection: ConnectionManager,
    sync: DataSync,
    session: watch::Sender<Session>,
}

impl SessionController {
    pub fn new(
        rest: RestClient,
        credentials: CredentialStore,
        connection: ConnectionManager,
        sync: DataSync,
    ) -> Self {
        let (session, _) = watch::channel(Session::default());
        Self {
            inner: Arc::new(SessionInner {
                rest,
                credentials,
                connection,
                sync,
                session,
            }),
        }
    }

    pub fn session(&self) -> Session {
        self.inner.session.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.inner.session.subscribe()
    }

    /// Notifications that a REST call found the token expired.
    pub fn login_required(&self) -> broadcast::Receiver<LoginRequired> {
        self.inner.rest.login_required()
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Authenticate, persist the credentials and open the channel.
    ///
    /// A channel failure after a successful login is logged, not returned:
    /// it shows up as connection status.
    pub async fn login(&self, email: &str, password: &SecretString) -> Result<User, CoreError> {
        let data = self.inner.rest.login(email, password).await?;
        let token = SecretString::from(data.token);
        let user = data.user;

        self.inner.credentials.store_token(&token)?;
        self.inner.credentials.store_identity(&user)?;
        self.inner.session.send_replace(Session {
            identity: Some(user.clone()),
            token: Some(token),
            loading: false,
            validated_at: Some(Utc::now()),
        });
        info!(user_id = %user.id, "logged in");

        if let Err(e) = self.inner.connection.connect().await {
            warn!(error = %e, "logged in but the event channel did not connect");
        }
        Ok(user)
    }

    /// End the session. Local state is cleared even when the gateway call fails.
    pub async fn logout(&self) {
        if self.inner.credentials.token().is_some() {
            if let Err(e) = self.inner.rest.logout().await {
                warn!(error = %e, "gateway logout failed, clearing local session anyway");
            }
        }
        self.clear_local().await;
        info!("logged out");
    }

    /// Revalidate a stored token at startup.
    ///
    /// Publishes the stored identity optimistically with `loading = true`
    /// while the gateway confirms it. Confirmation opens the channel; an
    /// expired token clears local state and yields `Ok(None)`. Other
    /// failures also clear local state and are returned.
    pub async fn restore(&self) -> Result<Option<User>, CoreError> {
        let Some(token) = self.inner.credentials.token() else {
            debug!("no stored token, nothing to restore");
            self.inner.session.send_replace(Session::default());
            return Ok(None);
        };

        self.inner.session.send_replace(Session {
            identity: self.inner.credentials.identity(),
            token: Some(token.clone()),
            loading: true,
            validated_at: None,
        });

        match self.inner.rest.get_profile().await {
            Ok(user) => {
                if let Err(e) = self.inner.credentials.store_identity(&user) {
                    warn!(error = %e, "could not refresh stored identity");
                }
                self.inner.session.send_replace(Session {
                    identity: Some(user.clone()),
                    token: Some(token),
                    loading: false,
                    validated_at: Some(Utc::now()),
                });
                debug!(user_id = %user.id, "stored session confirmed");

                if let Err(e) = self.inner.connection.connect().await {
                    warn!(error = %e, "session restored but the event channel did not connect");
                }
                Ok(Some(user))
            }
            Err(e) => {
                warn!(error = %e, "stored session could not be confirmed, clearing");
                self.clear_local().await;
                if e.is_auth_expired() {
                    Ok(None)
                } else {
                    Err(e.into())
                }
            }
        }
    }

    // ── Profile & password ───────────────────────────────────────────

    pub async fn profile(&self) -> Result<User, CoreError> {
        let result = self.inner.rest.get_profile().await;
        let user = self.expire_on_401(result).await?;
        self.remember_identity(&user);
        Ok(user)
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<User, CoreError> {
        let result = self.inner.rest.update_profile(update).await;
        let user = self.expire_on_401(result).await?;
        self.remember_identity(&user);
        Ok(user)
    }

    pub async fn change_password(
        &self,
        current: &SecretString,
        new: &SecretString,
    ) -> Result<(), CoreError> {
        let result = self.inner.rest.change_password(current, new).await;
        self.expire_on_401(result).await
    }

    pub async fn forgot_password(&self, email: &str) -> Result<(), CoreError> {
        self.inner
            .rest
            .forgot_password(email)
            .await
            .map_err(CoreError::from)
    }

    pub async fn reset_password(
        &self,
        reset_token: &str,
        new_password: &SecretString,
    ) -> Result<(), CoreError> {
        self.inner
            .rest
            .reset_password(reset_token, new_password)
            .await
            .map_err(CoreError::from)
    }

    // ── Internals ────────────────────────────────────────────────────

    async fn expire_on_401<T: Send>(&self, result: Result<T, htpi_api::Error>) -> Result<T, CoreError> {
        match result {
            Err(htpi_api::Error::SessionExpired) => {
                self.clear_local().await;
                Err(CoreError::SessionExpired)
            }
            other => other.map_err(CoreError::from),
        }
    }

    fn remember_identity(&self, user: &User) {
        if let Err(e) = self.inner.credentials.store_identity(user) {
            warn!(error = %e, "could not persist identity");
        }
        self.inner.session.send_modify(|session| {
            session.identity = Some(user.clone());
            session.validated_at = Some(Utc::now());
        });
    }

    async fn clear_local(&self) {
        if let Err(e) = self.inner.credentials.clear() {
            warn!(error = %e, "could not clear stored credentials");
        }
        self.inner.sync.reset();
        self.inner.connection.disconnect().await;
        self.inner.session.send_replace(Session::default());
    }
}
