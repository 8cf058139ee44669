use thiserror::Error;

/// Top-level error type for the `htpi-api` crate.
///
/// Covers every failure mode across both gateway surfaces: the REST
/// endpoints used for authentication and profile management, and the
/// Socket.IO event channel. `htpi-core` maps these into user-facing errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Login failed (wrong credentials, locked account, etc.)
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// The bearer token was rejected with a 401 on an authenticated call.
    #[error("Session expired -- please log in again")]
    SessionExpired,

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── REST API ────────────────────────────────────────────────────
    /// The gateway answered with `success: false` or a non-2xx status.
    #[error("API error (HTTP {status}): {message}")]
    Api {
        message: String,
        code: Option<String>,
        status: u16,
    },

    // ── Event channel ───────────────────────────────────────────────
    /// The channel could not be opened (refused, unreachable, dropped mid-handshake).
    #[error("Channel connection failed: {0}")]
    ChannelConnect(String),

    /// The gateway refused the handshake credentials.
    #[error("Channel handshake rejected: {message}")]
    ChannelRejected { message: String },

    /// An event could not be written to the channel.
    #[error("Channel emit failed: {0}")]
    ChannelEmit(String),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this error indicates the credentials are no longer
    /// accepted and logging in again might resolve it.
    pub fn is_auth_expired(&self) -> bool {
        matches!(
            self,
            Self::Authentication { .. } | Self::SessionExpired | Self::ChannelRejected { .. }
        )
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. } | Self::ChannelConnect(_) => true,
            _ => false,
        }
    }

    /// Extract the API error code, if available.
    pub fn api_error_code(&self) -> Option<&str> {
        match self {
            Self::Api { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_connect_is_transient() {
        assert!(Error::ChannelConnect("refused".into()).is_transient());
        assert!(Error::Timeout { timeout_secs: 5 }.is_transient());
    }

    #[test]
    fn handshake_rejection_is_not_transient() {
        let err = Error::ChannelRejected {
            message: "invalid token".into(),
        };
        assert!(!err.is_transient());
        assert!(err.is_auth_expired());
    }

    #[test]
    fn api_error_code_is_exposed() {
        let err = Error::Api {
            message: "bad request".into(),
            code: Some("VALIDATION".into()),
            status: 400,
        };
        assert_eq!(err.api_error_code(), Some("VALIDATION"));
        assert_eq!(Error::SessionExpired.api_error_code(), None);
    }
}
