// ── Core error types ──
//
// User-facing errors from htpi-core. Consumers never see HTTP status codes
// or Socket.IO library errors directly: the `From<htpi_api::Error>` impl
// translates transport-layer errors into domain-appropriate variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Configuration errors ─────────────────────────────────────────
    /// No token is stored; connecting requires logging in first.
    #[error("Not logged in: no authentication token stored")]
    MissingToken,

    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to gateway at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    /// The channel is not connected, so the request was never sent.
    #[error("Event channel is not connected")]
    ChannelUnavailable,

    #[error("Gateway connection timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Authentication errors ────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Session expired -- please log in again")]
    SessionExpired,

    // ── Request errors ───────────────────────────────────────────────
    /// The gateway acknowledged the request with `success: false`.
    #[error("Request rejected: {message}")]
    Rejected {
        code: Option<String>,
        message: String,
    },

    #[error("No response to {operation} after {timeout_secs}s")]
    RequestTimeout { operation: String, timeout_secs: u64 },

    /// The request was dropped before a response arrived (e.g. cache reset).
    #[error("Request abandoned before a response arrived")]
    RequestAbandoned,

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        code: Option<String>,
        status: Option<u16>,
    },

    // ── Storage errors ───────────────────────────────────────────────
    #[error("Credential storage error: {message}")]
    Storage { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Whether logging in again is the way out of this error.
    pub fn requires_login(&self) -> bool {
        matches!(
            self,
            Self::MissingToken | Self::SessionExpired | Self::AuthenticationFailed { .. }
        )
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<htpi_api::Error> for CoreError {
    fn from(err: htpi_api::Error) -> Self {
        match err {
            htpi_api::Error::Authentication { message } => {
                CoreError::AuthenticationFailed { message }
            }
            htpi_api::Error::SessionExpired => CoreError::SessionExpired,
            htpi_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout { timeout_secs: 0 }
                } else if e.is_connect() {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map_or_else(|| "<unknown>".into(), ToString::to_string),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        code: None,
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            htpi_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            htpi_api::Error::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            htpi_api::Error::Tls(msg) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            htpi_api::Error::Api {
                message,
                code,
                status,
            } => CoreError::Api {
                message,
                code,
                status: Some(status),
            },
            htpi_api::Error::ChannelConnect(reason) => CoreError::ConnectionFailed {
                url: String::new(),
                reason,
            },
            htpi_api::Error::ChannelRejected { message } => {
                CoreError::AuthenticationFailed { message }
            }
            htpi_api::Error::ChannelEmit(_) => CoreError::ChannelUnavailable,
            htpi_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
        }
    }
}
