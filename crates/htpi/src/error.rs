//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use htpi_config::ConfigError;
use htpi_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const REJECTED: i32 = 5;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to the gateway at {url}")]
    #[diagnostic(
        code(htpi::connection_failed),
        help(
            "Check that the gateway is running and reachable.\n\
             Cause: {reason}\n\
             Try: htpi --gateway <url> whoami"
        )
    )]
    ConnectionFailed { url: String, reason: String },

    #[error("The event channel is not connected")]
    #[diagnostic(
        code(htpi::channel_unavailable),
        help("The gateway dropped the connection. Retry the command.")
    )]
    ChannelUnavailable,

    // ── Authentication ───────────────────────────────────────────────
    #[error("Not logged in (profile '{profile}')")]
    #[diagnostic(code(htpi::not_logged_in), help("Run: htpi login"))]
    NotLoggedIn { profile: String },

    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(htpi::auth_failed),
        help("Check your email and password, then run: htpi login")
    )]
    AuthFailed { message: String },

    #[error("Your session has expired")]
    #[diagnostic(code(htpi::session_expired), help("Run: htpi login"))]
    SessionExpired,

    // ── Requests ─────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(htpi::not_found),
        help("Run: htpi {list_command} to see available records")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("Gateway rejected the request ({code}): {message}")]
    #[diagnostic(code(htpi::rejected))]
    Rejected { code: String, message: String },

    #[error("No response to {operation} after {seconds}s")]
    #[diagnostic(
        code(htpi::timeout),
        help("Raise request_timeout in your profile, or check gateway load.")
    )]
    Timeout { operation: String, seconds: u64 },

    #[error("API error ({code}): {message}")]
    #[diagnostic(code(htpi::api_error))]
    ApiError { code: String, message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(htpi::validation))]
    Validation { field: String, reason: String },

    #[error("Destructive operation '{action}' requires confirmation")]
    #[diagnostic(
        code(htpi::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(htpi::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: htpi config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("Configuration error: {0}")]
    #[diagnostic(code(htpi::config))]
    Config(String),

    #[error("Credential storage error: {message}")]
    #[diagnostic(
        code(htpi::storage),
        help("Set credential_store = \"file\" in your profile if no keyring is available.")
    )]
    Storage { message: String },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON payload: {0}")]
    #[diagnostic(code(htpi::json), help("Check the JSON input and try again."))]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    #[diagnostic(code(htpi::internal))]
    Internal(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::ChannelUnavailable => exit_code::CONNECTION,
            Self::NotLoggedIn { .. } | Self::AuthFailed { .. } | Self::SessionExpired => {
                exit_code::AUTH
            }
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Rejected { .. } => exit_code::REJECTED,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. }
            | Self::NonInteractiveRequiresYes { .. }
            | Self::ProfileNotFound { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::MissingToken => CliError::NotLoggedIn {
                profile: "current".into(),
            },

            CoreError::ConnectionFailed { url, reason } => CliError::ConnectionFailed { url, reason },

            CoreError::ChannelUnavailable | CoreError::RequestAbandoned => {
                CliError::ChannelUnavailable
            }

            CoreError::Timeout { timeout_secs } => CliError::Timeout {
                operation: "connect".into(),
                seconds: timeout_secs,
            },

            CoreError::RequestTimeout {
                operation,
                timeout_secs,
            } => CliError::Timeout {
                operation,
                seconds: timeout_secs,
            },

            CoreError::AuthenticationFailed { message } => CliError::AuthFailed { message },

            CoreError::SessionExpired => CliError::SessionExpired,

            CoreError::Rejected { code, message } => CliError::Rejected {
                code: code.unwrap_or_else(|| "rejected".into()),
                message,
            },

            CoreError::Api { message, code, .. } => CliError::ApiError {
                code: code.unwrap_or_else(|| "api_error".into()),
                message,
            },

            CoreError::Storage { message } => CliError::Storage { message },

            CoreError::Config { message } => CliError::Config(message),

            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::UnknownProfile { name } => {
                let cfg = htpi_config::load_config_or_default();
                let available = cfg.profiles.keys().cloned().collect::<Vec<_>>().join(", ");
                CliError::ProfileNotFound { name, available }
            }
            ConfigError::Io(e) => CliError::Io(e),
            other => CliError::Config(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_errors_share_an_exit_code() {
        let missing: CliError = CoreError::MissingToken.into();
        let expired: CliError = CoreError::SessionExpired.into();
        assert_eq!(missing.exit_code(), exit_code::AUTH);
        assert_eq!(expired.exit_code(), exit_code::AUTH);
    }

    #[test]
    fn rejection_keeps_gateway_code() {
        let err: CliError = CoreError::Rejected {
            code: Some("NOT_FOUND".into()),
            message: "Patient not found".into(),
        }
        .into();
        assert!(matches!(err, CliError::Rejected { ref code, .. } if code == "NOT_FOUND"));
        assert_eq!(err.exit_code(), exit_code::REJECTED);
    }

    #[test]
    fn request_timeout_names_the_operation() {
        let err: CliError = CoreError::RequestTimeout {
            operation: "claim:list".into(),
            timeout_secs: 30,
        }
        .into();
        assert_eq!(err.to_string(), "No response to claim:list after 30s");
        assert_eq!(err.exit_code(), exit_code::TIMEOUT);
    }
}
