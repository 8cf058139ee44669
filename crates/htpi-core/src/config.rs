// ── Runtime portal configuration ──
//
// These types describe *how* to reach the gateway. They carry endpoints and
// tuning only, never credentials, and never touch disk: the CLI builds a
// `PortalConfig` from its profile and hands it in.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use htpi_api::ReconnectPolicy;
use htpi_api::channel::SocketIoConfig;
use htpi_api::transport::{TlsMode, TransportConfig};

/// Default gateway address for a local development stack.
pub const DEFAULT_GATEWAY_URL: &str = "http://localhost:8000";

/// Default Socket.IO namespace.
pub const DEFAULT_NAMESPACE: &str = "/";

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(PathBuf),
    /// Skip verification (self-signed certs on local gateways).
    DangerAcceptInvalid,
}

/// Configuration for one portal deployment.
#[derive(Debug, Clone)]
pub struct PortalConfig {
    /// Gateway URL hosting the event channel.
    pub gateway_url: Url,
    /// Socket.IO namespace on the gateway.
    pub namespace: String,
    /// REST base URL; the gateway URL when unset.
    pub api_url: Option<Url>,
    /// TLS verification strategy for both surfaces.
    pub tls: TlsVerification,
    /// HTTP request timeout.
    pub timeout: Duration,
    /// How long a correlated request waits for its ack. `None` waits forever.
    pub request_timeout: Option<Duration>,
    /// Channel reconnection backoff.
    pub reconnect: ReconnectPolicy,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            gateway_url: Url::parse(DEFAULT_GATEWAY_URL)
                .unwrap_or_else(|_| unreachable!("default gateway URL is valid")),
            namespace: DEFAULT_NAMESPACE.into(),
            api_url: None,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
            request_timeout: Some(Duration::from_secs(30)),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl PortalConfig {
    /// REST base URL, falling back to the gateway.
    pub fn rest_url(&self) -> &Url {
        self.api_url.as_ref().unwrap_or(&self.gateway_url)
    }

    pub fn transport(&self) -> TransportConfig {
        let tls = match &self.tls {
            TlsVerification::SystemDefaults => TlsMode::System,
            TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
            TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
        };
        TransportConfig {
            tls,
            timeout: self.timeout,
        }
    }

    pub fn socketio(&self) -> SocketIoConfig {
        SocketIoConfig {
            url: self.gateway_url.clone(),
            namespace: self.namespace.clone(),
            transport: self.transport(),
            ack_timeout: self.request_timeout.unwrap_or(Duration::from_secs(3600)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rest_url_defaults_to_gateway() {
        let config = PortalConfig::default();
        assert_eq!(config.rest_url().as_str(), "http://localhost:8000/");
        assert_eq!(config.request_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn insecure_tls_carries_through() {
        let config = PortalConfig {
            tls: TlsVerification::DangerAcceptInvalid,
            ..PortalConfig::default()
        };
        assert!(matches!(
            config.transport().tls,
            TlsMode::DangerAcceptInvalid
        ));
        assert_eq!(config.socketio().namespace, "/");
    }
}
