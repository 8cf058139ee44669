//! Shared configuration for the HTPI portal client.
//!
//! TOML profiles, environment overrides, credential backend selection
//! (OS keyring, JSON file, memory) and translation to
//! `htpi_core::PortalConfig`.

mod keyring_backend;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use htpi_core::config::{DEFAULT_GATEWAY_URL, DEFAULT_NAMESPACE};
use htpi_core::{
    CredentialBackend, FileBackend, MemoryBackend, PortalConfig, ReconnectPolicy, TlsVerification,
};

pub use keyring_backend::KeyringBackend;

/// Keyring service name.
pub const KEYRING_SERVICE: &str = "htpi";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found")]
    UnknownProfile { name: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named gateway profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    #[serde(default)]
    pub insecure: bool,

    /// HTTP timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Seconds to wait for a channel acknowledgement; 0 waits forever.
    #[serde(default = "default_timeout")]
    pub request_timeout: u64,

    /// `keyring`, `file` or `memory`.
    #[serde(default = "default_credential_store")]
    pub credential_store: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            insecure: false,
            timeout: default_timeout(),
            request_timeout: default_timeout(),
            credential_store: default_credential_store(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    30
}
fn default_credential_store() -> String {
    "keyring".into()
}

/// A named gateway profile.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Profile {
    /// Gateway base URL (e.g., "http://localhost:8000").
    #[serde(default = "default_gateway")]
    pub gateway: String,

    /// REST base URL when it differs from the gateway.
    pub api_url: Option<String>,

    /// Socket.IO namespace.
    pub namespace: Option<String>,

    /// Email remembered for the login prompt.
    pub email: Option<String>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override insecure TLS setting.
    pub insecure: Option<bool>,

    /// Override HTTP timeout.
    pub timeout: Option<u64>,

    /// Override acknowledgement timeout; 0 waits forever.
    pub request_timeout: Option<u64>,

    /// Channel connection attempts before giving up.
    pub reconnect_attempts: Option<u32>,

    /// Backoff ceiling in seconds.
    pub reconnect_max_delay: Option<u64>,

    /// Override credential store.
    pub credential_store: Option<String>,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            gateway: default_gateway(),
            api_url: None,
            namespace: None,
            email: None,
            ca_cert: None,
            insecure: None,
            timeout: None,
            request_timeout: None,
            reconnect_attempts: None,
            reconnect_max_delay: None,
            credential_store: None,
        }
    }
}

fn default_gateway() -> String {
    DEFAULT_GATEWAY_URL.into()
}

impl Config {
    /// Name of the profile to use when the caller names none.
    pub fn default_profile_name(&self) -> &str {
        self.default_profile.as_deref().unwrap_or("default")
    }

    /// Look up `name` (or the default profile).
    ///
    /// The default profile need not exist in the file: it falls back to a
    /// local gateway. Any other missing name is an error.
    pub fn resolve_profile(&self, name: Option<&str>) -> Result<(String, Profile), ConfigError> {
        let wanted = name.unwrap_or_else(|| self.default_profile_name());
        match self.profiles.get(wanted) {
            Some(profile) => Ok((wanted.to_owned(), profile.clone())),
            None if name.is_none() || wanted == self.default_profile_name() => {
                Ok((wanted.to_owned(), Profile::default()))
            }
            None => Err(ConfigError::UnknownProfile {
                name: wanted.to_owned(),
            }),
        }
    }
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "htpi", "htpi")
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback().join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Credential file used by the `file` store for `profile`.
pub fn credentials_path(profile: &str) -> PathBuf {
    let file = format!("credentials-{profile}.json");
    project_dirs().map_or_else(
        || dirs_fallback().join(&file),
        |dirs| dirs.data_dir().join(&file),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("htpi");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path`, then apply `HTPI_` environment overrides
/// (`HTPI_DEFAULTS__TIMEOUT=10`, `HTPI_DEFAULT_PROFILE=staging`).
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("HTPI_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist or is invalid.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Translation ─────────────────────────────────────────────────────

fn parse_url(field: &str, raw: &str) -> Result<url::Url, ConfigError> {
    let url: url::Url = raw.parse().map_err(|_| ConfigError::Validation {
        field: field.into(),
        reason: format!("invalid URL: {raw}"),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Validation {
            field: field.into(),
            reason: format!("expected http or https, got '{}'", url.scheme()),
        });
    }
    Ok(url)
}

/// Build a `PortalConfig` from a profile and the global defaults.
pub fn profile_to_portal_config(
    profile: &Profile,
    defaults: &Defaults,
) -> Result<PortalConfig, ConfigError> {
    let gateway_url = parse_url("gateway", &profile.gateway)?;
    let api_url = profile
        .api_url
        .as_deref()
        .map(|raw| parse_url("api_url", raw))
        .transpose()?;

    let namespace = profile
        .namespace
        .clone()
        .unwrap_or_else(|| DEFAULT_NAMESPACE.into());
    if !namespace.starts_with('/') {
        return Err(ConfigError::Validation {
            field: "namespace".into(),
            reason: format!("must start with '/', got '{namespace}'"),
        });
    }

    let tls = if profile.insecure.unwrap_or(defaults.insecure) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    let timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));
    let request_timeout = match profile.request_timeout.unwrap_or(defaults.request_timeout) {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };

    let mut reconnect = ReconnectPolicy::default();
    if let Some(attempts) = profile.reconnect_attempts {
        if attempts == 0 {
            return Err(ConfigError::Validation {
                field: "reconnect_attempts".into(),
                reason: "must be at least 1".into(),
            });
        }
        reconnect.max_attempts = attempts;
    }
    if let Some(secs) = profile.reconnect_max_delay {
        reconnect.max_delay = Duration::from_secs(secs).max(reconnect.initial_delay);
    }

    Ok(PortalConfig {
        gateway_url,
        namespace,
        api_url,
        tls,
        timeout,
        request_timeout,
        reconnect,
    })
}

/// Pick the credential backend configured for `profile_name`.
pub fn credential_backend(
    profile_name: &str,
    profile: &Profile,
    defaults: &Defaults,
) -> Result<Arc<dyn CredentialBackend>, ConfigError> {
    let kind = profile
        .credential_store
        .as_deref()
        .unwrap_or(&defaults.credential_store);

    match kind {
        "keyring" => Ok(Arc::new(KeyringBackend::new(profile_name))),
        "file" => Ok(Arc::new(FileBackend::new(credentials_path(profile_name)))),
        "memory" => Ok(Arc::new(MemoryBackend::new())),
        other => Err(ConfigError::Validation {
            field: "credential_store".into(),
            reason: format!("expected 'keyring', 'file', or 'memory', got '{other}'"),
        }),
    }
}
