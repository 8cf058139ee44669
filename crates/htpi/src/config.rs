//! CLI configuration: thin wrapper around `htpi_config` shared types.
//!
//! Adds the resolution step that layers `GlobalOpts` flag overrides
//! (--gateway, --insecure, --timeout) on top of the selected profile.

use htpi_core::{CredentialStore, Portal, PortalConfig, TlsVerification};

use crate::cli::GlobalOpts;
use crate::error::CliError;

// ── Re-exports from shared crate ────────────────────────────────────

pub use htpi_config::{Config, Profile, config_path, load_config, save_config};

/// A portal wired for one profile.
pub struct Context {
    pub profile_name: String,
    pub profile: Profile,
    pub portal: Portal,
}

// ── CLI-specific helpers ────────────────────────────────────────────

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .unwrap_or_else(|| config.default_profile_name().to_owned())
}

/// Apply flag overrides to a profile before translation.
fn apply_overrides(mut profile: Profile, global: &GlobalOpts) -> Profile {
    if let Some(ref gateway) = global.gateway {
        profile.gateway.clone_from(gateway);
    }
    if global.insecure {
        profile.insecure = Some(true);
    }
    if let Some(timeout) = global.timeout {
        profile.timeout = Some(timeout);
    }
    profile
}

/// Build the `PortalConfig` for the active profile.
pub fn resolve_portal_config(
    cfg: &Config,
    global: &GlobalOpts,
) -> Result<(String, Profile, PortalConfig), CliError> {
    let (name, profile) = cfg.resolve_profile(global.profile.as_deref())?;
    let profile = apply_overrides(profile, global);
    let portal_config = htpi_config::profile_to_portal_config(&profile, &cfg.defaults)?;

    if portal_config.tls == TlsVerification::DangerAcceptInvalid {
        tracing::warn!(profile = %name, "TLS certificate verification disabled");
    }
    tracing::debug!(
        profile = %name,
        gateway = %portal_config.gateway_url,
        timeout = ?portal_config.timeout,
        request_timeout = ?portal_config.request_timeout,
        "resolved portal config"
    );

    Ok((name, profile, portal_config))
}

/// Load config, resolve the profile and wire a `Portal` for it.
pub fn build_context(global: &GlobalOpts) -> Result<Context, CliError> {
    let cfg = load_config()?;
    let (profile_name, profile, portal_config) = resolve_portal_config(&cfg, global)?;

    let backend = htpi_config::credential_backend(&profile_name, &profile, &cfg.defaults)?;
    let portal = Portal::new(portal_config, CredentialStore::new(backend))?;

    Ok(Context {
        profile_name,
        profile,
        portal,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::cli::OutputFormat;

    fn global() -> GlobalOpts {
        GlobalOpts {
            profile: None,
            gateway: None,
            output: OutputFormat::Table,
            verbose: 0,
            quiet: false,
            yes: false,
            insecure: false,
            timeout: None,
        }
    }

    #[test]
    fn gateway_flag_overrides_profile() {
        let cfg = Config::default();
        let opts = GlobalOpts {
            gateway: Some("https://gw.example".into()),
            insecure: true,
            timeout: Some(5),
            ..global()
        };
        let (name, _, portal) = resolve_portal_config(&cfg, &opts).unwrap();
        assert_eq!(name, "default");
        assert_eq!(portal.gateway_url.as_str(), "https://gw.example/");
        assert_eq!(portal.tls, TlsVerification::DangerAcceptInvalid);
        assert_eq!(portal.timeout, Duration::from_secs(5));
    }

    #[test]
    fn unknown_profile_is_reported() {
        let cfg = Config::default();
        let opts = GlobalOpts {
            profile: Some("prod".into()),
            ..global()
        };
        assert!(matches!(
            resolve_portal_config(&cfg, &opts),
            Err(CliError::ProfileNotFound { .. })
        ));
    }
}
