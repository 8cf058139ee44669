//! Config subcommand handlers.

use dialoguer::{Input, Select};
use serde_json::json;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::config::{self, Config, Profile};
use crate::error::CliError;
use crate::output;

use super::util::prompt_err;

const STORES: [&str; 3] = ["keyring", "file", "memory"];

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Init => init(global),

        ConfigCommand::Show => {
            let cfg = config::load_config()?;
            let out = match global.output {
                OutputFormat::Table | OutputFormat::Plain => {
                    toml::to_string_pretty(&cfg).map_err(|e| CliError::Config(e.to_string()))?
                }
                format => output::render_value(format, &cfg, |_| String::new()),
            };
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(&config::config_path().display().to_string(), false);
            Ok(())
        }

        ConfigCommand::Profiles => {
            let cfg = config::load_config()?;
            let default = cfg.default_profile_name().to_owned();
            let rows: Vec<_> = cfg
                .profiles
                .iter()
                .map(|(name, p)| {
                    json!({
                        "name": name,
                        "default": *name == default,
                        "gateway": p.gateway,
                        "namespace": p.namespace.as_deref().unwrap_or("/"),
                        "credential_store": p.credential_store.as_deref()
                            .unwrap_or(&cfg.defaults.credential_store),
                    })
                })
                .collect();
            let out = output::render_records(global.output, &rows, "name");
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Use { name } => {
            let mut cfg = config::load_config()?;
            if !cfg.profiles.contains_key(&name) {
                return Err(CliError::ProfileNotFound {
                    available: cfg.profiles.keys().cloned().collect::<Vec<_>>().join(", "),
                    name,
                });
            }
            cfg.default_profile = Some(name.clone());
            config::save_config(&cfg)?;
            if !global.quiet {
                eprintln!("Default profile set to '{name}'");
            }
            Ok(())
        }
    }
}

/// Guided setup: add or replace one profile.
fn init(global: &GlobalOpts) -> Result<(), CliError> {
    let mut cfg = config::load_config().unwrap_or_else(|_| Config::default());

    let name: String = Input::new()
        .with_prompt("Profile name")
        .default(global.profile.clone().unwrap_or_else(|| "default".into()))
        .interact_text()
        .map_err(prompt_err)?;

    let gateway: String = Input::new()
        .with_prompt("Gateway URL")
        .default(
            global
                .gateway
                .clone()
                .unwrap_or_else(|| Profile::default().gateway),
        )
        .interact_text()
        .map_err(prompt_err)?;

    let namespace: String = Input::new()
        .with_prompt("Socket.IO namespace")
        .default("/".into())
        .interact_text()
        .map_err(prompt_err)?;

    let email: String = Input::new()
        .with_prompt("Account email (optional)")
        .allow_empty(true)
        .interact_text()
        .map_err(prompt_err)?;

    let store = Select::new()
        .with_prompt("Where should the session token be stored?")
        .items(&[
            "System keyring (recommended)",
            "JSON file in the data directory",
            "Memory only (log in every run)",
        ])
        .default(0)
        .interact()
        .map_err(prompt_err)?;

    let profile = Profile {
        gateway,
        namespace: (namespace != "/").then_some(namespace),
        email: (!email.trim().is_empty()).then(|| email.trim().to_owned()),
        credential_store: STORES.get(store).map(|s| (*s).to_owned()),
        insecure: global.insecure.then_some(true),
        ..Profile::default()
    };

    // Validate before touching the file.
    htpi_config::profile_to_portal_config(&profile, &cfg.defaults)?;

    if cfg.profiles.is_empty() {
        cfg.default_profile = Some(name.clone());
    }
    cfg.profiles.insert(name.clone(), profile);
    config::save_config(&cfg)?;

    if !global.quiet {
        eprintln!(
            "Saved profile '{name}' to {}\nNext: htpi --profile {name} login",
            config::config_path().display()
        );
    }
    Ok(())
}
