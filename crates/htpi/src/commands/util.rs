//! Shared helpers for command handlers.

use std::io::BufRead;
use std::path::Path;

use serde_json::{Map, Value};

use htpi_core::User;

use crate::config::Context;
use crate::error::CliError;

/// Fail with a login hint unless a token is stored.
pub fn require_token(ctx: &Context) -> Result<(), CliError> {
    if ctx.portal.credentials().token().is_none() {
        return Err(CliError::NotLoggedIn {
            profile: ctx.profile_name.clone(),
        });
    }
    Ok(())
}

/// Revalidate the stored session and make sure the channel is up.
///
/// Every record and watch command goes through here first.
pub async fn require_session(ctx: &Context) -> Result<User, CliError> {
    require_token(ctx)?;

    let user = ctx
        .portal
        .session()
        .restore()
        .await?
        .ok_or_else(|| CliError::NotLoggedIn {
            profile: ctx.profile_name.clone(),
        })?;

    let connection = ctx.portal.connection();
    if !connection.is_connected() {
        tracing::debug!(endpoint = %connection.endpoint(), "channel not up after restore, connecting");
        connection.connect().await?;
    }
    Ok(user)
}

/// Prompt for confirmation, auto-approving if `--yes` was passed.
pub fn confirm(message: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    if !std::io::IsTerminal::is_terminal(&std::io::stdin()) {
        return Err(CliError::NonInteractiveRequiresYes {
            action: message.to_owned(),
        });
    }
    dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(prompt_err)
}

/// Map a dialoguer / interactive I/O failure into CliError.
pub fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

/// Read one line from stdin, without the trailing newline.
pub fn read_stdin_line() -> Result<String, CliError> {
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_owned())
}

/// Parse a JSON object from `--data` or `--from-file`.
pub fn json_object_arg(data: Option<&str>, from_file: Option<&Path>) -> Result<Value, CliError> {
    let raw = match (data, from_file) {
        (Some(inline), _) => inline.to_owned(),
        (None, Some(path)) => std::fs::read_to_string(path)?,
        (None, None) => {
            return Err(CliError::Validation {
                field: "data".into(),
                reason: "pass --data '<json>' or --from-file <path>".into(),
            });
        }
    };

    let value: Value = serde_json::from_str(&raw)?;
    if !value.is_object() {
        return Err(CliError::Validation {
            field: "data".into(),
            reason: "expected a JSON object".into(),
        });
    }
    Ok(value)
}

/// Turn `key=value` pairs into a query object. Values that parse as JSON
/// keep their type; everything else is a string.
pub fn parse_filters(filters: &[String]) -> Result<Value, CliError> {
    let mut params = Map::new();
    for filter in filters {
        let Some((key, raw)) = filter.split_once('=') else {
            return Err(CliError::Validation {
                field: "filter".into(),
                reason: format!("expected KEY=VALUE, got '{filter}'"),
            });
        };
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_owned()));
        params.insert(key.trim().to_owned(), value);
    }
    Ok(Value::Object(params))
}
