//! Login, logout, whoami and password handlers.

use dialoguer::Input;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use htpi_core::User;

use crate::cli::{GlobalOpts, LoginArgs, PasswordArgs, PasswordCommand};
use crate::config::Context;
use crate::error::CliError;
use crate::output;

use super::util;

// ── Login / logout ──────────────────────────────────────────────────

pub async fn login(args: LoginArgs, ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    let email = match args.email.or_else(|| ctx.profile.email.clone()) {
        Some(email) => email,
        None => Input::new()
            .with_prompt("Email")
            .interact_text()
            .map_err(util::prompt_err)?,
    };

    let password = if args.password_stdin {
        util::read_stdin_line()?
    } else {
        rpassword::prompt_password("Password: ").map_err(util::prompt_err)?
    };
    if email.trim().is_empty() || password.is_empty() {
        return Err(CliError::Validation {
            field: "credentials".into(),
            reason: "email and password cannot be empty".into(),
        });
    }

    let user = ctx
        .portal
        .session()
        .login(email.trim(), &SecretString::from(password))
        .await?;

    if !global.quiet {
        eprintln!("Logged in as {} <{}>", user.display_name(), user.email);
        if !ctx.portal.connection().is_connected() {
            eprintln!(
                "warning: event channel at {} is not connected; record commands will retry",
                ctx.portal.connection().endpoint()
            );
        }
    }
    Ok(())
}

pub async fn logout(ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    ctx.portal.session().logout().await;
    if !global.quiet {
        eprintln!("Logged out of profile '{}'", ctx.profile_name);
    }
    Ok(())
}

// ── Whoami ──────────────────────────────────────────────────────────

#[derive(Serialize)]
struct WhoAmI<'a> {
    profile: &'a str,
    #[serde(flatten)]
    user: &'a User,
    validated_at: Option<String>,
    channel: String,
}

pub async fn whoami(ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    util::require_token(ctx)?;

    let session = ctx.portal.session();
    let user = session.restore().await?.ok_or_else(|| CliError::NotLoggedIn {
        profile: ctx.profile_name.clone(),
    })?;
    let validated_at = session
        .session()
        .validated_at
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string());

    let report = WhoAmI {
        profile: &ctx.profile_name,
        user: &user,
        validated_at,
        channel: ctx.portal.connection().status().to_string(),
    };
    let out = output::render_value(global.output, &report, |r| r.user.email.clone());
    output::print_output(&out, global.quiet);
    Ok(())
}

// ── Password ────────────────────────────────────────────────────────

fn prompt_new_password() -> Result<SecretString, CliError> {
    let new = rpassword::prompt_password("New password: ").map_err(util::prompt_err)?;
    let again = rpassword::prompt_password("Repeat new password: ").map_err(util::prompt_err)?;
    if new.is_empty() {
        return Err(CliError::Validation {
            field: "password".into(),
            reason: "password cannot be empty".into(),
        });
    }
    if new != again {
        return Err(CliError::Validation {
            field: "password".into(),
            reason: "passwords do not match".into(),
        });
    }
    Ok(SecretString::from(new))
}

pub async fn password(
    args: PasswordArgs,
    ctx: &Context,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let session = ctx.portal.session();
    match args.command {
        PasswordCommand::Change => {
            util::require_token(ctx)?;
            let current = SecretString::from(
                rpassword::prompt_password("Current password: ").map_err(util::prompt_err)?,
            );
            let new = prompt_new_password()?;
            if current.expose_secret() == new.expose_secret() {
                return Err(CliError::Validation {
                    field: "password".into(),
                    reason: "new password must differ from the current one".into(),
                });
            }
            session.change_password(&current, &new).await?;
            if !global.quiet {
                eprintln!("Password changed");
            }
        }
        PasswordCommand::Forgot { email } => {
            session.forgot_password(&email).await?;
            if !global.quiet {
                eprintln!("If {email} has an account, a reset link is on its way");
            }
        }
        PasswordCommand::Reset { token } => {
            let new = prompt_new_password()?;
            session.reset_password(&token, &new).await?;
            if !global.quiet {
                eprintln!("Password reset; log in with: htpi login");
            }
        }
    }
    Ok(())
}
