//! Command dispatch: bridges CLI args -> portal services -> output formatting.

pub mod auth;
pub mod config_cmd;
pub mod profile;
pub mod records;
pub mod request;
pub mod util;
pub mod watch;

use htpi_core::Resource;

use crate::cli::{Command, GlobalOpts};
use crate::config::Context;
use crate::error::CliError;

/// Dispatch a gateway-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Login(args) => auth::login(args, ctx, global).await,
        Command::Logout => auth::logout(ctx, global).await,
        Command::Whoami => auth::whoami(ctx, global).await,
        Command::Password(args) => auth::password(args, ctx, global).await,
        Command::Profile(args) => profile::handle(args, ctx, global).await,
        Command::Patients(args) => records::handle(Resource::PATIENT, args, ctx, global).await,
        Command::Claims(args) => records::handle(Resource::CLAIM, args, ctx, global).await,
        Command::Policies(args) => {
            records::handle(Resource::INSURANCE_POLICY, args, ctx, global).await
        }
        Command::Watch(args) => watch::handle(args, ctx, global).await,
        Command::Request(args) => request::handle(args, ctx, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => Err(CliError::Internal(
            "command does not need a gateway".into(),
        )),
    }
}
