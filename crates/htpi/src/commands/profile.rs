//! Profile subcommand handlers.

use htpi_core::{ProfileUpdate, User};

use crate::cli::{GlobalOpts, ProfileArgs, ProfileCommand};
use crate::config::Context;
use crate::error::CliError;
use crate::output;

use super::util;

pub async fn handle(args: ProfileArgs, ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    util::require_token(ctx)?;
    let session = ctx.portal.session();

    let user = match args.command {
        ProfileCommand::Show => session.profile().await?,
        ProfileCommand::Update {
            first_name,
            last_name,
            email,
            phone,
        } => {
            let update = ProfileUpdate {
                first_name,
                last_name,
                email,
                phone,
            };
            if update.is_empty() {
                return Err(CliError::Validation {
                    field: "profile".into(),
                    reason: "nothing to update; pass at least one field".into(),
                });
            }
            session.update_profile(&update).await?
        }
    };

    let out = output::render_value(global.output, &user, |u: &User| u.email.clone());
    output::print_output(&out, global.quiet);
    Ok(())
}
