//! Record handlers shared by `patients`, `claims` and `policies`.

use std::sync::Arc;

use serde_json::Value;

use htpi_core::{CoreError, Resource};

use crate::cli::{GlobalOpts, RecordArgs, RecordCommand};
use crate::config::Context;
use crate::error::CliError;
use crate::output;

use super::util;

pub async fn handle(
    resource: Resource,
    args: RecordArgs,
    ctx: &Context,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    util::require_session(ctx).await?;
    let data = ctx.portal.data();

    match args.command {
        RecordCommand::List { filter } => {
            let params = util::parse_filters(&filter)?;
            let listing = data.list(resource, params).await?;
            let records = resource.unwrap_list(&listing);
            let out = output::render_records(global.output, records, resource.id_field);
            output::print_output(&out, global.quiet);
        }

        RecordCommand::Get { id } => {
            let record: Arc<Value> = data
                .get(resource, &id)
                .await
                .map_err(|e| not_found(resource, &id, e))?;
            let out = output::render_record(global.output, &record, resource.id_field);
            output::print_output(&out, global.quiet);
        }

        RecordCommand::Create { data: inline, from_file } => {
            let record = util::json_object_arg(inline.as_deref(), from_file.as_deref())?;
            let created = data.create(resource, record).await?;
            let out = output::render_record(global.output, &created, resource.id_field);
            output::print_output(&out, global.quiet);
        }

        RecordCommand::Update {
            id,
            data: inline,
            from_file,
        } => {
            let changes = util::json_object_arg(inline.as_deref(), from_file.as_deref())?;
            let updated = data
                .update(resource, &id, changes)
                .await
                .map_err(|e| not_found(resource, &id, e))?;
            let out = output::render_record(global.output, &updated, resource.id_field);
            output::print_output(&out, global.quiet);
        }

        RecordCommand::Delete { id } => {
            if !util::confirm(&format!("Delete {resource} {id}?"), global.yes)? {
                return Ok(());
            }
            data.delete(resource, &id)
                .await
                .map_err(|e| not_found(resource, &id, e))?;
            if !global.quiet {
                eprintln!("Deleted {resource} {id}");
            }
        }
    }
    Ok(())
}

/// Turn a `NOT_FOUND` rejection into a not-found diagnostic.
fn not_found(resource: Resource, id: &str, err: CoreError) -> CliError {
    match err {
        CoreError::Rejected { code: Some(ref code), .. } if code.eq_ignore_ascii_case("not_found") => {
            CliError::NotFound {
                resource_type: resource.name.replace('_', " "),
                identifier: id.to_owned(),
                list_command: format!("{} list", command_name(resource)),
            }
        }
        other => other.into(),
    }
}

fn command_name(resource: Resource) -> &'static str {
    match resource.name {
        "claim" => "claims",
        "insurance_policy" => "policies",
        _ => "patients",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_rejection_names_the_list_command() {
        let err = not_found(
            Resource::INSURANCE_POLICY,
            "POL9",
            CoreError::Rejected {
                code: Some("NOT_FOUND".into()),
                message: "Policy not found".into(),
            },
        );
        assert!(matches!(
            err,
            CliError::NotFound { ref list_command, ref resource_type, .. }
                if list_command == "policies list" && resource_type == "insurance policy"
        ));
    }

    #[test]
    fn other_rejections_pass_through() {
        let err = not_found(
            Resource::PATIENT,
            "P1",
            CoreError::Rejected {
                code: Some("FORBIDDEN".into()),
                message: "nope".into(),
            },
        );
        assert!(matches!(err, CliError::Rejected { .. }));
    }
}
