//! Raw correlated request: `htpi request patient:get -d '{"patient_id":"P1"}'`.

use serde_json::Value;

use crate::cli::{GlobalOpts, RequestArgs};
use crate::config::Context;
use crate::error::CliError;
use crate::output;

use super::util;

pub async fn handle(args: RequestArgs, ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    if !args.operation.contains(':') {
        return Err(CliError::Validation {
            field: "operation".into(),
            reason: format!("expected '<resource>:<action>', got '{}'", args.operation),
        });
    }
    let payload = match args.data.as_deref() {
        Some(raw) => serde_json::from_str(raw)?,
        None => Value::Object(serde_json::Map::new()),
    };

    util::require_session(ctx).await?;
    let data = ctx.portal.data().request(&args.operation, payload).await?;

    let out = output::render_value(global.output, &data, Value::to_string);
    output::print_output(&out, global.quiet);
    Ok(())
}
