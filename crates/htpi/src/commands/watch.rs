//! Live broadcast feed.
//!
//! Registers one listener per broadcast event next to the cache's own
//! subscriptions and prints every change until Ctrl-C or `--count`.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use htpi_core::sync::resource::Change;
use htpi_core::{ConnectionStatus, Resource};

use crate::cli::{GlobalOpts, OutputFormat, RecordKind, WatchArgs};
use crate::config::Context;
use crate::error::CliError;
use crate::output;

use super::util;

const CHANGES: [Change; 3] = [Change::Created, Change::Updated, Change::Deleted];

#[derive(Debug, Serialize)]
struct Broadcast {
    at: String,
    event: String,
    id: Option<String>,
    payload: Value,
}

fn resource_of(kind: RecordKind) -> Resource {
    match kind {
        RecordKind::Patients => Resource::PATIENT,
        RecordKind::Claims => Resource::CLAIM,
        RecordKind::Policies => Resource::INSURANCE_POLICY,
    }
}

/// Requested resources in first-mention order, or all of them when none given.
fn selected_resources(kinds: &[RecordKind]) -> Vec<Resource> {
    if kinds.is_empty() {
        return Resource::ALL.to_vec();
    }
    let mut resources = Vec::with_capacity(kinds.len());
    for resource in kinds.iter().copied().map(resource_of) {
        if !resources.contains(&resource) {
            resources.push(resource);
        }
    }
    resources
}

pub async fn handle(args: WatchArgs, ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    util::require_session(ctx).await?;

    let resources = selected_resources(&args.resource);

    let connection = ctx.portal.connection();
    let (tx, mut rx) = mpsc::unbounded_channel::<Broadcast>();
    let mut listeners = Vec::new();

    for resource in &resources {
        ctx.portal.data().ensure_subscribed(*resource);
        for change in CHANGES {
            let event = resource.broadcast(change);
            let tx = tx.clone();
            let name = event.clone();
            let resource = *resource;
            let id = connection.on(&event, move |payload| {
                let _ = tx.send(Broadcast {
                    at: Utc::now().to_rfc3339(),
                    event: name.clone(),
                    id: resource.extract_id(resource.unwrap_record(payload)),
                    payload: payload.clone(),
                });
            });
            listeners.push((event, id));
        }
    }
    drop(tx);

    if !global.quiet {
        let names: Vec<_> = resources.iter().map(|r| r.collection).collect();
        eprintln!("Watching {} (Ctrl-C to stop)", names.join(", "));
    }

    let mut status = connection.subscribe();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut seen = 0_usize;

    let outcome = loop {
        tokio::select! {
            biased;
            _ = &mut ctrl_c => break Ok(()),
            changed = status.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let current = *status.borrow_and_update();
                if current == ConnectionStatus::Failed {
                    break Err(CliError::ConnectionFailed {
                        url: connection.endpoint(),
                        reason: "reconnection attempts exhausted".into(),
                    });
                }
                tracing::info!(status = %current, "channel status changed");
            }
            Some(broadcast) = rx.recv() => {
                print_broadcast(global, &broadcast);
                seen += 1;
                if args.count.is_some_and(|n| seen >= n) {
                    break Ok(());
                }
            }
            else => break Ok(()),
        }
    };

    for (event, id) in listeners {
        connection.off(&event, Some(id));
    }
    outcome
}

fn print_broadcast(global: &GlobalOpts, broadcast: &Broadcast) {
    let id = broadcast.id.as_deref().unwrap_or("-");
    let line = match global.output {
        OutputFormat::Table => format!("{}  {:<26}  {id}", broadcast.at, broadcast.event),
        OutputFormat::Plain => format!("{} {id}", broadcast.event),
        // One document per event so the stream stays line-parseable.
        OutputFormat::Json | OutputFormat::JsonCompact => {
            output::render_value(OutputFormat::JsonCompact, broadcast, |_| String::new())
        }
        OutputFormat::Yaml => format!(
            "---\n{}",
            output::render_value(OutputFormat::Yaml, broadcast, |_| String::new())
        ),
    };
    output::print_output(&line, global.quiet);
}
