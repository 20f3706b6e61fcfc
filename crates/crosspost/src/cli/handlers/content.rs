//! Per-item commands: `publish-now`, `status`, `record-outcome`.

use anyhow::{Context, Result};
use clap::ArgMatches;
use crosspost_core::{
    reconcile::Reconciliation, ChannelName, ChannelStatus, ContentId, ContentItem, PublishOutcome,
};
use serde::Serialize;

use super::{print_json, services::Services, Globals};

fn content_id(matches: &ArgMatches) -> Result<ContentId> {
    matches
        .get_one::<String>("content-id")
        .map(|id| ContentId::new(id.as_str()))
        .context("content id is required")
}

pub async fn handle_publish_now(matches: &ArgMatches) -> Result<()> {
    let globals = Globals::from(matches);
    let id = content_id(matches)?;
    let services = Services::build(&globals.load_config()?).await?;

    let report = services.dispatcher.publish_now(&id).await?;
    let (item, derived) = services.dispatcher.inspect(&id).await?;

    if globals.json {
        return print_json(&serde_json::json!({ "report": report, "status": derived.status }));
    }
    println!(
        "{id}: {} published, {} failed, {} accepted, {} skipped (lease held)",
        report.published, report.failed, report.accepted, report.skipped_lease_denied
    );
    print_item(&item, &derived);
    Ok(())
}

/// JSON shape of `status`.
#[derive(Debug, Serialize)]
struct StatusView<'a> {
    content_id: &'a ContentId,
    stored_status: String,
    derived: &'a Reconciliation,
    channels: &'a crosspost_core::content::ChannelStates,
}

pub async fn handle_status(matches: &ArgMatches) -> Result<()> {
    let globals = Globals::from(matches);
    let id = content_id(matches)?;
    let services = Services::build(&globals.load_config()?).await?;

    let (item, derived) = services.dispatcher.inspect(&id).await?;

    if globals.json {
        return print_json(&StatusView {
            content_id: &item.id,
            stored_status: item.aggregate_status.to_string(),
            derived: &derived,
            channels: &item.channel_states,
        });
    }
    print_item(&item, &derived);
    Ok(())
}

pub async fn handle_record_outcome(matches: &ArgMatches) -> Result<()> {
    let globals = Globals::from(matches);
    let id = content_id(matches)?;
    let channel = matches
        .get_one::<String>("channel")
        .context("channel is required")?;
    let channel = ChannelName::parse(channel)?;
    let status = matches
        .get_one::<String>("status")
        .map(|raw| ChannelStatus::parse_lenient(raw))
        .context("status is required")?;

    let outcome = PublishOutcome {
        status,
        post_url: matches.get_one::<String>("post-url").cloned(),
        post_id: matches.get_one::<String>("post-id").cloned(),
        error: matches.get_one::<String>("error").cloned(),
    };

    let services = Services::build(&globals.load_config()?).await?;
    let derived = services
        .dispatcher
        .record_outcome(&id, &channel, &outcome)
        .await?;

    if globals.json {
        return print_json(&derived);
    }
    println!(
        "{id}/{channel}: recorded {}, item is {}",
        outcome.status, derived.status
    );
    Ok(())
}

fn print_item(item: &ContentItem, derived: &Reconciliation) {
    println!("{}: stored {}", item.id, item.aggregate_status);
    if derived.should_persist {
        println!("  derived {} ({})", derived.status, derived.rule);
    }
    for (name, state) in &item.channel_states {
        let marker = if state.selected { "*" } else { " " };
        let detail = state
            .post_url
            .as_deref()
            .or(state.error.as_deref())
            .unwrap_or("");
        let status: &str = state.status.as_ref();
        println!("  {marker} {:<12} {status:<10} {detail}", name.as_str());
    }
}
