//! `run` and `tick`.

use std::time::Duration;

use anyhow::Result;
use crosspost_core::{wait_for_signal, ShutdownCoordinator, TickReport};

use super::{print_json, services::Services, Globals};

pub async fn handle_run(globals: &Globals) -> Result<()> {
    let config = globals.load_config()?;
    let services = Services::build(&config).await?;

    let coordinator = ShutdownCoordinator::new(Duration::from_secs(30));

    let dispatcher = services.dispatcher.clone();
    coordinator.spawn("dispatcher", |rx| dispatcher.run(rx)).await;

    let leases = services.leases.clone();
    coordinator.spawn("lease-sweeper", |rx| leases.run_sweeper(rx)).await;

    let session = services.session.clone();
    coordinator.spawn("session-sweeper", |rx| session.run_sweeper(rx)).await;

    tracing::info!(
        publishing_enabled = config.dispatcher.publishing_enabled,
        tick_interval_secs = config.dispatcher.tick_interval_secs,
        "crosspost running"
    );

    wait_for_signal().await?;

    coordinator.shutdown().await?;
    services.session.shutdown().await;
    Ok(())
}

pub async fn handle_tick(globals: &Globals) -> Result<()> {
    let config = globals.load_config()?;
    let services = Services::build(&config).await?;
    let report = services.dispatcher.run_tick().await?;

    if globals.json {
        print_json(&report)
    } else {
        print_summary(&report);
        Ok(())
    }
}

fn print_summary(report: &TickReport) {
    if report.auth_unavailable {
        println!("Tick {} skipped: no credential available", report.tick);
        return;
    }
    println!(
        "Tick {}: {} discovered, {} attempted, {} published, {} failed, {} accepted",
        report.tick,
        report.discovered,
        report.attempted,
        report.published,
        report.failed,
        report.accepted
    );
    println!(
        "  skipped: {} lease held, {} not due",
        report.skipped_lease_denied, report.skipped_not_due
    );
    println!(
        "  {} statuses persisted, {} audit corrections, {} errors",
        report.statuses_persisted, report.audit_corrections, report.errors
    );
    if report.publishing_disabled {
        println!("  publishing is disabled; nothing was sent");
    }
}
