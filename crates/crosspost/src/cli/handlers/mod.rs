//! CLI command handlers that bridge between `clap` and the core services

mod config;
mod content;
mod daemon;
mod services;

use std::path::PathBuf;

use anyhow::Result;
use clap::ArgMatches;
use crosspost_core::Config;
use serde::Serialize;

/// Format an error for user display (no stack traces)
pub fn format_error(err: &anyhow::Error) -> String {
    let msg = err.to_string();
    if let Some(source) = err.source() {
        let source_msg = source.to_string();
        if !msg.contains(&source_msg) && !source_msg.is_empty() {
            return format!("{msg}\nCause: {source_msg}");
        }
    }
    msg
}

pub async fn dispatch(matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("run", sub_m)) => daemon::handle_run(&Globals::from(sub_m)).await,
        Some(("tick", sub_m)) => daemon::handle_tick(&Globals::from(sub_m)).await,
        Some(("publish-now", sub_m)) => content::handle_publish_now(sub_m).await,
        Some(("status", sub_m)) => content::handle_status(sub_m).await,
        Some(("record-outcome", sub_m)) => content::handle_record_outcome(sub_m).await,
        Some(("config", sub_m)) => config::handle(sub_m),
        Some((other, _)) => {
            anyhow::bail!("Unknown command '{other}'. Run 'crosspost --help' for usage.")
        }
        None => anyhow::bail!("No command given. Run 'crosspost --help' for usage."),
    }
}

/// Flags every subcommand accepts.
#[derive(Debug, Clone, Default)]
struct Globals {
    config: Option<PathBuf>,
    json: bool,
}

impl From<&ArgMatches> for Globals {
    fn from(matches: &ArgMatches) -> Self {
        Self {
            config: matches.get_one::<PathBuf>("config").cloned(),
            json: matches.get_flag("json"),
        }
    }
}

impl Globals {
    fn load_config(&self) -> Result<Config> {
        Ok(crosspost_core::load_config(self.config.as_deref())?)
    }
}

/// Print `value` as pretty JSON.
fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
