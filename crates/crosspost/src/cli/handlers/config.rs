//! `config show`.

use anyhow::Result;
use clap::ArgMatches;

use super::{print_json, Globals};

pub fn handle(matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("show", sub_m)) => show(&Globals::from(sub_m)),
        _ => anyhow::bail!("Unknown config subcommand. Run 'crosspost config --help' for usage."),
    }
}

fn show(globals: &Globals) -> Result<()> {
    let config = globals.load_config()?.redacted();
    if globals.json {
        return print_json(&config);
    }
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}
