pub mod handlers;

use std::path::PathBuf;

use clap::{value_parser, Arg, ArgAction, Command};

pub fn build_cli() -> Command {
    Command::new("crosspost")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Publish content items to many channels on schedule")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .value_name("PATH")
                .value_parser(value_parser!(PathBuf))
                .help("Config file to use instead of .crosspost/config.toml"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Print machine-readable JSON"),
        )
        .subcommand(cmd_run())
        .subcommand(cmd_tick())
        .subcommand(cmd_publish_now())
        .subcommand(cmd_status())
        .subcommand(cmd_record_outcome())
        .subcommand(cmd_config())
}

fn content_id_arg() -> Arg {
    Arg::new("content-id")
        .required(true)
        .value_name("CONTENT_ID")
        .help("Content item id in the store")
}

fn cmd_run() -> Command {
    Command::new("run").about("Run the dispatcher and sweepers until SIGINT/SIGTERM")
}

fn cmd_tick() -> Command {
    Command::new("tick").about("Run one dispatcher tick and print its report")
}

fn cmd_publish_now() -> Command {
    Command::new("publish-now")
        .about("Publish one item now, retrying failed channels")
        .arg(content_id_arg())
}

fn cmd_status() -> Command {
    Command::new("status")
        .about("Show the derived status of an item without changing it")
        .arg(content_id_arg())
}

fn cmd_record_outcome() -> Command {
    Command::new("record-outcome")
        .about("Record a publish outcome reported by the gateway")
        .arg(content_id_arg())
        .arg(
            Arg::new("channel")
                .required(true)
                .value_name("CHANNEL")
                .help("Channel the outcome belongs to"),
        )
        .arg(
            Arg::new("status")
                .long("status")
                .required(true)
                .value_parser(["published", "failed", "error", "pending", "scheduled"])
                .help("Channel status reported by the gateway"),
        )
        .arg(Arg::new("post-url").long("post-url").value_name("URL"))
        .arg(Arg::new("post-id").long("post-id").value_name("ID"))
        .arg(Arg::new("error").long("error").value_name("MESSAGE"))
}

fn cmd_config() -> Command {
    Command::new("config")
        .about("Inspect configuration")
        .subcommand_required(true)
        .subcommand(
            Command::new("show").about("Print the effective configuration, secrets redacted"),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        build_cli().debug_assert();
    }

    #[test]
    fn test_global_flags_reach_subcommands() -> anyhow::Result<()> {
        let matches = build_cli().try_get_matches_from([
            "crosspost", "status", "c-1", "--json", "-c", "x.toml",
        ])?;
        let (name, sub_m) = matches
            .subcommand()
            .ok_or_else(|| anyhow::anyhow!("missing subcommand"))?;
        assert_eq!(name, "status");
        assert!(sub_m.get_flag("json"));
        assert_eq!(
            sub_m.get_one::<PathBuf>("config"),
            Some(&PathBuf::from("x.toml"))
        );
        Ok(())
    }

    #[test]
    fn test_record_outcome_requires_status() {
        let result = build_cli().try_get_matches_from(["crosspost", "record-outcome", "c-1", "vk"]);
        assert!(result.is_err());
    }
}
