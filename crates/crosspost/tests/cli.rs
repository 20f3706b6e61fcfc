//! Binary-level checks that need no external services.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::{fs, path::Path};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// `crosspost` isolated from the user's config files and environment.
fn crosspost(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("crosspost").unwrap();
    cmd.current_dir(home)
        .env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env_remove("RUST_LOG");
    for (key, _) in std::env::vars() {
        if key.starts_with("CROSSPOST_") {
            cmd.env_remove(key);
        }
    }
    cmd
}

#[test]
fn config_show_redacts_secrets() {
    let home = TempDir::new().unwrap();
    let path = home.path().join("crosspost.toml");
    fs::write(
        &path,
        r#"
[session]
static_token = "super-secret-admin-token"

[store]
base_url = "https://cms.example.com"
"#,
    )
    .unwrap();

    crosspost(home.path())
        .args(["config", "show", "--json", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("<redacted>"))
        .stdout(predicate::str::contains("https://cms.example.com"))
        .stdout(predicate::str::contains("super-secret-admin-token").not());
}

#[test]
fn project_config_is_picked_up() {
    let home = TempDir::new().unwrap();
    fs::create_dir_all(home.path().join(".crosspost")).unwrap();
    fs::write(
        home.path().join(".crosspost/config.toml"),
        "[dispatcher]\ntick_interval_secs = 7\n",
    )
    .unwrap();

    crosspost(home.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("tick_interval_secs = 7"));
}

#[test]
fn invalid_config_exits_with_validation_code() {
    let home = TempDir::new().unwrap();
    let path = home.path().join("bad.toml");
    fs::write(&path, "[dispatcher]\ntick_interval_secs = 0\n").unwrap();

    crosspost(home.path())
        .args(["config", "show", "--config"])
        .arg(&path)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("tick_interval_secs"));
}

#[test]
fn missing_explicit_config_is_an_error() {
    let home = TempDir::new().unwrap();

    crosspost(home.path())
        .args(["config", "show", "--config", "does-not-exist.toml"])
        .assert()
        .failure();
}

#[test]
fn tick_without_store_url_is_a_config_error() {
    let home = TempDir::new().unwrap();

    crosspost(home.path())
        .arg("tick")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("store.base_url"));
}

#[test]
fn env_override_reaches_effective_config() {
    let home = TempDir::new().unwrap();

    crosspost(home.path())
        .args(["config", "show", "--json"])
        .env("CROSSPOST_DISABLE_SCHEDULER", "true")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"publishing_enabled\": false"));
}
