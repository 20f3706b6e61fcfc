//! Loading-focused tests for configuration
//!
//! Tests for file loading, layering, validation, and environment overrides.

#[cfg(test)]
mod loading_tests {
    use std::{collections::HashMap, io::Write};

    use serial_test::serial;

    use crate::config::{
        config_from_table, load_config, load_toml_file, Config, GatewayMode, LeaseBackend,
    };
    use crate::{Error, Result};

    fn write_config(dir: &tempfile::TempDir, body: &str) -> Result<std::path::PathBuf> {
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path)?;
        file.write_all(body.as_bytes())?;
        Ok(path)
    }

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_are_valid() -> Result<()> {
        let config = Config::default();
        config.validate()?;
        assert_eq!(config.dispatcher.tick_interval_secs, 30);
        assert_eq!(config.leases.ttl_secs, 300);
        assert_eq!(config.leases.max_leases, 500);
        assert_eq!(config.session.refresh_ceiling, 3);
        assert_eq!(config.session.lookahead_secs, 1800);
        assert!(config.session.static_token_ttl_secs > config.session.lookahead_secs);
        assert_eq!(config.store.collection, "campaign_content");
        assert!(config.dispatcher.publishing_enabled);
        Ok(())
    }

    #[test]
    #[serial]
    fn test_explicit_file_overrides_defaults() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_config(
            &dir,
            r#"
[dispatcher]
tick_interval_secs = 5

[gateway]
mode = "callback"
webhook_url = "https://hooks.example.com/p"
"#,
        )?;

        let config = load_config(Some(&path))?;

        assert_eq!(config.dispatcher.tick_interval_secs, 5);
        assert_eq!(config.dispatcher.due_batch_limit, 100, "untouched keys keep defaults");
        assert_eq!(config.gateway.mode, GatewayMode::Callback);
        Ok(())
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let result = load_config(Some(&dir.path().join("absent.toml")));
        assert!(matches!(result, Err(Error::Io(_))));
        Ok(())
    }

    #[test]
    fn test_malformed_toml_returns_parse_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_config(&dir, "[dispatcher\ntick_interval_secs = ")?;
        let result = load_toml_file(&path);
        assert!(matches!(result, Err(Error::ParseError(_))));
        Ok(())
    }

    #[test]
    fn test_wrongly_typed_value_is_rejected() -> Result<()> {
        let table = "[leases]\nttl_secs = \"five minutes\"\n"
            .parse()
            .map_err(|e: toml::de::Error| Error::ParseError(e.to_string()))?;
        assert!(matches!(config_from_table(table), Err(Error::ParseError(_))));
        Ok(())
    }

    #[test]
    fn test_directory_path_is_rejected() -> Result<()> {
        let dir = tempfile::tempdir()?;
        assert!(matches!(load_toml_file(dir.path()), Err(Error::Io(_))));
        Ok(())
    }

    #[test]
    fn test_env_overrides_apply() -> Result<()> {
        let config = Config::default().apply_env_from(env(&[
            ("CROSSPOST_TICK_INTERVAL_SECS", "12"),
            ("CROSSPOST_LEASE_BACKEND", "SQLite"),
            ("CROSSPOST_LEASE_SQLITE_PATH", "/tmp/leases.db"),
            ("CROSSPOST_STATIC_TOKEN", "tok"),
        ]))?;

        assert_eq!(config.dispatcher.tick_interval_secs, 12);
        assert_eq!(config.leases.backend, LeaseBackend::Sqlite);
        assert_eq!(config.session.static_token.as_deref(), Some("tok"));
        config.validate()?;
        Ok(())
    }

    #[test]
    fn test_disable_scheduler_turns_off_publishing() -> Result<()> {
        let config =
            Config::default().apply_env_from(env(&[("CROSSPOST_DISABLE_SCHEDULER", "true")]))?;
        assert!(!config.dispatcher.publishing_enabled);
        Ok(())
    }

    #[test]
    fn test_invalid_env_value_is_reported() {
        let result =
            Config::default().apply_env_from(env(&[("CROSSPOST_TICK_INTERVAL_SECS", "soon")]));
        assert!(matches!(
            result,
            Err(Error::InvalidConfig(msg)) if msg.contains("CROSSPOST_TICK_INTERVAL_SECS")
        ));
    }

    #[test]
    #[serial]
    fn test_process_env_is_read() -> Result<()> {
        std::env::set_var("CROSSPOST_STORE_COLLECTION", "posts");
        let result = Config::default().apply_env_vars();
        std::env::remove_var("CROSSPOST_STORE_COLLECTION");

        assert_eq!(result?.store.collection, "posts");
        Ok(())
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut zero_tick = Config::default();
        zero_tick.dispatcher.tick_interval_secs = 0;
        assert!(zero_tick.validate().is_err());

        let mut tiny_ceiling = Config::default();
        tiny_ceiling.leases.max_leases = 3;
        assert!(tiny_ceiling.validate().is_err());

        let mut sqlite_without_path = Config::default();
        sqlite_without_path.leases.backend = LeaseBackend::Sqlite;
        assert!(sqlite_without_path.validate().is_err());

        let mut half_login = Config::default();
        half_login.session.email = Some("ops@example.com".into());
        assert!(half_login.validate().is_err());

        let mut static_inside_lookahead = Config::default();
        static_inside_lookahead.session.static_token_ttl_secs = 1800;
        assert!(static_inside_lookahead.validate().is_err());

        let mut bad_url = Config::default();
        bad_url.store.base_url = Some("cms.example.com".into());
        assert!(bad_url.validate().is_err());
    }

    #[test]
    fn test_redacted_hides_secrets() -> Result<()> {
        let mut config = Config::default();
        config.session.static_token = Some("secret-token".into());
        config.session.email = Some("ops@example.com".into());
        config.session.password = Some("hunter2".into());

        let shown = toml::to_string(&config.redacted())
            .map_err(|e| Error::ParseError(e.to_string()))?;

        assert!(!shown.contains("secret-token"));
        assert!(!shown.contains("hunter2"));
        assert!(shown.contains("ops@example.com"));
        Ok(())
    }
}
