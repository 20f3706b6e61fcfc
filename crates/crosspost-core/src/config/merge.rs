//! Configuration merging logic (Immutable functional pattern)
//!
//! Layers are merged as TOML tables before deserializing, so a key that a
//! later file omits keeps the earlier value and a key it sets always wins,
//! even when the value equals the built-in default.

use toml::{Table, Value};

/// Deep-merge `overlay` into `base` (overlay takes precedence).
///
/// Nested tables merge key by key; any other value, arrays included, is
/// replaced wholesale.
pub fn merge_tables(base: Table, overlay: Table) -> Table {
    overlay.into_iter().fold(base, |mut merged, (key, value)| {
        let combined = match (merged.remove(&key), value) {
            (Some(Value::Table(existing)), Value::Table(incoming)) => {
                Value::Table(merge_tables(existing, incoming))
            }
            (_, incoming) => incoming,
        };
        merged.insert(key, combined);
        merged
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(src: &str) -> Table {
        src.parse().unwrap_or_default()
    }

    #[test]
    fn test_overlay_wins_per_key() {
        let base = table("[dispatcher]\ntick_interval_secs = 10\naudit_enabled = false\n");
        let overlay = table("[dispatcher]\ntick_interval_secs = 30\n");

        let merged = merge_tables(base, overlay);
        let dispatcher = merged.get("dispatcher").and_then(Value::as_table);

        assert_eq!(
            dispatcher.and_then(|t| t.get("tick_interval_secs")).and_then(Value::as_integer),
            Some(30)
        );
        assert_eq!(
            dispatcher.and_then(|t| t.get("audit_enabled")).and_then(Value::as_bool),
            Some(false)
        );
    }

    #[test]
    fn test_sections_from_both_layers_survive() {
        let merged = merge_tables(
            table("[store]\ncollection = \"posts\"\n"),
            table("[gateway]\nmode = \"callback\"\n"),
        );
        assert!(merged.contains_key("store"));
        assert!(merged.contains_key("gateway"));
    }
}
