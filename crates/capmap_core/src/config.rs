//! Runtime configuration.
//!
//! # Environment variables
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `CAPMAP_LOG_LEVEL` | build-mode default | `trace|debug|info|warn|error` |
//! | `CAPMAP_LOG_DIR` | unset (logging off) | absolute directory for rolling logs |
//! | `CAPMAP_DATABASE_PATH` | unset (in-memory) | SQLite database file |
//! | `CAPMAP_DEDUP_MAX_CONFLICT_RETRIES` | `3` | retries after a taxonomy version conflict |
//!
//! Unparseable values fall back to the default.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::logging::default_log_level;

const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 3;

/// Deduplication engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// How many times a filing call reloads and re-applies its mutation after
    /// losing a compare-and-swap race. `0` disables retrying.
    pub max_conflict_retries: u32,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
        }
    }
}

impl DedupConfig {
    /// Reads engine settings from the environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let max_conflict_retries = lookup("CAPMAP_DEDUP_MAX_CONFLICT_RETRIES")
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(DEFAULT_MAX_CONFLICT_RETRIES);
        Self {
            max_conflict_retries,
        }
    }
}

/// Process-level settings for hosts embedding the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub log_level: String,
    /// `None` leaves file logging disabled.
    pub log_dir: Option<PathBuf>,
    /// `None` selects an in-memory database.
    pub database_path: Option<PathBuf>,
    pub dedup: DedupConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level().to_string(),
            log_dir: None,
            database_path: None,
            dedup: DedupConfig::default(),
        }
    }
}

impl CoreConfig {
    /// Reads all settings from the environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Parses settings from a JSON document; missing keys use defaults.
    pub fn from_json_str(value: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(value)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_blank = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        Self {
            log_level: non_blank("CAPMAP_LOG_LEVEL")
                .unwrap_or_else(|| default_log_level().to_string()),
            log_dir: non_blank("CAPMAP_LOG_DIR").map(PathBuf::from),
            database_path: non_blank("CAPMAP_DATABASE_PATH").map(PathBuf::from),
            dedup: DedupConfig::from_lookup(&lookup),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let values: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key: &str| values.get(key).cloned()
    }

    #[test]
    fn env_values_override_defaults() {
        let config = CoreConfig::from_lookup(lookup_from(&[
            ("CAPMAP_LOG_LEVEL", "warn"),
            ("CAPMAP_DATABASE_PATH", "/tmp/capmap.sqlite3"),
            ("CAPMAP_DEDUP_MAX_CONFLICT_RETRIES", "7"),
        ]));
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.log_dir, None);
        assert_eq!(
            config.database_path,
            Some(PathBuf::from("/tmp/capmap.sqlite3"))
        );
        assert_eq!(config.dedup.max_conflict_retries, 7);
    }

    #[test]
    fn bad_numbers_and_blanks_fall_back() {
        let config = CoreConfig::from_lookup(lookup_from(&[
            ("CAPMAP_LOG_DIR", "   "),
            ("CAPMAP_DEDUP_MAX_CONFLICT_RETRIES", "many"),
        ]));
        assert_eq!(config.log_dir, None);
        assert_eq!(config.dedup, DedupConfig::default());
    }

    #[test]
    fn json_fills_missing_keys_with_defaults() {
        let config = CoreConfig::from_json_str(r#"{"dedup":{"max_conflict_retries":0}}"#).unwrap();
        assert_eq!(config.dedup.max_conflict_retries, 0);
        assert_eq!(config.log_level, default_log_level());
        assert!(config.database_path.is_none());
    }
}
