//! Configuration for kinship relationship sync.
//!
//! Configuration is loaded from (in priority order):
//! 1. Environment variables (KINSHIP__ prefix, `__` separator)
//! 2. Config file (kinship.toml, `[sync]` table)
//! 3. Defaults

use std::time::Duration;

use serde::Deserialize;

use crate::error::Result;

/// Sync engine configuration.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SyncConfig {
    /// Folder (relative to the vault root) holding contact documents.
    #[serde(default = "default_contacts_folder")]
    pub contacts_folder: String,

    /// Seconds after which a held document lock is force-reclaimed.
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout_secs: u64,

    /// Quiet period in milliseconds before a burst of edits is synced.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Heading level used when a Related section is appended.
    #[serde(default = "default_heading_level")]
    pub section_heading_level: usize,

    /// Append an empty Related section even when there is nothing to list.
    #[serde(default)]
    pub create_missing_section: bool,

    /// Write genders inferred from gendered terms back to front matter.
    #[serde(default = "default_true")]
    pub write_inferred_gender: bool,

    #[serde(default = "default_uid_field")]
    pub uid_field: String,

    #[serde(default = "default_name_field")]
    pub name_field: String,

    #[serde(default = "default_gender_field")]
    pub gender_field: String,

    #[serde(default = "default_revision_field")]
    pub revision_field: String,
}

impl SyncConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

fn default_contacts_folder() -> String {
    "Contacts".to_string()
}

fn default_lock_timeout() -> u64 {
    30
}

fn default_debounce_ms() -> u64 {
    1000
}

fn default_heading_level() -> usize {
    2
}

fn default_true() -> bool {
    true
}

fn default_uid_field() -> String {
    "UID".to_string()
}

fn default_name_field() -> String {
    "FN".to_string()
}

fn default_gender_field() -> String {
    "GENDER".to_string()
}

fn default_revision_field() -> String {
    "REV".to_string()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            contacts_folder: default_contacts_folder(),
            lock_timeout_secs: default_lock_timeout(),
            debounce_ms: default_debounce_ms(),
            section_heading_level: default_heading_level(),
            create_missing_section: false,
            write_inferred_gender: true,
            uid_field: default_uid_field(),
            name_field: default_name_field(),
            gender_field: default_gender_field(),
            revision_field: default_revision_field(),
        }
    }
}

/// Load the `[sync]` table from `<file_prefix>.toml` and `KINSHIP__` env vars.
///
/// A missing file or table yields the defaults; a present but malformed
/// table is an error.
pub fn load_config(file_prefix: &str) -> Result<SyncConfig> {
    let cfg = config::Config::builder()
        .add_source(config::File::with_name(file_prefix).required(false))
        .add_source(
            config::Environment::with_prefix("KINSHIP")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    match cfg.get::<SyncConfig>("sync") {
        Ok(c) => Ok(c),
        Err(config::ConfigError::NotFound(_)) => {
            tracing::debug!(file_prefix, "No [sync] configuration found, using defaults");
            Ok(SyncConfig::default())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.contacts_folder, "Contacts");
        assert_eq!(config.lock_timeout(), Duration::from_secs(30));
        assert_eq!(config.debounce(), Duration::from_millis(1000));
        assert_eq!(config.section_heading_level, 2);
        assert!(config.write_inferred_gender);
        assert!(!config.create_missing_section);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = load_config("definitely-not-a-kinship-config-file").unwrap();
        assert_eq!(config.uid_field, "UID");
        assert_eq!(config.revision_field, "REV");
    }
}
