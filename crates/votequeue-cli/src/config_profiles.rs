//! Persistent CLI profile configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use votequeue_core::SyncOptions;

const CONFIG_FILE_NAME: &str = "cli-config.json";
pub const PROFILE_ENV_VAR: &str = "VOTEQUEUE_PROFILE";
pub const LEDGER_URL_ENV_VAR: &str = "VOTEQUEUE_LEDGER_URL";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliProfilesConfig {
    #[serde(default = "default_config_version")]
    pub version: u32,
    #[serde(default)]
    pub active_profile: Option<String>,
    #[serde(default)]
    pub profiles: BTreeMap<String, CliProfile>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliProfile {
    /// Base URL of the ledger gateway
    #[serde(default)]
    pub ledger_url: Option<String>,
    /// Connectivity probe URL; defaults to `{ledger_url}/health`
    #[serde(default)]
    pub health_url: Option<String>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub inter_item_delay_ms: Option<u64>,
    #[serde(default)]
    pub settle_delay_ms: Option<u64>,
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
}

const fn default_config_version() -> u32 {
    1
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("votequeue")
        .join(CONFIG_FILE_NAME)
}

pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    votequeue_core::util::normalize_text_option(value)
}

pub fn normalize_profile_name(value: Option<&str>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

pub fn is_http_url(value: &str) -> bool {
    votequeue_core::util::is_http_url(value)
}

impl CliProfilesConfig {
    pub fn load() -> Result<Self, String> {
        Self::load_from_path(&default_config_path())
    }

    pub fn load_from_path(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|error| format!("Failed to read config at {}: {}", path.display(), error))?;
        let mut config = serde_json::from_str::<Self>(&raw)
            .map_err(|error| format!("Failed to parse config at {}: {}", path.display(), error))?;
        config.normalize();
        Ok(config)
    }

    pub fn save(&self) -> Result<PathBuf, String> {
        let path = default_config_path();
        self.save_to_path(&path)?;
        Ok(path)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| {
                format!(
                    "Failed to create config directory {}: {}",
                    parent.display(),
                    error
                )
            })?;
        }

        let mut normalized = self.clone();
        normalized.normalize();
        let serialized = serde_json::to_string_pretty(&normalized)
            .map_err(|error| format!("Failed to serialize config: {error}"))?;
        std::fs::write(path, serialized)
            .map_err(|error| format!("Failed to write config at {}: {}", path.display(), error))
    }

    /// Explicit name, then `VOTEQUEUE_PROFILE`, then the active profile, then `default`.
    pub fn resolve_profile_name(&self, explicit: Option<&str>) -> String {
        if let Some(profile) = normalize_profile_name(explicit) {
            return profile;
        }
        if let Some(profile) =
            normalize_profile_name(std::env::var(PROFILE_ENV_VAR).ok().as_deref())
        {
            return profile;
        }
        if let Some(profile) = normalize_profile_name(self.active_profile.as_deref()) {
            return profile;
        }
        "default".to_string()
    }

    pub fn profile(&self, name: &str) -> Option<&CliProfile> {
        self.profiles.get(name)
    }

    pub fn profile_mut_or_default(&mut self, name: &str) -> &mut CliProfile {
        self.profiles.entry(name.to_string()).or_default()
    }

    fn normalize(&mut self) {
        self.active_profile = normalize_profile_name(self.active_profile.as_deref());
        for profile in self.profiles.values_mut() {
            profile.normalize();
        }
    }
}

impl CliProfile {
    /// Ledger gateway URL, with `VOTEQUEUE_LEDGER_URL` taking precedence
    pub fn ledger_url(&self) -> Option<String> {
        normalize_text_option(std::env::var(LEDGER_URL_ENV_VAR).ok())
            .or_else(|| normalize_text_option(self.ledger_url.clone()))
    }

    pub fn health_url(&self) -> Option<String> {
        normalize_text_option(self.health_url.clone()).or_else(|| {
            self.ledger_url()
                .map(|url| format!("{}/health", url.trim_end_matches('/')))
        })
    }

    /// Defaults overlaid with whatever this profile overrides
    pub fn sync_options(&self) -> SyncOptions {
        let defaults = SyncOptions::default();
        let options = SyncOptions {
            max_attempts: defaults.max_attempts,
            inter_item_delay_ms: self
                .inter_item_delay_ms
                .unwrap_or(defaults.inter_item_delay_ms),
            settle_delay_ms: self.settle_delay_ms.unwrap_or(defaults.settle_delay_ms),
            poll_interval_ms: self.poll_interval_ms.unwrap_or(defaults.poll_interval_ms),
        };
        options.with_max_attempts(self.max_attempts.unwrap_or(defaults.max_attempts))
    }

    fn normalize(&mut self) {
        self.ledger_url = normalize_text_option(self.ledger_url.clone())
            .map(|url| url.trim_end_matches('/').to_string());
        self.health_url = normalize_text_option(self.health_url.clone());
    }
}
