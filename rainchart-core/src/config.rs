use anyhow::{Context, Result, anyhow, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{Location, provider::ProviderId, provider::open_meteo::FieldMap};

/// Configuration for a single provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Override of the provider's API root, mostly for testing against a mock.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// A location remembered between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedLocation {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl SavedLocation {
    /// Names compare case-insensitively.
    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    pub fn to_location(&self) -> Result<Location> {
        Location::new(self.name.clone(), self.latitude, self.longitude)
            .with_context(|| format!("Saved location '{}' is invalid", self.name))
    }
}

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Optional default provider id, "open-meteo" or "openweather".
    /// Open-Meteo is used when unset.
    pub default_provider: Option<String>,

    /// Example TOML:
    /// [providers.openweather]
    /// api_key = "..."
    pub providers: HashMap<String, ProviderConfig>,

    /// HTTP timeout applied to every request.
    pub timeout_secs: u64,

    pub past_days: u8,
    pub forecast_days: u8,

    /// Overrides the Open-Meteo block/array names.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<FieldMap>,

    pub locations: Vec<SavedLocation>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_provider: None,
            providers: HashMap::new(),
            timeout_secs: 30,
            past_days: 7,
            forecast_days: 7,
            fields: None,
            locations: Vec::new(),
        }
    }
}

impl Config {
    /// Return the default provider as a strongly-typed ProviderId.
    pub fn default_provider_id(&self) -> Result<ProviderId> {
        match self.default_provider.as_deref() {
            None => Ok(ProviderId::OpenMeteo),
            Some(s) => ProviderId::try_from(s).context(
                "Invalid default provider in config.\n\
                 Hint: run `rainchart configure <provider>`, e.g. `open-meteo`.",
            ),
        }
    }

    pub fn has_provider(&self, id: ProviderId) -> bool {
        self.providers.contains_key(id.as_str())
    }

    pub fn provider_config(&self, id: ProviderId) -> Option<&ProviderConfig> {
        self.providers.get(id.as_str())
    }

    /// Store default provider as string.
    pub fn set_default_provider(&mut self, id: ProviderId) {
        self.default_provider = Some(id.as_str().to_string());
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn base_url(&self, id: ProviderId) -> Option<&str> {
        self.provider_config(id)
            .and_then(|cfg| cfg.base_url.as_deref())
    }

    /// Load config from disk, or return an empty default if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file, return empty.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "rainchart", "rainchart")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Convenience helper: set/replace a provider API key and optionally set default provider.
    pub fn upsert_provider_api_key(&mut self, provider_id: ProviderId, api_key: String) {
        let key = provider_id.as_str().to_string();
        self.providers.entry(key).or_default().api_key = Some(api_key);

        if self.default_provider.is_none() {
            self.default_provider = Some(provider_id.to_string());
        }
    }

    /// Returns API key for a provider, if present.
    pub fn provider_api_key(&self, provider_id: ProviderId) -> Option<&str> {
        self.provider_config(provider_id)
            .and_then(|cfg| cfg.api_key.as_deref())
    }

    pub fn is_provider_configured(&self, provider_id: ProviderId) -> bool {
        !provider_id.requires_api_key() || self.provider_api_key(provider_id).is_some()
    }

    /// Add a named location. Names are unique, case-insensitively.
    pub fn add_location(&mut self, name: &str, latitude: f64, longitude: f64) -> Result<()> {
        let location = Location::new(name, latitude, longitude)?;

        if self.find_location(location.name()).is_some() {
            bail!("A location named '{}' already exists", location.name());
        }

        self.locations.push(SavedLocation {
            name: location.name().to_string(),
            latitude,
            longitude,
        });
        Ok(())
    }

    /// Returns whether a location was removed.
    pub fn remove_location(&mut self, name: &str) -> bool {
        let before = self.locations.len();
        self.locations.retain(|l| !l.is_named(name));
        self.locations.len() != before
    }

    pub fn find_location(&self, name: &str) -> Option<&SavedLocation> {
        self.locations.iter().find(|l| l.is_named(name))
    }

    pub fn location(&self, name: &str) -> Result<Location> {
        self.find_location(name)
            .ok_or_else(|| {
                anyhow!(
                    "Unknown location '{name}'.\n\
                     Hint: run `rainchart add-location {name} <lat> <lon>` first."
                )
            })?
            .to_location()
    }

    pub fn all_locations(&self) -> Result<Vec<Location>> {
        self.locations
            .iter()
            .map(SavedLocation::to_location)
            .collect()
    }
}
